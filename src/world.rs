//! Mutable game world shared by the turn core.
//!
//! Enemies and ground items live as entities in a [`hecs::World`]; the
//! ordered `enemies` list is the authoritative roster the turn manager
//! snapshots. Combat removes entries from both when an enemy dies.

use std::collections::{BTreeSet, VecDeque};

use dungeon::{
    Direction, EnemyKind, GenerationState, Grid, Item, ItemKind, Position, SpawnKind, Tile,
    ZoneCache, ZoneCoord, ZoneGenerator,
};
use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::event_bus::GameEvent;

/// 敌人组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enemy {
    pub kind: EnemyKind,
    /// Identity in the defeated set, see [`dungeon::Spawn::key`].
    pub spawn_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Health {
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0
    }

    /// 扣除生命值，返回是否死亡
    pub fn take_damage(&mut self, amount: u32) -> bool {
        self.current = self.current.saturating_sub(amount);
        !self.is_alive()
    }
}

/// 地面物品组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundItem {
    pub kind: ItemKind,
    pub spawn_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<Item>,
}

impl Inventory {
    pub fn add(&mut self, kind: ItemKind, quantity: u32) {
        match self.items.iter_mut().find(|item| item.kind == kind) {
            Some(item) => item.quantity += quantity,
            None => self.items.push(Item::new(kind, quantity)),
        }
    }

    /// 取出一个物品，没有时返回 `false`
    pub fn take(&mut self, kind: ItemKind) -> bool {
        let Some(index) = self.items.iter().position(|item| item.kind == kind) else {
            return false;
        };
        self.items[index].quantity -= 1;
        if self.items[index].quantity == 0 {
            self.items.remove(index);
        }
        true
    }

    pub fn count(&self, kind: ItemKind) -> u32 {
        self.items
            .iter()
            .filter(|item| item.kind == kind)
            .map(|item| item.quantity)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub position: Position,
    pub hp: u32,
    pub max_hp: u32,
    pub attack: u32,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            hp: 10,
            max_hp: 10,
            attack: 1,
            inventory: Inventory::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp);
        self.hp - before
    }
}

/// 消息日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct MessageLog {
    entries: VecDeque<String>,
}

impl MessageLog {
    pub const CAPACITY: usize = 50;

    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() >= Self::CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &str> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl From<Vec<String>> for MessageLog {
    fn from(entries: Vec<String>) -> Self {
        let mut log = MessageLog::default();
        for entry in entries {
            log.push(entry);
        }
        log
    }
}

impl From<MessageLog> for Vec<String> {
    fn from(log: MessageLog) -> Self {
        log.entries.into()
    }
}

/// Where the player lands when entering a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Center,
    /// Entered by walking off the previous zone's edge in this direction.
    Heading(Direction),
    At(Position),
}

pub struct GameWorld {
    pub entities: World,
    /// Authoritative, ordered enemy roster for the current zone.
    pub enemies: Vec<Entity>,
    pub player: Player,
    pub zone: ZoneCoord,
    pub grid: Grid,
    pub zones: ZoneCache,
    pub defeated: BTreeSet<String>,
    pub collected: BTreeSet<String>,
    pub messages: MessageLog,
    pub generation: GenerationState,
    /// Completed enemy phases.
    pub turn: u64,
    /// Events raised while the world was borrowed, published once it is released.
    pub outbox: Vec<GameEvent>,
}

impl GameWorld {
    /// An empty world over `grid`, without zone bookkeeping. Useful for fixtures.
    pub fn with_grid(grid: Grid, player_at: Position) -> Self {
        Self {
            entities: World::new(),
            enemies: Vec::new(),
            player: Player::new(player_at),
            zone: ZoneCoord::ORIGIN,
            grid,
            zones: ZoneCache::new(),
            defeated: BTreeSet::new(),
            collected: BTreeSet::new(),
            messages: MessageLog::default(),
            generation: GenerationState::default(),
            turn: 0,
            outbox: Vec::new(),
        }
    }

    /// 开始新游戏：生成起始区域，玩家位于中心
    pub fn new_game(seed: u64, generator: &dyn ZoneGenerator) -> Self {
        let mut world = Self::with_grid(Grid::filled(1, 1, Tile::Floor), Position::default());
        world.generation = GenerationState::with_seed(seed);
        world.enter_zone(ZoneCoord::ORIGIN, generator, Arrival::Center);
        world.messages.push("Welcome, adventurer.");
        world
    }

    /// 进入区域：加载或生成地图，并重建实体
    pub fn enter_zone(&mut self, coord: ZoneCoord, generator: &dyn ZoneGenerator, arrival: Arrival) {
        self.zones.update_grid(self.zone, &self.grid);
        let zone = self
            .zones
            .get_or_generate(coord, generator, &mut self.generation)
            .clone();

        self.zone = coord;
        self.grid = zone.grid.clone();
        self.entities.clear();
        self.enemies.clear();

        for spawn in &zone.spawns {
            let key = spawn.key(coord);
            match spawn.kind {
                SpawnKind::Enemy(kind) if !self.defeated.contains(&key) => {
                    self.spawn_enemy(kind, spawn.position, key);
                }
                SpawnKind::Item(kind) if !self.collected.contains(&key) => {
                    self.spawn_item(kind, spawn.position, key);
                }
                _ => {}
            }
        }

        self.player.position = match arrival {
            Arrival::Center => zone.center(),
            Arrival::Heading(direction) => zone.entry_point(direction),
            Arrival::At(position) => position,
        };
        tracing::info!(zone.x = coord.x, zone.y = coord.y, enemies = self.enemies.len(), "entered zone");
        self.outbox.push(GameEvent::ZoneEntered { zone: coord });
    }

    pub fn spawn_enemy(&mut self, kind: EnemyKind, position: Position, spawn_key: String) -> Entity {
        let entity = self.entities.spawn((
            Enemy { kind, spawn_key },
            position,
            Health::full(kind.max_hp()),
        ));
        self.enemies.push(entity);
        entity
    }

    pub fn spawn_item(&mut self, kind: ItemKind, position: Position, spawn_key: String) -> Entity {
        self.entities.spawn((GroundItem { kind, spawn_key }, position))
    }

    /// 从世界和权威列表中移除敌人；已移除时返回 `false`
    pub fn remove_enemy(&mut self, entity: Entity) -> bool {
        self.enemies.retain(|e| *e != entity);
        self.entities.despawn(entity).is_ok()
    }

    /// Still on the roster, still in the world, and alive.
    pub fn is_enemy_active(&self, entity: Entity) -> bool {
        self.enemies.contains(&entity)
            && self
                .entities
                .get::<&Health>(entity)
                .is_ok_and(|health| health.is_alive())
    }

    pub fn enemy_position(&self, entity: Entity) -> Option<Position> {
        self.entities.get::<&Position>(entity).ok().map(|pos| *pos)
    }

    pub fn enemy_kind(&self, entity: Entity) -> Option<EnemyKind> {
        self.entities.get::<&Enemy>(entity).ok().map(|enemy| enemy.kind)
    }

    /// Living enemy standing on `pos`.
    pub fn enemy_at(&self, pos: Position) -> Option<Entity> {
        self.enemies
            .iter()
            .copied()
            .find(|e| self.is_enemy_active(*e) && self.enemy_position(*e) == Some(pos))
    }

    pub fn living_enemy_count(&self) -> usize {
        self.enemies
            .iter()
            .filter(|e| self.is_enemy_active(**e))
            .count()
    }

    pub fn has_living_enemies(&self) -> bool {
        self.living_enemy_count() > 0
    }

    pub fn item_at(&self, pos: Position) -> Option<Entity> {
        self.entities
            .query::<(&GroundItem, &Position)>()
            .iter()
            .find(|(_, (_, item_pos))| **item_pos == pos)
            .map(|(entity, _)| entity)
    }

    pub fn tile_at(&self, pos: Position) -> Option<Tile> {
        self.grid.get(pos)
    }

    pub fn player_tile(&self) -> Option<Tile> {
        self.grid.get(self.player.position)
    }

    /// Terrain allows it and no living enemy blocks it.
    pub fn is_passable(&self, pos: Position) -> bool {
        self.grid.is_walkable(pos) && self.enemy_at(pos).is_none()
    }

    /// Replace a tile and keep the zone cache in step.
    pub fn set_tile(&mut self, pos: Position, tile: Tile) -> bool {
        let changed = self.grid.set(pos, tile);
        if changed {
            self.zones.update_grid(self.zone, &self.grid);
        }
        changed
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.messages.push(message);
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.outbox)
    }
}
