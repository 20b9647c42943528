//! 游戏状态快照与存档管理
//!
//! [`GameSnapshot`] is the persisted shape of a [`GameWorld`]: everything
//! mutable, including the generation counters, in one serde record.
//! [`GameStateManager`] is the only place that reads or writes it; the
//! versioned envelope itself is handled by [`save::SaveManager`].

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use dungeon::{EnemyKind, GenerationState, Grid, ItemKind, Position, ZoneCache, ZoneCoord};
use error::GameError;
use save::{AutoSave, KeyValueStore, SaveManager};
use serde::{Deserialize, Serialize};

use crate::config::SaveConfig;
use crate::event_bus::{GameEvent, Subscription, names};
use crate::services::Services;
use crate::world::{Enemy, GameWorld, GroundItem, Health, MessageLog, Player};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemySnapshot {
    pub kind: EnemyKind,
    pub position: Position,
    pub hp: u32,
    pub spawn_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub kind: ItemKind,
    pub position: Position,
    pub spawn_key: String,
}

/// 存档数据（包含游戏完整状态）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub player: Player,
    pub zone: ZoneCoord,
    pub grid: Grid,
    pub zones: ZoneCache,
    /// Enemies of the current zone, in roster order.
    pub enemies: Vec<EnemySnapshot>,
    pub items: Vec<ItemSnapshot>,
    pub defeated: BTreeSet<String>,
    #[serde(default)]
    pub collected: BTreeSet<String>,
    pub messages: MessageLog,
    pub generation: GenerationState,
    #[serde(default)]
    pub turn: u64,
}

impl GameSnapshot {
    pub fn capture(world: &GameWorld) -> Self {
        let enemies = world
            .enemies
            .iter()
            .filter_map(|entity| {
                let mut query = world
                    .entities
                    .query_one::<(&Enemy, &Position, &Health)>(*entity)
                    .ok()?;
                let (enemy, position, health) = query.get()?;
                Some(EnemySnapshot {
                    kind: enemy.kind,
                    position: *position,
                    hp: health.current,
                    spawn_key: enemy.spawn_key.clone(),
                })
            })
            .collect();

        let mut items: Vec<ItemSnapshot> = world
            .entities
            .query::<(&GroundItem, &Position)>()
            .iter()
            .map(|(_, (item, position))| ItemSnapshot {
                kind: item.kind,
                position: *position,
                spawn_key: item.spawn_key.clone(),
            })
            .collect();
        items.sort_by(|a, b| a.spawn_key.cmp(&b.spawn_key));

        let mut zones = world.zones.clone();
        zones.update_grid(world.zone, &world.grid);

        Self {
            player: world.player.clone(),
            zone: world.zone,
            grid: world.grid.clone(),
            zones,
            enemies,
            items,
            defeated: world.defeated.clone(),
            collected: world.collected.clone(),
            messages: world.messages.clone(),
            generation: world.generation.clone(),
            turn: world.turn,
        }
    }

    /// 从快照重建世界；死亡的敌人不会被恢复
    pub fn restore(self) -> GameWorld {
        let mut world = GameWorld::with_grid(self.grid, self.player.position);
        world.player = self.player;
        world.zone = self.zone;
        world.zones = self.zones;
        world.defeated = self.defeated;
        world.collected = self.collected;
        world.messages = self.messages;
        world.generation = self.generation;
        world.turn = self.turn;

        for enemy in self.enemies.into_iter().filter(|enemy| enemy.hp > 0) {
            let entity = world.spawn_enemy(enemy.kind, enemy.position, enemy.spawn_key);
            if let Ok(mut health) = world.entities.get::<&mut Health>(entity) {
                health.current = enemy.hp.min(health.max);
            }
        }
        for item in self.items {
            world.spawn_item(item.kind, item.position, item.spawn_key);
        }
        world
    }
}

/// Version 1 saves called the defeated set `defeatedEnemies` and kept the
/// message log under `log`.
fn migrate_state(state: &mut serde_json::Value, from_version: u32) {
    if from_version >= 2 {
        return;
    }
    let Some(object) = state.as_object_mut() else {
        return;
    };
    if let Some(defeated) = object.remove("defeatedEnemies") {
        object.insert("defeated".into(), defeated);
    }
    if let Some(log) = object.remove("log") {
        object.insert("messages".into(), log);
    }
}

/// 存档管理：游戏状态的唯一持久化入口
pub struct GameStateManager<S: KeyValueStore> {
    saves: SaveManager<S>,
    autosave: Option<AutoSave>,
}

impl<S: KeyValueStore> GameStateManager<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            saves: SaveManager::new(store, key).with_migration(migrate_state),
            autosave: None,
        }
    }

    pub fn from_config(store: S, config: &SaveConfig) -> Self {
        let mut manager = Self::new(store, config.key.clone());
        if config.autosave {
            manager.autosave = Some(AutoSave::new(config.autosave_interval()));
        }
        manager
    }

    pub fn saves(&self) -> &SaveManager<S> {
        &self.saves
    }

    pub fn saves_mut(&mut self) -> &mut SaveManager<S> {
        &mut self.saves
    }

    pub fn has_save(&self) -> bool {
        self.saves.has_save()
    }

    pub fn autosave_enabled(&self) -> bool {
        self.autosave.is_some()
    }

    /// 保存当前世界，返回时间戳
    pub fn save(&mut self, world: &GameWorld) -> Result<u64, GameError> {
        let snapshot = GameSnapshot::capture(world);
        let last_saved = self.saves.save(&snapshot)?;
        tracing::info!(turn = world.turn, last_saved, "game saved");
        Ok(last_saved)
    }

    /// `Ok(None)` when there is no save.
    pub fn load(&mut self) -> Result<Option<GameWorld>, GameError> {
        let Some(envelope) = self.saves.load::<GameSnapshot>()? else {
            return Ok(None);
        };
        let world = envelope.state.restore();
        tracing::info!(
            turn = world.turn,
            zone.x = world.zone.x,
            zone.y = world.zone.y,
            "game loaded"
        );
        Ok(Some(world))
    }

    /// Load the saved game, or build a fresh one when there is none or it
    /// cannot be read.
    pub fn load_or_new(&mut self, fresh: impl FnOnce() -> GameWorld) -> (GameWorld, bool) {
        match self.load() {
            Ok(Some(world)) => (world, true),
            Ok(None) => (fresh(), false),
            Err(err) => {
                tracing::warn!(error = %err, "save unusable, starting a new game");
                (fresh(), false)
            }
        }
    }

    pub fn clear(&mut self) -> Result<(), GameError> {
        self.saves.clear()
    }

    fn autosave_due(&self, now: Instant) -> bool {
        self.autosave.as_ref().is_some_and(|auto| auto.is_due(now))
    }

    fn mark_autosaved(&mut self, now: Instant) {
        if let Some(auto) = self.autosave.as_mut() {
            auto.mark_saved(now);
        }
    }
}

impl<S: KeyValueStore + 'static> GameStateManager<S> {
    /// 每个敌人阶段结束后自动保存
    pub fn attach_autosave(manager: Rc<RefCell<Self>>, services: &Services) -> Subscription {
        let world = services.world.clone();
        let bus = services.bus.clone();
        services
            .bus
            .on(names::TURN_ENEMY_COMPLETED, move |_| -> anyhow::Result<()> {
                let now = Instant::now();
                let mut manager = manager.borrow_mut();
                if !manager.autosave_due(now) {
                    return Ok(());
                }
                let last_saved = {
                    let world = world.borrow();
                    if !world.player.is_alive() {
                        return Ok(());
                    }
                    manager.save(&world)?
                };
                manager.mark_autosaved(now);
                drop(manager);
                bus.publish(&GameEvent::GameSaved { last_saved });
                Ok(())
            })
    }
}
