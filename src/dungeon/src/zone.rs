//! 区域、区域缓存与区域生成器
//!
//! 生成过程中的计数器和标志位保存在 [`GenerationState`] 中，由调用方持有并以
//! `&mut` 传入生成器，便于测试重置与隔离。

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::content::{EnemyKind, ItemKind};
use crate::grid::Grid;
use crate::position::{Direction, Position};
use crate::tiles::Tile;

/// 区域坐标（世界地图上的一屏）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneCoord {
    pub x: i32,
    pub y: i32,
}

impl ZoneCoord {
    pub const ORIGIN: ZoneCoord = ZoneCoord { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn neighbor(self, direction: Direction) -> ZoneCoord {
        let (dx, dy) = direction.delta();
        ZoneCoord::new(self.x + dx, self.y + dy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "kind")]
pub enum SpawnKind {
    Enemy(EnemyKind),
    Item(ItemKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawn {
    pub position: Position,
    pub kind: SpawnKind,
}

impl Spawn {
    /// Stable identity of a spawn across visits, used by the defeated/collected sets.
    pub fn key(&self, zone: ZoneCoord) -> String {
        format!("{},{}@{}", zone.x, zone.y, self.position.key())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub coord: ZoneCoord,
    pub grid: Grid,
    pub spawns: Vec<Spawn>,
}

impl Zone {
    pub fn center(&self) -> Position {
        Position::new(self.grid.width() / 2, self.grid.height() / 2)
    }

    /// Where the player appears after leaving the previous zone heading `heading`.
    ///
    /// The player enters through the exit on the opposite edge, one tile inward.
    pub fn entry_point(&self, heading: Direction) -> Position {
        let entry_edge = heading.opposite();
        self.grid
            .positions()
            .find(|pos| self.grid.exit_direction(*pos) == Some(entry_edge))
            .map(|exit| exit.step(heading))
            .filter(|pos| self.grid.is_walkable(*pos))
            .unwrap_or_else(|| self.center())
    }
}

/// 已访问区域的缓存，序列化为区域列表
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Zone>", into = "Vec<Zone>")]
pub struct ZoneCache {
    zones: HashMap<ZoneCoord, Zone>,
}

impl ZoneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: ZoneCoord) -> Option<&Zone> {
        self.zones.get(&coord)
    }

    pub fn contains(&self, coord: ZoneCoord) -> bool {
        self.zones.contains_key(&coord)
    }

    pub fn insert(&mut self, zone: Zone) {
        self.zones.insert(zone.coord, zone);
    }

    /// Keeps the cached grid in sync with in-zone terrain changes (e.g. chopped trees).
    pub fn update_grid(&mut self, coord: ZoneCoord, grid: &Grid) {
        if let Some(zone) = self.zones.get_mut(&coord) {
            zone.grid = grid.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Returns the cached zone, generating and caching it on first visit.
    pub fn get_or_generate(
        &mut self,
        coord: ZoneCoord,
        generator: &dyn ZoneGenerator,
        state: &mut GenerationState,
    ) -> &Zone {
        self.zones
            .entry(coord)
            .or_insert_with(|| generator.generate(coord, state))
    }
}

impl From<Vec<Zone>> for ZoneCache {
    fn from(zones: Vec<Zone>) -> Self {
        Self {
            zones: zones.into_iter().map(|zone| (zone.coord, zone)).collect(),
        }
    }
}

impl From<ZoneCache> for Vec<Zone> {
    fn from(cache: ZoneCache) -> Self {
        let mut zones: Vec<Zone> = cache.zones.into_values().collect();
        zones.sort_by_key(|zone| zone.coord);
        zones
    }
}

/// 会话级生成计数器与标志位
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationState {
    pub seed: u64,
    pub zones_generated: u32,
    pub enemies_spawned: u32,
    pub items_spawned: u32,
    /// The welcome sign is placed once, in the first generated zone.
    pub sign_placed: bool,
}

impl GenerationState {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// 区域生成协作者
pub trait ZoneGenerator {
    fn generate(&self, coord: ZoneCoord, state: &mut GenerationState) -> Zone;
}

/// Seeded room generator: walled border, one exit per edge, scattered terrain.
///
/// The centre row and column are always kept clear so every exit is reachable
/// from the centre.
#[derive(Clone, Debug)]
pub struct BasicZoneGenerator {
    pub width: i32,
    pub height: i32,
}

impl Default for BasicZoneGenerator {
    fn default() -> Self {
        Self {
            width: 21,
            height: 13,
        }
    }
}

impl BasicZoneGenerator {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width: width.max(7),
            height: height.max(7),
        }
    }

    fn rng_for(coord: ZoneCoord, seed: u64) -> Pcg64 {
        let mixed = seed
            ^ (coord.x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (coord.y as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        Pcg64::seed_from_u64(mixed)
    }

    fn carve_border(&self, grid: &mut Grid) {
        let (w, h) = (self.width, self.height);
        for pos in grid.positions().collect::<Vec<_>>() {
            if pos.x == 0 || pos.y == 0 || pos.x == w - 1 || pos.y == h - 1 {
                grid.set(pos, Tile::Wall);
            }
        }
        for exit in [
            Position::new(w / 2, 0),
            Position::new(w / 2, h - 1),
            Position::new(0, h / 2),
            Position::new(w - 1, h / 2),
        ] {
            grid.set(exit, Tile::Exit);
        }
    }

    fn is_corridor(&self, pos: Position) -> bool {
        pos.x == self.width / 2 || pos.y == self.height / 2
    }
}

impl ZoneGenerator for BasicZoneGenerator {
    fn generate(&self, coord: ZoneCoord, state: &mut GenerationState) -> Zone {
        let mut rng = Self::rng_for(coord, state.seed);
        let mut grid = Grid::filled(self.width, self.height, Tile::Floor);
        self.carve_border(&mut grid);

        let center = Position::new(self.width / 2, self.height / 2);
        for pos in grid.positions().collect::<Vec<_>>() {
            if grid.get(pos) != Some(Tile::Floor) || self.is_corridor(pos) {
                continue;
            }
            let roll: f64 = rng.random();
            let tile = if roll < 0.08 {
                Tile::Tree
            } else if roll < 0.10 {
                Tile::Water
            } else if roll < 0.11 {
                Tile::Statue
            } else {
                continue;
            };
            grid.set(pos, tile);
        }

        if !state.sign_placed {
            grid.set(Position::new(center.x + 2, center.y - 2), Tile::Sign);
            grid.set(Position::new(center.x - 2, center.y - 2), Tile::Npc);
            state.sign_placed = true;
        }
        if state.zones_generated % 5 == 4 {
            grid.set(Position::new(center.x + 2, center.y + 2), Tile::Port);
        }

        let mut spawns = Vec::new();
        let free = |grid: &Grid, spawns: &[Spawn], pos: Position| {
            grid.get(pos) == Some(Tile::Floor)
                && pos != center
                && !spawns.iter().any(|s| s.position == pos)
        };

        if coord != ZoneCoord::ORIGIN {
            let count = 1 + state.zones_generated.min(6) / 2;
            for _ in 0..count {
                for _attempt in 0..50 {
                    let pos = Position::new(
                        rng.random_range(1..self.width - 1),
                        rng.random_range(1..self.height - 1),
                    );
                    if !free(&grid, &spawns, pos) {
                        continue;
                    }
                    let roll: f64 = rng.random();
                    let kind = if roll < 0.5 {
                        EnemyKind::Slime
                    } else if roll < 0.85 {
                        EnemyKind::Skeleton
                    } else {
                        EnemyKind::Bomber
                    };
                    spawns.push(Spawn {
                        position: pos,
                        kind: SpawnKind::Enemy(kind),
                    });
                    state.enemies_spawned += 1;
                    break;
                }
            }
        }

        for (chance, item) in [(0.4, ItemKind::HealingPotion), (0.3, ItemKind::Coin)] {
            if !rng.random_bool(chance) {
                continue;
            }
            for _attempt in 0..50 {
                let pos = Position::new(
                    rng.random_range(1..self.width - 1),
                    rng.random_range(1..self.height - 1),
                );
                if free(&grid, &spawns, pos) {
                    spawns.push(Spawn {
                        position: pos,
                        kind: SpawnKind::Item(item),
                    });
                    state.items_spawned += 1;
                    break;
                }
            }
        }

        state.zones_generated += 1;
        Zone {
            coord,
            grid,
            spawns,
        }
    }
}
