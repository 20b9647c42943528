//! 地图与区域模型
//!
//! 网格、格子类型、区域缓存以及区域生成器接口。生成算法本身只是一个
//! 可替换的协作者，回合核心只通过 [`ZoneGenerator`] 与之交互。

pub mod content;
pub mod grid;
pub mod position;
pub mod tiles;
pub mod zone;

pub use content::{EnemyKind, Item, ItemKind};
pub use grid::{Grid, GridError};
pub use position::{Direction, Position};
pub use tiles::Tile;
pub use zone::{
    BasicZoneGenerator, GenerationState, Spawn, SpawnKind, Zone, ZoneCache, ZoneCoord,
    ZoneGenerator,
};
