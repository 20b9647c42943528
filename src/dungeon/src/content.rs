//! Game content referenced by zones: enemy archetypes and items.

use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Slime,
    Skeleton,
    /// Explodes on death, damaging everything adjacent.
    Bomber,
}

impl EnemyKind {
    pub fn max_hp(self) -> u32 {
        match self {
            EnemyKind::Slime => 2,
            EnemyKind::Skeleton => 3,
            EnemyKind::Bomber => 1,
        }
    }

    pub fn attack(self) -> u32 {
        match self {
            EnemyKind::Slime => 1,
            EnemyKind::Skeleton => 2,
            EnemyKind::Bomber => 1,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            EnemyKind::Slime => 's',
            EnemyKind::Skeleton => 'k',
            EnemyKind::Bomber => 'b',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    HealingPotion,
    Wood,
    Coin,
}

impl ItemKind {
    pub fn is_usable(self) -> bool {
        matches!(self, ItemKind::HealingPotion)
    }
}

/// 背包中的一叠物品
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub quantity: u32,
}

impl Item {
    pub fn new(kind: ItemKind, quantity: u32) -> Self {
        Self { kind, quantity }
    }
}
