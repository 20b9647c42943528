use serde::{Deserialize, Serialize};

/// 表示区域中的一个地图格子
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    #[default]
    Floor,
    Wall,
    Water,
    /// 可砍伐的树木
    Tree,
    /// 告示牌，永远不能作为寻路目标
    Sign,
    Npc,
    Statue,
    /// 区域边缘的出口，通往相邻区域
    Exit,
    /// 传送门，返回起始区域
    Port,
}

impl Tile {
    pub fn is_walkable(self) -> bool {
        matches!(self, Tile::Floor | Tile::Exit | Tile::Port)
    }

    /// 双击可交互的格子（NPC、雕像、可砍伐地形）
    pub fn is_interactive(self) -> bool {
        matches!(self, Tile::Npc | Tile::Statue | Tile::Tree)
    }

    pub fn is_transition(self) -> bool {
        matches!(self, Tile::Exit | Tile::Port)
    }

    pub fn glyph(self) -> char {
        match self {
            Tile::Floor => '.',
            Tile::Wall => '#',
            Tile::Water => '~',
            Tile::Tree => 'T',
            Tile::Sign => 'S',
            Tile::Npc => 'N',
            Tile::Statue => 'A',
            Tile::Exit => 'E',
            Tile::Port => 'O',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Tile> {
        let tile = match glyph {
            '.' => Tile::Floor,
            '#' => Tile::Wall,
            '~' => Tile::Water,
            'T' => Tile::Tree,
            'S' => Tile::Sign,
            'N' => Tile::Npc,
            'A' => Tile::Statue,
            'E' => Tile::Exit,
            'O' => Tile::Port,
            _ => return None,
        };
        Some(tile)
    }
}
