use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::{Direction, Position};
use crate::tiles::Tile;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid has no rows")]
    Empty,
    #[error("row {row} has width {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("unknown tile glyph {0:?}")]
    UnknownGlyph(char),
}

/// 一个区域的格子网格（行优先存储）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl Grid {
    pub fn filled(width: i32, height: i32, tile: Tile) -> Self {
        let len = (width.max(0) * height.max(0)) as usize;
        Self {
            width: width.max(0),
            height: height.max(0),
            tiles: vec![tile; len],
        }
    }

    /// Parses a grid from text rows using [`Tile::from_glyph`].
    pub fn from_rows(rows: &[&str]) -> Result<Self, GridError> {
        let expected = rows.first().ok_or(GridError::Empty)?.chars().count();
        let mut tiles = Vec::with_capacity(expected * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != expected {
                return Err(GridError::RaggedRow { row, found, expected });
            }
            for glyph in line.chars() {
                tiles.push(Tile::from_glyph(glyph).ok_or(GridError::UnknownGlyph(glyph))?);
            }
        }
        Ok(Self {
            width: expected as i32,
            height: rows.len() as i32,
            tiles,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn get(&self, pos: Position) -> Option<Tile> {
        self.index(pos).map(|i| self.tiles[i])
    }

    pub fn set(&mut self, pos: Position, tile: Tile) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    /// Out-of-bounds positions are never walkable.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.get(pos).is_some_and(Tile::is_walkable)
    }

    /// Which edge an exit tile sits on, i.e. the direction the player leaves in.
    pub fn exit_direction(&self, pos: Position) -> Option<Direction> {
        if self.get(pos) != Some(Tile::Exit) {
            return None;
        }
        if pos.y == 0 {
            Some(Direction::Up)
        } else if pos.y == self.height - 1 {
            Some(Direction::Down)
        } else if pos.x == 0 {
            Some(Direction::Left)
        } else if pos.x == self.width - 1 {
            Some(Direction::Right)
        } else {
            None
        }
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Position::new(x, y)))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Tile]> {
        self.tiles.chunks(self.width.max(1) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_reports_exits() {
        let grid = Grid::from_rows(&["##E##", "#...#", "E.S.E", "#...#", "##E##"]).unwrap();
        assert_eq!(grid.width(), 5);
        assert_eq!(grid.height(), 5);
        assert_eq!(grid.get(Position::new(2, 2)), Some(Tile::Sign));
        assert_eq!(grid.exit_direction(Position::new(2, 0)), Some(Direction::Up));
        assert_eq!(grid.exit_direction(Position::new(4, 2)), Some(Direction::Right));
        assert_eq!(grid.exit_direction(Position::new(1, 1)), None);
    }

    #[test]
    fn rejects_ragged_rows_and_unknown_glyphs() {
        assert_eq!(
            Grid::from_rows(&["...", ".."]),
            Err(GridError::RaggedRow { row: 1, found: 2, expected: 3 })
        );
        assert_eq!(Grid::from_rows(&[".?."]), Err(GridError::UnknownGlyph('?')));
        assert_eq!(Grid::from_rows(&[]), Err(GridError::Empty));
    }

    #[test]
    fn out_of_bounds_is_not_walkable() {
        let grid = Grid::filled(3, 3, Tile::Floor);
        assert!(grid.is_walkable(Position::new(0, 0)));
        assert!(!grid.is_walkable(Position::new(-1, 0)));
        assert!(!grid.is_walkable(Position::new(3, 1)));
    }
}
