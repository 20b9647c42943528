//! Platform-facing collaborator seams: rendering, audio and viewport mapping.
//!
//! All calls are synchronous and fire-and-forget from the turn core's point
//! of view. Audio and pointer-capture failures are transient and only logged.

use std::cell::Cell;

use dungeon::{Item, Position};
use error::GameError;

use crate::input::PointerId;
use crate::world::GameWorld;

/// 渲染协作者
#[cfg_attr(test, mockall::automock)]
pub trait RenderCollaborator {
    fn render(&self, world: &GameWorld);
    /// Press-and-hold highlight under the pointer.
    fn start_hold_feedback(&self, x: f32, y: f32);
    fn clear_feedback(&self);
    fn show_tap_feedback(&self, x: f32, y: f32);
    fn open_radial_menu(&self, items: &[Item]);
    fn close_radial_menu(&self);
}

/// 音频协作者
#[cfg_attr(test, mockall::automock)]
pub trait AudioCollaborator {
    fn play_sound(&self, name: &str) -> Result<(), GameError>;
}

/// Maps screen coordinates to tiles and owns pointer capture.
#[cfg_attr(test, mockall::automock)]
pub trait Viewport {
    /// An error means "no tile under this point".
    fn screen_to_tile(&self, x: f32, y: f32) -> Result<Position, GameError>;
    fn capture_pointer(&self, id: PointerId) -> Result<(), GameError>;
    fn release_pointer(&self, id: PointerId) -> Result<(), GameError>;
}

/// Renders nothing. Used headless and when no renderer was configured.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl RenderCollaborator for NullRenderer {
    fn render(&self, _world: &GameWorld) {}
    fn start_hold_feedback(&self, _x: f32, _y: f32) {}
    fn clear_feedback(&self) {}
    fn show_tap_feedback(&self, _x: f32, _y: f32) {}
    fn open_radial_menu(&self, _items: &[Item]) {}
    fn close_radial_menu(&self) {}
}

#[derive(Debug, Default)]
pub struct SilentAudio;

impl AudioCollaborator for SilentAudio {
    fn play_sound(&self, name: &str) -> Result<(), GameError> {
        tracing::trace!(sound = name, "sound suppressed");
        Ok(())
    }
}

/// Uniform square tiles anchored at `origin`.
#[derive(Debug)]
pub struct GridViewport {
    pub tile_size: f32,
    origin: Cell<(f32, f32)>,
    size: Cell<(i32, i32)>,
}

impl GridViewport {
    pub fn new(tile_size: f32, width: i32, height: i32) -> Self {
        Self {
            tile_size,
            origin: Cell::new((0.0, 0.0)),
            size: Cell::new((width, height)),
        }
    }

    /// Move the map, e.g. after a layout change.
    pub fn set_origin(&self, x: f32, y: f32) {
        self.origin.set((x, y));
    }

    pub fn set_size(&self, width: i32, height: i32) {
        self.size.set((width, height));
    }
}

impl Viewport for GridViewport {
    fn screen_to_tile(&self, x: f32, y: f32) -> Result<Position, GameError> {
        let (ox, oy) = self.origin.get();
        let (width, height) = self.size.get();
        let tx = ((x - ox) / self.tile_size).floor();
        let ty = ((y - oy) / self.tile_size).floor();
        if tx < 0.0 || ty < 0.0 || tx >= width as f32 || ty >= height as f32 {
            return Err(GameError::ViewportError(format!(
                "({x}, {y}) is outside the map"
            )));
        }
        Ok(Position::new(tx as i32, ty as i32))
    }

    fn capture_pointer(&self, _id: PointerId) -> Result<(), GameError> {
        Ok(())
    }

    fn release_pointer(&self, _id: PointerId) -> Result<(), GameError> {
        Ok(())
    }
}
