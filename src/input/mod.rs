//! Input handling: pointer gestures, keyboard bindings, auto-pathing and the
//! coordinator that routes them to gameplay.

mod coordinator;
mod gesture;
mod keyboard;
mod pathfinding;

pub use coordinator::InputCoordinator;
pub use gesture::{
    Gesture, GestureDetector, GestureThresholds, PointerEvent, PointerId, PointerKind, PressKind,
    Tap, TileCrossing, classify, swipe_direction,
};
pub use keyboard::{Key, KeyBindings, KeyCommand, KeyboardHandler};
pub use pathfinding::{
    PathError, PathOutcome, PathfindingController, bfs, find_path, find_path_to_adjacent,
};

use crossterm::event::{self, Event as CEvent, MouseButton, MouseEventKind};
use std::time::Duration;

/// Trait for input sources
pub trait InputSource {
    type Event;

    /// Poll for input events with a timeout
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Self::Event>>;
}

/// 终端输入事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key(Key),
    Pointer(PointerPhase, PointerEvent),
    Resize(u16, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// The terminal mouse is the only pointer a console has.
const TERMINAL_POINTER: PointerId = 0;

/// Convert a terminal mouse event; only the left button and plain motion count.
pub fn pointer_from_mouse(mouse: &event::MouseEvent) -> Option<(PointerPhase, PointerEvent)> {
    let phase = match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => PointerPhase::Down,
        MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => PointerPhase::Move,
        MouseEventKind::Up(MouseButton::Left) => PointerPhase::Up,
        _ => return None,
    };
    let pointer = PointerEvent::new(
        TERMINAL_POINTER,
        PointerKind::Mouse,
        f32::from(mouse.column),
        f32::from(mouse.row),
    );
    Some((phase, pointer))
}

impl InputEvent {
    pub fn from_crossterm(event: CEvent) -> Option<Self> {
        match event {
            CEvent::Key(key_event) => Key::from_event(&key_event).map(InputEvent::Key),
            CEvent::Mouse(mouse) => {
                pointer_from_mouse(&mouse).map(|(phase, ev)| InputEvent::Pointer(phase, ev))
            }
            CEvent::Resize(width, height) => Some(InputEvent::Resize(width, height)),
            _ => None,
        }
    }
}

/// Console input source implementation
#[derive(Debug, Default)]
pub struct ConsoleInput;

impl InputSource for ConsoleInput {
    type Event = InputEvent;

    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Self::Event>> {
        if event::poll(timeout)? {
            return Ok(InputEvent::from_crossterm(event::read()?));
        }
        Ok(None)
    }
}

impl InputCoordinator {
    /// Feed one terminal event. Returns the key command, if any, so the
    /// caller can react to `Save` and `Quit`.
    pub fn handle_event(&self, event: InputEvent) -> Option<KeyCommand> {
        match event {
            InputEvent::Key(key) => self.handle_key(key),
            InputEvent::Pointer(PointerPhase::Down, ev) => {
                self.pointer_down(ev);
                None
            }
            InputEvent::Pointer(PointerPhase::Move, ev) => {
                self.pointer_move(ev);
                None
            }
            InputEvent::Pointer(PointerPhase::Up, ev) => {
                self.pointer_up(ev);
                None
            }
            InputEvent::Resize(..) => None,
        }
    }
}
