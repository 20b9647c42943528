//! Test helpers and builders for wiring a headless game with a recording
//! renderer and an event log.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dungeon::{EnemyKind, Grid, Item, ItemKind, Position};
use tile_adventure::actions::ActionManager;
use tile_adventure::collaborators::{GridViewport, RenderCollaborator};
use tile_adventure::config::GameConfig;
use tile_adventure::event_bus::{EventBus, GameEvent, Subscription};
use tile_adventure::input::{InputCoordinator, PointerEvent, PointerKind};
use tile_adventure::services::Services;
use tile_adventure::turn_system::TurnManager;
use tile_adventure::world::GameWorld;

/// Screen pixels per tile in every harness.
pub const TILE: f32 = 10.0;

/// Remembers what the core asked to be drawn.
#[derive(Default)]
pub struct RecordingRenderer {
    pub frames: Cell<usize>,
    pub menu: RefCell<Option<Vec<Item>>>,
    pub taps: Cell<usize>,
    pub holds: Cell<usize>,
}

impl RenderCollaborator for RecordingRenderer {
    fn render(&self, _world: &GameWorld) {
        self.frames.set(self.frames.get() + 1);
    }

    fn start_hold_feedback(&self, _x: f32, _y: f32) {
        self.holds.set(self.holds.get() + 1);
    }

    fn clear_feedback(&self) {}

    fn show_tap_feedback(&self, _x: f32, _y: f32) {
        self.taps.set(self.taps.get() + 1);
    }

    fn open_radial_menu(&self, items: &[Item]) {
        *self.menu.borrow_mut() = Some(items.to_vec());
    }

    fn close_radial_menu(&self) {
        *self.menu.borrow_mut() = None;
    }
}

/// Builder for deterministic test games
pub struct TestWorldBuilder {
    rows: Vec<String>,
    player: Position,
    enemies: Vec<(EnemyKind, Position)>,
    items: Vec<(ItemKind, u32)>,
    config: GameConfig,
}

impl TestWorldBuilder {
    pub fn new(rows: &[&str], player: Position) -> Self {
        Self {
            rows: rows.iter().map(|row| row.to_string()).collect(),
            player,
            enemies: Vec::new(),
            items: Vec::new(),
            config: GameConfig::default(),
        }
    }

    pub fn with_enemy(mut self, kind: EnemyKind, pos: Position) -> Self {
        self.enemies.push((kind, pos));
        self
    }

    pub fn with_item(mut self, kind: ItemKind, quantity: u32) -> Self {
        self.items.push((kind, quantity));
        self
    }

    pub fn with_config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let rows: Vec<&str> = self.rows.iter().map(String::as_str).collect();
        let grid = Grid::from_rows(&rows).expect("valid test grid");
        let (width, height) = (grid.width(), grid.height());
        let mut world = GameWorld::with_grid(grid, self.player);
        for (index, (kind, pos)) in self.enemies.into_iter().enumerate() {
            world.spawn_enemy(kind, pos, format!("test@{index}"));
        }
        for (kind, quantity) in self.items {
            world.player.inventory.add(kind, quantity);
        }

        let renderer = Rc::new(RecordingRenderer::default());
        let services = Services::builder(world)
            .config(self.config)
            .renderer(renderer.clone())
            .viewport(Rc::new(GridViewport::new(TILE, width, height)))
            .build();
        let turns = TurnManager::new(services.clone());
        let actions = ActionManager::new(services.clone(), turns.clone());
        let input = InputCoordinator::new(actions.clone());
        Harness {
            services,
            turns,
            actions,
            input,
            renderer,
            pointer: Cell::new(1),
        }
    }
}

pub struct Harness {
    pub services: Services,
    pub turns: TurnManager,
    pub actions: ActionManager,
    pub input: InputCoordinator,
    pub renderer: Rc<RecordingRenderer>,
    pointer: Cell<u32>,
}

impl Harness {
    pub fn bus(&self) -> &EventBus {
        &self.services.bus
    }

    pub fn player(&self) -> Position {
        self.services.world.borrow().player.position
    }

    /// Record every event published under `names`.
    pub fn record(&self, names: &[&str]) -> (Rc<RefCell<Vec<GameEvent>>>, Vec<Subscription>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let subscriptions = names
            .iter()
            .map(|name| {
                let log = log.clone();
                self.bus()
                    .on(name, move |event: &GameEvent| log.borrow_mut().push(event.clone()))
            })
            .collect();
        (log, subscriptions)
    }

    fn center(tile: Position) -> (f32, f32) {
        (
            tile.x as f32 * TILE + TILE / 2.0,
            tile.y as f32 * TILE + TILE / 2.0,
        )
    }

    /// Press and release on the centre of `tile` with the given pointer kind.
    pub fn tap_with(&self, kind: PointerKind, tile: Position) {
        let id = self.pointer.get();
        self.pointer.set(id + 1);
        let (x, y) = Self::center(tile);
        self.input.pointer_down(PointerEvent::new(id, kind, x, y));
        self.input.pointer_up(PointerEvent::new(id, kind, x, y));
    }

    pub fn tap(&self, tile: Position) {
        self.tap_with(PointerKind::Mouse, tile);
    }

    /// A touch drag from the centre of `from` by (dx, dy) pixels.
    pub fn swipe(&self, from: Position, dx: f32, dy: f32) {
        let id = self.pointer.get();
        self.pointer.set(id + 1);
        let (x, y) = Self::center(from);
        self.input
            .pointer_down(PointerEvent::new(id, PointerKind::Touch, x, y));
        self.input
            .pointer_move(PointerEvent::new(id, PointerKind::Touch, x + dx / 2.0, y + dy / 2.0));
        self.input
            .pointer_up(PointerEvent::new(id, PointerKind::Touch, x + dx, y + dy));
    }
}

/// Names of the recorded events, in order.
pub fn names(log: &Rc<RefCell<Vec<GameEvent>>>) -> Vec<String> {
    log.borrow().iter().map(|event| event.name().to_string()).collect()
}
