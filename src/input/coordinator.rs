//! Routes raw pointer and key input to gameplay.
//!
//! Single taps are held back for the double-tap window so a second tap can
//! turn them into a double tap; the deferral is an animation sequence that
//! the double tap cancels.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dungeon::{ItemKind, Position};

use crate::actions::{ActionManager, ActionOutcome, Intent, adjacent_interactive};
use crate::animation::SequenceId;
use crate::event_bus::GameEvent;
use crate::services::{Services, report_collaborator_error};
use crate::turn_system::TurnManager;

use super::gesture::{
    Gesture, GestureDetector, GestureThresholds, PointerEvent, PointerId, PointerKind, Tap,
};
use super::keyboard::{Key, KeyCommand, KeyboardHandler};
use super::pathfinding::{PathOutcome, PathfindingController, find_path, find_path_to_adjacent};

struct CoordinatorInner {
    services: Services,
    actions: ActionManager,
    paths: PathfindingController,
    gestures: RefCell<GestureDetector>,
    keyboard: RefCell<KeyboardHandler>,
    pending_tap: Cell<Option<SequenceId>>,
    menu_open: Cell<bool>,
}

/// 输入协调器；克隆后共享状态
#[derive(Clone)]
pub struct InputCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl InputCoordinator {
    pub fn new(actions: ActionManager) -> Self {
        let services = actions.services().clone();
        let thresholds = GestureThresholds::from(&services.config.input);
        Self {
            inner: Rc::new(CoordinatorInner {
                paths: PathfindingController::new(actions.clone()),
                services,
                actions,
                gestures: RefCell::new(GestureDetector::new(thresholds)),
                keyboard: RefCell::new(KeyboardHandler::default()),
                pending_tap: Cell::new(None),
                menu_open: Cell::new(false),
            }),
        }
    }

    pub fn paths(&self) -> &PathfindingController {
        &self.inner.paths
    }

    pub fn actions(&self) -> &ActionManager {
        &self.inner.actions
    }

    fn turns(&self) -> &TurnManager {
        self.inner.actions.turns()
    }

    fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn keyboard_mut(&self) -> std::cell::RefMut<'_, KeyboardHandler> {
        self.inner.keyboard.borrow_mut()
    }

    pub fn is_menu_open(&self) -> bool {
        self.inner.menu_open.get()
    }

    /// A single tap is waiting out the double-tap window. Zone changes cancel
    /// every sequence, so the stored id alone is not enough.
    pub fn has_pending_tap(&self) -> bool {
        self.inner
            .pending_tap
            .get()
            .is_some_and(|id| self.services().scheduler.is_running(id))
    }

    /// Tile under a screen point, if any.
    fn tile_at(&self, x: f32, y: f32) -> Option<Position> {
        match self.services().viewport.screen_to_tile(x, y) {
            Ok(pos) if self.services().world.borrow().grid.in_bounds(pos) => Some(pos),
            Ok(_) => None,
            Err(err) => {
                tracing::trace!(x, y, error = %err, "no tile under pointer");
                None
            }
        }
    }

    fn player_position(&self) -> Position {
        self.services().world.borrow().player.position
    }

    // ===== 指针事件 =====

    pub fn pointer_down(&self, event: PointerEvent) {
        let services = self.services();
        if let Err(err) = services.viewport.capture_pointer(event.id) {
            report_collaborator_error("capture_pointer", &err);
        }
        let tile = self.tile_at(event.x, event.y);
        self.inner.gestures.borrow_mut().pointer_down(&event, tile);
        services.renderer.start_hold_feedback(event.x, event.y);

        if services.config.input.radial_menu_on_press
            && event.kind != PointerKind::Mouse
            && tile == Some(self.player_position())
            && !self.player_on_transition()
            && self.turns().is_player_turn()
        {
            self.open_menu_for(event.id);
        }
    }

    pub fn pointer_move(&self, event: PointerEvent) {
        let tile = self.tile_at(event.x, event.y);
        let crossing = self.inner.gestures.borrow_mut().pointer_move(&event, tile);
        let Some(crossing) = crossing else {
            return;
        };
        self.services().play_sound("tile-cross");

        // a touch drag onto the player opens the menu, once per pointer
        if event.kind == PointerKind::Touch
            && crossing.to == self.player_position()
            && self.turns().is_player_turn()
        {
            self.open_menu_for(event.id);
        }
    }

    pub fn pointer_up(&self, event: PointerEvent) {
        let services = self.services();
        if let Err(err) = services.viewport.release_pointer(event.id) {
            report_collaborator_error("release_pointer", &err);
        }
        services.renderer.clear_feedback();

        let tile = self.tile_at(event.x, event.y);
        let gesture = self.inner.gestures.borrow_mut().pointer_up(&event, tile);
        match gesture {
            None => {}
            Some(Gesture::Swipe(direction)) => {
                services.bus.publish(&GameEvent::Swipe { direction });
                if self.inner.paths.cancel() {
                    return;
                }
                if self.turns().is_player_turn() {
                    self.close_menu();
                    self.inner.actions.perform(Intent::Move(direction));
                }
            }
            Some(Gesture::Tap(tap)) => {
                services.renderer.show_tap_feedback(tap.x, tap.y);
                services.bus.publish(&GameEvent::Tap {
                    x: tap.x,
                    y: tap.y,
                    tile: tap.tile,
                });
                if let Some(target) = self.inner.paths.target() {
                    if tap.tile == Some(target) {
                        return;
                    }
                    self.inner.paths.cancel();
                }
                self.defer_single_tap(tap);
            }
            Some(Gesture::DoubleTap(tap)) => {
                if let Some(pending) = self.inner.pending_tap.take() {
                    services.scheduler.cancel_sequence(pending);
                }
                services.renderer.show_tap_feedback(tap.x, tap.y);
                services
                    .bus
                    .publish(&GameEvent::DoubleTap { tile: tap.tile });
                let this = self.clone();
                tokio::task::spawn_local(async move { this.commit_double_tap(tap).await });
            }
        }
    }

    pub fn pointer_cancel(&self, id: PointerId) {
        self.inner.gestures.borrow_mut().pointer_cancel(id);
        self.services().renderer.clear_feedback();
        if let Err(err) = self.services().viewport.release_pointer(id) {
            report_collaborator_error("release_pointer", &err);
        }
    }

    fn defer_single_tap(&self, tap: Tap) {
        let scheduler = &self.services().scheduler;
        if let Some(previous) = self.inner.pending_tap.take() {
            scheduler.cancel_sequence(previous);
        }
        let this = self.clone();
        let sequence = scheduler
            .create_sequence()
            .wait_for(self.services().config.input.double_tap_window())
            .then(move || {
                this.inner.pending_tap.set(None);
                tokio::task::spawn_local(async move { this.commit_single_tap(tap).await });
            });
        self.inner.pending_tap.set(Some(sequence.id()));
        let _ = sequence.start();
    }

    /// 单击：自身格子打开菜单或穿过出口，其他格子移动或寻路
    pub async fn commit_single_tap(&self, tap: Tap) {
        let Some(tile) = tap.tile else {
            return;
        };
        if !self.turns().is_player_turn() || self.inner.paths.is_active() {
            tracing::debug!("tap ignored outside the player's turn");
            return;
        }

        let player = self.player_position();
        if tile == player {
            self.services()
                .bus
                .publish(&GameEvent::PlayerTileTap { position: player });
            if self.player_on_transition() {
                self.inner.actions.perform(Intent::Transition);
            } else {
                self.open_menu();
            }
            return;
        }
        self.close_menu();

        let enemies_alive = self.services().world.borrow().has_living_enemies();
        if enemies_alive {
            match player.direction_to(&tile) {
                Some(direction) => {
                    self.inner.actions.perform(Intent::Move(direction));
                }
                None => tracing::debug!("auto-path suppressed while enemies are alive"),
            }
            return;
        }

        let route = {
            let world = self.services().world.borrow();
            find_path(&world, player, tile)
        };
        match route {
            Ok(directions) if directions.is_empty() => {}
            Ok(directions) => {
                let outcome = self.inner.paths.execute_path(tile, directions, None).await;
                if let PathOutcome::ExitReached { .. } = outcome {
                    self.inner.actions.perform(Intent::Transition);
                }
            }
            Err(err) => tracing::debug!(x = tile.x, y = tile.y, error = %err, "no path"),
        }
    }

    /// 双击：与可交互格子交互（不相邻时先走过去）
    pub async fn commit_double_tap(&self, tap: Tap) {
        let Some(tile) = tap.tile else {
            return;
        };
        if !self.turns().is_player_turn() {
            return;
        }

        let (player, interactive, enemies_alive) = {
            let world = self.services().world.borrow();
            (
                world.player.position,
                world.tile_at(tile).is_some_and(|t| t.is_interactive()),
                world.has_living_enemies(),
            )
        };
        if !interactive {
            self.commit_single_tap(tap).await;
            return;
        }
        self.close_menu();

        if player.is_adjacent(&tile) {
            self.inner.actions.perform(Intent::Interact(tile));
            return;
        }
        if enemies_alive {
            tracing::debug!("auto-path suppressed while enemies are alive");
            return;
        }

        let route = {
            let world = self.services().world.borrow();
            find_path_to_adjacent(&world, player, tile)
        };
        match route {
            Ok(directions) => {
                self.inner
                    .paths
                    .execute_path(tile, directions, Some(Intent::Interact(tile)))
                    .await;
            }
            Err(err) => tracing::debug!(error = %err, "no path to interaction target"),
        }
    }

    // ===== 键盘事件 =====

    /// Returns the bound command so the caller can handle `Save` and `Quit`.
    pub fn handle_key(&self, key: Key) -> Option<KeyCommand> {
        self.services().bus.publish(&GameEvent::KeyPress {
            key: key.to_string(),
        });
        let command = self.inner.keyboard.borrow().handle(key)?;

        // any key takes over from a running path
        if self.inner.paths.cancel() {
            return Some(command);
        }
        let player_turn = self.turns().is_player_turn();
        match command {
            KeyCommand::Move(direction) if player_turn => {
                self.close_menu();
                self.inner.actions.perform(Intent::Move(direction));
            }
            KeyCommand::Wait if player_turn => {
                self.inner.actions.perform(Intent::Wait);
            }
            KeyCommand::Interact if player_turn => {
                let target = adjacent_interactive(&self.services().world.borrow());
                match target {
                    Some(target) => {
                        self.inner.actions.perform(Intent::Interact(target));
                    }
                    None => tracing::debug!("nothing to interact with"),
                }
            }
            KeyCommand::UseItem(kind) if player_turn => {
                self.select_menu_item(kind);
            }
            KeyCommand::OpenMenu => {
                if self.is_menu_open() {
                    self.close_menu();
                } else {
                    self.open_menu();
                }
            }
            KeyCommand::CancelPath => self.close_menu(),
            _ => {}
        }
        Some(command)
    }

    // ===== 径向菜单 =====

    fn open_menu_for(&self, pointer: PointerId) {
        if self.inner.gestures.borrow_mut().mark_menu_opened(pointer) {
            self.open_menu();
        }
    }

    pub fn open_menu(&self) {
        let items = self.services().world.borrow().player.inventory.items.clone();
        self.services().renderer.open_radial_menu(&items);
        self.inner.menu_open.set(true);
        self.services()
            .bus
            .publish(&GameEvent::MenuOpened { items: items.len() });
    }

    pub fn close_menu(&self) {
        if self.inner.menu_open.replace(false) {
            self.services().renderer.close_radial_menu();
        }
    }

    /// 从菜单中使用物品
    pub fn select_menu_item(&self, kind: ItemKind) -> ActionOutcome {
        self.close_menu();
        if !self.turns().is_player_turn() {
            return ActionOutcome::Blocked;
        }
        self.inner.actions.perform(Intent::UseItem(kind))
    }

    fn player_on_transition(&self) -> bool {
        self.services()
            .world
            .borrow()
            .player_tile()
            .is_some_and(|tile| tile.is_transition())
    }
}
