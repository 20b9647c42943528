//! Pointer and keyboard input driving paths, interactions and zone changes.

mod helpers;

use std::time::Duration;

use dungeon::{ItemKind, Position, ZoneCoord};
use helpers::{TestWorldBuilder, names};
use pretty_assertions::assert_eq;
use tile_adventure::actions::{ActionOutcome, Intent};
use tile_adventure::event_bus::{GameEvent, names as events};
use tile_adventure::input::{Key, KeyCommand, PointerKind};
use tokio::task::LocalSet;
use tokio::time::sleep;

const ROOM: &[&str] = &[
    "#########",
    "#.......#",
    "#...N...#",
    "#.......#",
    "#########",
];

#[tokio::test(start_paused = true)]
async fn tap_walks_a_path_and_batches_the_turns() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[
                events::INPUT_TAP,
                events::INPUT_PATH_STARTED,
                events::INPUT_PATH_COMPLETED,
            ]);

            game.tap(Position::new(5, 3));
            // nothing happens until the double-tap window has passed
            assert_eq!(game.player(), Position::new(1, 1));

            sleep(Duration::from_secs(2)).await;
            assert_eq!(game.player(), Position::new(5, 3));
            assert_eq!(
                names(&log),
                vec![
                    events::INPUT_TAP,
                    events::INPUT_PATH_STARTED,
                    events::INPUT_PATH_COMPLETED
                ]
            );
            assert_eq!(game.services.world.borrow().turn, 6);
            assert!(game.turns.is_player_turn());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn tapping_another_tile_replaces_the_walk() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[
                events::INPUT_PATH_STARTED,
                events::INPUT_PATH_CANCELLED,
                events::INPUT_PATH_COMPLETED,
            ]);

            game.tap(Position::new(7, 3));
            sleep(Duration::from_millis(500)).await;
            assert!(game.input.paths().is_active());

            game.tap(Position::new(3, 1));
            sleep(Duration::from_secs(3)).await;
            assert_eq!(game.player(), Position::new(3, 1));
            assert_eq!(
                names(&log),
                vec![
                    events::INPUT_PATH_STARTED,
                    events::INPUT_PATH_CANCELLED,
                    events::INPUT_PATH_STARTED,
                    events::INPUT_PATH_COMPLETED,
                ]
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn a_key_press_only_cancels_a_running_path() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[events::INPUT_PATH_CANCELLED]);

            game.tap(Position::new(7, 3));
            sleep(Duration::from_millis(500)).await;
            assert_eq!(
                game.input.handle_key(Key::Down),
                Some(KeyCommand::Move(dungeon::Direction::Down))
            );
            sleep(Duration::from_secs(2)).await;

            let cancelled = log.borrow();
            let [GameEvent::PathCancelled { steps_taken, target }] = cancelled.as_slice() else {
                panic!("expected one cancellation, got {cancelled:?}");
            };
            assert_eq!(*steps_taken, 2);
            assert_eq!(*target, Position::new(7, 3));
            assert_eq!(game.player().manhattan(&Position::new(1, 1)), 2);
            assert!(!game.input.paths().is_active());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn double_tap_walks_over_and_interacts() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[
                events::INPUT_TAP,
                events::INPUT_DOUBLE_TAP,
                events::INTERACTION,
                events::INPUT_PATH_COMPLETED,
            ]);

            let npc = Position::new(4, 2);
            game.tap(npc);
            game.tap(npc);
            assert!(!game.input.has_pending_tap());

            sleep(Duration::from_secs(2)).await;
            assert!(game.player().is_adjacent(&npc));
            assert_eq!(
                names(&log),
                vec![
                    events::INPUT_TAP,
                    events::INPUT_DOUBLE_TAP,
                    events::INTERACTION,
                    events::INPUT_PATH_COMPLETED,
                ]
            );
            // three steps plus the interaction
            assert_eq!(game.services.world.borrow().turn, 4);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn slow_taps_stay_single_taps() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[
                events::INPUT_TAP,
                events::INPUT_DOUBLE_TAP,
                events::INPUT_PLAYER_TILE_TAP,
            ]);

            game.tap(Position::new(3, 1));
            sleep(Duration::from_secs(1)).await;
            assert_eq!(game.player(), Position::new(3, 1));

            game.tap(Position::new(3, 1));
            sleep(Duration::from_secs(1)).await;
            assert_eq!(
                names(&log),
                vec![
                    events::INPUT_TAP,
                    events::INPUT_TAP,
                    events::INPUT_PLAYER_TILE_TAP
                ]
            );
            assert!(game.renderer.menu.borrow().is_some());
            assert!(game.input.is_menu_open());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn swipes_step_once_in_their_direction() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1)).build();
            let (log, _subs) = game.record(&[events::INPUT_SWIPE]);

            game.swipe(Position::new(5, 1), 40.0, 3.0);
            assert_eq!(game.player(), Position::new(2, 1));
            // let the (empty) enemy phase finish
            sleep(Duration::from_millis(10)).await;
            game.swipe(Position::new(5, 1), -2.0, 35.0);
            assert_eq!(game.player(), Position::new(2, 2));
            assert_eq!(
                *log.borrow(),
                vec![
                    GameEvent::Swipe {
                        direction: dungeon::Direction::Right
                    },
                    GameEvent::Swipe {
                        direction: dungeon::Direction::Down
                    },
                ]
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn walking_onto_an_exit_enters_the_next_zone() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(
                &[
                    "#########",
                    "#.......#",
                    "#.......E",
                    "#.......#",
                    "#########",
                ],
                Position::new(5, 2),
            )
            .build();
            let (log, _subs) = game.record(&[events::INPUT_EXIT_REACHED, events::ZONE_ENTERED]);

            game.tap(Position::new(8, 2));
            sleep(Duration::from_secs(2)).await;

            assert_eq!(
                names(&log),
                vec![events::INPUT_EXIT_REACHED, events::ZONE_ENTERED]
            );
            let world = game.services.world.borrow();
            assert_eq!(world.zone, ZoneCoord::new(1, 0));
            assert!(game.turns.is_player_turn());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn touch_press_on_the_player_opens_the_menu() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(ROOM, Position::new(1, 1))
                .with_item(ItemKind::HealingPotion, 1)
                .build();
            game.services.world.borrow_mut().player.hp = 5;
            let (log, _subs) = game.record(&[events::INPUT_TAP, events::ITEM_USED]);

            game.tap_with(PointerKind::Touch, Position::new(1, 1));
            let menu = game.renderer.menu.borrow().clone().expect("menu open");
            assert_eq!(menu.len(), 1);

            game.input.handle_key(Key::Char('1'));
            assert!(game.renderer.menu.borrow().is_none());
            assert_eq!(game.services.world.borrow().player.hp, 8);
            // the press opened the menu, so no tap was reported
            assert_eq!(names(&log), vec![events::ITEM_USED]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn zone_change_drops_a_deferred_tap() {
    LocalSet::new()
        .run_until(async {
            let game = TestWorldBuilder::new(
                &[
                    "#########",
                    "#.......#",
                    "#.......E",
                    "#.......#",
                    "#########",
                ],
                Position::new(8, 2),
            )
            .build();
            let (log, _subs) = game.record(&[events::INPUT_PATH_STARTED]);

            game.tap(Position::new(3, 2));
            assert!(game.input.has_pending_tap());

            assert_eq!(
                game.actions.perform(Intent::Transition),
                ActionOutcome::ZoneChanged {
                    zone: ZoneCoord::new(1, 0)
                }
            );
            assert!(!game.input.has_pending_tap());

            sleep(Duration::from_secs(1)).await;
            assert!(log.borrow().is_empty());
            assert_eq!(game.services.world.borrow().zone, ZoneCoord::new(1, 0));
        })
        .await;
}
