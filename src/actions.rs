//! 玩家动作分发
//!
//! Every player intent, whatever input produced it, goes through
//! [`ActionManager::dispatch`], which applies it to the world and reports how
//! many turns it consumed. [`ActionManager::perform`] additionally hands the
//! consumed turn to the [`TurnManager`].

use dungeon::{Direction, ItemKind, Position, Tile, ZoneCoord};
use hecs::Entity;

use crate::combat::{self, AttackOutcome};
use crate::event_bus::GameEvent;
use crate::services::Services;
use crate::turn_system::TurnManager;
use crate::world::{Arrival, GameWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Move(Direction),
    Wait,
    /// Interact with the (adjacent) tile at this position.
    Interact(Position),
    UseItem(ItemKind),
    /// Leave the zone through the exit or port the player stands on.
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Moved { to: Position },
    Attacked(AttackOutcome),
    Waited,
    Interacted { tile: Tile },
    ItemUsed(ItemKind),
    ZoneChanged { zone: ZoneCoord },
    /// Nothing happened (wall, missing item, not adjacent, player dead).
    Blocked,
}

impl ActionOutcome {
    /// 该动作消耗的回合数
    pub fn turns(&self) -> u32 {
        match self {
            ActionOutcome::Moved { .. }
            | ActionOutcome::Attacked(_)
            | ActionOutcome::Waited
            | ActionOutcome::Interacted { .. }
            | ActionOutcome::ItemUsed(_) => 1,
            ActionOutcome::ZoneChanged { .. } | ActionOutcome::Blocked => 0,
        }
    }
}

#[derive(Clone)]
pub struct ActionManager {
    services: Services,
    turns: TurnManager,
}

impl ActionManager {
    pub fn new(services: Services, turns: TurnManager) -> Self {
        Self { services, turns }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn turns(&self) -> &TurnManager {
        &self.turns
    }

    /// Apply an intent to the world without advancing enemy turns.
    pub fn dispatch(&self, intent: Intent) -> ActionOutcome {
        let outcome = {
            let mut world = self.services.world.borrow_mut();
            if !world.player.is_alive() {
                return ActionOutcome::Blocked;
            }
            match intent {
                Intent::Move(direction) => self.move_player(&mut world, direction),
                Intent::Wait => ActionOutcome::Waited,
                Intent::Interact(target) => interact(&mut world, target),
                Intent::UseItem(kind) => {
                    if combat::use_item(&mut world, kind) {
                        ActionOutcome::ItemUsed(kind)
                    } else {
                        ActionOutcome::Blocked
                    }
                }
                Intent::Transition => self.transition(&mut world),
            }
        };
        tracing::debug!(?intent, ?outcome, "action dispatched");

        if let ActionOutcome::ZoneChanged { .. } = outcome {
            self.turns.reset();
            self.services.scheduler.cancel_all();
        }
        self.services.flush_events();
        self.services.render();
        outcome
    }

    /// Dispatch and, if a turn was consumed, let the enemies act.
    ///
    /// Attacks hold the enemy phase until the attack has resolved.
    pub fn perform(&self, intent: Intent) -> ActionOutcome {
        let outcome = self.dispatch(intent);
        match outcome {
            ActionOutcome::Attacked(_) => {
                self.turns.begin_player_action();
                let turns = self.turns.clone();
                let _resolution = self
                    .services
                    .scheduler
                    .create_sequence()
                    .wait_for(self.services.config.turn.attack_resolution())
                    .then(move || {
                        let _ = turns.resolve_player_action();
                    })
                    .start();
            }
            other if other.turns() > 0 => {
                let _ = self.turns.start_enemy_turns();
            }
            _ => {}
        }
        outcome
    }

    fn move_player(&self, world: &mut GameWorld, direction: Direction) -> ActionOutcome {
        let from = world.player.position;

        // walking off an exit in its direction leaves the zone
        if world.grid.exit_direction(from) == Some(direction) {
            return self.transition(world);
        }

        let to = from.step(direction);
        if let Some(enemy) = world.enemy_at(to) {
            return self.attack(world, enemy);
        }
        if !world.grid.is_walkable(to) {
            return ActionOutcome::Blocked;
        }
        world.player.position = to;
        ActionOutcome::Moved { to }
    }

    fn attack(&self, world: &mut GameWorld, enemy: Entity) -> ActionOutcome {
        let outcome = self.services.combat.handle_player_attack(world, enemy);
        ActionOutcome::Attacked(outcome)
    }

    fn transition(&self, world: &mut GameWorld) -> ActionOutcome {
        let position = world.player.position;
        let (coord, arrival) = match world.grid.get(position) {
            Some(Tile::Exit) => match world.grid.exit_direction(position) {
                Some(direction) => (world.zone.neighbor(direction), Arrival::Heading(direction)),
                None => return ActionOutcome::Blocked,
            },
            Some(Tile::Port) => (ZoneCoord::ORIGIN, Arrival::Center),
            _ => return ActionOutcome::Blocked,
        };
        world.enter_zone(coord, self.services.zones.as_ref(), arrival);
        world.log(format!("You travel to zone ({}, {}).", coord.x, coord.y));
        ActionOutcome::ZoneChanged { zone: coord }
    }
}

/// Adjacent interactive tiles only.
fn interact(world: &mut GameWorld, target: Position) -> ActionOutcome {
    if !world.player.position.is_adjacent(&target) {
        return ActionOutcome::Blocked;
    }
    let Some(tile) = world.tile_at(target).filter(|tile| tile.is_interactive()) else {
        return ActionOutcome::Blocked;
    };
    let message = match tile {
        Tile::Npc => "The villager says: beware the bombers to the east.".to_string(),
        Tile::Statue => "An old statue. Someone left a coin at its feet.".to_string(),
        Tile::Tree => {
            world.set_tile(target, Tile::Floor);
            world.player.inventory.add(ItemKind::Wood, 1);
            "You chop down the tree and collect some wood.".to_string()
        }
        _ => return ActionOutcome::Blocked,
    };
    if tile == Tile::Statue && !world.collected.contains(&statue_key(world, target)) {
        let key = statue_key(world, target);
        world.collected.insert(key);
        world.player.inventory.add(ItemKind::Coin, 1);
    }
    world.log(message.clone());
    world.outbox.push(GameEvent::Interaction {
        tile,
        position: target,
        message,
    });
    ActionOutcome::Interacted { tile }
}

fn statue_key(world: &GameWorld, pos: Position) -> String {
    format!("{},{}@statue:{}", world.zone.x, world.zone.y, pos.key())
}

/// First interactive tile next to the player, in direction order.
pub fn adjacent_interactive(world: &GameWorld) -> Option<Position> {
    use strum::IntoEnumIterator;
    let origin = world.player.position;
    Direction::iter()
        .map(|dir| origin.step(dir))
        .find(|pos| world.tile_at(*pos).is_some_and(Tile::is_interactive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn_system::TurnState;
    use dungeon::{EnemyKind, Grid};
    use std::time::Duration;
    use tokio::task::LocalSet;

    fn manager(rows: &[&str], player: Position) -> ActionManager {
        let world = GameWorld::with_grid(Grid::from_rows(rows).unwrap(), player);
        let services = Services::builder(world).build();
        let turns = TurnManager::new(services.clone());
        ActionManager::new(services, turns)
    }

    const ROOM: &[&str] = &["#####", "#..T#", "#.N.#", "#...#", "#####"];

    #[test]
    fn walls_block_without_consuming_a_turn() {
        let actions = manager(ROOM, Position::new(1, 1));
        let outcome = actions.dispatch(Intent::Move(Direction::Up));
        assert_eq!(outcome, ActionOutcome::Blocked);
        assert_eq!(outcome.turns(), 0);
        assert_eq!(
            actions.dispatch(Intent::Move(Direction::Right)),
            ActionOutcome::Moved { to: Position::new(2, 1) }
        );
    }

    #[test]
    fn chopping_trees_yields_wood() {
        let actions = manager(ROOM, Position::new(2, 1));
        let outcome = actions.dispatch(Intent::Interact(Position::new(3, 1)));
        assert_eq!(outcome, ActionOutcome::Interacted { tile: Tile::Tree });
        let world = actions.services.world.borrow();
        assert_eq!(world.tile_at(Position::new(3, 1)), Some(Tile::Floor));
        assert_eq!(world.player.inventory.count(ItemKind::Wood), 1);
    }

    #[test]
    fn interaction_requires_adjacency() {
        let actions = manager(ROOM, Position::new(1, 3));
        assert_eq!(
            actions.dispatch(Intent::Interact(Position::new(3, 1))),
            ActionOutcome::Blocked
        );
        assert_eq!(
            adjacent_interactive(&actions.services.world.borrow()),
            None
        );
    }

    #[test]
    fn statues_give_a_coin_once() {
        let actions = manager(&["#####", "#.A.#", "#...#", "#####"], Position::new(1, 1));
        actions.dispatch(Intent::Interact(Position::new(2, 1)));
        actions.dispatch(Intent::Interact(Position::new(2, 1)));
        let world = actions.services.world.borrow();
        assert_eq!(world.player.inventory.count(ItemKind::Coin), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attacks_suspend_the_enemy_phase_until_resolved() {
        LocalSet::new()
            .run_until(async {
                let actions = manager(ROOM, Position::new(1, 1));
                actions.services.world.borrow_mut().spawn_enemy(
                    EnemyKind::Skeleton,
                    Position::new(1, 2),
                    "k".into(),
                );

                let outcome = actions.perform(Intent::Move(Direction::Down));
                assert!(matches!(outcome, ActionOutcome::Attacked(AttackOutcome::Hit { .. })));
                assert_eq!(actions.turns.state(), TurnState::Suspended);
                assert!(actions.turns.player_just_attacked());

                tokio::time::sleep(Duration::from_secs(2)).await;
                assert!(actions.turns.is_player_turn());
                assert!(!actions.turns.player_just_attacked());
                // the skeleton struck back during the released phase
                assert_eq!(actions.services.world.borrow().player.hp, 8);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn walking_off_an_exit_changes_zone() {
        LocalSet::new()
            .run_until(async {
                let actions = manager(&["#####", "#...E", "#####"], Position::new(4, 1));
                let outcome = actions.perform(Intent::Move(Direction::Right));
                assert_eq!(outcome, ActionOutcome::ZoneChanged { zone: ZoneCoord::new(1, 0) });
                assert!(actions.turns.is_player_turn());
                let world = actions.services.world.borrow();
                assert_eq!(world.zone, ZoneCoord::new(1, 0));
                assert_eq!(world.player.position, Position::new(1, 6));
            })
            .await;
    }
}
