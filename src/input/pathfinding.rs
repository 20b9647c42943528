//! 寻路与路径执行
//!
//! Breadth-first search over the 4-connected grid. Neighbours are expanded
//! in the order up, down, left, right, which decides ties between equally
//! short routes. Living enemies block every tile they stand on.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use dungeon::{Direction, Position, Tile};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::actions::{ActionManager, ActionOutcome, Intent};
use crate::animation::{SequenceId, SequenceOutcome};
use crate::event_bus::GameEvent;
use crate::world::GameWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("target is outside the zone")]
    OutOfBounds,
    #[error("signs cannot be walked to")]
    SignTarget,
    #[error("a living enemy stands on the target")]
    EnemyAtGoal,
    #[error("target tile is not walkable")]
    Impassable,
    #[error("no route to the target")]
    Unreachable,
}

/// Shortest sequence of steps from `start` to any tile satisfying `is_goal`,
/// moving only through tiles satisfying `is_open`.
pub fn bfs(
    start: Position,
    is_open: impl Fn(Position) -> bool,
    is_goal: impl Fn(Position) -> bool,
) -> Option<Vec<Direction>> {
    if is_goal(start) {
        return Some(Vec::new());
    }
    let mut came_from: HashMap<Position, (Position, Direction)> = HashMap::new();
    let mut frontier = VecDeque::from([start]);

    while let Some(current) = frontier.pop_front() {
        for direction in Direction::iter() {
            let next = current.step(direction);
            if next == start || came_from.contains_key(&next) || !is_open(next) {
                continue;
            }
            came_from.insert(next, (current, direction));
            if is_goal(next) {
                return Some(reconstruct(&came_from, start, next));
            }
            frontier.push_back(next);
        }
    }
    None
}

fn reconstruct(
    came_from: &HashMap<Position, (Position, Direction)>,
    start: Position,
    goal: Position,
) -> Vec<Direction> {
    let mut steps = Vec::new();
    let mut cursor = goal;
    while cursor != start {
        let Some(&(previous, direction)) = came_from.get(&cursor) else {
            break;
        };
        steps.push(direction);
        cursor = previous;
    }
    steps.reverse();
    steps
}

/// 计算从 `start` 到 `goal` 的最短路径
pub fn find_path(
    world: &GameWorld,
    start: Position,
    goal: Position,
) -> Result<Vec<Direction>, PathError> {
    match world.tile_at(goal) {
        None => return Err(PathError::OutOfBounds),
        Some(Tile::Sign) => return Err(PathError::SignTarget),
        Some(_) => {}
    }
    if world.enemy_at(goal).is_some() {
        return Err(PathError::EnemyAtGoal);
    }
    if !world.grid.is_walkable(goal) {
        return Err(PathError::Impassable);
    }
    bfs(start, |pos| world.is_passable(pos), |pos| pos == goal).ok_or(PathError::Unreachable)
}

/// Path to any passable tile next to `target`, e.g. to talk to an NPC.
pub fn find_path_to_adjacent(
    world: &GameWorld,
    start: Position,
    target: Position,
) -> Result<Vec<Direction>, PathError> {
    if world.tile_at(target).is_none() {
        return Err(PathError::OutOfBounds);
    }
    bfs(
        start,
        |pos| world.is_passable(pos),
        |pos| pos.is_adjacent(&target),
    )
    .ok_or(PathError::Unreachable)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOutcome {
    Completed { steps: u32 },
    Cancelled { steps: u32 },
    /// Stopped on an exit or on the port that was the target.
    ExitReached { steps: u32 },
    /// A step failed (something moved into the way) or enemies took over.
    Interrupted { steps: u32 },
}

impl PathOutcome {
    pub fn steps(&self) -> u32 {
        match *self {
            PathOutcome::Completed { steps }
            | PathOutcome::Cancelled { steps }
            | PathOutcome::ExitReached { steps }
            | PathOutcome::Interrupted { steps } => steps,
        }
    }
}

#[derive(Debug)]
struct ActivePath {
    token: u64,
    target: Position,
    cancelled: bool,
    delay: Option<SequenceId>,
}

/// Walks a computed path one paced step at a time.
#[derive(Clone)]
pub struct PathfindingController {
    actions: ActionManager,
    active: Rc<RefCell<Option<ActivePath>>>,
    next_token: Rc<Cell<u64>>,
}

impl PathfindingController {
    pub fn new(actions: ActionManager) -> Self {
        Self {
            actions,
            active: Rc::new(RefCell::new(None)),
            next_token: Rc::new(Cell::new(0)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.borrow().is_some()
    }

    pub fn target(&self) -> Option<Position> {
        self.active.borrow().as_ref().map(|path| path.target)
    }

    /// 取消正在执行的路径，没有路径时返回 `false`
    pub fn cancel(&self) -> bool {
        let delay = {
            let mut active = self.active.borrow_mut();
            match active.as_mut() {
                Some(path) if !path.cancelled => {
                    path.cancelled = true;
                    path.delay.take()
                }
                _ => return false,
            }
        };
        if let Some(id) = delay {
            self.actions.services().scheduler.cancel_sequence(id);
        }
        true
    }

    fn is_cancelled(&self, token: u64) -> bool {
        match self.active.borrow().as_ref() {
            Some(path) if path.token == token => path.cancelled,
            _ => true,
        }
    }

    /// Execute `directions` toward `target`, then run `on_arrival` if the
    /// walk completed. Turns spent on the way are forwarded to the turn
    /// manager in one batch at the end.
    pub async fn execute_path(
        &self,
        target: Position,
        directions: Vec<Direction>,
        on_arrival: Option<Intent>,
    ) -> PathOutcome {
        self.cancel();
        let token = self.next_token.get();
        self.next_token.set(token + 1);
        *self.active.borrow_mut() = Some(ActivePath {
            token,
            target,
            cancelled: false,
            delay: None,
        });

        let services = self.actions.services().clone();
        let turns = self.actions.turns().clone();
        services.bus.publish(&GameEvent::PathStarted {
            target,
            steps: directions.len(),
        });
        tracing::debug!(x = target.x, y = target.y, steps = directions.len(), "path started");

        let total = directions.len();
        let mut steps = 0u32;
        let mut consumed = 0u32;
        let mut outcome = None;

        for (index, direction) in directions.into_iter().enumerate() {
            if self.is_cancelled(token) {
                outcome = Some(PathOutcome::Cancelled { steps });
                break;
            }
            if !turns.is_player_turn() {
                outcome = Some(PathOutcome::Interrupted { steps });
                break;
            }

            let result = self.actions.dispatch(Intent::Move(direction));
            consumed += result.turns();
            let ActionOutcome::Moved { to } = result else {
                tracing::debug!(?result, "path step failed");
                outcome = Some(PathOutcome::Interrupted { steps });
                break;
            };
            steps += 1;

            let standing_on = services.world.borrow().tile_at(to);
            if standing_on == Some(Tile::Exit)
                || (standing_on.is_some_and(Tile::is_transition) && to == target)
            {
                let zone = services.world.borrow().zone;
                services
                    .bus
                    .publish(&GameEvent::ExitReached { position: to, zone });
                outcome = Some(PathOutcome::ExitReached { steps });
                break;
            }

            if index + 1 < total {
                let delay = services
                    .scheduler
                    .delay(services.config.input.path_step_delay());
                if let Some(path) = self.active.borrow_mut().as_mut() {
                    if path.token == token {
                        path.delay = Some(delay.id());
                    }
                }
                if delay.await == SequenceOutcome::Cancelled {
                    outcome = Some(PathOutcome::Cancelled { steps });
                    break;
                }
            }
        }

        let outcome = outcome.unwrap_or(PathOutcome::Completed { steps });
        if let (PathOutcome::Completed { .. }, Some(intent)) = (outcome, on_arrival) {
            consumed += self.actions.dispatch(intent).turns();
        }

        {
            let mut active = self.active.borrow_mut();
            if active.as_ref().is_some_and(|path| path.token == token) {
                *active = None;
            }
        }

        match outcome {
            PathOutcome::Cancelled { steps } | PathOutcome::Interrupted { steps } => {
                services.bus.publish(&GameEvent::PathCancelled {
                    target,
                    steps_taken: steps,
                });
            }
            PathOutcome::Completed { steps } | PathOutcome::ExitReached { steps } => {
                services.bus.publish(&GameEvent::PathCompleted {
                    target,
                    steps_taken: steps,
                });
            }
        }
        tracing::debug!(?outcome, consumed, "path finished");

        if consumed > 0 {
            turns.advance_turns(consumed).await;
        }
        outcome
    }
}
