//! Player/enemy turn alternation.
//!
//! The `TurnManager` snapshots the enemy roster when an enemy phase starts,
//! then lets each enemy act in order with a fixed pause between actors.
//! Every queued enemy is re-validated right before it acts, because an
//! earlier actor (a bomber exploding, say) may have killed it.
//!
//! The phase is driven by a local task; `start_enemy_turns` itself only
//! performs the synchronous bookkeeping and hands back the task handle.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use dungeon::Position;
use hecs::Entity;
use tokio::task::JoinHandle;

use crate::animation::{SequenceId, SequenceOutcome};
use crate::event_bus::GameEvent;
use crate::services::Services;

/// Tiles claimed during the current enemy phase, keyed by `"x,y"`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OccupiedTiles {
    tiles: HashSet<String>,
}

impl OccupiedTiles {
    /// 占用一个格子，已被占用时返回 `false`
    pub fn claim(&mut self, pos: Position) -> bool {
        self.tiles.insert(pos.key())
    }

    pub fn release(&mut self, pos: Position) {
        self.tiles.remove(&pos.key());
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.tiles.contains(&pos.key())
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// High-level phases recognised by the turn manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Input is accepted.
    PlayerTurn,
    /// Enemies are acting; input is ignored.
    EnemyPhaseRunning,
    /// A player action (an attack) is still resolving.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed { acted: usize, skipped: usize },
    /// The phase was not started (player action resolving, phase already running, player dead).
    NotStarted,
    /// `reset` cancelled the phase mid-way.
    Interrupted,
    PlayerDefeated,
}

#[derive(Debug)]
struct TurnQueue {
    state: TurnState,
    player_just_attacked: bool,
    queue: VecDeque<Entity>,
    occupied: OccupiedTiles,
    pending_delay: Option<SequenceId>,
    acted: usize,
    skipped: usize,
}

impl Default for TurnQueue {
    fn default() -> Self {
        Self {
            state: TurnState::PlayerTurn,
            player_just_attacked: false,
            queue: VecDeque::new(),
            occupied: OccupiedTiles::default(),
            pending_delay: None,
            acted: 0,
            skipped: 0,
        }
    }
}

/// Coordinates the enemy phase. Clones share state.
#[derive(Clone)]
pub struct TurnManager {
    services: Services,
    inner: Rc<RefCell<TurnQueue>>,
}

impl TurnManager {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            inner: Rc::new(RefCell::new(TurnQueue::default())),
        }
    }

    pub fn state(&self) -> TurnState {
        self.inner.borrow().state
    }

    pub fn is_player_turn(&self) -> bool {
        self.state() == TurnState::PlayerTurn
    }

    pub fn player_just_attacked(&self) -> bool {
        self.inner.borrow().player_just_attacked
    }

    /// Enemies still waiting to act in the current phase.
    pub fn queue_len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    pub fn is_tile_occupied(&self, pos: Position) -> bool {
        self.inner.borrow().occupied.is_occupied(pos)
    }

    pub fn occupied_count(&self) -> usize {
        self.inner.borrow().occupied.len()
    }

    /// Marks a player attack as resolving; enemy phases are held off until
    /// [`TurnManager::resolve_player_action`].
    pub fn begin_player_action(&self) {
        let mut queue = self.inner.borrow_mut();
        queue.player_just_attacked = true;
        queue.state = TurnState::Suspended;
    }

    /// Clears the resolving flag and starts the enemy phase it held off.
    pub fn resolve_player_action(&self) -> Option<JoinHandle<PhaseOutcome>> {
        {
            let mut queue = self.inner.borrow_mut();
            queue.player_just_attacked = false;
            if queue.state == TurnState::Suspended {
                queue.state = TurnState::PlayerTurn;
            }
        }
        self.start_enemy_turns()
    }

    /// 开始敌人回合
    ///
    /// No-op while a player action is resolving or a phase is already
    /// running. Otherwise resets the occupied tiles (reserving the player's
    /// tile), snapshots the enemy roster and spawns the draining task.
    pub fn start_enemy_turns(&self) -> Option<JoinHandle<PhaseOutcome>> {
        let (turn, enemies) = {
            let mut queue = self.inner.borrow_mut();
            if queue.player_just_attacked {
                tracing::debug!("player action still resolving, enemy phase deferred");
                return None;
            }
            if queue.state == TurnState::EnemyPhaseRunning {
                tracing::debug!("enemy phase already running");
                return None;
            }
            let world = self.services.world.borrow();
            if !world.player.is_alive() {
                return None;
            }

            queue.state = TurnState::EnemyPhaseRunning;
            queue.occupied.clear();
            queue.occupied.claim(world.player.position);
            queue.queue = world.enemies.iter().copied().collect();
            queue.acted = 0;
            queue.skipped = 0;
            (world.turn + 1, queue.queue.len())
        };

        tracing::debug!(turn, enemies, "enemy phase started");
        self.services
            .bus
            .publish(&GameEvent::EnemyPhaseStarted { turn, enemies });

        let manager = self.clone();
        Some(tokio::task::spawn_local(async move {
            manager.process_turn_queue().await
        }))
    }

    /// Drain the queue: one enemy, one pause, repeat.
    pub async fn process_turn_queue(&self) -> PhaseOutcome {
        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            let Some(enemy) = next else {
                return self.finish_enemy_phase();
            };

            self.act(enemy);
            self.services.flush_events();
            self.services.render();
            if !self.services.world.borrow().player.is_alive() {
                return self.player_defeated();
            }

            // skipped enemies still cost a pause
            let delay = self
                .services
                .scheduler
                .delay(self.services.config.turn.enemy_move_delay());
            self.inner.borrow_mut().pending_delay = Some(delay.id());
            if delay.await == SequenceOutcome::Cancelled {
                tracing::debug!("enemy phase interrupted");
                return PhaseOutcome::Interrupted;
            }
            self.inner.borrow_mut().pending_delay = None;
        }
    }

    fn act(&self, enemy: Entity) {
        let mut guard = self.inner.borrow_mut();
        let queue = &mut *guard;
        let mut world = self.services.world.borrow_mut();
        if !world.is_enemy_active(enemy) {
            tracing::trace!(?enemy, "skipping enemy removed earlier in the phase");
            queue.skipped += 1;
            return;
        }
        self.services
            .combat
            .handle_single_enemy_movement(&mut world, &mut queue.occupied, enemy);
        queue.acted += 1;
    }

    fn finish_enemy_phase(&self) -> PhaseOutcome {
        let (acted, skipped) = {
            let mut queue = self.inner.borrow_mut();
            queue.state = TurnState::PlayerTurn;
            queue.player_just_attacked = false;
            queue.occupied.clear();
            queue.queue.clear();
            (queue.acted, queue.skipped)
        };
        let turn = {
            let mut world = self.services.world.borrow_mut();
            self.services.combat.check_collisions(&mut world);
            world.turn += 1;
            world.turn
        };
        self.services.flush_events();
        self.services.render();

        tracing::debug!(turn, acted, skipped, "enemy phase completed");
        let bus = &self.services.bus;
        bus.publish(&GameEvent::EnemyPhaseCompleted {
            turn,
            acted,
            skipped,
        });
        bus.publish(&GameEvent::PlayerTurnStarted { turn });
        PhaseOutcome::Completed { acted, skipped }
    }

    fn player_defeated(&self) -> PhaseOutcome {
        {
            let mut queue = self.inner.borrow_mut();
            queue.state = TurnState::PlayerTurn;
            queue.player_just_attacked = false;
            queue.occupied.clear();
            queue.queue.clear();
        }
        let turn = self.services.world.borrow().turn;
        tracing::info!(turn, "player defeated");
        self.services.bus.publish(&GameEvent::GameOver { turn });
        PhaseOutcome::PlayerDefeated
    }

    /// Run `count` enemy phases back to back, stopping early if one does not complete.
    pub async fn advance_turns(&self, count: u32) -> PhaseOutcome {
        let mut last = PhaseOutcome::NotStarted;
        for _ in 0..count {
            last = match self.start_enemy_turns() {
                Some(handle) => handle.await.unwrap_or(PhaseOutcome::Interrupted),
                None => PhaseOutcome::NotStarted,
            };
            if !matches!(last, PhaseOutcome::Completed { .. }) {
                break;
            }
        }
        last
    }

    /// 中断当前敌人阶段并回到玩家回合（切换区域、读档时使用）
    pub fn reset(&self) {
        let pending = {
            let mut queue = self.inner.borrow_mut();
            let pending = queue.pending_delay.take();
            *queue = TurnQueue::default();
            pending
        };
        if let Some(id) = pending {
            self.services.scheduler.cancel_sequence(id);
        }
    }
}
