//! 事件总线系统，用于解耦模块间通信
//!
//! 同步的具名发布-订阅通道：
//! - `on` 注册监听器并返回取消订阅句柄
//! - `off` 移除单个或某个名称下的全部监听器
//! - `emit` 在调用方的帧内按注册顺序同步调用监听器
//!
//! 单个监听器返回错误或 panic 不会影响其余监听器，错误只记录日志、不向上传播。
//! 总线只在单线程内使用（`Rc` 句柄），没有缓冲、持久化或跨进程传输。

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use dungeon::{Direction, EnemyKind, ItemKind, Position, Tile, ZoneCoord};
use serde::{Deserialize, Serialize};

/// 稳定的事件名称，其它子系统基于这些名称构建
pub mod names {
    pub const INPUT_TAP: &str = "input:tap";
    pub const INPUT_DOUBLE_TAP: &str = "input:double:tap";
    pub const INPUT_SWIPE: &str = "input:swipe";
    pub const INPUT_KEY_PRESS: &str = "input:key:press";
    pub const INPUT_PLAYER_TILE_TAP: &str = "input:player:tile:tap";
    pub const INPUT_PATH_STARTED: &str = "input:path:started";
    pub const INPUT_PATH_CANCELLED: &str = "input:path:cancelled";
    pub const INPUT_PATH_COMPLETED: &str = "input:path:completed";
    pub const INPUT_EXIT_REACHED: &str = "input:exit:reached";

    pub const TURN_ENEMY_STARTED: &str = "turn:enemy:started";
    pub const TURN_ENEMY_COMPLETED: &str = "turn:enemy:completed";
    pub const TURN_PLAYER_STARTED: &str = "turn:player:started";

    pub const COMBAT_ATTACK: &str = "combat:attack";
    pub const COMBAT_ENEMY_DEFEATED: &str = "combat:enemy:defeated";
    pub const COMBAT_EXPLOSION: &str = "combat:explosion";
    pub const ITEM_PICKED_UP: &str = "item:picked:up";
    pub const ITEM_USED: &str = "item:used";
    pub const INTERACTION: &str = "interaction";
    pub const MENU_OPENED: &str = "menu:opened";
    pub const ZONE_ENTERED: &str = "zone:entered";

    pub const GAME_SAVED: &str = "game:saved";
    pub const GAME_LOADED: &str = "game:loaded";
    pub const GAME_OVER: &str = "game:over";
}

/// Who took part in a combat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combatant {
    Player,
    Enemy(EnemyKind),
}

/// 游戏事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    // ===== 输入事件 =====
    Tap {
        x: f32,
        y: f32,
        tile: Option<Position>,
    },
    DoubleTap {
        tile: Option<Position>,
    },
    Swipe {
        direction: Direction,
    },
    KeyPress {
        key: String,
    },
    PlayerTileTap {
        position: Position,
    },
    PathStarted {
        target: Position,
        steps: usize,
    },
    PathCancelled {
        target: Position,
        steps_taken: u32,
    },
    PathCompleted {
        target: Position,
        steps_taken: u32,
    },
    ExitReached {
        position: Position,
        zone: ZoneCoord,
    },

    // ===== 回合事件 =====
    EnemyPhaseStarted {
        turn: u64,
        enemies: usize,
    },
    EnemyPhaseCompleted {
        turn: u64,
        acted: usize,
        skipped: usize,
    },
    PlayerTurnStarted {
        turn: u64,
    },

    // ===== 战斗与物品事件 =====
    Attack {
        attacker: Combatant,
        target: Combatant,
        damage: u32,
    },
    EnemyDefeated {
        kind: EnemyKind,
        position: Position,
    },
    Explosion {
        position: Position,
    },
    ItemPickedUp {
        kind: ItemKind,
    },
    ItemUsed {
        kind: ItemKind,
    },
    Interaction {
        tile: Tile,
        position: Position,
        message: String,
    },
    MenuOpened {
        items: usize,
    },
    ZoneEntered {
        zone: ZoneCoord,
    },

    // ===== 系统事件 =====
    GameSaved {
        last_saved: u64,
    },
    GameLoaded {
        turn: u64,
    },
    GameOver {
        turn: u64,
    },

    /// 任意结构化负载，供扩展子系统使用
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

impl GameEvent {
    /// 获取事件所属的通道名称
    pub fn name(&self) -> &str {
        match self {
            GameEvent::Tap { .. } => names::INPUT_TAP,
            GameEvent::DoubleTap { .. } => names::INPUT_DOUBLE_TAP,
            GameEvent::Swipe { .. } => names::INPUT_SWIPE,
            GameEvent::KeyPress { .. } => names::INPUT_KEY_PRESS,
            GameEvent::PlayerTileTap { .. } => names::INPUT_PLAYER_TILE_TAP,
            GameEvent::PathStarted { .. } => names::INPUT_PATH_STARTED,
            GameEvent::PathCancelled { .. } => names::INPUT_PATH_CANCELLED,
            GameEvent::PathCompleted { .. } => names::INPUT_PATH_COMPLETED,
            GameEvent::ExitReached { .. } => names::INPUT_EXIT_REACHED,
            GameEvent::EnemyPhaseStarted { .. } => names::TURN_ENEMY_STARTED,
            GameEvent::EnemyPhaseCompleted { .. } => names::TURN_ENEMY_COMPLETED,
            GameEvent::PlayerTurnStarted { .. } => names::TURN_PLAYER_STARTED,
            GameEvent::Attack { .. } => names::COMBAT_ATTACK,
            GameEvent::EnemyDefeated { .. } => names::COMBAT_ENEMY_DEFEATED,
            GameEvent::Explosion { .. } => names::COMBAT_EXPLOSION,
            GameEvent::ItemPickedUp { .. } => names::ITEM_PICKED_UP,
            GameEvent::ItemUsed { .. } => names::ITEM_USED,
            GameEvent::Interaction { .. } => names::INTERACTION,
            GameEvent::MenuOpened { .. } => names::MENU_OPENED,
            GameEvent::ZoneEntered { .. } => names::ZONE_ENTERED,
            GameEvent::GameSaved { .. } => names::GAME_SAVED,
            GameEvent::GameLoaded { .. } => names::GAME_LOADED,
            GameEvent::GameOver { .. } => names::GAME_OVER,
            GameEvent::Custom { name, .. } => name,
        }
    }
}

/// What a listener may return: `()` for infallible listeners, or a `Result`.
pub trait ListenerOutcome {
    fn into_result(self) -> anyhow::Result<()>;
}

impl ListenerOutcome for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl ListenerOutcome for anyhow::Result<()> {
    fn into_result(self) -> anyhow::Result<()> {
        self
    }
}

type Listener = Box<dyn FnMut(&GameEvent) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    active: Cell<bool>,
    callback: RefCell<Listener>,
}

struct BusInner {
    channels: RefCell<HashMap<String, Vec<Rc<ListenerEntry>>>>,
    next_id: Cell<u64>,
    /// 事件历史（用于调试）
    history: RefCell<VecDeque<String>>,
    max_history: usize,
    /// 递归发布深度计数器
    publish_depth: Cell<usize>,
    max_publish_depth: usize,
}

/// 同步事件总线句柄；克隆后共享同一组监听器
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

/// Handle returned by [`EventBus::on`]; dropping it keeps the listener registered.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    bus: Weak<BusInner>,
    name: String,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 取消订阅；总线已销毁时为空操作
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus { inner }.off(&self.name, Some(self.id));
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history_size(100)
    }

    /// 创建一个指定历史记录大小的事件总线
    pub fn with_history_size(max_history: usize) -> Self {
        Self {
            inner: Rc::new(BusInner {
                channels: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
                history: RefCell::new(VecDeque::new()),
                max_history,
                publish_depth: Cell::new(0),
                max_publish_depth: 16,
            }),
        }
    }

    /// 注册监听器，返回取消订阅句柄
    pub fn on<F, R>(&self, name: &str, mut listener: F) -> Subscription
    where
        F: FnMut(&GameEvent) -> R + 'static,
        R: ListenerOutcome,
    {
        let id = ListenerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let entry = Rc::new(ListenerEntry {
            id,
            active: Cell::new(true),
            callback: RefCell::new(Box::new(move |event| listener(event).into_result())),
        });
        self.inner
            .channels
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(entry);

        Subscription {
            bus: Rc::downgrade(&self.inner),
            name: name.to_string(),
            id,
        }
    }

    /// 移除一个监听器；`listener` 为 `None` 时移除该名称下的全部监听器
    pub fn off(&self, name: &str, listener: Option<ListenerId>) {
        let mut channels = self.inner.channels.borrow_mut();
        match listener {
            Some(id) => {
                if let Some(entries) = channels.get_mut(name) {
                    entries.retain(|entry| {
                        if entry.id == id {
                            entry.active.set(false);
                            false
                        } else {
                            true
                        }
                    });
                    if entries.is_empty() {
                        channels.remove(name);
                    }
                }
            }
            None => {
                if let Some(entries) = channels.remove(name) {
                    for entry in entries {
                        entry.active.set(false);
                    }
                }
            }
        }
    }

    /// 按注册顺序同步调用该名称下的监听器
    ///
    /// Listeners removed during the emit are not invoked afterwards; listeners
    /// added during the emit are first invoked by the next emit.
    pub fn emit(&self, name: &str, payload: &GameEvent) {
        let depth = self.inner.publish_depth.get();
        if depth >= self.inner.max_publish_depth {
            tracing::error!(
                event = name,
                depth,
                "maximum publish depth reached, dropping event"
            );
            return;
        }

        self.add_to_history(name);

        let snapshot: Vec<Rc<ListenerEntry>> = match self.inner.channels.borrow().get(name) {
            Some(entries) => entries.clone(),
            None => return,
        };

        self.inner.publish_depth.set(depth + 1);
        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }
            let Ok(mut callback) = entry.callback.try_borrow_mut() else {
                tracing::warn!(event = name, "listener re-entered itself, skipping");
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(event = name, error = %err, "event listener failed");
                }
                Err(_) => {
                    tracing::error!(event = name, "event listener panicked");
                }
            }
        }
        self.inner.publish_depth.set(depth);
    }

    /// 发布事件到其自身名称的通道
    pub fn publish(&self, event: &GameEvent) {
        self.emit(event.name(), event);
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .channels
            .borrow()
            .get(name)
            .map_or(0, Vec::len)
    }

    /// 获取订阅者数量（用于调试）
    pub fn subscriber_count(&self) -> usize {
        self.inner.channels.borrow().values().map(Vec::len).sum()
    }

    /// 移除全部监听器
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.channels.borrow_mut().drain().collect();
        for (_, entries) in drained {
            for entry in entries {
                entry.active.set(false);
            }
        }
    }

    fn add_to_history(&self, name: &str) {
        let mut history = self.inner.history.borrow_mut();
        if history.len() >= self.inner.max_history {
            history.pop_front();
        }
        history.push_back(name.to_string());
    }

    /// 获取事件历史（最近的 n 个事件名称）
    pub fn get_history(&self, count: usize) -> Vec<String> {
        let history = self.inner.history.borrow();
        let start = history.len().saturating_sub(count);
        history.iter().skip(start).cloned().collect()
    }

    /// 清空历史记录
    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
