//! Sequenced timing primitive shared by the turn loop and input handling.
//!
//! A sequence is an ordered list of steps, each either an action that runs
//! once or a wait. Starting a sequence runs the leading actions synchronously
//! and hands the remainder to a local task; the returned [`SequenceHandle`]
//! resolves when every step has run or the sequence was cancelled.
//!
//! Sequences are spawned with [`tokio::task::spawn_local`], so they must be
//! started from inside a [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};

pub type SequenceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed,
    Cancelled,
}

enum Step {
    Action(Box<dyn FnOnce()>),
    Wait(Duration),
}

#[derive(Default)]
struct SequenceControl {
    cancelled: Cell<bool>,
    wake: Notify,
}

#[derive(Default)]
struct SchedulerInner {
    next_id: Cell<SequenceId>,
    running: RefCell<HashMap<SequenceId, Rc<SequenceControl>>>,
}

/// 动画调度器；克隆后共享同一组运行中的序列
#[derive(Clone, Default)]
pub struct AnimationScheduler {
    inner: Rc<SchedulerInner>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建一个新的空序列，分配唯一 id
    pub fn create_sequence(&self) -> AnimationSequence {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        AnimationSequence {
            id,
            steps: VecDeque::new(),
            scheduler: self.clone(),
        }
    }

    /// Single-wait sequence, the building block for paced loops.
    pub fn delay(&self, duration: Duration) -> SequenceHandle {
        self.create_sequence().wait_for(duration).start()
    }

    /// 取消序列：剩余步骤不再执行，挂起的等待立即结束。未知 id 返回 `false`。
    pub fn cancel_sequence(&self, id: SequenceId) -> bool {
        let control = self.inner.running.borrow_mut().remove(&id);
        match control {
            Some(control) => {
                control.cancelled.set(true);
                control.wake.notify_one();
                tracing::trace!(sequence = id, "sequence cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.inner.running.borrow_mut().drain().collect();
        for (_, control) in &drained {
            control.cancelled.set(true);
            control.wake.notify_one();
        }
        drained.len()
    }

    pub fn is_running(&self, id: SequenceId) -> bool {
        self.inner.running.borrow().contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.running.borrow().len()
    }

    fn register(&self, id: SequenceId, control: Rc<SequenceControl>) {
        self.inner.running.borrow_mut().insert(id, control);
    }

    fn unregister(&self, id: SequenceId) {
        self.inner.running.borrow_mut().remove(&id);
    }
}

/// 序列构建器
///
/// `start` consumes the builder, so steps cannot be appended to a running
/// sequence.
pub struct AnimationSequence {
    id: SequenceId,
    steps: VecDeque<Step>,
    scheduler: AnimationScheduler,
}

impl AnimationSequence {
    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 追加一个动作步骤
    pub fn then(mut self, action: impl FnOnce() + 'static) -> Self {
        self.steps.push_back(Step::Action(Box::new(action)));
        self
    }

    /// 追加一个等待步骤（毫秒）
    pub fn wait(self, ms: u64) -> Self {
        self.wait_for(Duration::from_millis(ms))
    }

    pub fn wait_for(mut self, duration: Duration) -> Self {
        self.steps.push_back(Step::Wait(duration));
        self
    }

    /// 启动序列
    pub fn start(self) -> SequenceHandle {
        let AnimationSequence {
            id,
            mut steps,
            scheduler,
        } = self;
        let control = Rc::new(SequenceControl::default());
        scheduler.register(id, control.clone());

        // Leading actions run in the caller's frame.
        loop {
            if control.cancelled.get() {
                scheduler.unregister(id);
                return SequenceHandle::ready(id, SequenceOutcome::Cancelled);
            }
            match steps.pop_front() {
                None => {
                    scheduler.unregister(id);
                    return SequenceHandle::ready(id, SequenceOutcome::Completed);
                }
                Some(Step::Action(action)) => run_action(id, action),
                Some(wait @ Step::Wait(_)) => {
                    steps.push_front(wait);
                    break;
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_local(async move {
            let outcome = run_steps(id, steps, &control).await;
            scheduler.unregister(id);
            let _ = tx.send(outcome);
        });
        SequenceHandle {
            id,
            state: HandleState::Pending(rx),
        }
    }
}

async fn run_steps(
    id: SequenceId,
    mut steps: VecDeque<Step>,
    control: &SequenceControl,
) -> SequenceOutcome {
    while let Some(step) = steps.pop_front() {
        if control.cancelled.get() {
            return SequenceOutcome::Cancelled;
        }
        match step {
            Step::Action(action) => run_action(id, action),
            Step::Wait(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = control.wake.notified() => {}
                }
                if control.cancelled.get() {
                    return SequenceOutcome::Cancelled;
                }
            }
        }
    }
    SequenceOutcome::Completed
}

fn run_action(id: SequenceId, action: Box<dyn FnOnce()>) {
    if catch_unwind(AssertUnwindSafe(action)).is_err() {
        tracing::error!(sequence = id, "sequence action panicked");
    }
}

enum HandleState {
    Ready(SequenceOutcome),
    Pending(oneshot::Receiver<SequenceOutcome>),
}

/// Resolves once the sequence completes or is cancelled.
///
/// Dropping the handle does not stop the sequence.
pub struct SequenceHandle {
    id: SequenceId,
    state: HandleState,
}

impl SequenceHandle {
    fn ready(id: SequenceId, outcome: SequenceOutcome) -> Self {
        Self {
            id,
            state: HandleState::Ready(outcome),
        }
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }
}

impl Future for SequenceHandle {
    type Output = SequenceOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            HandleState::Ready(outcome) => Poll::Ready(*outcome),
            // the runtime dropped the task before it finished
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(SequenceOutcome::Cancelled)),
        }
    }
}
