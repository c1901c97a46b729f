// Cooperative tasks, polled once per tick

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::context::FlowContext;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Outcome slot shared between a running job and whoever waits on it.
#[derive(Debug, Clone)]
pub struct Completion {
    state: Arc<AtomicU8>,
    token: CancelToken,
}

impl Completion {
    pub fn pending() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
            token: CancelToken::new(),
        }
    }

    pub fn completed() -> Self {
        let completion = Self::pending();
        completion.complete();
        completion
    }

    pub fn cancelled() -> Self {
        let completion = Self::pending();
        completion.cancel();
        completion
    }

    pub fn complete(&self) {
        let _ = self
            .state
            .compare_exchange(PENDING, COMPLETED, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Requests cancellation. Has no effect once the job completed.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.token.cancel();
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == COMPLETED
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Completed or cancelled.
    pub fn is_finished(&self) -> bool {
        !self.is_pending()
    }
}

type Predicate = Box<dyn FnMut(&FlowContext<'_>) -> bool + Send + Sync>;
type Action = Box<dyn FnOnce(&mut FlowContext<'_>) + Send + Sync>;
type Starter = Box<dyn FnOnce(&mut FlowContext<'_>) -> Completion + Send + Sync>;

enum Step {
    Seconds(f32),
    Await(Completion),
    Until(Predicate),
    Yield,
    Run(Action),
    Start(Starter),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Seconds(secs) => write!(f, "Seconds({secs})"),
            Step::Await(completion) => write!(f, "Await({completion:?})"),
            Step::Until(_) => f.write_str("Until(..)"),
            Step::Yield => f.write_str("Yield"),
            Step::Run(_) => f.write_str("Run(..)"),
            Step::Start(_) => f.write_str("Start(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    Pending,
    Ready,
    Cancelled,
}

/// A sequence of steps driven by [`Task::poll`].
///
/// Every wait suspends for at least one tick, even when its condition already
/// holds, except [`Task::wait_for`] on a job that has already finished.
#[derive(Debug, Default)]
pub struct Task {
    steps: VecDeque<Step>,
    head_started: bool,
    waited: f32,
    token: CancelToken,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_secs(mut self, secs: f32) -> Self {
        self.steps.push_back(Step::Seconds(secs));
        self
    }

    pub fn wait_for(mut self, completion: Completion) -> Self {
        self.steps.push_back(Step::Await(completion));
        self
    }

    pub fn wait_until(
        mut self,
        predicate: impl FnMut(&FlowContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.steps.push_back(Step::Until(Box::new(predicate)));
        self
    }

    pub fn yield_now(mut self) -> Self {
        self.steps.push_back(Step::Yield);
        self
    }

    pub fn then(mut self, action: impl FnOnce(&mut FlowContext<'_>) + Send + Sync + 'static) -> Self {
        self.steps.push_back(Step::Run(Box::new(action)));
        self
    }

    /// Runs `start` when reached and waits for the job it returns, typically
    /// a transition started against the context.
    pub fn then_await(
        mut self,
        start: impl FnOnce(&mut FlowContext<'_>) -> Completion + Send + Sync + 'static,
    ) -> Self {
        self.steps.push_back(Step::Start(Box::new(start)));
        self
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Advances the task by `dt` seconds of wall time.
    pub fn poll(&mut self, ctx: &mut FlowContext<'_>, dt: f32) -> TaskPoll {
        // Time only flows into a wait that was already suspended before this poll.
        let mut elapsed = Some(dt);
        loop {
            if self.token.is_cancelled() {
                self.steps.clear();
                return TaskPoll::Cancelled;
            }
            let Some(step) = self.steps.front_mut() else {
                return TaskPoll::Ready;
            };
            match step {
                Step::Seconds(secs) => {
                    if !self.head_started {
                        self.head_started = true;
                        self.waited = 0.0;
                        return TaskPoll::Pending;
                    }
                    self.waited += elapsed.take().unwrap_or(0.0);
                    if self.waited < *secs {
                        return TaskPoll::Pending;
                    }
                }
                Step::Await(completion) => {
                    if completion.is_pending() {
                        self.head_started = true;
                        return TaskPoll::Pending;
                    }
                }
                Step::Until(predicate) => {
                    if !self.head_started {
                        self.head_started = true;
                        return TaskPoll::Pending;
                    }
                    if !predicate(&*ctx) {
                        return TaskPoll::Pending;
                    }
                }
                Step::Yield => {
                    if !self.head_started {
                        self.head_started = true;
                        return TaskPoll::Pending;
                    }
                }
                Step::Run(_) | Step::Start(_) => {}
            }

            self.head_started = false;
            match self.steps.pop_front() {
                Some(Step::Run(action)) => action(&mut *ctx),
                Some(Step::Start(start)) => {
                    let completion = start(&mut *ctx);
                    self.steps.push_front(Step::Await(completion));
                }
                _ => {}
            }
        }
    }
}
