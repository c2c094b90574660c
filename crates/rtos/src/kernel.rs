//! Deterministic priority scheduler hosting the task bodies.
//!
//! Tasks are `async` bodies polled one at a time on the caller's thread. The
//! highest-priority ready task always runs next (FIFO among equal
//! priorities), virtual time advances only when nothing is ready, and the
//! software timer service fires on every processed tick. Primitives reach the
//! scheduler through the crate-private helpers at the bottom of this file.

use core::fmt;
use core::future::{poll_fn, Future};
use core::mem;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context as PollContext, Poll, Waker};
use std::sync::{Arc, Weak};

use futures::task::{waker, ArcWake};
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::{ContractViolation, Error};
use crate::interrupt::InterruptNumber;
use crate::timer::TimerService;
use crate::waitlist::WaitList;

/// Kernel tick count.
pub type Tick = u64;

/// Task priority. Larger values preempt smaller ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Self = Self(0);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier handed out by [`Kernel::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

/// Bound on how long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Never suspend; report `Full`/`Empty` straight away.
    Immediate,
    /// Suspend for at most this many ticks.
    Ticks(Tick),
    /// Suspend until the operation can complete.
    Forever,
}

impl Timeout {
    pub const fn ticks(ticks: Tick) -> Self {
        if ticks == 0 {
            Self::Immediate
        } else {
            Self::Ticks(ticks)
        }
    }

    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Immediate | Self::Ticks(0))
    }
}

impl From<Tick> for Timeout {
    fn from(ticks: Tick) -> Self {
        Self::ticks(ticks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    Now,
    At(Tick),
    Never,
}

/// Where the code calling into the kernel is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Outside of any task, e.g. the host thread driving the kernel.
    Idle,
    Task { id: TaskId, priority: Priority },
    /// The deferred-execution context running timer callbacks.
    TimerService,
    /// A simulated interrupt handler, with the priority it interrupted.
    Interrupt {
        number: InterruptNumber,
        preempted: Priority,
    },
}

/// Configuration for the kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    pub tick_rate_hz: u32,
    pub max_priorities: u8,
    pub timer_priority: u8,
    /// Consecutive dispatches after which one tick elapses even though tasks
    /// are still ready.
    pub polls_per_tick: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "blinky",
            tick_rate_hz: 1000,
            max_priorities: 8,
            timer_priority: 7,
            polls_per_tick: 32,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Converts milliseconds to ticks, rounding down.
    pub fn ms_to_ticks(&self, ms: u64) -> Tick {
        ms.saturating_mul(u64::from(self.tick_rate_hz)) / 1000
    }

    pub fn timer_priority(&self) -> Priority {
        Priority(self.timer_priority)
    }

    fn validate(&self) -> Result<(), KernelError> {
        if self.tick_rate_hz == 0 {
            return Err(KernelError::InvalidConfig("tick rate must be non-zero"));
        }
        if self.max_priorities == 0 {
            return Err(KernelError::InvalidConfig("at least one priority level is required"));
        }
        if self.timer_priority >= self.max_priorities {
            return Err(KernelError::InvalidConfig("timer priority must be below max_priorities"));
        }
        if self.polls_per_tick == 0 {
            return Err(KernelError::InvalidConfig("polls_per_tick must be non-zero"));
        }
        Ok(())
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name used in log records.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the tick frequency used by [`KernelConfig::ms_to_ticks`].
    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Sets the number of task priority levels.
    pub fn max_priorities(mut self, max: u8) -> Self {
        self.config.max_priorities = max;
        self
    }

    /// Sets the priority reported while timer callbacks run.
    pub fn timer_priority(mut self, priority: u8) -> Self {
        self.config.timer_priority = priority;
        self
    }

    pub fn polls_per_tick(mut self, polls: u32) -> Self {
        self.config.polls_per_tick = polls;
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("priority {priority} exceeds the configured maximum {max}")]
    InvalidPriority { priority: u8, max: u8 },
    #[error("kernel is already running")]
    AlreadyRunning,
}

type IdleHook = Box<dyn Fn() + Send + Sync>;
type TaskBody = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct KernelBuilder {
    config: KernelConfig,
    idle_hook: Option<IdleHook>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            idle_hook: None,
        }
    }

    /// Installs a hook called each time the kernel finds nothing to run.
    pub fn idle_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.idle_hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Kernel, KernelError> {
        self.config.validate()?;
        Ok(Kernel {
            shared: Arc::new(Shared {
                config: self.config,
                idle_hook: self.idle_hook,
                state: Mutex::new(State::default()),
                tasks: Mutex::new(Vec::new()),
                timers: TimerService::default(),
                running: AtomicBool::new(false),
            }),
        })
    }
}

struct TaskSlot {
    name: &'static str,
    body: Option<TaskBody>,
    waker: Waker,
    finished: bool,
}

struct Sleeper {
    at: Tick,
    /// `None` for a sleeper registered outside of any task.
    task: Option<TaskId>,
    waker: Waker,
}

struct State {
    tick: Tick,
    context: Context,
    ready: Vec<TaskId>,
    priorities: Vec<Priority>,
    sleepers: Vec<Sleeper>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            tick: 0,
            context: Context::Idle,
            ready: Vec::new(),
            priorities: Vec::new(),
            sleepers: Vec::new(),
        }
    }
}

impl State {
    fn make_ready(&mut self, id: TaskId) {
        if !self.ready.contains(&id) {
            self.ready.push(id);
        }
    }

    fn priority_of(&self, id: TaskId) -> Priority {
        self.priorities.get(id.0).copied().unwrap_or(Priority::IDLE)
    }

    /// Removes the highest-priority ready task, earliest first among equals.
    fn next_ready(&mut self) -> Option<(TaskId, Priority)> {
        let mut best: Option<(usize, Priority)> = None;
        for (pos, id) in self.ready.iter().enumerate() {
            let priority = self.priority_of(*id);
            if best.map_or(true, |(_, top)| priority > top) {
                best = Some((pos, priority));
            }
        }
        let (pos, priority) = best?;
        Some((self.ready.remove(pos), priority))
    }

    fn running_priority(&self, timer_priority: Priority) -> Priority {
        match self.context {
            Context::Idle => Priority::IDLE,
            Context::Task { priority, .. } => priority,
            Context::TimerService => timer_priority,
            Context::Interrupt { preempted, .. } => preempted,
        }
    }

    fn cancel_sleep(&mut self, id: TaskId) {
        self.sleepers.retain(|sleeper| sleeper.task != Some(id));
    }

    fn take_due(&mut self, now: Tick) -> Vec<Waker> {
        let mut due = Vec::new();
        self.sleepers.retain(|sleeper| {
            if sleeper.at <= now {
                due.push(sleeper.waker.clone());
                false
            } else {
                true
            }
        });
        due
    }
}

pub(crate) struct Shared {
    config: KernelConfig,
    idle_hook: Option<IdleHook>,
    state: Mutex<State>,
    tasks: Mutex<Vec<TaskSlot>>,
    timers: TimerService,
    running: AtomicBool,
}

struct TaskWaker {
    id: TaskId,
    shared: Weak<Shared>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Some(shared) = arc_self.shared.upgrade() {
            shared.state.lock().make_ready(arc_self.id);
        }
    }
}

/// Restores the previous execution context when dropped.
pub(crate) struct ContextGuard<'a> {
    kernel: &'a Kernel,
    previous: Context,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.kernel.shared.state.lock().context = self.previous;
    }
}

struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, KernelError> {
        if flag.swap(true, Ordering::AcqRel) {
            Err(KernelError::AlreadyRunning)
        } else {
            Ok(Self(flag))
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the scheduler. Clones share the same kernel.
#[derive(Clone)]
pub struct Kernel {
    shared: Arc<Shared>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.shared.config.name)
            .field("tick", &self.tick_count())
            .finish_non_exhaustive()
    }
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// Returns the kernel configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.shared.config
    }

    /// Creates a task. It becomes ready immediately and first runs at the
    /// next dispatch.
    pub fn spawn<F>(
        &self,
        name: &'static str,
        priority: Priority,
        body: F,
    ) -> Result<TaskId, KernelError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let max = self.shared.config.max_priorities;
        if priority.0 >= max {
            return Err(KernelError::InvalidPriority {
                priority: priority.0,
                max,
            });
        }

        let mut tasks = self.shared.tasks.lock();
        let id = TaskId(tasks.len());
        let waker = waker(Arc::new(TaskWaker {
            id,
            shared: Arc::downgrade(&self.shared),
        }));
        tasks.push(TaskSlot {
            name,
            body: Some(Box::pin(body)),
            waker,
            finished: false,
        });

        let mut state = self.shared.state.lock();
        state.priorities.push(priority);
        state.make_ready(id);
        drop(state);
        drop(tasks);

        log::debug!("spawned task '{name}' ({id:?}) at priority {priority}");
        Ok(id)
    }

    pub fn tick_count(&self) -> Tick {
        self.shared.state.lock().tick
    }

    pub fn ms_to_ticks(&self, ms: u64) -> Tick {
        self.shared.config.ms_to_ticks(ms)
    }

    pub fn context(&self) -> Context {
        self.shared.state.lock().context
    }

    pub fn current_task(&self) -> Option<TaskId> {
        match self.context() {
            Context::Task { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Priority a woken task must exceed to warrant a reschedule.
    pub fn running_priority(&self) -> Priority {
        let timer_priority = self.shared.config.timer_priority();
        self.shared.state.lock().running_priority(timer_priority)
    }

    pub fn task_count(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    pub fn task_name(&self, id: TaskId) -> Option<&'static str> {
        self.shared.tasks.lock().get(id.0).map(|slot| slot.name)
    }

    pub fn is_finished(&self, id: TaskId) -> bool {
        self.shared
            .tasks
            .lock()
            .get(id.0)
            .map_or(false, |slot| slot.finished)
    }

    /// Suspends the calling task for `ticks`. Zero yields to equal or higher
    /// priority tasks instead.
    pub async fn delay(&self, ticks: Tick) {
        if ticks == 0 {
            self.yield_now().await;
        } else {
            let until = self.tick_count().saturating_add(ticks);
            self.sleep_until(until).await;
        }
    }

    /// Suspends until `*last_wake + period`, then advances `last_wake` by
    /// exactly one period. Returns at once if that instant already passed.
    pub async fn delay_until(&self, last_wake: &mut Tick, period: Tick) {
        let next = last_wake.saturating_add(period);
        *last_wake = next;
        if next > self.tick_count() {
            self.sleep_until(next).await;
        }
    }

    /// Moves the calling task to the back of the ready list.
    pub async fn yield_now(&self) {
        let mut yielded = false;
        poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await
    }

    async fn sleep_until(&self, until: Tick) {
        poll_fn(|cx| {
            let mut state = self.shared.state.lock();
            if state.tick >= until {
                Poll::Ready(())
            } else {
                push_sleeper(&mut state, until, cx.waker());
                Poll::Pending
            }
        })
        .await
    }

    pub fn run_for(&self, ticks: Tick) -> Result<(), KernelError> {
        let end = self.tick_count().saturating_add(ticks);
        self.run_until(end)
    }

    /// Runs tasks, timers and virtual time until the tick count reaches `end`.
    pub fn run_until(&self, end: Tick) -> Result<(), KernelError> {
        if self.context() != Context::Idle {
            return Err(KernelError::AlreadyRunning);
        }
        let _running = RunGuard::acquire(&self.shared.running)?;
        let budget = self.shared.config.polls_per_tick;
        log::debug!(
            "kernel '{}' running from tick {} to {end}",
            self.shared.config.name,
            self.tick_count()
        );

        loop {
            let mut polls = 0;
            while polls < budget && self.dispatch_once() {
                polls += 1;
            }

            let now = self.tick_count();
            if now >= end {
                break;
            }

            let next = if polls >= budget {
                now + 1
            } else {
                if let Some(hook) = &self.shared.idle_hook {
                    hook();
                }
                self.next_event().map_or(end, |at| at.min(end)).max(now + 1)
            };
            self.advance_to(next);
        }
        Ok(())
    }

    /// Dispatches ready tasks without advancing time.
    pub fn run_until_idle(&self) {
        while self.dispatch_once() {}
    }

    /// Polls the highest-priority ready task once.
    ///
    /// Returns `false` when nothing was ready, or when called from inside a
    /// task, timer callback or interrupt handler.
    pub fn dispatch_once(&self) -> bool {
        let next = {
            let mut state = self.shared.state.lock();
            if state.context != Context::Idle {
                return false;
            }
            state.next_ready()
        };
        let Some((id, priority)) = next else {
            return false;
        };

        let (body, waker, name) = {
            let mut tasks = self.shared.tasks.lock();
            match tasks.get_mut(id.0) {
                Some(slot) => (slot.body.take(), slot.waker.clone(), slot.name),
                None => return true,
            }
        };
        let Some(mut body) = body else {
            return true;
        };

        let poll = {
            let _context = self.enter(Context::Task { id, priority });
            body.as_mut().poll(&mut PollContext::from_waker(&waker))
        };

        let completed = {
            let mut tasks = self.shared.tasks.lock();
            match (tasks.get_mut(id.0), poll) {
                (Some(slot), Poll::Ready(())) => {
                    slot.finished = true;
                    true
                }
                (Some(slot), Poll::Pending) if !slot.finished => {
                    slot.body = Some(body);
                    false
                }
                _ => false,
            }
        };
        if completed {
            log::debug!("task '{name}' finished");
        }
        true
    }

    /// Drops every task body and timer. Primitives stay usable but nothing
    /// runs any more.
    pub fn shutdown(&self) {
        let bodies: Vec<TaskBody> = {
            let mut tasks = self.shared.tasks.lock();
            tasks
                .iter_mut()
                .filter_map(|slot| {
                    slot.finished = true;
                    slot.body.take()
                })
                .collect()
        };
        {
            let mut state = self.shared.state.lock();
            state.ready.clear();
            state.sleepers.clear();
        }
        self.shared.timers.clear();
        log::debug!(
            "kernel '{}' shut down, dropped {} task bodies",
            self.shared.config.name,
            bodies.len()
        );
        drop(bodies);
    }

    fn next_event(&self) -> Option<Tick> {
        let sleeper = {
            let state = self.shared.state.lock();
            state.sleepers.iter().map(|sleeper| sleeper.at).min()
        };
        match (sleeper, self.shared.timers.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn advance_to(&self, tick: Tick) {
        let due = {
            let mut state = self.shared.state.lock();
            state.tick = tick;
            state.take_due(tick)
        };
        for waker in due {
            waker.wake();
        }

        let _context = self.enter(Context::TimerService);
        self.shared.timers.fire_due(tick);
    }
}

fn push_sleeper(state: &mut State, at: Tick, waker: &Waker) {
    let task = match state.context {
        Context::Task { id, .. } => Some(id),
        _ => None,
    };
    let known = state.sleepers.iter().any(|sleeper| {
        sleeper.at == at && sleeper.task == task && sleeper.waker.will_wake(waker)
    });
    if !known {
        state.sleepers.push(Sleeper {
            at,
            task,
            waker: waker.clone(),
        });
    }
}

// Crate-private plumbing used by the primitives.
impl Kernel {
    pub(crate) fn timers(&self) -> &TimerService {
        &self.shared.timers
    }

    pub(crate) fn enter(&self, context: Context) -> ContextGuard<'_> {
        let previous = mem::replace(&mut self.shared.state.lock().context, context);
        ContextGuard {
            kernel: self,
            previous,
        }
    }

    /// Switches to interrupt context, refusing to nest handlers.
    pub(crate) fn enter_interrupt(
        &self,
        number: InterruptNumber,
    ) -> Result<ContextGuard<'_>, Error> {
        let timer_priority = self.shared.config.timer_priority();
        let mut state = self.shared.state.lock();
        if let Context::Interrupt { number: active, .. } = state.context {
            drop(state);
            return Err(self.violation(ContractViolation::NestedInterrupt {
                active,
                requested: number,
            }));
        }
        let preempted = state.running_priority(timer_priority);
        let previous = mem::replace(&mut state.context, Context::Interrupt { number, preempted });
        Ok(ContextGuard {
            kernel: self,
            previous,
        })
    }

    pub(crate) fn violation(&self, violation: ContractViolation) -> Error {
        log::warn!("{violation}");
        Error::Contract(violation)
    }

    /// Rejects blocking-API calls from contexts that must never suspend.
    pub(crate) fn check_blocking_call(&self, timeout: Timeout) -> Result<(), Error> {
        match self.context() {
            Context::Interrupt { .. } => {
                Err(self.violation(ContractViolation::BlockingInInterrupt))
            }
            Context::TimerService if !timeout.is_immediate() => {
                Err(self.violation(ContractViolation::BlockingInTimerService))
            }
            _ => Ok(()),
        }
    }

    /// Rejects the synchronous forms in task context: they cannot yield to a
    /// task they ready, so tasks must use the awaiting ones.
    pub(crate) fn check_sync_call(&self) -> Result<(), Error> {
        match self.context() {
            Context::Task { .. } => Err(self.violation(ContractViolation::SyncCallInTask)),
            _ => self.check_blocking_call(Timeout::Immediate),
        }
    }

    pub(crate) fn deadline(&self, timeout: Timeout) -> Deadline {
        match timeout {
            Timeout::Immediate | Timeout::Ticks(0) => Deadline::Now,
            Timeout::Ticks(ticks) => Deadline::At(self.tick_count().saturating_add(ticks)),
            Timeout::Forever => Deadline::Never,
        }
    }

    /// Parks the polling task on `list` until it is woken or `deadline`
    /// passes. `Ready` carries the error the blocking call should return.
    pub(crate) fn park(
        &self,
        list: &mut WaitList,
        deadline: Deadline,
        cx: &mut PollContext<'_>,
        unavailable: Error,
    ) -> Poll<Error> {
        let mut state = self.shared.state.lock();
        let (context, now) = (state.context, state.tick);
        let (id, priority) = match context {
            Context::Task { id, priority } => (id, priority),
            _ if deadline == Deadline::Now => return Poll::Ready(unavailable),
            _ => {
                drop(state);
                return Poll::Ready(self.violation(ContractViolation::NoTaskContext));
            }
        };

        match deadline {
            Deadline::Now => {
                list.remove(id);
                state.cancel_sleep(id);
                Poll::Ready(unavailable)
            }
            Deadline::At(at) if now >= at => {
                list.remove(id);
                state.cancel_sleep(id);
                Poll::Ready(Error::Timeout)
            }
            Deadline::At(at) => {
                list.register(id, priority, cx.waker());
                push_sleeper(&mut state, at, cx.waker());
                Poll::Pending
            }
            Deadline::Never => {
                list.register(id, priority, cx.waker());
                Poll::Pending
            }
        }
    }

    /// Drops the calling task's registration and pending timeout after the
    /// wait completed.
    pub(crate) fn release(&self, list: &mut WaitList) {
        if let Some(id) = self.current_task() {
            list.remove(id);
            self.shared.state.lock().cancel_sleep(id);
        }
    }

    /// Wakes the best waiter on `list`; `true` when it outranks the running
    /// context.
    pub(crate) fn wake_one(&self, list: &mut WaitList) -> bool {
        match list.wake_highest() {
            Some(priority) => {
                let running = self.running_priority();
                log::trace!("woke waiter at priority {priority} (running {running})");
                priority > running
            }
            None => false,
        }
    }

    /// Yield point after a task-context operation readied a higher-priority
    /// task.
    pub(crate) async fn preempt_if(&self, woken: bool) {
        if woken {
            self.yield_now().await;
        }
    }
}
