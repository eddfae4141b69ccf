// ABOUTME: Priority-ordered, bounded-concurrency task runner with per-task timeouts,
// ABOUTME: exponential backoff retries and broadcast lifecycle events.
use crate::error::{QueueError, Result};
use crate::task::{
    backoff_delay, AgentTask, Priority, SchedulerEvent, SchedulerStats, TaskHandler, TaskId,
    TaskOptions, TaskStatus,
};
use chrono::Utc;
use codescan_core::SchedulerConfig;
use metrics::{counter, gauge, histogram};
use parking_lot::{Mutex, RwLock};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

#[derive(Default)]
struct State {
    /// Equal priorities dispatch in submission order.
    queue: PriorityQueue<TaskId, (Priority, Reverse<u64>)>,
    tasks: HashMap<TaskId, AgentTask>,
    in_flight: usize,
    /// Tasks sleeping out a backoff delay before re-entering the queue.
    backing_off: usize,
    sequence: u64,
    executions: u64,
    execution_ms_total: u64,
}

impl State {
    fn enqueue(&mut self, id: TaskId, priority: Priority) {
        self.sequence += 1;
        self.queue.push(id, (priority, Reverse(self.sequence)));
        gauge!("scheduler_queue_size").set(self.queue.len() as f64);
    }
}

struct Inner {
    config: SchedulerConfig,
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    state: Mutex<State>,
    events: broadcast::Sender<SchedulerEvent>,
    /// Wakes the dispatcher after a submission, completion or stop.
    wake: Notify,
    /// Wakes `wait_for_completion` callers.
    settled: Notify,
    running: AtomicBool,
    stopped: AtomicBool,
}

enum Outcome {
    Completed(serde_json::Value),
    Failed(String),
    Rejected(String),
}

/// Runs registered handlers for submitted tasks, highest priority first,
/// with at most `max_concurrency` executions in flight.
#[derive(Clone)]
pub struct AgentScheduler {
    inner: Arc<Inner>,
}

impl AgentScheduler {
    pub fn new(mut config: SchedulerConfig) -> Self {
        if config.max_concurrency == 0 {
            warn!("max_concurrency of 0 raised to 1");
            config.max_concurrency = 1;
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: RwLock::new(HashMap::new()),
                state: Mutex::new(State::default()),
                events,
                wake: Notify::new(),
                settled: Notify::new(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn register_handler(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        debug!("Registered handler for task type {}", task_type);
        self.inner.handlers.write().insert(task_type, handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    pub fn add_task(
        &self,
        task_type: impl Into<String>,
        input: serde_json::Value,
        options: TaskOptions,
    ) -> Result<TaskId> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }
        let task_type = task_type.into();
        if !self.inner.handlers.read().contains_key(&task_type) {
            return Err(QueueError::UnknownTaskType(task_type));
        }

        let config = &self.inner.config;
        let task = AgentTask::new(
            task_type,
            input,
            options.priority,
            options.max_retries.unwrap_or(config.max_retries),
            options
                .timeout
                .unwrap_or_else(|| Duration::from_millis(config.task_timeout_ms)),
        );
        let id = task.id;
        let priority = task.priority;
        {
            let mut state = self.inner.state.lock();
            state.tasks.insert(id, task);
            state.enqueue(id, priority);
        }
        counter!("tasks_added").increment(1);
        debug!("Task {} added with priority {:?}", id, priority);
        self.inner.wake.notify_one();
        Ok(id)
    }

    /// Changes the priority of a task that is still waiting in the queue.
    pub fn update_priority(&self, id: TaskId, priority: Priority) -> Result<()> {
        let mut state = self.inner.state.lock();
        let Some(task) = state.tasks.get_mut(&id) else {
            return Err(QueueError::TaskNotFound(id));
        };
        if task.status != TaskStatus::Pending {
            return Err(QueueError::NotPending(id));
        }
        task.priority = priority;
        let current = state.queue.get_priority(&id).map(|(_, seq)| *seq);
        match current {
            Some(seq) => {
                state.queue.change_priority(&id, (priority, seq));
                Ok(())
            }
            None => Err(QueueError::NotPending(id)),
        }
    }

    /// Starts dispatching. Calling it while already running has no effect.
    pub fn start(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            max_concurrency = self.inner.config.max_concurrency,
            "Agent scheduler started"
        );
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { Inner::dispatch_loop(inner).await });
    }

    /// Stops dispatching new work. Running tasks finish; queued tasks stay pending.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        if self.inner.running.swap(false, Ordering::SeqCst) {
            info!("Agent scheduler stopped");
        }
        self.inner.wake.notify_one();
        self.inner.settled.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Resolves once nothing is queued, running or backing off. When the
    /// scheduler is not running, queued tasks are ignored.
    pub async fn wait_for_completion(&self) {
        loop {
            let settled = self.inner.settled.notified();
            if self.inner.is_settled() {
                return;
            }
            settled.await;
        }
    }

    pub fn task(&self, id: TaskId) -> Option<AgentTask> {
        self.inner.state.lock().tasks.get(&id).cloned()
    }

    pub fn tasks(&self) -> Vec<AgentTask> {
        let state = self.inner.state.lock();
        let mut tasks: Vec<AgentTask> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock();
        let mut stats = SchedulerStats {
            total: state.tasks.len(),
            ..SchedulerStats::default()
        };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Retrying => stats.retrying += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        if state.executions > 0 {
            stats.average_execution_ms = state.execution_ms_total as f64 / state.executions as f64;
        }
        stats
    }
}

impl Inner {
    fn is_settled(&self) -> bool {
        let state = self.state.lock();
        let idle = state.in_flight == 0 && state.backing_off == 0;
        idle && (state.queue.is_empty() || !self.running.load(Ordering::SeqCst))
    }

    fn emit(&self, event: SchedulerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Pops the next task if a concurrency slot is free and marks it running.
    fn next_task(&self) -> Option<(AgentTask, Arc<dyn TaskHandler>)> {
        let mut state = self.state.lock();
        if state.in_flight >= self.config.max_concurrency {
            return None;
        }
        loop {
            let (id, _) = state.queue.pop()?;
            gauge!("scheduler_queue_size").set(state.queue.len() as f64);

            let Some(task) = state.tasks.get_mut(&id) else {
                continue;
            };
            let handler = self.handlers.read().get(&task.task_type).cloned();
            let Some(handler) = handler else {
                task.status = TaskStatus::Failed;
                task.error = Some(format!(
                    "No handler registered for task type: {}",
                    task.task_type
                ));
                task.completed_at = Some(Utc::now());
                continue;
            };
            task.status = TaskStatus::Running;
            task.attempts += 1;
            task.started_at = Some(Utc::now());
            let snapshot = task.clone();
            state.in_flight += 1;
            return Some((snapshot, handler));
        }
    }

    async fn dispatch_loop(inner: Arc<Inner>) {
        while inner.running.load(Ordering::SeqCst) {
            match inner.next_task() {
                Some((task, handler)) => {
                    let worker = Arc::clone(&inner);
                    tokio::spawn(async move { worker.run_task(task, handler).await });
                }
                None => {
                    inner.settled.notify_waiters();
                    inner.wake.notified().await;
                }
            }
        }
        debug!("Dispatch loop exited");
    }

    async fn run_task(self: Arc<Self>, task: AgentTask, handler: Arc<dyn TaskHandler>) {
        self.emit(SchedulerEvent::TaskStarted {
            id: task.id,
            task_type: task.task_type.clone(),
            attempt: task.attempts,
        });

        let started = Instant::now();
        let outcome = match handler.validate(&task.input) {
            Err(reason) => Outcome::Rejected(format!("Invalid input: {}", reason)),
            Ok(()) => {
                let input = task.input.clone();
                let execution = tokio::spawn(async move { handler.execute(input).await });
                let abort = execution.abort_handle();
                match tokio::time::timeout(task.timeout, execution).await {
                    Ok(Ok(Ok(output))) => Outcome::Completed(output),
                    Ok(Ok(Err(e))) => Outcome::Failed(e.to_string()),
                    Ok(Err(join_error)) => Outcome::Failed(format!("Task panicked: {}", join_error)),
                    Err(_) => {
                        abort.abort();
                        Outcome::Failed(format!(
                            "Task timed out after {} ms",
                            task.timeout.as_millis()
                        ))
                    }
                }
            }
        };
        let elapsed = started.elapsed();
        histogram!("task_execution_time").record(elapsed);

        self.finish(task.id, outcome, elapsed);
        self.wake.notify_one();
        self.settled.notify_waiters();
    }

    fn finish(self: &Arc<Self>, id: TaskId, outcome: Outcome, elapsed: Duration) {
        let execution_ms = elapsed.as_millis() as u64;
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.executions += 1;
        state.execution_ms_total += execution_ms;

        let Some(task) = state.tasks.get_mut(&id) else {
            return;
        };
        task.execution_ms = Some(execution_ms);

        let (error, retryable) = match outcome {
            Outcome::Completed(output) => {
                task.status = TaskStatus::Completed;
                task.output = Some(output);
                task.error = None;
                task.completed_at = Some(Utc::now());
                counter!("tasks_completed").increment(1);
                debug!("Task {} completed in {} ms", id, execution_ms);
                self.emit(SchedulerEvent::TaskCompleted { id, execution_ms });
                return;
            }
            Outcome::Rejected(error) => (error, false),
            Outcome::Failed(error) => (error, true),
        };

        task.error = Some(error.clone());
        if !retryable || !task.can_retry() {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            counter!("tasks_failed").increment(1);
            warn!("Task {} failed after {} attempts: {}", id, task.attempts, error);
            self.emit(SchedulerEvent::TaskFailed { id, error });
            return;
        }

        let attempt = task.attempts;
        let delay = backoff_delay(Duration::from_millis(self.config.base_delay_ms), attempt);
        task.status = TaskStatus::Retrying;
        if self.config.boost_priority_on_retry {
            task.priority = task.priority.boosted();
        }
        let priority = task.priority;
        state.backing_off += 1;
        drop(state);

        counter!("tasks_retried").increment(1);
        warn!(
            "Task {} attempt {} failed, retrying in {} ms: {}",
            id,
            attempt,
            delay.as_millis(),
            error
        );
        self.emit(SchedulerEvent::TaskRetrying {
            id,
            attempt,
            delay_ms: delay.as_millis() as u64,
            error,
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.state.lock();
                state.backing_off = state.backing_off.saturating_sub(1);
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.status = TaskStatus::Pending;
                }
                state.enqueue(id, priority);
            }
            inner.wake.notify_one();
            inner.settled.notify_waiters();
        });
    }
}
