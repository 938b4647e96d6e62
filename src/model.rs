use super::{
    errors::BoxError,
    handle::Job,
};
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use uuid::Uuid;


/// Идентификатор задачи, уникальный в пределах процесса (UUID v7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    #[inline]
    pub(crate) fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    #[inline]
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}


/// Единица работы в очереди: задача вместе с уже привязанными аргументами
pub struct TaskRecord<T> {
    id: TaskId,
    job: Job<T>,
}

impl<T: 'static> TaskRecord<T> {
    pub(crate) fn new<F, E>(id: TaskId, f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            id,
            job: Box::new(move || f().map_err(Into::into)),
        }
    }

    pub(crate) fn with_args<A, F, E>(id: TaskId, f: F, args: A) -> Self
    where
        A: Send + 'static,
        F: FnOnce(A) -> Result<T, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(id, move || f(args))
    }
}

impl<T> TaskRecord<T> {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn into_parts(self) -> (TaskId, Job<T>) {
        (self.id, self.job)
    }
}

impl<T> fmt::Debug for TaskRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord").field("id", &self.id).finish_non_exhaustive()
    }
}


/// Счетчики пула, общие для контроллера и воркеров
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub live_workers: AtomicUsize,
    pub busy_workers: AtomicUsize,
    pub submitted: AtomicUsize,
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl Counters {
    #[inline]
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn inc(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }
}


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub workers: usize,
    pub live_workers: usize,
    pub busy_workers: usize,
    pub queued_tasks: usize,
    pub pending_tasks: usize,
    pub unclaimed_results: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
}

impl PoolMetrics {
    pub fn idle_workers(&self) -> usize {
        self.live_workers.saturating_sub(self.busy_workers)
    }

    pub fn utilization(&self) -> f64 {
        if self.live_workers == 0 {
            return 0.0;
        }
        self.busy_workers as f64 / self.live_workers as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        if self.workers == 0 {
            return self.queued_tasks as f64;
        }
        self.queued_tasks as f64 / self.workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}


/// Итог остановки пула
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Все принятые задачи завершились до остановки воркеров
    pub drained: bool,
    /// Задачи, снятые с очереди без выполнения
    pub cancelled_tasks: usize,
    /// Воркеры, не успевшие выйти за grace period
    pub detached_workers: usize,
}
