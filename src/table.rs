use super::{
    errors::{PoolError, PoolResult, TaskError},
    model::TaskId,
};
use std::{
    collections::HashMap,
    pin::pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::warn;


pub(crate) type Outcome<T> = Result<T, TaskError>;


/// Состояние одной задачи: done-сигнал и результат, который записывается ровно один раз
pub(crate) struct TaskSlot<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    done: AtomicBool,
    cond: Condvar,
    notify: Notify,
}

impl<T> TaskSlot<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: AtomicBool::new(false),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    #[inline]
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn complete(&self, outcome: Outcome<T>) -> bool {
        {
            let mut cell = self.outcome.lock();
            if self.is_done() {
                return false;
            }
            *cell = Some(outcome);
            self.done.store(true, Ordering::Release);
        }
        self.cond.notify_all();
        self.notify.notify_waiters();
        true
    }

    fn wait(&self) {
        let mut cell = self.outcome.lock();
        while !self.is_done() {
            self.cond.wait(&mut cell);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cell = self.outcome.lock();
        while !self.is_done() {
            if self.cond.wait_until(&mut cell, deadline).timed_out() {
                return self.is_done();
            }
        }
        true
    }

    async fn wait_async(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    fn take_outcome(&self) -> Option<Outcome<T>> {
        self.outcome.lock().take()
    }
}


/// Общая таблица результатов: id задачи -> состояние
///
/// Запись создается при `submit`, завершается воркером и удаляется
/// первым успешным `take`. Отсутствующий id означает "никогда не было"
/// или "уже забрали", оба случая дают `UnknownTask`.
pub(crate) struct ResultTable<T> {
    slots: Mutex<HashMap<TaskId, Arc<TaskSlot<T>>>>,
    outstanding: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cond: Condvar,
    idle_notify: Notify,
}

impl<T> ResultTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            outstanding: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle_cond: Condvar::new(),
            idle_notify: Notify::new(),
        }
    }

    pub fn register(&self, id: TaskId) {
        let prev = self.slots.lock().insert(id, Arc::new(TaskSlot::new()));
        debug_assert!(prev.is_none(), "task id {id} registered twice");
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Откат регистрации, если задачу не удалось поставить в очередь.
    pub fn discard(&self, id: TaskId) {
        if self.slots.lock().remove(&id).is_some() {
            self.release_outstanding();
        }
    }

    pub fn complete(&self, id: TaskId, outcome: Outcome<T>) -> bool {
        let slot = self.slots.lock().get(&id).cloned();
        let Some(slot) = slot else {
            warn!(%id, "completion for unknown task ignored");
            return false;
        };
        if !slot.complete(outcome) {
            warn!(%id, "task already completed, second outcome ignored");
            return false;
        }
        self.release_outstanding();
        true
    }

    fn release_outstanding(&self) {
        let left = self.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        // Остановка с воркера пула ждет остатка 1: собственной задачи
        if left <= 1 {
            let _guard = self.idle_lock.lock();
            self.idle_cond.notify_all();
            if left == 0 {
                self.idle_notify.notify_waiters();
            }
        }
    }

    fn slot(&self, id: TaskId) -> PoolResult<Arc<TaskSlot<T>>> {
        self.slots
            .lock()
            .get(&id)
            .cloned()
            .ok_or(PoolError::UnknownTask(id))
    }

    pub fn peek_done(&self, id: TaskId) -> PoolResult<bool> {
        self.slot(id).map(|slot| slot.is_done())
    }

    pub fn take(&self, id: TaskId) -> PoolResult<T> {
        let slot = self.slot(id)?;
        slot.wait();
        self.claim(id)
    }

    pub fn take_timeout(&self, id: TaskId, timeout: Duration) -> PoolResult<T> {
        let slot = self.slot(id)?;
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                if !slot.wait_until(deadline) {
                    return Err(PoolError::Timeout(id));
                }
            }
            None => slot.wait(),
        }
        self.claim(id)
    }

    pub async fn take_async(&self, id: TaskId) -> PoolResult<T> {
        let slot = self.slot(id)?;
        slot.wait_async().await;
        self.claim(id)
    }

    fn claim(&self, id: TaskId) -> PoolResult<T> {
        let removed = self.slots.lock().remove(&id);
        let slot = removed.ok_or(PoolError::UnknownTask(id))?;
        match slot.take_outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(TaskError::Cancelled)) => Err(PoolError::Cancelled(id)),
            Some(Err(source)) => Err(PoolError::TaskFailed { id, source }),
            None => Err(PoolError::UnknownTask(id)),
        }
    }

    /// Принятые, но еще не завершенные задачи.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Записи, которые еще никто не забрал (включая незавершенные).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        self.wait_outstanding(0, timeout)
    }

    /// Ждет, пока незавершенных задач останется не больше `at_most`.
    pub fn wait_outstanding(&self, at_most: usize, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut guard = self.idle_lock.lock();
        while self.outstanding() > at_most {
            match deadline {
                Some(deadline) => {
                    if self.idle_cond.wait_until(&mut guard, deadline).timed_out() {
                        return self.outstanding() <= at_most;
                    }
                }
                None => self.idle_cond.wait(&mut guard),
            }
        }
        true
    }

    pub async fn wait_idle_async(&self) {
        loop {
            let mut notified = pin!(self.idle_notify.notified());
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}
