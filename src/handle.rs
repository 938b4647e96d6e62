use super::{
    errors::{BoxError, PoolResult},
    model::TaskId,
    table::ResultTable,
};
use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    time::Duration,
};


pub type Job<T> = Box<dyn FnOnce() -> Result<T, BoxError> + Send + 'static>;


/// Handle на задачу: тот же id, что вернул бы `submit`, но с типом результата
///
/// Результат можно забрать один раз любым способом: через handle
/// или через `WorkerPool::result_of(handle.id())`.
pub struct TaskHandle<T> {
    id: TaskId,
    table: Arc<ResultTable<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, table: Arc<ResultTable<T>>) -> Self {
        Self { id, table }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn is_done(&self) -> PoolResult<bool> {
        self.table.peek_done(self.id)
    }

    /// Блокирует поток до завершения задачи.
    pub fn join(self) -> PoolResult<T> {
        self.table.take(self.id)
    }

    /// При таймауте результат остается в таблице, handle можно использовать снова.
    pub fn join_timeout(&self, timeout: Duration) -> PoolResult<T> {
        self.table.take_timeout(self.id, timeout)
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

impl<T: Send + 'static> IntoFuture for TaskHandle<T> {
    type Output = PoolResult<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = PoolResult<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.table.take_async(self.id).await })
    }
}
