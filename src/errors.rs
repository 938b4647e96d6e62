use crate::model::TaskId;

/// Ошибка, которую вернула сама задача.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type PoolResult<T> = Result<T, PoolError>;


/// Причина, по которой задача не дала результата
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task returned an error: {0}")]
    Failed(#[source] BoxError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before it started")]
    Cancelled,
}

impl TaskError {
    /// Исходная ошибка задачи, если она вернула `Err`.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TaskError::Failed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}


#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("task {id} failed")]
    TaskFailed {
        id: TaskId,
        #[source]
        source: TaskError,
    },

    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("pool is closed")]
    PoolClosed,

    #[error("work queue is full")]
    QueueFull,

    #[error("timed out waiting for task {0}")]
    Timeout(TaskId),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PoolError {
    #[inline]
    pub fn is_unknown_task(&self) -> bool {
        matches!(self, PoolError::UnknownTask(_))
    }

    /// Ошибка задачи, если запрос упал из-за неё.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            PoolError::TaskFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
