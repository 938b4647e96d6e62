//! Пул воркеров фиксированного размера с общей очередью и таблицей результатов
//!
//! # Features
//! - FIFO-очередь задач, общая для всех воркеров (bounded или unbounded)
//! - Неблокирующий submit, результат забирается ровно один раз
//! - Ошибки и паники задач не роняют воркеров, а возвращаются вызывающему
//! - Graceful shutdown с drain, grace period и отсоединением зависших воркеров
//! - Блокирующий, таймаутный и async доступ к результатам
//! - Метрики пула

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
mod table;
mod worker;

pub use errors::{BoxError, PoolError, PoolResult, TaskError};
pub use handle::TaskHandle;
pub use model::{PoolMetrics, ShutdownReport, TaskId};
pub use pool::{Config, WorkerPool};
