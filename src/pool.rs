use super::{
    errors::{BoxError, PoolError, PoolResult, TaskError},
    handle::TaskHandle,
    model::{
        Counters,
        PoolMetrics,
        ShutdownReport,
        TaskId,
        TaskRecord,
    },
    table::ResultTable,
    worker::{
        StopSignals,
        Worker,
        WorkerHandle,
    },
};
use std::{
    env,
    fmt::Display,
    str::FromStr,
    sync::Arc,
    thread,
    time::Duration,
};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};


pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
pub const DEFAULT_THREAD_NAME: &str = "task-pool";

pub const ENV_WORKERS: &str = "TASK_POOL_WORKERS";
pub const ENV_MAX_PENDING: &str = "TASK_POOL_MAX_PENDING";
pub const ENV_POLL_MS: &str = "TASK_POOL_POLL_MS";
pub const ENV_GRACE_MS: &str = "TASK_POOL_GRACE_MS";
pub const ENV_DRAIN_MS: &str = "TASK_POOL_DRAIN_MS";
pub const ENV_THREAD_NAME: &str = "TASK_POOL_THREAD_NAME";


/// Конфигурация пула воркеров
#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: usize,
    /// `None`: неограниченная очередь
    pub max_pending: Option<usize>,
    /// Сколько воркер ждет задачу перед повторной проверкой сигнала остановки
    pub poll_interval: Duration,
    /// Сколько ждать выхода каждого воркера при остановке.
    /// Должно быть больше `poll_interval`, иначе простаивающий воркер
    /// не успеет увидеть сигнал остановки.
    pub shutdown_grace: Duration,
    /// `None`: `shutdown` ждет завершения всех принятых задач
    pub drain_timeout: Option<Duration>,
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get() + 1,
            max_pending: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            drain_timeout: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_workers: num_cpus,
            max_pending: Some(num_cpus * 64),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self::new(num_cpus::get() * 2)
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.num_workers < 1 {
            return Err(PoolError::InvalidConfiguration(format!(
                "worker count must be at least 1, got {}",
                self.num_workers
            )));
        }
        if self.max_pending == Some(0) {
            return Err(PoolError::InvalidConfiguration(
                "max_pending must be positive".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "poll_interval must be positive".into(),
            ));
        }
        if self.poll_interval >= self.shutdown_grace {
            return Err(PoolError::InvalidConfiguration(format!(
                "shutdown_grace ({:?}) must exceed poll_interval ({:?})",
                self.shutdown_grace, self.poll_interval
            )));
        }
        if self.thread_name.contains('\0') {
            return Err(PoolError::InvalidConfiguration(
                "thread_name must not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }

    /// Конфигурация из переменных окружения `TASK_POOL_*`, остальное по умолчанию
    pub fn from_env() -> PoolResult<Self> {
        let mut config = Self::default();
        if let Some(workers) = env_parse::<usize>(ENV_WORKERS)? {
            config.num_workers = workers;
        }
        if let Some(max_pending) = env_parse::<usize>(ENV_MAX_PENDING)? {
            config.max_pending = Some(max_pending);
        }
        if let Some(ms) = env_parse::<u64>(ENV_POLL_MS)? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(ENV_GRACE_MS)? {
            config.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(ENV_DRAIN_MS)? {
            config.drain_timeout = Some(Duration::from_millis(ms));
        }
        if let Ok(name) = env::var(ENV_THREAD_NAME) {
            config.thread_name = name;
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<V>(key: &str) -> PoolResult<Option<V>>
where
    V: FromStr,
    V::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<V>()
            .map(Some)
            .map_err(|e| PoolError::InvalidConfiguration(format!("{key}={raw:?}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(PoolError::InvalidConfiguration(format!("{key}: {e}"))),
    }
}


/// Пул воркеров фиксированного размера
///
/// Задачи попадают в общую FIFO-очередь, результат лежит в общей таблице,
/// пока его не заберут (ровно один раз). `Drop` вызывает `shutdown`.
pub struct WorkerPool<T> {
    queue_tx: Sender<TaskRecord<T>>,
    queue_rx: Receiver<TaskRecord<T>>,
    table: Arc<ResultTable<T>>,
    workers: Mutex<Vec<WorkerHandle>>,
    // Держится на чтение на время submit, на запись при закрытии
    closed: RwLock<bool>,
    signals: StopSignals,
    counters: Arc<Counters>,
    config: Config,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(num_workers: usize) -> PoolResult<Self> {
        Self::with_config(Config::new(num_workers))
    }

    pub fn from_env() -> PoolResult<Self> {
        Self::with_config(Config::from_env()?)
    }

    pub fn with_config(config: Config) -> PoolResult<Self> {
        config.validate()?;

        let (queue_tx, queue_rx) = match config.max_pending {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let table = Arc::new(ResultTable::new());
        let signals = StopSignals::new();
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.num_workers);
        for index in 0..config.num_workers {
            let spawned = Worker::spawn(
                index,
                format!("{}-{}", config.thread_name, index),
                queue_rx.clone(),
                table.clone(),
                signals.clone(),
                counters.clone(),
                config.poll_interval,
            );
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    warn!(worker = index, error = %err, "failed to spawn worker, stopping started ones");
                    signals.abort.cancel();
                    for handle in workers {
                        handle.join(config.shutdown_grace);
                    }
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        info!(
            workers = config.num_workers,
            max_pending = ?config.max_pending,
            "worker pool started"
        );

        Ok(Self {
            queue_tx,
            queue_rx,
            table,
            workers: Mutex::new(workers),
            closed: RwLock::new(false),
            signals,
            counters,
            config,
        })
    }

    /// Создает пул, выполняет `f` и останавливает пул.
    /// При панике в `f` пул останавливается через `Drop`.
    pub fn scoped<R, F>(config: Config, f: F) -> PoolResult<R>
    where
        F: FnOnce(&WorkerPool<T>) -> R,
    {
        let pool = Self::with_config(config)?;
        let out = f(&pool);
        pool.shutdown();
        Ok(out)
    }

    /// Ставит задачу в очередь и сразу возвращает ее id.
    pub fn submit<F, E>(&self, f: F) -> PoolResult<TaskId>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.enqueue(|id| TaskRecord::new(id, f))
    }

    /// То же, что `submit`, но аргументы передаются отдельно:
    /// кортеж для позиционных, структура для именованных.
    pub fn submit_with<A, F, E>(&self, f: F, args: A) -> PoolResult<TaskId>
    where
        A: Send + 'static,
        F: FnOnce(A) -> Result<T, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.enqueue(|id| TaskRecord::with_args(id, f, args))
    }

    pub fn spawn<F, E>(&self, f: F) -> PoolResult<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let id = self.submit(f)?;
        Ok(TaskHandle::new(id, self.table.clone()))
    }

    fn enqueue<M>(&self, make_record: M) -> PoolResult<TaskId>
    where
        M: FnOnce(TaskId) -> TaskRecord<T>,
    {
        let closed = self.closed.read();
        if *closed {
            return Err(PoolError::PoolClosed);
        }

        let id = TaskId::generate();
        self.table.register(id);
        match self.queue_tx.try_send(make_record(id)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.table.discard(id);
                return Err(PoolError::QueueFull);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.table.discard(id);
                return Err(PoolError::PoolClosed);
            }
        }
        drop(closed);

        Counters::inc(&self.counters.submitted);
        trace!(%id, "task submitted");
        Ok(id)
    }

    #[inline]
    pub fn is_done(&self, id: TaskId) -> PoolResult<bool> {
        self.table.peek_done(id)
    }

    /// Блокирует поток до завершения задачи и забирает результат.
    pub fn result_of(&self, id: TaskId) -> PoolResult<T> {
        self.table.take(id)
    }

    /// При таймауте результат не теряется, его можно запросить снова.
    pub fn result_of_timeout(&self, id: TaskId, timeout: Duration) -> PoolResult<T> {
        self.table.take_timeout(id, timeout)
    }

    pub async fn result_of_async(&self, id: TaskId) -> PoolResult<T> {
        self.table.take_async(id).await
    }

    /// Забирает результаты в порядке завершения, а не в порядке id.
    pub async fn results_unordered<I>(&self, ids: I) -> Vec<(TaskId, PoolResult<T>)>
    where
        I: IntoIterator<Item = TaskId>,
    {
        let table = &self.table;
        let mut pending: FuturesUnordered<_> = ids
            .into_iter()
            .map(move |id| async move { (id, table.take_async(id).await) })
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        results
    }

    /// Ждет, пока все принятые задачи не завершатся.
    pub fn wait_idle(&self) {
        self.table.wait_idle(None);
    }

    pub async fn join_all(&self) {
        self.table.wait_idle_async().await;
    }
}

impl<T> WorkerPool<T> {
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.config.num_workers
    }

    #[inline]
    pub fn live_workers(&self) -> usize {
        Counters::get(&self.counters.live_workers)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> PoolMetrics {
        let pending_tasks = self.table.outstanding();
        PoolMetrics {
            workers: self.config.num_workers,
            live_workers: Counters::get(&self.counters.live_workers),
            busy_workers: Counters::get(&self.counters.busy_workers),
            queued_tasks: self.queue_rx.len(),
            pending_tasks,
            unclaimed_results: self.table.len().saturating_sub(pending_tasks),
            total_submitted: Counters::get(&self.counters.submitted),
            completed_tasks: Counters::get(&self.counters.completed),
            failed_tasks: Counters::get(&self.counters.failed),
            cancelled_tasks: Counters::get(&self.counters.cancelled),
        }
    }

    /// Закрывает пул для новых задач, дожидается принятых и останавливает воркеров.
    /// Повторный вызов ничего не делает. Готовые результаты остаются доступны.
    pub fn shutdown(&self) {
        self.stop(true);
    }

    /// Останавливает пул без ожидания очереди: задачи, которые еще не начались,
    /// завершаются как `Cancelled`.
    pub fn shutdown_now(&self) -> ShutdownReport {
        self.stop(false)
    }

    fn stop(&self, drain: bool) -> ShutdownReport {
        // Конкурентные вызовы ждут здесь, пока первый не закончит
        let mut workers = self.workers.lock();
        *self.closed.write() = true;
        if workers.is_empty() {
            return ShutdownReport {
                drained: self.table.outstanding() == 0,
                ..Default::default()
            };
        }

        // Пул может быть остановлен из собственной задачи (например, задача
        // держала последний Arc). Эта задача еще не завершена, и свой поток
        // присоединить нельзя.
        let current = thread::current().id();
        let own_worker = workers.iter().position(|h| h.thread_id() == current);
        let own_tasks = usize::from(own_worker.is_some());

        info!(
            drain,
            outstanding = self.table.outstanding(),
            from_worker = own_worker.is_some(),
            "shutting down worker pool"
        );

        let drained = if drain {
            let drained = self
                .table
                .wait_outstanding(own_tasks, self.config.drain_timeout);
            if !drained {
                warn!(
                    outstanding = self.table.outstanding(),
                    timeout = ?self.config.drain_timeout,
                    "drain timed out, aborting remaining work"
                );
            }
            drained
        } else {
            self.table.outstanding() <= own_tasks
        };

        if drain && drained {
            self.signals.terminate.cancel();
        } else {
            self.signals.abort.cancel();
        }

        let mut detached_workers = 0;
        for (index, handle) in workers.drain(..).enumerate() {
            if Some(index) == own_worker {
                debug!(worker = index, "stopping from own worker, leaving its thread to exit after the task");
                continue;
            }
            if !handle.join(self.config.shutdown_grace) {
                detached_workers += 1;
            }
        }
        if detached_workers > 0 {
            self.signals.abort.cancel();
        }

        let report = ShutdownReport {
            drained,
            cancelled_tasks: self.cancel_queued(),
            detached_workers,
        };
        info!(?report, "worker pool stopped");
        report
    }

    fn cancel_queued(&self) -> usize {
        let mut cancelled = 0;
        for record in self.queue_rx.try_iter() {
            if self.table.complete(record.id(), Err(TaskError::Cancelled)) {
                Counters::inc(&self.counters.cancelled);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            warn!(cancelled, "queued tasks cancelled on shutdown");
        }
        cancelled
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop(true);
    }
}
