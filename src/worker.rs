use super::{
    errors::TaskError,
    model::{Counters, TaskRecord},
    table::{Outcome, ResultTable},
};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};


/// Сигналы остановки воркеров.
///
/// `terminate`: мягкая остановка, воркер выходит, когда очередь пуста.
/// `abort`: жесткая, воркер выходит перед следующим dequeue.
/// `terminate` является дочерним токеном `abort`.
#[derive(Debug, Clone)]
pub(crate) struct StopSignals {
    pub terminate: CancellationToken,
    pub abort: CancellationToken,
}

impl StopSignals {
    pub fn new() -> Self {
        let abort = CancellationToken::new();
        Self {
            terminate: abort.child_token(),
            abort,
        }
    }
}


pub(crate) struct Worker<T> {
    index: usize,
    queue: Receiver<TaskRecord<T>>,
    table: Arc<ResultTable<T>>,
    signals: StopSignals,
    counters: Arc<Counters>,
    poll_interval: Duration,
    // Закрывается при выходе из цикла, контроллер видит Disconnected
    _exit: Sender<()>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn(
        index: usize,
        name: String,
        queue: Receiver<TaskRecord<T>>,
        table: Arc<ResultTable<T>>,
        signals: StopSignals,
        counters: Arc<Counters>,
        poll_interval: Duration,
    ) -> io::Result<WorkerHandle> {
        let (exit_tx, exit_rx) = channel::bounded(0);
        Counters::inc(&counters.live_workers);

        let worker = Worker {
            index,
            queue,
            table,
            signals,
            counters,
            poll_interval,
            _exit: exit_tx,
        };

        // Если spawn упадет, замыкание с воркером дропнется и счетчик вернется назад
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())?;

        Ok(WorkerHandle {
            index,
            thread,
            exited: exit_rx,
        })
    }

    fn run(self) {
        debug!(worker = self.index, "worker started");
        loop {
            if self.signals.abort.is_cancelled() {
                break;
            }
            match self.queue.recv_timeout(self.poll_interval) {
                Ok(record) => self.execute(record),
                Err(RecvTimeoutError::Timeout) => {
                    if self.signals.terminate.is_cancelled() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = self.index, "worker stopped");
    }

    fn execute(&self, record: TaskRecord<T>) {
        let (id, job) = record.into_parts();
        Counters::inc(&self.counters.busy_workers);
        let started = Instant::now();

        let outcome: Outcome<T> = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                debug!(worker = self.index, %id, error = %err, "task returned an error");
                Err(TaskError::Failed(err))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(worker = self.index, %id, panic = %message, "task panicked");
                Err(TaskError::Panicked(message))
            }
        };

        if outcome.is_ok() {
            Counters::inc(&self.counters.completed);
        } else {
            Counters::inc(&self.counters.failed);
        }
        Counters::dec(&self.counters.busy_workers);

        self.table.complete(id, outcome);
        debug!(worker = self.index, %id, elapsed = ?started.elapsed(), "task finished");
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        Counters::dec(&self.counters.live_workers);
    }
}


fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}


/// Сторона контроллера: поток воркера и сигнал его выхода
pub(crate) struct WorkerHandle {
    index: usize,
    thread: thread::JoinHandle<()>,
    exited: Receiver<()>,
}

impl WorkerHandle {
    pub fn thread_id(&self) -> thread::ThreadId {
        self.thread.thread().id()
    }

    /// Ждет выхода воркера не дольше `grace`.
    ///
    /// Поток нельзя убить, поэтому опоздавший воркер отсоединяется. Контроллер
    /// выставляет `abort`, и воркер выходит сам после текущей задачи.
    pub fn join(self, grace: Duration) -> bool {
        match self.exited.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(worker = self.index, ?grace, "worker did not stop within grace period, detaching");
                false
            }
            _ => {
                if self.thread.join().is_err() {
                    warn!(worker = self.index, "worker thread panicked");
                }
                true
            }
        }
    }
}
