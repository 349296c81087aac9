use crate::admission::AdmissionQueue;
use crate::connection::Connection;
use crate::context::ServerContext;
use crate::worker::WorkerPool;
use crate::NumlogError;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// What a completed shutdown observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub interrupted_reads: usize,
    pub unserved_connections: usize,
    pub stragglers: usize,
    pub unique_total: usize,
}

/// Drains the server: stop flag, cancel, join handlers, flush the number log.
pub struct ShutdownCoordinator<C> {
    context: Arc<ServerContext>,
    queue: Arc<AdmissionQueue<C>>,
    workers: Mutex<Option<WorkerPool>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
    join_timeout: Duration,
}

impl<C: Connection> ShutdownCoordinator<C> {
    pub fn new(
        context: Arc<ServerContext>,
        queue: Arc<AdmissionQueue<C>>,
        workers: WorkerPool,
        reporter: Option<JoinHandle<()>>,
        join_timeout: Duration,
    ) -> Self {
        ShutdownCoordinator {
            context,
            queue,
            workers: Mutex::new(Some(workers)),
            reporter: Mutex::new(reporter),
            join_timeout,
        }
    }

    /// Run the shutdown sequence. Only the first call does anything; later calls return
    /// `Ok(None)`.
    pub fn shutdown(&self) -> Result<Option<ShutdownSummary>, NumlogError> {
        if !self.context.stop() {
            return Ok(None);
        }
        info!("Stopping ...");

        let interrupted_reads = self.context.cancel_all();

        // Admitted but never picked up: close them so clients see a drop, not silence.
        let unserved = self.queue.drain();
        let unserved_connections = unserved.len();
        for connection in unserved {
            connection.close();
        }

        let stragglers = match self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            Some(pool) => pool.join_timeout(self.join_timeout),
            None => 0,
        };
        if stragglers > 0 {
            warn!(stragglers, "handlers still running after {:?}", self.join_timeout);
        }

        if let Some(reporter) = self
            .reporter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            if reporter.join().is_err() {
                warn!("reporter thread panicked");
            }
        }

        self.context.sink().flush()?;
        self.context.sink().close()?;

        let (unique, duplicates) = self.context.counters().lifetime();
        let summary = ShutdownSummary {
            interrupted_reads,
            unserved_connections,
            stragglers,
            unique_total: self.context.store().len(),
        };
        info!(
            unique,
            duplicates,
            unique_total = summary.unique_total,
            interrupted_reads,
            unserved_connections,
            "stopped"
        );
        Ok(Some(summary))
    }
}
