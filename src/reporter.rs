use crate::cancel::CancelToken;
use crate::context::ServerContext;
use crate::stats::Report;
use crate::NumlogError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Periodic throughput summary. Reads counters and store size only; never takes a lock a
/// worker holds across I/O.
pub struct Reporter {
    context: Arc<ServerContext>,
    interval: Duration,
    cancel: CancelToken,
}

impl Reporter {
    pub fn new(context: Arc<ServerContext>, interval: Duration) -> Self {
        let cancel = context.cancel_token();
        Reporter {
            context,
            interval,
            cancel,
        }
    }

    pub fn tick(&self) -> Report {
        self.context.report()
    }

    /// Emit one report per interval until cancelled. A cancel that lands mid-sleep ends the
    /// loop without a final partial report.
    pub fn run<F: FnMut(Report)>(&self, mut emit: F) {
        while !self.cancel.wait_timeout(self.interval) {
            emit(self.tick());
        }
    }

    /// Run on a dedicated `reporter` thread, printing each report to stdout.
    pub fn spawn(self) -> Result<JoinHandle<()>, NumlogError> {
        let handle = std::thread::Builder::new()
            .name("reporter".to_string())
            .spawn(move || {
                self.run(|report| println!("{}", report));
                tracing::debug!("reporter stopped");
            })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    fn context() -> Arc<ServerContext> {
        Arc::new(ServerContext::new(Arc::new(MemorySink::new())))
    }

    #[test]
    fn seven_unique_three_duplicates() {
        let context = context();
        for i in 0..7 {
            context.save(format!("{:09}", i).parse().unwrap()).unwrap();
        }
        for i in 0..3 {
            context.save(format!("{:09}", i).parse().unwrap()).unwrap();
        }

        let reporter = Reporter::new(Arc::clone(&context), Duration::from_secs(10));
        assert_eq!(
            reporter.tick(),
            Report {
                unique: 7,
                duplicates: 3,
                unique_total: 7
            }
        );
        assert_eq!(context.counters().peek(), (0, 0));
    }

    #[test]
    fn emits_each_interval_until_cancelled() {
        let context = context();
        let reporter = Reporter::new(Arc::clone(&context), Duration::from_millis(10));
        let (tx, rx) = unbounded();
        let handle = std::thread::spawn(move || reporter.run(|r| tx.send(r).unwrap()));

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.unique_total, 0);
        context.cancel_all();
        handle.join().unwrap();
    }

    #[test]
    fn cancel_during_sleep_skips_partial_report() {
        let context = context();
        let reporter = Reporter::new(Arc::clone(&context), Duration::from_secs(60));
        let (tx, rx) = unbounded();
        let start = Instant::now();
        let handle = std::thread::spawn(move || reporter.run(|r| tx.send(r).unwrap()));

        std::thread::sleep(Duration::from_millis(20));
        context.cancel_all();
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(rx.try_recv().is_err());
    }
}
