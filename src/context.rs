use crate::cancel::{CancelSource, CancelToken};
use crate::connection::Interrupter;
use crate::dedup_store::DedupStore;
use crate::sink::TokenSink;
use crate::stats::{Report, StatCounters};
use crate::token::Token;
use crate::NumlogError;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unique,
    Duplicate,
}

/// Interrupt handles for connections currently being read, keyed by worker id.
#[derive(Default)]
pub struct ActiveConnections {
    reads: Mutex<FxHashMap<usize, Interrupter>>,
}

impl ActiveConnections {
    fn reads(&self) -> MutexGuard<'_, FxHashMap<usize, Interrupter>> {
        self.reads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, worker: usize, interrupter: Interrupter) {
        self.reads().insert(worker, interrupter);
    }

    pub fn deregister(&self, worker: usize) {
        self.reads().remove(&worker);
    }

    pub fn interrupt_all(&self) -> usize {
        let reads = self.reads();
        for interrupter in reads.values() {
            interrupter.interrupt();
        }
        reads.len()
    }

    pub fn len(&self) -> usize {
        self.reads().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared by the acceptor, every worker, the reporter and the shutdown coordinator.
pub struct ServerContext {
    running: AtomicBool,
    store: DedupStore,
    counters: StatCounters,
    sink: Arc<dyn TokenSink>,
    cancel: CancelSource,
    active: ActiveConnections,
}

impl ServerContext {
    pub fn new(sink: Arc<dyn TokenSink>) -> Self {
        Self::with_store(sink, DedupStore::new())
    }

    pub fn with_store(sink: Arc<dyn TokenSink>, store: DedupStore) -> Self {
        Self {
            running: AtomicBool::new(true),
            store,
            counters: StatCounters::new(),
            sink,
            cancel: CancelSource::new(),
            active: ActiveConnections::default(),
        }
    }

    /// Classify one token: insert-if-absent, count it, and log it if it is new.
    pub fn save(&self, token: Token) -> Result<Outcome, NumlogError> {
        if !self.store.insert(token) {
            self.counters.record_duplicate();
            return Ok(Outcome::Duplicate);
        }
        self.counters.record_unique();
        self.sink.append(token)?;
        Ok(Outcome::Unique)
    }

    /// Sample and reset the interval counters.
    pub fn report(&self) -> Report {
        let (unique, duplicates) = self.counters.take();
        Report {
            unique,
            duplicates,
            unique_total: self.store.len(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip running to false. Returns true only for the caller that flipped it.
    pub fn stop(&self) -> bool {
        self.running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Wake everything blocked on the cancel channel or on a socket read.
    /// Call after `stop` so woken workers observe the flag.
    pub fn cancel_all(&self) -> usize {
        self.cancel.cancel();
        self.active.interrupt_all()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.token()
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn counters(&self) -> &StatCounters {
        &self.counters
    }

    pub fn sink(&self) -> &Arc<dyn TokenSink> {
        &self.sink
    }

    pub fn active(&self) -> &ActiveConnections {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::sync::atomic::AtomicUsize;

    fn token(s: &str) -> Token {
        s.parse().unwrap()
    }

    #[test]
    fn save_scenario_one_connection() {
        let sink = Arc::new(MemorySink::new());
        let context = ServerContext::new(sink.clone());

        assert_eq!(context.save(token("123456789")).unwrap(), Outcome::Unique);
        assert_eq!(context.save(token("123456789")).unwrap(), Outcome::Duplicate);
        assert_eq!(context.save(token("000000001")).unwrap(), Outcome::Unique);

        assert_eq!(context.counters().peek(), (2, 1));
        assert_eq!(sink.tokens(), vec![token("123456789"), token("000000001")]);
    }

    #[test]
    fn report_samples_then_zeroes() {
        let context = ServerContext::new(Arc::new(MemorySink::new()));
        for i in 0..7 {
            context.save(token(&format!("{:09}", i))).unwrap();
        }
        for i in 0..3 {
            context.save(token(&format!("{:09}", i))).unwrap();
        }

        let report = context.report();
        assert_eq!((report.unique, report.duplicates, report.unique_total), (7, 3, 7));
        assert_eq!(context.counters().peek(), (0, 0));
        assert_eq!(context.report().unique_total, 7);
    }

    #[test]
    fn stop_flips_once() {
        let context = ServerContext::new(Arc::new(MemorySink::new()));
        assert!(context.is_running());
        assert!(context.stop());
        assert!(!context.stop());
        assert!(!context.is_running());
    }

    #[test]
    fn cancel_all_interrupts_registered_reads() {
        let context = ServerContext::new(Arc::new(MemorySink::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        for worker in 0..3 {
            let hits = Arc::clone(&hits);
            context.active().register(
                worker,
                Interrupter::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        context.active().deregister(1);

        assert_eq!(context.cancel_all(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(context.cancel_token().is_cancelled());
    }

    #[test]
    fn sink_failure_surfaces_after_counting() {
        let sink = Arc::new(MemorySink::new());
        sink.close().unwrap();
        let context = ServerContext::new(sink);

        assert!(matches!(context.save(token("111111111")), Err(NumlogError::Sink(_))));
        assert!(context.store().contains(&token("111111111")));
    }
}
