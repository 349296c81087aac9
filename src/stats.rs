use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-interval unique/duplicate counters plus lifetime totals that are never reset.
#[derive(Debug, Default)]
pub struct StatCounters {
    unique: AtomicU64,
    duplicate: AtomicU64,
    unique_lifetime: AtomicU64,
    duplicate_lifetime: AtomicU64,
}

impl StatCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unique(&self) {
        self.unique.fetch_add(1, Ordering::AcqRel);
        self.unique_lifetime.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate.fetch_add(1, Ordering::AcqRel);
        self.duplicate_lifetime.fetch_add(1, Ordering::Relaxed);
    }

    /// Read-and-zero both interval counters. Each swap is atomic, so an increment lands in
    /// exactly one sample.
    pub fn take(&self) -> (u64, u64) {
        let unique = self.unique.swap(0, Ordering::AcqRel);
        let duplicate = self.duplicate.swap(0, Ordering::AcqRel);
        (unique, duplicate)
    }

    /// Current interval values without resetting them.
    pub fn peek(&self) -> (u64, u64) {
        (
            self.unique.load(Ordering::Acquire),
            self.duplicate.load(Ordering::Acquire),
        )
    }

    pub fn lifetime(&self) -> (u64, u64) {
        (
            self.unique_lifetime.load(Ordering::Relaxed),
            self.duplicate_lifetime.load(Ordering::Relaxed),
        )
    }
}

/// One reporting interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub unique: u64,
    pub duplicates: u64,
    pub unique_total: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.unique, self.duplicates, self.unique_total
        )
    }
}
