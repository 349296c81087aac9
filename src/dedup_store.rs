use crate::token::Token;
use rustc_hash::{FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_SHARDS: usize = 64;

#[derive(Default, Debug)]
struct Shard {
    seen: FxHashSet<Token>,
}

/// Every token seen during this process lifetime, split across independently locked shards.
/// Membership only grows.
pub struct DedupStore {
    shards: Vec<Mutex<Shard>>,
    total_seen_count: AtomicUsize,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(num_shards: usize) -> Self {
        let num_shards = num_shards.max(1);
        let shards = (0..num_shards).map(|_| Mutex::new(Shard::default())).collect();
        Self {
            shards,
            total_seen_count: AtomicUsize::new(0),
        }
    }

    fn shard_for(&self, token: &Token) -> MutexGuard<'_, Shard> {
        let mut hasher = FxHasher::default();
        token.hash(&mut hasher);
        let shard_id = (hasher.finish() as usize) % self.shards.len();
        // A poisoned shard still holds a valid set; insertion never leaves it half-updated.
        self.shards[shard_id]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert if absent. Returns true for exactly one caller per distinct token,
    /// however many threads race on it.
    pub fn insert(&self, token: Token) -> bool {
        let mut shard = self.shard_for(&token);
        let first_seen = shard.seen.insert(token);
        if first_seen {
            self.total_seen_count.fetch_add(1, Ordering::Relaxed);
        }
        first_seen
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.shard_for(token).seen.contains(token)
    }

    pub fn len(&self) -> usize {
        self.total_seen_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new()
    }
}
