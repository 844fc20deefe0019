use std::sync::atomic::{AtomicU64, Ordering};

/// Generator of unique transaction identifiers, used as savepoint names.
///
/// Identifiers are `<prefix><n>` with `n` counting up from 1. After `limit`
/// the counter wraps back to 1. Savepoint names only need to be unique within
/// one connection, and one generator serves every transaction of a
/// [`Database`](crate::Database), so ids never collide between transactions
/// that are open at the same time unless `limit` of them are.
#[derive(Debug)]
pub struct SavepointIds {
    prefix: String,
    counter: AtomicU64,
    limit: u64,
}

impl Default for SavepointIds {
    fn default() -> Self {
        Self::new("trx_")
    }
}

impl SavepointIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
            limit: u64::MAX,
        }
    }

    /// Wrap after `limit` ids instead of at `u64::MAX`.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Continue counting after `last`, so the next id is `last + 1`.
    pub fn resume_after(self, last: u64) -> Self {
        self.counter.store(last, Ordering::Relaxed);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next identifier.
    pub fn next(&self) -> String {
        let limit = self.limit;
        let step = |n: u64| if n >= limit { 1 } else { n + 1 };
        // The closure always returns `Some`, so both arms carry the old value.
        let previous = match self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(step(n)))
        {
            Ok(n) | Err(n) => n,
        };
        format!("{}{}", self.prefix, step(previous))
    }
}
