//! In-memory driver used by unit tests.
//!
//! Every submitted statement is recorded; nothing is executed.

use crate::client::{Driver, Executor, QueryOutput};
use crate::error::{SqlError, SqlResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Submitted {
    pub sql: String,
    pub params: usize,
    /// `false` for [`Executor::batch`].
    pub prepared: bool,
}

#[derive(Debug, Default)]
struct Shared {
    submitted: Mutex<Vec<Submitted>>,
    failing: Mutex<Vec<String>>,
    row_count: AtomicU64,
}

/// A connection that records SQL. All clones share one log.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnection {
    shared: Arc<Shared>,
}

impl MockConnection {
    pub fn with_row_count(self, row_count: u64) -> Self {
        self.shared.row_count.store(row_count, Ordering::SeqCst);
        self
    }

    /// Make every later submission of exactly `sql` fail.
    pub fn fail_on(&self, sql: &str) {
        self.shared.failing.lock().unwrap().push(sql.to_string());
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.shared.submitted.lock().unwrap().clone()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.submitted().into_iter().map(|s| s.sql).collect()
    }

    fn record(&self, sql: &str, params: usize, prepared: bool) -> SqlResult<()> {
        self.shared.submitted.lock().unwrap().push(Submitted {
            sql: sql.to_string(),
            params,
            prepared,
        });
        if self.shared.failing.lock().unwrap().iter().any(|f| f == sql) {
            return Err(SqlError::Connection(format!("mock failure on `{sql}`")));
        }
        Ok(())
    }
}

impl Executor for MockConnection {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        self.record(sql, params.len(), true)?;
        Ok(QueryOutput {
            rows: Vec::new(),
            row_count: self.shared.row_count.load(Ordering::SeqCst),
            columns: Vec::new(),
        })
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        self.record(sql, 0, false)
    }
}

/// Hands out clones of one [`MockConnection`] and counts checkouts.
#[derive(Debug, Default)]
pub(crate) struct MockDriver {
    conn: MockConnection,
    acquired: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    fail_acquire: AtomicBool,
}

impl MockDriver {
    pub fn connection(&self) -> &MockConnection {
        &self.conn
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.conn.sql_log()
    }

    pub fn fail_on(&self, sql: &str) {
        self.conn.fail_on(sql);
    }

    pub fn fail_acquire(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Connections currently checked out.
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released() - self.discarded()
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn acquire(&self) -> SqlResult<MockConnection> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(SqlError::Connection("no connection available".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.conn.clone())
    }

    fn release(&self, _conn: MockConnection) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn discard(&self, _conn: MockConnection) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}
