//! Nested transactions backed by savepoints.
//!
//! A root transaction checks a connection out of the [`Driver`] and issues
//! `begin`. Every nested transaction shares that connection and opens a
//! savepoint named after its own id. The connection goes back to the driver
//! exactly once, when the root reaches a terminal state (or, if it never
//! does, when the last handle is dropped).
//!
//! ```ignore
//! use pgcompose::{Database, SqlError};
//!
//! let db = Database::connect(&url)?;
//! db.begin_with(|tx| async move {
//!     tx.sql("insert into audit (event) values (").bind("start").append(")").run().await?;
//!     // A failure in here only rolls back to the savepoint.
//!     let _ = tx
//!         .begin_with(|inner| async move {
//!             inner.sql("delete from todos").run().await?;
//!             Err::<(), _>(SqlError::usage("changed my mind"))
//!         })
//!         .await;
//!     Ok::<_, SqlError>(())
//! })
//! .await?;
//! ```

mod ids;

#[cfg(test)]
mod tests;

pub use ids::SavepointIds;

use crate::client::{Driver, Executor, QueryOutput};
use crate::config::DatabaseConfig;
use crate::database::DatabaseInner;
use crate::error::{SqlError, SqlResult};
use crate::field::{Many, Row};
use crate::fragment::{self, Fragment, Template};
use crate::statement::Statement;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio_postgres::types::ToSql;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Pending = 0,
    Committed = 1,
    RolledBack = 2,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Committed,
            _ => Self::RolledBack,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

/// A control operation on a transaction, named in state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionAction {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Revert,
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begun",
            Self::Commit => "committed",
            Self::Rollback => "rolled back",
            Self::Savepoint => "saved",
            Self::Revert => "reverted",
        })
    }
}

/// The connection a root transaction checked out, shared with its descendants.
struct ConnectionLink<D: Driver> {
    db: Arc<DatabaseInner<D>>,
    conn: tokio::sync::Mutex<Option<D::Connection>>,
}

impl<D: Driver> ConnectionLink<D> {
    async fn release(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            self.db.driver.release(conn);
        }
    }
}

impl<D: Driver> Drop for ConnectionLink<D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: "pgcompose.transaction",
                "transaction dropped while pending; discarding its connection"
            );
            self.db.driver.discard(conn);
        }
    }
}

struct TxNode<D: Driver> {
    id: String,
    state: AtomicU8,
    parent: Option<Weak<TxNode<D>>>,
    link: Arc<ConnectionLink<D>>,
}

impl<D: Driver> TxNode<D> {
    fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `pending -> to`, or report the state that blocked it.
    fn transition(&self, action: TransactionAction, to: TransactionState) -> SqlResult<()> {
        self.state
            .compare_exchange(
                TransactionState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| SqlError::state(action, TransactionState::from_u8(actual)))
    }
}

/// A handle on a pending or finished transaction.
///
/// Handles are cheap to clone; clones refer to the same transaction.
pub struct Transaction<D: Driver> {
    node: Arc<TxNode<D>>,
}

impl<D: Driver> Clone for Transaction<D> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<D: Driver> fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.node.id)
            .field("state", &self.state())
            .field("root", &self.is_root())
            .finish()
    }
}

impl<D: Driver> Transaction<D> {
    /// Open a root transaction on a fresh connection.
    pub(crate) async fn begin_root(db: Arc<DatabaseInner<D>>) -> SqlResult<Self> {
        let conn = db.driver.acquire().await?;
        if let Err(err) = conn.batch("begin").await {
            db.driver.release(conn);
            return Err(err);
        }
        let id = db.ids.next();

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "pgcompose.transaction", id = %id, "begin");

        let link = Arc::new(ConnectionLink {
            db,
            conn: tokio::sync::Mutex::new(Some(conn)),
        });
        Ok(Self {
            node: Arc::new(TxNode {
                id,
                state: AtomicU8::new(TransactionState::Pending as u8),
                parent: None,
                link,
            }),
        })
    }

    /// Savepoint name of this transaction.
    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn state(&self) -> TransactionState {
        self.node.state()
    }

    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.node.link.db.config
    }

    /// Start a statement that runs inside this transaction.
    pub fn sql(&self, initial_sql: impl Into<String>) -> Statement<Self> {
        self.statement(Template::new(initial_sql))
    }

    /// Bind any fragment to this transaction.
    pub fn statement(&self, fragment: impl Into<Fragment>) -> Statement<Self> {
        Statement::with_config(
            fragment,
            self.clone(),
            Arc::clone(&self.node.link.db.config),
        )
    }

    pub fn insert_into(
        &self,
        table: impl Into<String>,
        rows: impl Into<Many<Row>>,
    ) -> SqlResult<Statement<Self>> {
        Ok(self.statement(fragment::insert_into(table, rows)?))
    }

    pub fn insert_into_columns<I, S>(
        &self,
        table: impl Into<String>,
        rows: impl Into<Many<Row>>,
        columns: I,
    ) -> Statement<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement(fragment::insert_into_columns(table, rows, columns))
    }

    /// Open a nested transaction under a new savepoint.
    pub async fn begin(&self) -> SqlResult<Self> {
        self.ensure_pending(TransactionAction::Begin)?;
        let child = Self {
            node: Arc::new(TxNode {
                id: self.node.link.db.ids.next(),
                state: AtomicU8::new(TransactionState::Pending as u8),
                parent: Some(Arc::downgrade(&self.node)),
                link: Arc::clone(&self.node.link),
            }),
        };
        child.control(&format!("savepoint {}", child.id())).await?;
        Ok(child)
    }

    /// Run `work` in a nested transaction.
    ///
    /// If `work` succeeds and left the transaction pending it is committed.
    /// If `work` fails the transaction is rolled back and the error of `work`
    /// is returned.
    pub async fn begin_with<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Transaction<D>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlError>,
    {
        let tx = self.begin().await?;
        tx.run(work).await
    }

    /// Commit.
    ///
    /// A root issues `commit` and returns its connection. A nested
    /// transaction issues `release savepoint <id>`, folding its work into the
    /// parent; nothing is durable until the root commits.
    pub async fn commit(&self) -> SqlResult<()> {
        self.finish(TransactionAction::Commit, TransactionState::Committed)
            .await
    }

    /// Roll back.
    ///
    /// A root issues `rollback` and returns its connection, even if the
    /// rollback itself fails. A nested transaction issues
    /// `rollback to savepoint <id>`.
    pub async fn rollback(&self) -> SqlResult<()> {
        self.finish(TransactionAction::Rollback, TransactionState::RolledBack)
            .await
    }

    /// Set a savepoint named after this transaction's id.
    pub async fn savepoint(&self) -> SqlResult<()> {
        self.ensure_pending(TransactionAction::Savepoint)?;
        self.control(&format!("savepoint {}", self.id())).await
    }

    /// Roll back to the most recent savepoint named after this transaction's id.
    pub async fn revert(&self) -> SqlResult<()> {
        self.ensure_pending(TransactionAction::Revert)?;
        self.control(&format!("rollback to savepoint {}", self.id()))
            .await
    }

    /// Fails unless this transaction, and its parent if nested, are pending.
    fn ensure_pending(&self, action: TransactionAction) -> SqlResult<()> {
        let state = self.state();
        if state != TransactionState::Pending {
            return Err(SqlError::state(action, state));
        }
        let Some(parent) = &self.node.parent else {
            return Ok(());
        };
        match parent.upgrade() {
            Some(parent) if parent.state() == TransactionState::Pending => Ok(()),
            Some(parent) => Err(SqlError::usage(format!(
                "transaction {} may not be {action}: its parent {} is {}",
                self.id(),
                parent.id,
                parent.state()
            ))),
            None => Err(SqlError::usage(format!(
                "transaction {} may not be {action}: its parent has been dropped",
                self.id()
            ))),
        }
    }

    async fn finish(&self, action: TransactionAction, to: TransactionState) -> SqlResult<()> {
        self.ensure_pending(action)?;
        self.node.transition(action, to)?;

        let sql = match (self.is_root(), action) {
            (true, TransactionAction::Commit) => "commit".to_string(),
            (true, _) => "rollback".to_string(),
            (false, TransactionAction::Commit) => format!("release savepoint {}", self.id()),
            (false, _) => format!("rollback to savepoint {}", self.id()),
        };
        let result = self.control(&sql).await;

        match action {
            // Still pending so the caller (or `run`) can roll back.
            TransactionAction::Commit if result.is_err() => {
                self.node.set_state(TransactionState::Pending);
            }
            _ if self.is_root() => self.node.link.release().await,
            _ => {}
        }
        result
    }

    async fn control(&self, sql: &str) -> SqlResult<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "pgcompose.transaction", id = %self.id(), sql, "control");

        self.batch(sql).await
    }

    /// Run `work` against this (fresh) transaction and finish it.
    pub(crate) async fn run<F, Fut, T, E>(self, work: F) -> Result<T, E>
    where
        F: FnOnce(Transaction<D>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlError>,
    {
        match work(self.clone()).await {
            Ok(value) => {
                if self.state() == TransactionState::Pending {
                    if let Err(err) = self.commit().await {
                        self.rollback_quietly().await;
                        return Err(err.into());
                    }
                }
                Ok(value)
            }
            Err(err) => {
                self.rollback_quietly().await;
                Err(err)
            }
        }
    }

    /// Roll back if still pending, logging (not returning) any failure.
    async fn rollback_quietly(&self) {
        if self.state() != TransactionState::Pending {
            return;
        }
        if let Err(_err) = self.rollback().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                target: "pgcompose.transaction",
                id = %self.id(),
                error = %_err,
                "automatic rollback failed"
            );
        }
    }
}

impl<D: Driver> Transaction<D> {
    fn released(&self) -> SqlError {
        SqlError::Connection(format!(
            "transaction {} has already returned its connection",
            self.id()
        ))
    }
}

impl<D: Driver> Executor for Transaction<D> {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        let conn = self.node.link.conn.lock().await;
        match conn.as_ref() {
            Some(conn) => conn.submit(sql, params).await,
            None => Err(self.released()),
        }
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        let conn = self.node.link.conn.lock().await;
        match conn.as_ref() {
            Some(conn) => conn.batch(sql).await,
            None => Err(self.released()),
        }
    }
}
