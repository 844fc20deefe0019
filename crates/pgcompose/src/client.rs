//! Driver-facing traits.
//!
//! [`Executor`] is anything that can run one SQL statement with bound
//! parameters. [`Driver`] hands out exclusive connections (for transactions)
//! and takes them back.

use crate::error::SqlResult;
use futures_util::TryStreamExt;
use std::future::Future;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Row, RowStream};

/// Raw output of one submitted statement.
#[derive(Debug, Default)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// Rows returned or affected, as reported by the server.
    pub row_count: u64,
    /// Names of the returned columns, in order.
    pub columns: Vec<String>,
}

/// Something that can submit a statement and wait for its result.
pub trait Executor: Send + Sync {
    /// Submit `sql` with positional `params` (`$1` is `params[0]`).
    fn submit(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = SqlResult<QueryOutput>> + Send;

    /// Run parameterless `sql` over the simple query protocol.
    ///
    /// Nothing is prepared, so no statement outlives the call. Transaction
    /// control (`begin`, `savepoint trx_7`, ...) goes through here.
    fn batch(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send;
}

/// Source of exclusive connections, e.g. a connection pool.
pub trait Driver: Send + Sync + 'static {
    type Connection: Executor + 'static;

    /// Check out a connection for exclusive use.
    fn acquire(&self) -> impl Future<Output = SqlResult<Self::Connection>> + Send;

    /// Return a connection after its transaction has finished.
    fn release(&self, conn: Self::Connection) {
        drop(conn);
    }

    /// Get rid of a connection whose transaction was never finished.
    ///
    /// The connection may still be inside an open transaction, so it must
    /// not be handed out again.
    fn discard(&self, conn: Self::Connection) {
        drop(conn);
    }
}

async fn collect_rows(stream: RowStream, columns: Vec<String>) -> SqlResult<QueryOutput> {
    let mut stream = std::pin::pin!(stream);
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row);
    }
    let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);
    Ok(QueryOutput {
        rows,
        row_count,
        columns,
    })
}

fn column_names(statement: &tokio_postgres::Statement) -> Vec<String> {
    statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

impl Executor for tokio_postgres::Client {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        let statement = self.prepare(sql).await?;
        let stream = self.query_raw(&statement, params.iter().copied()).await?;
        collect_rows(stream, column_names(&statement)).await
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        Ok(self.batch_execute(sql).await?)
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        let statement = self.prepare(sql).await?;
        let stream = self.query_raw(&statement, params.iter().copied()).await?;
        collect_rows(stream, column_names(&statement)).await
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        Ok(self.batch_execute(sql).await?)
    }
}

// ===== deadpool-postgres support =====

// Plain `prepare`: the statement is closed on the server once dropped.
#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::ClientWrapper {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        let client: &tokio_postgres::Client = self;
        Executor::submit(client, sql, params).await
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        Ok(self.batch_execute(sql).await?)
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        Executor::submit(&**self, sql, params).await
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        Executor::batch(&**self, sql).await
    }
}

#[cfg(feature = "pool")]
impl Driver for deadpool_postgres::Pool {
    type Connection = deadpool_postgres::Client;

    async fn acquire(&self) -> SqlResult<Self::Connection> {
        Ok(self.get().await?)
    }

    fn discard(&self, conn: Self::Connection) {
        // Detach from the pool; dropping the bare client closes the connection.
        drop(deadpool_postgres::Client::take(conn));
    }
}

impl<E: Executor> Executor for &E {
    fn submit(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = SqlResult<QueryOutput>> + Send {
        (*self).submit(sql, params)
    }

    fn batch(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send {
        (*self).batch(sql)
    }
}

impl<E: Executor> Executor for std::sync::Arc<E> {
    fn submit(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = SqlResult<QueryOutput>> + Send {
        (**self).submit(sql, params)
    }

    fn batch(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send {
        (**self).batch(sql)
    }
}
