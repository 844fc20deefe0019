//! The root statement factory and transaction manager.

use crate::client::{Driver, Executor, QueryOutput};
use crate::config::DatabaseConfig;
use crate::error::{SqlError, SqlResult};
use crate::field::{Many, Row};
use crate::fragment::{self, ColumnsAndValues, Fragment, SetClause, Template};
use crate::statement::Statement;
use crate::transaction::{SavepointIds, Transaction};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

pub(crate) struct DatabaseInner<D> {
    pub(crate) driver: D,
    pub(crate) ids: SavepointIds,
    pub(crate) config: Arc<DatabaseConfig>,
}

/// Entry point: builds statements that run on a pooled connection and opens
/// transactions.
///
/// Statements built here check a connection out for a single round trip.
/// Cloning is cheap and clones share the driver and the savepoint counter.
pub struct Database<D: Driver> {
    inner: Arc<DatabaseInner<D>>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Database<D> {
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, DatabaseConfig::default())
    }

    pub fn with_config(driver: D, config: DatabaseConfig) -> Self {
        let ids = SavepointIds::new(config.savepoint_prefix.clone());
        Self::with_savepoint_ids(driver, config, ids)
    }

    /// Use a specific id generator, e.g. one that wraps early.
    pub fn with_savepoint_ids(driver: D, config: DatabaseConfig, ids: SavepointIds) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                driver,
                ids,
                config: Arc::new(config),
            }),
        }
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Start a statement.
    pub fn sql(&self, initial_sql: impl Into<String>) -> Statement<Self> {
        self.statement(Template::new(initial_sql))
    }

    /// Bind any fragment to this database.
    pub fn statement(&self, fragment: impl Into<Fragment>) -> Statement<Self> {
        Statement::with_config(fragment, self.clone(), Arc::clone(&self.inner.config))
    }

    /// Same as [`fragment::insert`].
    pub fn insert(&self, rows: impl Into<Many<Row>>) -> SqlResult<ColumnsAndValues> {
        fragment::insert(rows)
    }

    /// Same as [`fragment::set`].
    pub fn set(&self, updates: Row) -> SqlResult<SetClause> {
        fragment::set(updates)
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

    /// Check out a connection and issue `begin`.
    pub async fn begin(&self) -> SqlResult<Transaction<D>> {
        Transaction::begin_root(Arc::clone(&self.inner)).await
    }

    /// Run `work` in a root transaction.
    ///
    /// The transaction is committed when `work` succeeds and left it pending,
    /// and rolled back when `work` fails. The error of `work` wins over a
    /// failed rollback; the connection is returned either way.
    pub async fn begin_with<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Transaction<D>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlError>,
    {
        let tx = self.begin().await?;
        tx.run(work).await
    }
}

#[cfg(feature = "pool")]
impl Database<deadpool_postgres::Pool> {
    /// Create a pooled database from a URL with [`create_pool`](crate::create_pool).
    pub fn connect(database_url: &str) -> SqlResult<Self> {
        Ok(Self::new(crate::pool::create_pool(database_url)?))
    }

    /// Like [`Database::connect`], with explicit pool options and configuration.
    pub fn connect_with(
        database_url: &str,
        options: crate::pool::PoolOptions,
        config: DatabaseConfig,
    ) -> SqlResult<Self> {
        let pool = crate::pool::create_pool_with(database_url, tokio_postgres::NoTls, options)?;
        Ok(Self::with_config(pool, config))
    }
}

impl<D: Driver> Executor for Database<D> {
    async fn submit(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SqlResult<QueryOutput> {
        let conn = self.inner.driver.acquire().await?;
        let result = conn.submit(sql, params).await;
        self.inner.driver.release(conn);
        result
    }

    async fn batch(&self, sql: &str) -> SqlResult<()> {
        let conn = self.inner.driver.acquire().await?;
        let result = conn.batch(sql).await;
        self.inner.driver.release(conn);
        result
    }
}
