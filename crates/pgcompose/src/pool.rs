//! Building a `deadpool-postgres` pool to back a [`Database`](crate::Database).

use crate::error::{SqlError, SqlResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

/// Pool settings used by [`create_pool_with`].
#[derive(Debug)]
pub struct PoolOptions {
    /// Most connections open at once, including those held by transactions.
    pub max_size: usize,
    /// Check run on a connection before it is handed out again.
    pub recycling_method: RecyclingMethod,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 16,
            recycling_method: RecyclingMethod::Fast,
        }
    }
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn recycling_method(mut self, method: RecyclingMethod) -> Self {
        self.recycling_method = method;
        self
    }
}

/// Create a `NoTls` pool with default [`PoolOptions`].
///
/// ```ignore
/// let db = pgcompose::Database::new(pgcompose::create_pool("postgres://localhost/todos")?);
/// ```
pub fn create_pool(database_url: &str) -> SqlResult<Pool> {
    create_pool_with(database_url, tokio_postgres::NoTls, PoolOptions::default())
}

/// Create a pool with an explicit TLS connector and options.
pub fn create_pool_with<T>(database_url: &str, tls: T, options: PoolOptions) -> SqlResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let pg_config = database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| SqlError::Connection(format!("invalid database url: {e}")))?;

    let manager = Manager::from_config(
        pg_config,
        tls,
        ManagerConfig {
            recycling_method: options.recycling_method,
        },
    );
    Pool::builder(manager)
        .max_size(options.max_size)
        .build()
        .map_err(|e| SqlError::Pool(e.to_string()))
}
