//! # pgcompose
//!
//! Composable, parameterized SQL for PostgreSQL, with nested transactions.
//!
//! ## Features
//!
//! - **Fragments compose**: a template may embed other fragments; the whole
//!   tree renders to one statement with a single `$1..$N` numbering
//! - **Values are always bound**: interpolated values become parameters, never SQL text
//! - **Insert/update helpers**: `insert`, `insert_into` and `set` build column lists from rows
//! - **Nested transactions**: `begin` on a transaction opens a savepoint; `begin_with`
//!   commits on success and rolls back on failure
//!
//! ## Example
//!
//! ```ignore
//! use pgcompose::{Database, Row, SqlError, set};
//!
//! let db = Database::connect("postgres://localhost/todos")?;
//!
//! let created = db
//!     .insert_into("todos", Row::new().set("task", "write docs").set("isCompleted", false))?
//!     .append(" returning *")
//!     .fetch_one()
//!     .await?;
//!
//! db.begin_with(|tx| async move {
//!     tx.sql("update \"todos\" ")
//!         .embed(set(Row::new().set("isCompleted", true))?)
//!         .append(" where \"task\" = ")
//!         .bind("write docs")
//!         .execute()
//!         .await?;
//!     Ok::<_, SqlError>(())
//! })
//! .await?;
//! ```

pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod field;
pub mod fragment;
pub mod ident;
pub mod params;
pub mod result;
pub mod row;
pub mod statement;
pub mod transaction;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
mod testing;

pub use client::{Driver, Executor, QueryOutput};
pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{SqlError, SqlResult};
pub use field::{Field, Many, Row};
pub use fragment::{
    ColumnsAndValues, Fragment, Hole, InsertInto, IntoHole, SetClause, SqlFragment, Template,
    insert, insert_columns, insert_into, insert_into_columns, set, set_columns, sql,
};
pub use ident::quote_identifier;
pub use params::ParamGenerator;
pub use result::{Command, QueryResult};
pub use row::{FromRow, RowExt};
pub use statement::Statement;
pub use transaction::{SavepointIds, Transaction, TransactionAction, TransactionState};

/// The driver's row type, as returned by [`Statement::fetch_one`] and friends.
pub use tokio_postgres::Row as PgRow;

#[cfg(feature = "pool")]
pub use pool::{PoolOptions, create_pool, create_pool_with};
