//! Decoding result rows.

use crate::error::{SqlError, SqlResult};
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

/// Conversion from a result row into a Rust value.
///
/// Tuples of up to four [`FromSql`] values decode the leading columns by
/// position, which covers the usual `select count(*)` or `returning id, name`.
///
/// ```ignore
/// use pgcompose::{FromRow, PgRow, RowExt, SqlResult};
///
/// struct Todo {
///     id: i32,
///     task: String,
/// }
///
/// impl FromRow for Todo {
///     fn from_row(row: &PgRow) -> SqlResult<Self> {
///         Ok(Todo {
///             id: row.try_get_column("todoId")?,
///             task: row.try_get_column("task")?,
///         })
///     }
/// }
///
/// let (total,): (i64,) = db.sql("select count(*) from todos").fetch_one_as().await?;
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> SqlResult<Self>;
}

/// Column access that reports failures as [`SqlError::Decode`].
pub trait RowExt {
    /// Decode the column named `column`.
    fn try_get_column<T>(&self, column: &str) -> SqlResult<T>
    where
        T: for<'a> FromSql<'a>;

    /// Decode the column at `index`; errors name the column when it exists.
    fn try_get_index<T>(&self, index: usize) -> SqlResult<T>
    where
        T: for<'a> FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> SqlResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| SqlError::decode(column, e.to_string()))
    }

    fn try_get_index<T>(&self, index: usize) -> SqlResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(index).map_err(|e| {
            let column = self
                .columns()
                .get(index)
                .map_or_else(|| format!("#{index}"), |c| c.name().to_string());
            SqlError::decode(column, e.to_string())
        })
    }
}

macro_rules! impl_from_row_for_tuple {
    ($($ty:ident => $index:tt),+) => {
        impl<$($ty),+> FromRow for ($($ty,)+)
        where
            $($ty: for<'a> FromSql<'a>,)+
        {
            fn from_row(row: &Row) -> SqlResult<Self> {
                Ok(($(row.try_get_index::<$ty>($index)?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(A => 0);
impl_from_row_for_tuple!(A => 0, B => 1);
impl_from_row_for_tuple!(A => 0, B => 1, C => 2);
impl_from_row_for_tuple!(A => 0, B => 1, C => 2, D => 3);
