use super::SqlFragment;
use crate::error::{SqlError, SqlResult};
use crate::field::{Field, Many, Row};
use crate::ident::{quote_identifier, write_quoted};
use crate::params::ParamGenerator;

/// `columns` as given, or `row`'s keys when the list is empty.
fn columns_or_keys<I, S>(columns: I, row: Option<&Row>) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    match row {
        Some(row) if columns.is_empty() => row.keys().map(str::to_string).collect(),
        _ => columns,
    }
}

fn inferred_columns(row: Option<&Row>, what: &str) -> SqlResult<Vec<String>> {
    let columns: Vec<String> = row
        .map(|row| row.keys().map(str::to_string).collect())
        .unwrap_or_default();
    if columns.is_empty() {
        return Err(SqlError::usage(format!(
            "{what}: no columns given and none can be inferred from an empty row"
        )));
    }
    Ok(columns)
}

fn write_column_list(out: &mut String, columns: &[String]) {
    out.push('(');
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_quoted(out, column);
    }
    out.push(')');
}

/// Project `row` onto `columns`, writing one placeholder per cell.
///
/// A column missing from the row binds `NULL`.
fn write_tuple(
    out: &mut String,
    values: &mut Vec<Field>,
    row: &Row,
    columns: &[String],
    params: &mut ParamGenerator,
) {
    out.push('(');
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&params.next());
        values.push(row.get(column).cloned().unwrap_or(Field::Null));
    }
    out.push(')');
}

/// `(col1, col2) values ($1, $2), ($3, $4)`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnsAndValues {
    rows: Many<Row>,
    columns: Vec<String>,
}

impl ColumnsAndValues {
    /// Infer the column list from the first row's keys, in order.
    pub fn infer(rows: Many<Row>) -> SqlResult<Self> {
        let columns = inferred_columns(rows.as_slice().first(), "insert")?;
        Ok(Self { rows, columns })
    }

    /// Use `columns` verbatim and in order. An empty list falls back to the
    /// first row's keys.
    pub fn with_columns<I, S>(rows: Many<Row>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns_or_keys(columns, rows.as_slice().first());
        Self { rows, columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        self.rows.as_slice()
    }

    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        let rows = self.rows.as_slice();
        let mut text = String::new();
        let mut values = Vec::with_capacity(rows.len() * self.columns.len());

        write_column_list(&mut text, &self.columns);
        text.push_str(" values ");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            write_tuple(&mut text, &mut values, row, &self.columns, params);
        }
        SqlFragment { text, values }
    }
}

/// `set (col1, col2) = row($1, $2)`
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    updates: Row,
    columns: Vec<String>,
}

impl SetClause {
    /// Infer the column list from the keys of `updates`, in order.
    pub fn infer(updates: Row) -> SqlResult<Self> {
        let columns = inferred_columns(Some(&updates), "set")?;
        Ok(Self { updates, columns })
    }

    /// Use `columns` verbatim and in order. An empty list falls back to the
    /// keys of `updates`.
    pub fn with_columns<I, S>(updates: Row, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns_or_keys(columns, Some(&updates));
        Self { updates, columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        let mut text = String::from("set ");
        let mut values = Vec::with_capacity(self.columns.len());

        write_column_list(&mut text, &self.columns);
        text.push_str(" = row");
        write_tuple(&mut text, &mut values, &self.updates, &self.columns, params);
        SqlFragment { text, values }
    }
}

/// `insert into <table> (cols) values (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertInto {
    table: String,
    columns_and_values: ColumnsAndValues,
}

impl InsertInto {
    pub fn new(table: impl Into<String>, columns_and_values: ColumnsAndValues) -> Self {
        Self {
            table: table.into(),
            columns_and_values,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns_and_values(&self) -> &ColumnsAndValues {
        &self.columns_and_values
    }

    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        let inner = self.columns_and_values.render(params);
        SqlFragment {
            text: format!("insert into {} {}", quote_identifier(&self.table), inner.text),
            values: inner.values,
        }
    }
}
