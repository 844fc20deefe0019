//! The public result shape of an executed statement.

use crate::client::QueryOutput;
use crate::error::SqlResult;
use crate::row::FromRow;
use std::ops::Deref;
use tokio_postgres::Row;

/// The kind of statement that produced a [`QueryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, transaction control and anything else.
    Other,
}

impl Command {
    /// Guess the command from SQL text.
    ///
    /// Comments and parentheses in front of the statement are skipped. For a
    /// `with` query the command is the first statement keyword at the same
    /// nesting level after the CTE list, so `with x as (...) delete from t`
    /// is a `Delete`.
    pub fn from_sql(sql: &str) -> Self {
        let words = words(sql);
        let Some(first) = words.first() else {
            return Command::Other;
        };
        if first.text.eq_ignore_ascii_case("with") {
            return words[1..]
                .iter()
                .filter(|word| word.depth == first.depth)
                .find_map(|word| Self::from_keyword(word.text))
                .unwrap_or(Command::Select);
        }
        Self::from_keyword(first.text).unwrap_or(Command::Other)
    }

    fn from_keyword(word: &str) -> Option<Self> {
        const KEYWORDS: [(&str, Command); 5] = [
            ("select", Command::Select),
            ("values", Command::Select),
            ("insert", Command::Insert),
            ("update", Command::Update),
            ("delete", Command::Delete),
        ];
        KEYWORDS
            .iter()
            .find(|(keyword, _)| word.eq_ignore_ascii_case(keyword))
            .map(|(_, command)| *command)
    }
}

struct Word<'a> {
    text: &'a str,
    /// Parenthesis nesting level.
    depth: usize,
}

/// Bare words of `sql` with their nesting level, skipping quoted text and comments.
fn words(sql: &str) -> Vec<Word<'_>> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 1);
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$'))
                {
                    i += 1;
                }
                words.push(Word {
                    text: &sql[start..i],
                    depth,
                });
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    words
}

/// Rows returned by a statement plus the metadata the server reported.
#[derive(Debug)]
pub struct QueryResult {
    rows: Vec<Row>,
    row_count: u64,
    columns: Vec<String>,
    command: Command,
}

impl QueryResult {
    pub(crate) fn new(output: QueryOutput, command: Command) -> Self {
        Self {
            rows: output.rows,
            row_count: output.row_count,
            columns: output.columns,
            command,
        }
    }

    /// Rows returned, or rows affected for `insert`/`update`/`delete`.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Names of the returned columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The kind of statement, guessed from its SQL by [`Command::from_sql`].
    ///
    /// This is not the server's command tag: DDL, `copy`, `merge`, `call`
    /// and the like are all [`Command::Other`].
    pub fn command(&self) -> Command {
        self.command
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Map every row through [`FromRow`].
    pub fn rows_as<T: FromRow>(&self) -> SqlResult<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }
}

impl Deref for QueryResult {
    type Target = [Row];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
