//! Composable SQL fragments.
//!
//! A [`Fragment`] renders to a [`SqlFragment`] (`text` + `values`) given a
//! shared [`ParamGenerator`]. Fragments nest: a [`Template`] hole may hold
//! another fragment, which is rendered in place with the same generator, so
//! the final statement has one contiguous `$1..$N` numbering no matter how
//! deeply it was composed.
//!
//! # Example
//!
//! ```
//! use pgcompose::{Row, insert_into, sql};
//!
//! let user = Row::new().set("firstName", "Ada");
//! let cte = sql!(
//!     "with inserted as (",
//!     insert_into("users", user).unwrap(),
//!     " returning *) select * from inserted where \"firstName\" = ",
//!     "Ada",
//!     ""
//! );
//!
//! let rendered = cte.to_sql();
//! assert_eq!(
//!     rendered.text,
//!     r#"with inserted as (insert into "users" ("firstName") values ($1) returning *) select * from inserted where "firstName" = $2"#
//! );
//! assert_eq!(rendered.values.len(), 2);
//! ```

mod partials;
mod template;


pub use partials::{ColumnsAndValues, InsertInto, SetClause};
pub use template::{Hole, IntoHole, Template};

use crate::error::SqlResult;
use crate::field::{Field, Many, Row};
use crate::params::ParamGenerator;
use tokio_postgres::types::ToSql;

/// The rendered form of a fragment.
///
/// Placeholder `$N` in `text` corresponds to `values[N - start]`, where
/// `start` is the generator's starting offset (1 for a top-level render).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub text: String,
    pub values: Vec<Field>,
}

impl SqlFragment {
    /// Collapse whitespace runs to single spaces and trim the ends.
    ///
    /// Quoted literals, quoted identifiers and `--` comments are left intact.
    pub fn normalized(self) -> Self {
        Self {
            text: normalize_whitespace(&self.text),
            values: self.values,
        }
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect()
    }
}

/// A renderable piece of SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Literal text interleaved with values and nested fragments.
    Template(Template),
    /// `(cols) values (...), (...)`
    Insert(ColumnsAndValues),
    /// `set (cols) = row(...)`
    Set(SetClause),
    /// `insert into <table> (cols) values (...)`
    InsertInto(InsertInto),
}

impl Default for Fragment {
    fn default() -> Self {
        Fragment::Template(Template::default())
    }
}

impl Fragment {
    /// Render with `params`, continuing whatever numbering it has reached.
    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        match self {
            Fragment::Template(template) => template.render(params),
            Fragment::Insert(insert) => insert.render(params),
            Fragment::Set(set) => set.render(params),
            Fragment::InsertInto(insert_into) => insert_into.render(params),
        }
    }

    /// Render as a top-level statement: fresh generator, normalized whitespace.
    pub fn to_sql(&self) -> SqlFragment {
        self.render(&mut ParamGenerator::new()).normalized()
    }
}

impl From<Template> for Fragment {
    fn from(template: Template) -> Self {
        Fragment::Template(template)
    }
}

impl From<ColumnsAndValues> for Fragment {
    fn from(insert: ColumnsAndValues) -> Self {
        Fragment::Insert(insert)
    }
}

impl From<SetClause> for Fragment {
    fn from(set: SetClause) -> Self {
        Fragment::Set(set)
    }
}

impl From<InsertInto> for Fragment {
    fn from(insert_into: InsertInto) -> Self {
        Fragment::InsertInto(insert_into)
    }
}

/// Start a template with literal text.
pub fn sql(initial_sql: impl Into<String>) -> Template {
    Template::new(initial_sql)
}

/// Build a `(cols) values (...)` fragment, inferring columns from the first row.
///
/// Fails with a usage error when there is no first row (or it has no keys) to
/// infer columns from.
pub fn insert(rows: impl Into<Many<Row>>) -> SqlResult<ColumnsAndValues> {
    ColumnsAndValues::infer(rows.into())
}

/// Build a `(cols) values (...)` fragment over an explicit column list.
pub fn insert_columns<I, S>(rows: impl Into<Many<Row>>, columns: I) -> ColumnsAndValues
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ColumnsAndValues::with_columns(rows.into(), columns)
}

/// Build a `set (cols) = row(...)` fragment, inferring columns from `updates`.
pub fn set(updates: Row) -> SqlResult<SetClause> {
    SetClause::infer(updates)
}

/// Build a `set (cols) = row(...)` fragment over an explicit column list.
pub fn set_columns<I, S>(updates: Row, columns: I) -> SetClause
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    SetClause::with_columns(updates, columns)
}

/// Build an `insert into <table> ...` fragment, inferring columns.
pub fn insert_into(table: impl Into<String>, rows: impl Into<Many<Row>>) -> SqlResult<InsertInto> {
    Ok(InsertInto::new(table, insert(rows)?))
}

/// Build an `insert into <table> ...` fragment over an explicit column list.
pub fn insert_into_columns<I, S>(
    table: impl Into<String>,
    rows: impl Into<Many<Row>>,
    columns: I,
) -> InsertInto
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    InsertInto::new(table, insert_columns(rows, columns))
}

/// Build a [`Template`] from alternating string literals and holes.
///
/// Arguments alternate `literal, hole, literal, hole, ..., literal`: the
/// template always starts and ends with literal text (use `""` when there is
/// none). Holes are any [`IntoHole`] value, i.e. a bindable value or another
/// fragment.
///
/// ```
/// use pgcompose::sql;
///
/// let t = sql!("select * from todos where id = ", 7, " and done = ", false, "");
/// assert_eq!(t.to_sql().text, "select * from todos where id = $1 and done = $2");
/// ```
#[macro_export]
macro_rules! sql {
    ($first:literal $(, $hole:expr, $literal:literal)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut template = $crate::Template::new($first);
        $(
            template.push_hole($hole);
            template.push($literal);
        )*
        template
    }};
}

/// Collapse whitespace runs outside of literals and comments to one space.
///
/// Quoted strings and identifiers, `E'...'` strings, dollar-quoted bodies and
/// comments are copied verbatim. A line comment keeps its newline.
pub(crate) fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    let mut pending_space = false;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            pending_space = true;
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        pending_space = false;

        let len = verbatim_len(rest, &out).unwrap_or(c.len_utf8());
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Byte length of the literal or comment `rest` starts with, if any.
///
/// An unterminated token runs to the end of the input.
fn verbatim_len(rest: &str, before: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut prev = before.chars().rev();
    let (last, second_last) = (prev.next(), prev.next());

    let end = match bytes {
        [b'\'', ..] => {
            let escapes =
                matches!(last, Some('E' | 'e')) && !second_last.is_some_and(is_ident_char);
            quoted_end(bytes, b'\'', escapes)
        }
        [b'"', ..] => quoted_end(bytes, b'"', false),
        [b'-', b'-', ..] => bytes.iter().position(|&b| b == b'\n').map(|i| i + 1),
        [b'/', b'*', ..] => block_comment_end(bytes),
        [b'$', ..] if !last.is_some_and(is_ident_char) => {
            let tag_len = dollar_tag_len(bytes)?;
            let tag = &rest[..tag_len];
            rest[tag_len..].find(tag).map(|i| tag_len + i + tag_len)
        }
        _ => return None,
    };
    Some(end.unwrap_or(bytes.len()))
}

/// End of a `quote`-delimited token; a doubled quote is an escaped quote.
fn quoted_end(bytes: &[u8], quote: u8, backslash_escapes: bool) -> Option<usize> {
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash_escapes => i += 1,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 1;
                } else {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// End of a `/* ... */` comment; these nest.
fn block_comment_end(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }
    None
}

/// Length of a `$tag$` opener (`$$` included), or `None` for `$1` and the like.
fn dollar_tag_len(bytes: &[u8]) -> Option<usize> {
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'$' => return Some(i + 1),
            b'0'..=b'9' if i > 1 => {}
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {}
            // Non-ASCII letters are valid tag characters.
            b if b >= 0x80 => {}
            _ => return None,
        }
        i += 1;
    }
    None
}
