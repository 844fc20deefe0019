//! SQL identifier quoting.
//!
//! Identifiers (table and column names) can't be bound as parameters, so they
//! are always written as quoted identifiers: wrapped in `"` with embedded `"`
//! doubled. The name is taken verbatim; `public.users` quotes to a single
//! identifier `"public.users"`, not a schema-qualified name.

/// Quote `name` as a PostgreSQL identifier.
///
/// ```
/// assert_eq!(pgcompose::quote_identifier("users"), r#""users""#);
/// assert_eq!(pgcompose::quote_identifier(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    write_quoted(&mut out, name);
    out
}

pub(crate) fn write_quoted(out: &mut String, name: &str) {
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
            out.push('"');
        } else {
            out.push(ch);
        }
    }
    out.push('"');
}
