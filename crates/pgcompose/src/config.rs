//! Runtime configuration for a [`Database`](crate::Database).

use std::borrow::Cow;

/// Settings shared by a database handle, its transactions and statements.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Collapse whitespace in submitted SQL.
    pub normalize_whitespace: bool,
    /// Prefix of generated savepoint names.
    pub savepoint_prefix: String,
    /// Cut SQL in log events after this many characters (`None` logs it whole).
    pub max_sql_log_length: Option<usize>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            normalize_whitespace: true,
            savepoint_prefix: "trx_".to_string(),
            max_sql_log_length: Some(200),
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit SQL exactly as rendered.
    pub fn keep_whitespace(mut self) -> Self {
        self.normalize_whitespace = false;
        self
    }

    /// Set the savepoint name prefix.
    ///
    /// The prefix is used unquoted, so it should be a plain lowercase identifier.
    pub fn savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }

    /// Set the maximum logged SQL length.
    pub fn max_sql_log_length(mut self, max: Option<usize>) -> Self {
        self.max_sql_log_length = max;
        self
    }

    /// SQL text as it should appear in a log event.
    ///
    /// Cut text ends with a marker saying how many bytes were left out.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn loggable<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        let cut = self
            .max_sql_log_length
            .and_then(|max| sql.char_indices().nth(max))
            .map(|(at, _)| at);
        match cut {
            Some(at) => Cow::Owned(format!("{}... ({} more bytes)", &sql[..at], sql.len() - at)),
            None => Cow::Borrowed(sql),
        }
    }
}
