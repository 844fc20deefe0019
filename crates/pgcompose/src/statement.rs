//! Executable statements.

use crate::client::Executor;
use crate::config::DatabaseConfig;
use crate::error::{SqlError, SqlResult};
use crate::field::Field;
use crate::fragment::{Fragment, Hole, IntoHole, SqlFragment, Template};
use crate::params::ParamGenerator;
use crate::result::{Command, QueryResult};
use crate::row::FromRow;
use std::sync::Arc;
use tokio_postgres::Row;

/// A [`Fragment`] bound to an executor.
///
/// A statement is still a fragment: it can be embedded into another template,
/// in which case only its SQL is used and its executor is ignored.
/// Every execution renders the fragment again with a fresh generator.
#[must_use]
#[derive(Debug, Clone)]
pub struct Statement<E> {
    fragment: Fragment,
    executor: E,
    config: Arc<DatabaseConfig>,
}

impl<E> Statement<E> {
    /// Bind `fragment` to `executor` with the default configuration.
    pub fn new(fragment: impl Into<Fragment>, executor: E) -> Self {
        Self::with_config(fragment, executor, Arc::new(DatabaseConfig::default()))
    }

    pub fn with_config(
        fragment: impl Into<Fragment>,
        executor: E,
        config: Arc<DatabaseConfig>,
    ) -> Self {
        Self {
            fragment: fragment.into(),
            executor,
            config,
        }
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_fragment(self) -> Fragment {
        self.fragment
    }

    fn edit(&mut self, f: impl FnOnce(&mut Template)) -> &mut Self {
        let mut template = Template::from(std::mem::take(&mut self.fragment));
        f(&mut template);
        self.fragment = Fragment::Template(template);
        self
    }

    /// Append literal text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.edit(|t| {
            t.push(sql);
        })
    }

    /// Append a placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Field>) -> &mut Self {
        self.edit(|t| {
            t.push_bind(value);
        })
    }

    /// Append another fragment, rendered in place.
    pub fn push_fragment(&mut self, fragment: impl Into<Fragment>) -> &mut Self {
        self.edit(|t| {
            t.push_fragment(fragment);
        })
    }

    pub fn push_hole(&mut self, hole: impl IntoHole) -> &mut Self {
        self.edit(|t| {
            t.push_hole(hole);
        })
    }

    pub fn append(mut self, sql: &str) -> Self {
        self.push(sql);
        self
    }

    pub fn bind(mut self, value: impl Into<Field>) -> Self {
        self.push_bind(value);
        self
    }

    pub fn embed(mut self, fragment: impl Into<Fragment>) -> Self {
        self.push_fragment(fragment);
        self
    }

    /// Render with `params`, continuing whatever numbering it has reached.
    pub fn render(&self, params: &mut ParamGenerator) -> SqlFragment {
        self.fragment.render(params)
    }

    /// The SQL and values that [`Statement::run`] submits.
    pub fn to_sql(&self) -> SqlFragment {
        let rendered = self.fragment.render(&mut ParamGenerator::new());
        if self.config.normalize_whitespace {
            rendered.normalized()
        } else {
            rendered
        }
    }
}

impl<E: Executor> Statement<E> {
    /// Render and submit the statement.
    pub async fn run(&self) -> SqlResult<QueryResult> {
        let rendered = self.to_sql();
        let command = Command::from_sql(&rendered.text);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "pgcompose.sql",
            command = ?command,
            param_count = rendered.values.len(),
            sql = %self.config.loggable(&rendered.text),
            "submit"
        );

        let output = self
            .executor
            .submit(&rendered.text, &rendered.params_ref())
            .await?;
        Ok(QueryResult::new(output, command))
    }

    /// Run and return the number of rows affected.
    pub async fn execute(&self) -> SqlResult<u64> {
        Ok(self.run().await?.row_count())
    }

    /// Run and return the first row, failing with [`SqlError::NotFound`] if
    /// there is none.
    pub async fn fetch_one(&self) -> SqlResult<Row> {
        self.fetch_opt()
            .await?
            .ok_or_else(|| SqlError::not_found("statement returned no rows"))
    }

    /// Run and return the first row, if any.
    pub async fn fetch_opt(&self) -> SqlResult<Option<Row>> {
        Ok(self.run().await?.into_iter().next())
    }

    pub async fn fetch_all_as<T: FromRow>(&self) -> SqlResult<Vec<T>> {
        self.run().await?.rows_as()
    }

    pub async fn fetch_one_as<T: FromRow>(&self) -> SqlResult<T> {
        T::from_row(&self.fetch_one().await?)
    }

    pub async fn fetch_opt_as<T: FromRow>(&self) -> SqlResult<Option<T>> {
        self.fetch_opt().await?.as_ref().map(T::from_row).transpose()
    }
}

impl<E> From<Statement<E>> for Fragment {
    fn from(statement: Statement<E>) -> Self {
        statement.fragment
    }
}

impl<E> IntoHole for Statement<E> {
    fn into_hole(self) -> Hole {
        Hole::Fragment(self.fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::insert;
    use crate::testing::MockConnection;
    use crate::{Row as FieldRow, sql};

    #[test]
    fn statement_embeds_as_fragment() {
        let conn = MockConnection::default();
        let inner = Statement::new(sql("a = ").bind(1), &conn);
        let outer = sql!("select * from t where ", inner, " and b = ", 2, "");
        assert_eq!(outer.to_sql().text, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn pushing_onto_a_non_template_wraps_it() {
        let conn = MockConnection::default();
        let rows = vec![FieldRow::new().set("a", 1)];
        let mut statement = Statement::new(insert(rows).unwrap(), &conn);
        statement.push(" returning *");
        assert_eq!(statement.to_sql().text, r#"("a") values ($1) returning *"#);
    }

    #[test]
    fn whitespace_is_kept_when_configured() {
        let conn = MockConnection::default();
        let config = Arc::new(DatabaseConfig::new().keep_whitespace());
        let statement = Statement::with_config(sql("select\n  1"), &conn, config);
        assert_eq!(statement.to_sql().text, "select\n  1");
    }

    #[tokio::test]
    async fn run_submits_rendered_sql_once() {
        let conn = MockConnection::default();
        let statement = Statement::new(
            sql("update t\n   set a = ").bind(1).append(" where b = ").bind("x"),
            &conn,
        );

        let result = statement.run().await.unwrap();
        assert_eq!(result.command(), Command::Update);
        assert!(result.is_empty());

        statement.run().await.unwrap();
        let submitted = conn.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].sql, "update t set a = $1 where b = $2");
        assert_eq!(submitted[0].params, 2);
        assert_eq!(submitted[0], submitted[1]);
    }

    #[tokio::test]
    async fn execute_returns_row_count() {
        let conn = MockConnection::default().with_row_count(3);
        let affected = Statement::new(sql("delete from t"), &conn)
            .execute()
            .await
            .unwrap();
        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn fetch_one_without_rows_is_not_found() {
        let conn = MockConnection::default();
        let statement = Statement::new(sql("select 1 where false"), &conn);
        assert!(statement.fetch_one().await.unwrap_err().is_not_found());
        assert!(statement.fetch_opt().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn driver_errors_propagate() {
        let conn = MockConnection::default();
        conn.fail_on("select boom");
        let err = Statement::new(sql("select boom"), &conn)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SqlError::Connection(_)));
    }
}
