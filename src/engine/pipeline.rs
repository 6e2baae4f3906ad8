// SPDX-License-Identifier: Apache-2.0

//! Execution Pipeline
//!
//! Compiled path: resolve the connection, compile the query text into
//! statement plans, then for each plan clamp the limit, render SQL and run
//! it. Statements run strictly in order and each one overwrites the
//! previous outcome, so only the last statement's SQL, rows and column
//! metadata are returned.
//!
//! Raw path: run the SQL verbatim. No compiler, no limit, generic metadata.
//!
//! Failures raised while compiling are reported as `CompileFailure`;
//! failures raised while rendering or executing are `ExecutionFailure`.
//! The shutdown token is checked before compiling and before every driver
//! call.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::engine::connection_registry::{Connection, ConnectionRegistry};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{RequestId, ResultSet};
use crate::metrics::{self, QueryPath};
use crate::model::compiler::QueryCompiler;
use crate::model::types::{DataType, Purpose};

/// Maximum number of rows a compiled statement may return.
pub const STATEMENT_LIMIT: u64 = 100;

/// Effective limit for a plan: unset (or zero) becomes the cap, anything
/// above the cap is lowered to it. Never raised.
pub fn clamp_limit(limit: Option<u64>) -> u64 {
    match limit {
        None | Some(0) => STATEMENT_LIMIT,
        Some(limit) => limit.min(STATEMENT_LIMIT),
    }
}

/// Trims the text and terminates it with `;` when non-empty.
pub fn normalize_query_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{trimmed};")
    }
}

/// Column metadata attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryColumn {
    pub name: String,
    pub datatype: DataType,
    pub purpose: Purpose,
}

/// Shaped result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub generated_sql: String,
    pub headers: Vec<String>,
    pub results: Vec<Map<String, JsonValue>>,
    /// `(concept or header name, metadata)` pairs
    pub columns: Vec<(String, QueryColumn)>,
    pub duration_ms: u64,
}

struct StatementOutput {
    sql: String,
    result: Option<ResultSet>,
    columns: Vec<(String, QueryColumn)>,
}

fn shape(output: Option<StatementOutput>, started: Instant) -> QueryOutcome {
    let (generated_sql, result, columns) = match output {
        Some(output) => (output.sql, output.result, output.columns),
        None => (String::new(), None, Vec::new()),
    };
    let (headers, results) = match result {
        Some(result) => (result.headers.clone(), result.into_records()),
        None => (Vec::new(), Vec::new()),
    };

    QueryOutcome {
        generated_sql,
        headers,
        results,
        columns,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Runs queries against registered connections.
pub struct QueryExecutor {
    connections: Arc<ConnectionRegistry>,
    compiler: Arc<dyn QueryCompiler>,
    shutdown: CancellationToken,
}

impl QueryExecutor {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        compiler: Arc<dyn QueryCompiler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connections,
            compiler,
            shutdown,
        }
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.shutdown.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn execute_on(
        &self,
        connection: &Connection,
        sql: &str,
    ) -> EngineResult<Option<ResultSet>> {
        self.ensure_running()?;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(EngineError::Cancelled),
            result = connection.driver.execute(sql) => {
                result.map_err(EngineError::into_execution_failure)
            }
        }
    }

    /// Compiles `text` against the connection's environment and runs every
    /// resulting statement, returning the last one's outcome.
    #[instrument(
        skip(self, connection_name, text),
        fields(request_id = %RequestId::new(), connection = %connection_name, query_len = text.len())
    )]
    pub async fn run_query(&self, connection_name: &str, text: &str) -> EngineResult<QueryOutcome> {
        let started = Instant::now();
        let result = self.run_compiled(connection_name, text).await;
        let elapsed = started.elapsed().as_millis() as u64;
        metrics::record_query(QueryPath::Compiled, elapsed, result.as_ref().err());

        match &result {
            Ok(outcome) => tracing::info!(
                duration_ms = outcome.duration_ms,
                rows = outcome.results.len(),
                "Query completed"
            ),
            Err(e) => tracing::warn!(kind = e.kind(), error = %e, "Query failed"),
        }
        result
    }

    async fn run_compiled(&self, connection_name: &str, text: &str) -> EngineResult<QueryOutcome> {
        let connection = self.connections.get(connection_name).await?;
        self.ensure_running()?;

        let started = Instant::now();
        let plans = self
            .compiler
            .compile(&normalize_query_text(text), &connection.environment)
            .map_err(EngineError::into_compile_failure)?;
        tracing::debug!(statements = plans.len(), dialect = %connection.dialect, "Query compiled");

        let mut last = None;
        for mut plan in plans {
            plan.limit = Some(clamp_limit(plan.limit));
            let sql = self
                .compiler
                .render(&plan, connection.dialect)
                .map_err(EngineError::into_execution_failure)?;

            let result = self.execute_on(&connection, &sql).await?;

            let columns = plan
                .output_columns
                .iter()
                .map(|concept| {
                    (
                        concept.name.clone(),
                        QueryColumn {
                            name: concept.display_name(),
                            datatype: concept.datatype,
                            purpose: concept.purpose,
                        },
                    )
                })
                .collect();

            last = Some(StatementOutput {
                sql,
                result,
                columns,
            });
        }

        Ok(shape(last, started))
    }

    /// Runs `sql` verbatim, bypassing the compiler and the row cap.
    #[instrument(
        skip(self, connection_name, sql),
        fields(request_id = %RequestId::new(), connection = %connection_name, query_len = sql.len())
    )]
    pub async fn run_raw(&self, connection_name: &str, sql: &str) -> EngineResult<QueryOutcome> {
        let started = Instant::now();
        let result = self.run_passthrough(connection_name, sql).await;
        let elapsed = started.elapsed().as_millis() as u64;
        metrics::record_query(QueryPath::Raw, elapsed, result.as_ref().err());

        match &result {
            Ok(outcome) => tracing::info!(
                duration_ms = outcome.duration_ms,
                rows = outcome.results.len(),
                "Raw query completed"
            ),
            Err(e) => tracing::warn!(kind = e.kind(), error = %e, "Raw query failed"),
        }
        result
    }

    async fn run_passthrough(&self, connection_name: &str, sql: &str) -> EngineResult<QueryOutcome> {
        let connection = self.connections.get(connection_name).await?;
        let started = Instant::now();

        let result = self.execute_on(&connection, sql).await?;
        let columns: Vec<(String, QueryColumn)> = result
            .as_ref()
            .map(|rs| {
                rs.keys()
                    .iter()
                    .map(|header| {
                        (
                            header.clone(),
                            QueryColumn {
                                name: header.clone(),
                                datatype: DataType::String,
                                purpose: Purpose::Key,
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(shape(
            Some(StatementOutput {
                sql: sql.to_string(),
                result,
                columns,
            }),
            started,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, MockFactory};
    use crate::engine::registry::DriverRegistry;
    use crate::engine::types::{ConnectionExtra, Dialect, Row, Value};
    use crate::model::compiler::{ModelCompiler, StatementPlan};
    use crate::model::Environment;

    const MODEL: &str = r#"
        key order_id int;
        property order_id.customer string;
        datasource orders (id: order_id, customer: customer) address orders;
    "#;

    async fn setup(engine: Arc<MockEngine>) -> (QueryExecutor, CancellationToken) {
        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(MockFactory::with_engine(engine)));
        let connections = Arc::new(ConnectionRegistry::new(Arc::new(drivers)));

        let mut environment = Environment::new();
        environment.parse(MODEL, None).unwrap();
        connections
            .upsert("t1", Dialect::DuckDb, environment, None, &ConnectionExtra::default())
            .await
            .unwrap();

        let token = CancellationToken::new();
        let executor = QueryExecutor::new(connections, Arc::new(ModelCompiler::new()), token.clone());
        (executor, token)
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(Some(150)), 100);
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(100)), 100);
        assert_eq!(clamp_limit(Some(0)), 100);
    }

    #[test]
    fn test_normalize_query_text() {
        assert_eq!(normalize_query_text("  select a  "), "select a;");
        assert_eq!(normalize_query_text("select a;"), "select a;");
        assert_eq!(normalize_query_text("   "), "");
    }

    #[tokio::test]
    async fn test_limit_is_clamped_in_executed_sql() {
        let engine = Arc::new(MockEngine::new(Dialect::DuckDb));
        let (executor, _) = setup(engine.clone()).await;

        executor.run_query("t1", "select order_id limit 150").await.unwrap();
        executor.run_query("t1", "select order_id").await.unwrap();
        executor.run_query("t1", "select order_id limit 10").await.unwrap();

        let executed = engine.executed();
        assert!(executed[0].ends_with(" LIMIT 100"), "{}", executed[0]);
        assert!(executed[1].ends_with(" LIMIT 100"), "{}", executed[1]);
        assert!(executed[2].ends_with(" LIMIT 10"), "{}", executed[2]);
    }

    #[tokio::test]
    async fn test_only_last_statement_survives() {
        let engine = Arc::new(MockEngine::new(Dialect::DuckDb));
        let (executor, _) = setup(engine.clone()).await;

        let outcome = executor
            .run_query("t1", "select order_id; select customer;")
            .await
            .unwrap();

        let executed = engine.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(outcome.generated_sql, executed[1]);
        assert_eq!(outcome.headers, vec!["sql"]);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0]["sql"], executed[1].as_str());
        assert_eq!(outcome.results[0]["_index"], 0);
        assert_eq!(outcome.columns.len(), 1);
        assert_eq!(outcome.columns[0].0, "customer");
        assert_eq!(outcome.columns[0].1.purpose, Purpose::Property);
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let engine = Arc::new(MockEngine::with_responder(Dialect::DuckDb, |_| {
            Err(EngineError::execution_failure("Catalog Error: Table with name orders does not exist!"))
        }));
        let (executor, _) = setup(engine.clone()).await;

        let err = executor.run_query("t1", "select nonsense ((").await.unwrap_err();
        assert!(matches!(err, EngineError::CompileFailure { .. }));
        assert!(engine.executed().is_empty());

        let err = executor.run_query("t1", "select order_id;").await.unwrap_err();
        assert_eq!(
            err,
            EngineError::execution_failure("Catalog Error: Table with name orders does not exist!")
        );
    }

    #[tokio::test]
    async fn test_driver_errors_are_reclassified() {
        let engine = Arc::new(MockEngine::with_responder(Dialect::DuckDb, |_| {
            Err(EngineError::internal("driver lock poisoned"))
        }));
        let (executor, _) = setup(engine).await;

        let err = executor.run_raw("t1", "SELECT 1").await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_missing_connection() {
        let (executor, _) = setup(Arc::new(MockEngine::new(Dialect::DuckDb))).await;

        let err = executor.run_query("missing", "select order_id;").await.unwrap_err();
        assert_eq!(err, EngineError::connection_not_found("missing"));
        let err = executor.run_raw("missing", "SELECT 1").await.unwrap_err();
        assert_eq!(err, EngineError::connection_not_found("missing"));
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty_result() {
        let engine = Arc::new(MockEngine::new(Dialect::DuckDb));
        let (executor, _) = setup(engine.clone()).await;

        let outcome = executor.run_query("t1", "  ").await.unwrap();
        assert!(outcome.headers.is_empty());
        assert!(outcome.results.is_empty());
        assert!(outcome.generated_sql.is_empty());
        assert!(engine.executed().is_empty());
    }

    #[tokio::test]
    async fn test_statement_without_rows() {
        let engine = Arc::new(MockEngine::with_responder(Dialect::DuckDb, |_| Ok(None)));
        let (executor, _) = setup(engine).await;

        let outcome = executor.run_raw("t1", "CREATE TABLE t (id INT)").await.unwrap();
        assert!(outcome.headers.is_empty());
        assert!(outcome.results.is_empty());
        assert!(outcome.columns.is_empty());
        assert_eq!(outcome.generated_sql, "CREATE TABLE t (id INT)");
    }

    #[tokio::test]
    async fn test_raw_path_ignores_environment() {
        let engine = Arc::new(MockEngine::with_responder(Dialect::DuckDb, |_| {
            Ok(Some(ResultSet::new(
                vec!["order_id".into(), "customer".into()],
                vec![Row { values: vec![Value::Int(1), Value::Text("ada".into())] }],
            )))
        }));
        let (executor, _) = setup(engine.clone()).await;

        let outcome = executor
            .run_raw("t1", "SELECT id AS order_id, customer FROM orders LIMIT 500")
            .await
            .unwrap();

        assert_eq!(engine.executed(), vec!["SELECT id AS order_id, customer FROM orders LIMIT 500"]);
        for (name, column) in &outcome.columns {
            assert_eq!(&column.name, name);
            assert_eq!(column.purpose, Purpose::Key);
            assert_eq!(column.datatype, DataType::String);
        }
        assert_eq!(outcome.results[0]["customer"], "ada");
    }

    #[tokio::test]
    async fn test_cancelled_before_driver_call() {
        let engine = Arc::new(MockEngine::new(Dialect::DuckDb));
        let (executor, token) = setup(engine.clone()).await;
        token.cancel();

        let err = executor.run_query("t1", "select order_id;").await.unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        let err = executor.run_raw("t1", "SELECT 1").await.unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        assert!(engine.executed().is_empty());
    }

    struct FailingRender;

    impl QueryCompiler for FailingRender {
        fn compile(&self, _text: &str, _environment: &Environment) -> EngineResult<Vec<StatementPlan>> {
            Ok(vec![StatementPlan::new(Vec::new(), Some(500))])
        }

        fn render(&self, plan: &StatementPlan, _dialect: Dialect) -> EngineResult<String> {
            Err(EngineError::compile_failure(format!("cannot render limit {:?}", plan.limit)))
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_execution_failure() {
        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(MockFactory::new(Dialect::DuckDb)));
        let connections = Arc::new(ConnectionRegistry::new(Arc::new(drivers)));
        connections
            .upsert("t1", Dialect::DuckDb, Environment::new(), None, &ConnectionExtra::default())
            .await
            .unwrap();
        let executor = QueryExecutor::new(connections, Arc::new(FailingRender), CancellationToken::new());

        let err = executor.run_query("t1", "anything").await.unwrap_err();
        assert_eq!(err, EngineError::execution_failure("cannot render limit Some(100)"));
    }
}
