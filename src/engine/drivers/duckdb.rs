// SPDX-License-Identifier: Apache-2.0

//! DuckDB Driver
//!
//! Implements the DataEngine trait for DuckDB using the native `duckdb` crate.
//!
//! ## DuckDB Specifics
//!
//! - DuckDB is a file-based embedded OLAP database
//! - `extra.path` selects the database file; without it the database lives in memory
//! - Supports `:memory:` explicitly as well
//!
//! ## Concurrency Model
//!
//! The `duckdb` crate provides a synchronous API. All operations are wrapped
//! in `tokio::task::spawn_blocking`. The `Connection` is `Send` but `!Sync`,
//! so it is protected by a `std::sync::Mutex`. Statements issued against one
//! connection are therefore serialized.

use std::sync::{Arc, Mutex};

use ::duckdb::types::{TimeUnit, Value as DuckValue};
use ::duckdb::Connection;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use rust_decimal::prelude::ToPrimitive;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_safety;
use crate::engine::traits::{DataEngine, DriverFactory};
use crate::engine::types::{ConnectionExtra, Dialect, ResultSet, Row, Value};
use crate::model::Environment;

const MEMORY_PATHS: [&str; 2] = [":memory:", "duckdb::memory:"];

// ==================== Session & Factory ====================

/// One open DuckDB database.
pub struct DuckDbDriver {
    /// The DuckDB connection, protected by a std Mutex (Connection is !Sync).
    conn: Arc<Mutex<Connection>>,
}

/// Opens DuckDB databases for new connections.
pub struct DuckDbFactory;

impl DuckDbFactory {
    pub fn new() -> Self {
        Self
    }

    /// Opens a DuckDB connection for a path.
    fn open_connection(path: &str) -> EngineResult<Connection> {
        if MEMORY_PATHS.contains(&path) {
            Connection::open_in_memory().map_err(|e| {
                EngineError::connection_failed(format!("Failed to open DuckDB in-memory: {e}"))
            })
        } else {
            Connection::open(path).map_err(|e| {
                EngineError::connection_failed(format!(
                    "Failed to open DuckDB file '{}': {e}",
                    path
                ))
            })
        }
    }

    /// Validates the DuckDB file path.
    fn validate_path(path: &str) -> EngineResult<()> {
        if MEMORY_PATHS.contains(&path) {
            return Ok(());
        }

        if path.is_empty() {
            return Err(EngineError::missing_configuration(
                "DuckDB path cannot be empty.",
            ));
        }

        if path.eq_ignore_ascii_case("localhost") {
            return Err(EngineError::missing_configuration(
                "Invalid DuckDB path: 'localhost'. Please provide a database file path.",
            ));
        }

        let path_lower = path.to_lowercase();
        let valid_extensions = [".duckdb", ".db"];
        let has_extension = valid_extensions.iter().any(|ext| path_lower.ends_with(ext));

        if !has_extension && path.contains("://") {
            return Err(EngineError::missing_configuration(format!(
                "Invalid DuckDB path format: {}",
                path
            )));
        }

        Ok(())
    }
}

impl Default for DuckDbFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverFactory for DuckDbFactory {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn driver_name(&self) -> &'static str {
        "DuckDB"
    }

    async fn build_driver(
        &self,
        _environment: &Environment,
        extra: &ConnectionExtra,
    ) -> EngineResult<Arc<dyn DataEngine>> {
        let db_path = extra
            .path
            .as_deref()
            .map(str::trim)
            .unwrap_or(":memory:")
            .to_string();
        Self::validate_path(&db_path)?;

        let path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || Self::open_connection(&path))
            .await
            .map_err(|e| EngineError::internal(format!("DuckDB task panicked: {e}")))??;

        tracing::debug!(db_path = %db_path, "DuckDB database opened");

        Ok(Arc::new(DuckDbDriver {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

impl DuckDbDriver {
    /// Runs a synchronous closure on the connection inside spawn_blocking.
    async fn with_conn<F, R>(&self, f: F) -> EngineResult<R>
    where
        F: FnOnce(&Connection) -> EngineResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                EngineError::internal(format!("Failed to lock DuckDB connection: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| EngineError::internal(format!("DuckDB task panicked: {e}")))?
    }
}

// ==================== Type Conversion ====================

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn timestamp_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Converts a DuckDB value into the gateway's value representation.
fn duckdb_value_to_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i as i64),
        DuckValue::SmallInt(i) => Value::Int(i as i64),
        DuckValue::Int(i) => Value::Int(i as i64),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i as i64),
        DuckValue::USmallInt(i) => Value::Int(i as i64),
        DuckValue::UInt(i) => Value::Int(i as i64),
        DuckValue::UBigInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(i.to_string())),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(i.to_string())),
        DuckValue::Float(f) => Value::Float(f as f64),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Decimal(d) => d
            .to_f64()
            .map(Value::Float)
            .unwrap_or_else(|| Value::Text(d.to_string())),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::Text(s),
        DuckValue::Blob(b) => Value::Bytes(b),
        DuckValue::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|date| Value::Text(date.to_string()))
            .unwrap_or(Value::Int(days as i64)),
        DuckValue::Timestamp(unit, raw) => {
            DateTime::from_timestamp_micros(timestamp_micros(unit, raw))
                .map(|ts| Value::Text(ts.naive_utc().to_string()))
                .unwrap_or(Value::Int(raw))
        }
        other => Value::Text(format!("{other:?}")),
    }
}

/// Executes a row-returning statement.
///
/// NOTE: DuckDB crate requires that `column_name()` is called AFTER the statement
/// has been executed (i.e., after iterating rows). We collect rows first, then
/// extract column names.
fn execute_select(conn: &Connection, sql: &str) -> EngineResult<ResultSet> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| EngineError::execution_failure(e.to_string()))?;

    // DuckDB crate: column_count/column_name panic before execution.
    // query_map executes internally, so we get column_count from the Row.
    let rows_iter = stmt
        .query_map([], |row| {
            let col_count = row.as_ref().column_count();
            let mut values = Vec::with_capacity(col_count);
            for i in 0..col_count {
                values.push(duckdb_value_to_value(row.get::<_, DuckValue>(i)?));
            }
            Ok(Row { values })
        })
        .map_err(|e| EngineError::execution_failure(e.to_string()))?;

    let mut rows = Vec::new();
    for row_result in rows_iter {
        rows.push(row_result.map_err(|e| EngineError::execution_failure(e.to_string()))?);
    }

    // After iteration the statement has executed, so column_name works
    let headers: Vec<String> = (0..stmt.column_count())
        .map(|i| {
            stmt.column_name(i)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| format!("col_{}", i))
        })
        .collect();

    Ok(ResultSet::new(headers, rows))
}

// ==================== DataEngine Implementation ====================

#[async_trait]
impl DataEngine for DuckDbDriver {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn execute(&self, sql: &str) -> EngineResult<Option<ResultSet>> {
        let query = sql.to_string();
        let returns_rows = sql_safety::returns_rows(Dialect::DuckDb, &query)
            .unwrap_or_else(|_| sql_safety::is_select_prefix(&query));

        self.with_conn(move |conn| {
            if returns_rows {
                execute_select(conn, &query).map(Some)
            } else {
                conn.execute_batch(&query)
                    .map_err(|e| EngineError::execution_failure(e.to_string()))?;
                Ok(None)
            }
        })
        .await
    }
}
