// SPDX-License-Identifier: Apache-2.0

//! Universal data types for the querygate engine
//!
//! These types provide a normalized representation of dialects, values and
//! driver result sets across the supported database engines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::engine::error::EngineError;
use crate::observability::Sensitive;

/// Unique identifier for one gateway request, used to correlate log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// SQL-speaking backend a connection is bound to.
///
/// The tag set is wider than the set of implemented drivers: a known tag
/// without a registered factory is reported as unsupported at connection
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "bigquery")]
    BigQuery,
    #[serde(rename = "duck_db")]
    DuckDb,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "snowflake")]
    Snowflake,
    #[serde(rename = "sql_server")]
    SqlServer,
    #[serde(rename = "presto")]
    Presto,
    #[serde(rename = "trino")]
    Trino,
}

impl Dialect {
    pub const ALL: [Dialect; 7] = [
        Dialect::BigQuery,
        Dialect::DuckDb,
        Dialect::Postgres,
        Dialect::Snowflake,
        Dialect::SqlServer,
        Dialect::Presto,
        Dialect::Trino,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::BigQuery => "bigquery",
            Dialect::DuckDb => "duck_db",
            Dialect::Postgres => "postgres",
            Dialect::Snowflake => "snowflake",
            Dialect::SqlServer => "sql_server",
            Dialect::Presto => "presto",
            Dialect::Trino => "trino",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "duckdb" => return Ok(Dialect::DuckDb),
            "sqlserver" | "mssql" => return Ok(Dialect::SqlServer),
            _ => {}
        }
        Dialect::ALL
            .into_iter()
            .find(|dialect| dialect.as_str() == normalized)
            .ok_or_else(|| EngineError::unsupported_dialect(s.trim()))
    }
}

/// Dialect-specific connection settings supplied with a create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionExtra {
    /// Inline service-account (or authorized-user) JSON for the cloud warehouse.
    #[serde(default)]
    pub user_or_service_auth_json: Option<Sensitive<String>>,
    /// Explicit cloud-warehouse project; overrides whatever the credentials carry.
    #[serde(default)]
    pub project: Option<String>,
    /// DuckDB database file. Defaults to an in-memory database.
    #[serde(default)]
    pub path: Option<String>,
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(JsonValue),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine};

        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(b),
            Value::Int(i) => JsonValue::from(i),
            // NaN and infinities have no JSON representation
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(s) => JsonValue::String(s),
            Value::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
            Value::Json(j) => j,
        }
    }
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// Rows returned by a driver together with the driver-reported headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Synthetic field attached to every shaped row.
pub const ROW_INDEX_FIELD: &str = "_index";

impl ResultSet {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Ordered header list, as reported by the driver.
    pub fn keys(&self) -> &[String] {
        &self.headers
    }

    /// Shapes the rows into field-name keyed records.
    ///
    /// Each record starts with `_index` (zero-based position); a driver
    /// column of the same name overrides it. Row order is preserved.
    pub fn into_records(self) -> Vec<Map<String, JsonValue>> {
        let headers = self.headers;
        self.rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut record = Map::with_capacity(headers.len() + 1);
                record.insert(ROW_INDEX_FIELD.to_string(), JsonValue::from(idx));
                for (header, value) in headers.iter().zip(row.values) {
                    record.insert(header.clone(), value.into());
                }
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_parses_wire_names_and_aliases() {
        assert_eq!("duck_db".parse::<Dialect>().unwrap(), Dialect::DuckDb);
        assert_eq!("DuckDB".parse::<Dialect>().unwrap(), Dialect::DuckDb);
        assert_eq!("bigquery".parse::<Dialect>().unwrap(), Dialect::BigQuery);

        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert_eq!(err, EngineError::unsupported_dialect("oracle"));
    }

    #[test]
    fn dialect_serde_matches_as_str() {
        for dialect in Dialect::ALL {
            let json = serde_json::to_string(&dialect).unwrap();
            assert_eq!(json, format!("\"{}\"", dialect.as_str()));
        }
    }

    #[test]
    fn records_carry_index_and_preserve_order() {
        let rs = ResultSet::new(
            vec!["x".to_string(), "y".to_string()],
            vec![
                Row { values: vec![Value::Int(1), Value::Text("a".into())] },
                Row { values: vec![Value::Int(2), Value::Null] },
            ],
        );
        let records = rs.into_records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["_index"], 0);
        assert_eq!(records[0]["x"], 1);
        assert_eq!(records[0]["y"], "a");
        assert_eq!(records[1]["_index"], 1);
        assert!(records[1]["y"].is_null());
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["_index", "x", "y"]);
    }

    #[test]
    fn driver_column_named_index_wins() {
        let rs = ResultSet::new(
            vec!["_index".to_string()],
            vec![Row { values: vec![Value::Int(42)] }],
        );
        assert_eq!(rs.into_records()[0]["_index"], 42);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert!(JsonValue::from(Value::Float(f64::NAN)).is_null());
        assert_eq!(JsonValue::from(Value::Bytes(vec![1, 2])), "AQI=");
    }

    #[test]
    fn extra_redacts_inline_credentials() {
        let extra: ConnectionExtra = serde_json::from_str(
            r#"{"user_or_service_auth_json": "{\"private_key\": \"k\"}", "project": "p"}"#,
        )
        .unwrap();
        assert_eq!(extra.project.as_deref(), Some("p"));
        assert!(!format!("{extra:?}").contains("private_key"));
    }
}
