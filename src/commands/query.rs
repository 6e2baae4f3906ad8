// SPDX-License-Identifier: Apache-2.0

//! Query commands
//!
//! Compiled and raw query execution against a named connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::engine::pipeline::QueryColumn;
use crate::engine::{EngineResult, QueryOutcome};
use crate::AppState;

/// Request body for both query endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct QueryInSchema {
    pub connection: String,
    pub query: String,
}

/// Response for both query endpoints
#[derive(Debug, Clone, Serialize)]
pub struct QueryOut {
    pub connection: String,
    pub query: String,
    pub generated_sql: String,
    pub headers: Vec<String>,
    pub results: Vec<Map<String, JsonValue>>,
    pub created_at: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
    /// Milliseconds
    pub duration: u64,
    pub columns: Vec<(String, QueryColumn)>,
}

impl QueryOut {
    fn from_outcome(request: QueryInSchema, outcome: QueryOutcome) -> Self {
        let now = Utc::now();
        Self {
            connection: request.connection,
            query: request.query,
            generated_sql: outcome.generated_sql,
            headers: outcome.headers,
            results: outcome.results,
            created_at: now,
            refreshed_at: now,
            duration: outcome.duration_ms,
            columns: outcome.columns,
        }
    }
}

/// Compiles and runs a declarative query
pub async fn run_query(state: &AppState, request: QueryInSchema) -> EngineResult<QueryOut> {
    let outcome = state.executor.run_query(&request.connection, &request.query).await?;
    Ok(QueryOut::from_outcome(request, outcome))
}

/// Runs literal SQL, bypassing the compiler
pub async fn run_raw_query(state: &AppState, request: QueryInSchema) -> EngineResult<QueryOut> {
    let outcome = state.executor.run_raw(&request.connection, &request.query).await?;
    Ok(QueryOut::from_outcome(request, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, Purpose};

    #[test]
    fn test_columns_serialize_as_pairs() {
        let out = QueryOut::from_outcome(
            QueryInSchema {
                connection: "t1".to_string(),
                query: "select geo.region;".to_string(),
            },
            QueryOutcome {
                generated_sql: "SELECT 1".to_string(),
                headers: vec!["geo_region".to_string()],
                results: Vec::new(),
                columns: vec![(
                    "region".to_string(),
                    QueryColumn {
                        name: "geo_region".to_string(),
                        datatype: DataType::String,
                        purpose: Purpose::Key,
                    },
                )],
                duration_ms: 3,
            },
        );

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["duration"], 3);
        assert_eq!(json["columns"][0][0], "region");
        assert_eq!(json["columns"][0][1]["name"], "geo_region");
        assert_eq!(json["columns"][0][1]["datatype"], "string");
        assert_eq!(json["columns"][0][1]["purpose"], "key");
        assert_eq!(json["created_at"], json["refreshed_at"]);
    }
}
