// SPDX-License-Identifier: Apache-2.0

//! Result Paging
//!
//! A BigQuery query answers with a single page that may be incomplete: the
//! job can still be running (`jobComplete: false`) or the rows can continue
//! behind a `pageToken`. [`ResultCollector`] absorbs each page and decides
//! what to fetch next, so the network loop in the client stays trivial.

use serde_json::Value as JsonValue;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{ResultSet, Row, Value};

/// Upper bound on status polls for a single job.
pub const MAX_POLLS: u32 = 600;

/// One response page, reduced to what the collector needs.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub job_complete: bool,
    pub job_id: Option<String>,
    pub location: Option<String>,
    /// Column names, present once the job has a schema.
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Row>,
    pub page_token: Option<String>,
    pub errors: Vec<String>,
}

/// Next request the client has to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextFetch {
    /// Job still running; poll its results again.
    Poll { job_id: String, location: Option<String> },
    /// More rows behind a page token.
    Page {
        job_id: String,
        location: Option<String>,
        page_token: String,
    },
    Done,
}

/// Accumulates pages of one query until the job is complete and drained.
#[derive(Debug)]
pub struct ResultCollector {
    headers: Option<Vec<String>>,
    rows: Vec<Row>,
    polls: u32,
    max_polls: u32,
}

impl ResultCollector {
    pub fn new(max_polls: u32) -> Self {
        Self {
            headers: None,
            rows: Vec::new(),
            polls: 0,
            max_polls,
        }
    }

    pub fn absorb(&mut self, page: QueryPage) -> EngineResult<NextFetch> {
        if !page.errors.is_empty() {
            return Err(EngineError::execution_failure(page.errors.join("; ")));
        }

        if !page.job_complete {
            self.polls += 1;
            if self.polls > self.max_polls {
                return Err(EngineError::execution_failure(format!(
                    "BigQuery job did not complete after {} status checks",
                    self.max_polls
                )));
            }
            let job_id = page.job_id.ok_or_else(|| {
                EngineError::execution_failure("BigQuery job incomplete and no job reference returned")
            })?;
            return Ok(NextFetch::Poll {
                job_id,
                location: page.location,
            });
        }

        if self.headers.is_none() {
            self.headers = page.headers;
        }
        self.rows.extend(page.rows);

        match page.page_token {
            Some(page_token) => {
                let job_id = page.job_id.ok_or_else(|| {
                    EngineError::execution_failure("BigQuery page token returned without a job reference")
                })?;
                Ok(NextFetch::Page {
                    job_id,
                    location: page.location,
                    page_token,
                })
            }
            None => Ok(NextFetch::Done),
        }
    }

    /// Complete result, or `None` when the finished job produced no schema
    /// (DDL and DML without output).
    pub fn finish(self) -> Option<ResultSet> {
        let rows = self.rows;
        self.headers.map(|headers| ResultSet::new(headers, rows))
    }
}

/// Converts one REST cell to a `Value`.
pub fn cell_value(value: Option<JsonValue>) -> Value {
    match value {
        None | Some(JsonValue::Null) => Value::Null,
        Some(JsonValue::Bool(b)) => Value::Bool(b),
        // The REST API returns scalars as strings
        Some(JsonValue::String(s)) => Value::Text(s),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        Some(other) => Value::Json(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_row(value: &str) -> Row {
        Row {
            values: vec![Value::Text(value.to_string())],
        }
    }

    fn running(job_id: &str) -> QueryPage {
        QueryPage {
            job_complete: false,
            job_id: Some(job_id.to_string()),
            location: Some("US".to_string()),
            ..Default::default()
        }
    }

    fn complete(rows: &[&str], page_token: Option<&str>) -> QueryPage {
        QueryPage {
            job_complete: true,
            job_id: Some("job_1".to_string()),
            location: Some("US".to_string()),
            headers: Some(vec!["name".to_string()]),
            rows: rows.iter().map(|r| text_row(r)).collect(),
            page_token: page_token.map(str::to_string),
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_incomplete_job_is_polled_not_empty() {
        let mut collector = ResultCollector::new(MAX_POLLS);
        let next = collector.absorb(running("job_1")).unwrap();
        assert_eq!(
            next,
            NextFetch::Poll {
                job_id: "job_1".to_string(),
                location: Some("US".to_string()),
            }
        );

        let next = collector.absorb(complete(&["ada"], None)).unwrap();
        assert_eq!(next, NextFetch::Done);

        let result = collector.finish().expect("rows after completion");
        assert_eq!(result.headers, vec!["name"]);
        assert_eq!(result.rows, vec![text_row("ada")]);
    }

    #[test]
    fn test_page_tokens_are_followed() {
        let mut collector = ResultCollector::new(MAX_POLLS);
        let next = collector.absorb(complete(&["a", "b"], Some("tok_2"))).unwrap();
        assert_eq!(
            next,
            NextFetch::Page {
                job_id: "job_1".to_string(),
                location: Some("US".to_string()),
                page_token: "tok_2".to_string(),
            }
        );

        let next = collector.absorb(complete(&["c"], None)).unwrap();
        assert_eq!(next, NextFetch::Done);

        let result = collector.finish().unwrap();
        assert_eq!(result.rows, vec![text_row("a"), text_row("b"), text_row("c")]);
    }

    #[test]
    fn test_complete_without_schema_has_no_result() {
        let mut collector = ResultCollector::new(MAX_POLLS);
        let page = QueryPage {
            job_complete: true,
            job_id: Some("job_1".to_string()),
            ..Default::default()
        };
        assert_eq!(collector.absorb(page).unwrap(), NextFetch::Done);
        assert!(collector.finish().is_none());
    }

    #[test]
    fn test_poll_budget_exhausted() {
        let mut collector = ResultCollector::new(2);
        collector.absorb(running("job_1")).unwrap();
        collector.absorb(running("job_1")).unwrap();
        let err = collector.absorb(running("job_1")).unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailure { .. }));
    }

    #[test]
    fn test_incomplete_without_reference_fails() {
        let mut collector = ResultCollector::new(MAX_POLLS);
        let page = QueryPage {
            job_complete: false,
            ..Default::default()
        };
        assert!(matches!(
            collector.absorb(page),
            Err(EngineError::ExecutionFailure { .. })
        ));
    }

    #[test]
    fn test_job_errors_fail_the_query() {
        let mut collector = ResultCollector::new(MAX_POLLS);
        let page = QueryPage {
            errors: vec!["Syntax error at [1:8]".to_string()],
            ..complete(&[], None)
        };
        let err = collector.absorb(page).unwrap_err();
        assert!(err.to_string().contains("Syntax error"));
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(None), Value::Null);
        assert_eq!(cell_value(Some(json!("42"))), Value::Text("42".to_string()));
        assert_eq!(cell_value(Some(json!(true))), Value::Bool(true));
        assert_eq!(cell_value(Some(json!(7))), Value::Int(7));
    }
}
