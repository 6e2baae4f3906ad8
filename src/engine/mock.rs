// SPDX-License-Identifier: Apache-2.0

//! In-memory driver used by unit tests.
//!
//! By default every statement echoes back as a one-row result set with a
//! single `sql` column, which makes "which statement produced this result"
//! easy to assert on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{DataEngine, DriverFactory};
use crate::engine::types::{ConnectionExtra, Dialect, ResultSet, Row, Value};
use crate::model::Environment;

type Responder = Box<dyn Fn(&str) -> EngineResult<Option<ResultSet>> + Send + Sync>;

pub struct MockEngine {
    dialect: Dialect,
    executed: Mutex<Vec<String>>,
    responder: Responder,
}

impl MockEngine {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_responder(dialect, |sql| {
            Ok(Some(ResultSet::new(
                vec!["sql".to_string()],
                vec![Row {
                    values: vec![Value::Text(sql.to_string())],
                }],
            )))
        })
    }

    pub fn with_responder<F>(dialect: Dialect, responder: F) -> Self
    where
        F: Fn(&str) -> EngineResult<Option<ResultSet>> + Send + Sync + 'static,
    {
        Self {
            dialect,
            executed: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DataEngine for MockEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, sql: &str) -> EngineResult<Option<ResultSet>> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }
        (self.responder)(sql)
    }
}

pub struct MockFactory {
    dialect: Dialect,
    engine: Arc<MockEngine>,
    failure: Option<EngineError>,
}

impl MockFactory {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_engine(Arc::new(MockEngine::new(dialect)))
    }

    pub fn with_engine(engine: Arc<MockEngine>) -> Self {
        Self {
            dialect: engine.dialect,
            engine,
            failure: None,
        }
    }

    pub fn failing(dialect: Dialect, failure: EngineError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(dialect)
        }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn driver_name(&self) -> &'static str {
        "Mock Driver"
    }

    async fn build_driver(
        &self,
        _environment: &Environment,
        _extra: &ConnectionExtra,
    ) -> EngineResult<Arc<dyn DataEngine>> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.engine.clone())
    }
}
