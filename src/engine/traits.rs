// SPDX-License-Identifier: Apache-2.0

//! Driver trait definitions
//!
//! `DataEngine` is the uniform "run SQL, return rows" contract every live
//! connection handle implements. `DriverFactory` builds those handles for
//! one dialect; adding a dialect means adding one factory, not editing a
//! branch chain.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{ConnectionExtra, Dialect, ResultSet};
use crate::model::Environment;

/// Live handle on one database connection.
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Dialect this handle speaks.
    fn dialect(&self) -> Dialect;

    /// Executes one SQL statement.
    ///
    /// Returns `Ok(None)` when the statement produces no result set
    /// (DDL, DML without RETURNING). Failures raised by the database are
    /// reported as `EngineError::ExecutionFailure`.
    async fn execute(&self, sql: &str) -> EngineResult<Option<ResultSet>>;
}

/// Builds `DataEngine` handles for a single dialect.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Dialect this factory is registered under.
    fn dialect(&self) -> Dialect;

    /// Human-readable driver name
    fn driver_name(&self) -> &'static str;

    /// Opens a new handle for a connection about to be registered.
    async fn build_driver(
        &self,
        environment: &Environment,
        extra: &ConnectionExtra,
    ) -> EngineResult<Arc<dyn DataEngine>>;
}
