// SPDX-License-Identifier: Apache-2.0

// Query Engine Module
// Connection registry, driver abstraction and the execution pipeline

pub mod connection_registry;
pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod sql_safety;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use connection_registry::{Connection, ConnectionRegistry, ConnectionSummary};
pub use error::{EngineError, EngineResult};
pub use pipeline::{QueryExecutor, QueryOutcome, STATEMENT_LIMIT};
pub use registry::DriverRegistry;
pub use traits::{DataEngine, DriverFactory};
pub use types::*;
