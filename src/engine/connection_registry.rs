// SPDX-License-Identifier: Apache-2.0

//! Connection Registry
//!
//! Name-keyed store of live connections. This is the SINGLE SOURCE OF TRUTH
//! for connection state: each entry bundles the dialect, the driver handle
//! and the schema environment into one `Arc<Connection>`, and replacement
//! swaps the whole `Arc` under the write lock. Readers therefore always see
//! a complete triple, old or new, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::instrument;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::DriverRegistry;
use crate::engine::traits::DataEngine;
use crate::engine::types::{ConnectionExtra, Dialect};
use crate::model::Environment;

/// A registered, live connection
pub struct Connection {
    pub name: String,
    pub dialect: Dialect,
    pub driver: Arc<dyn DataEngine>,
    pub environment: Environment,
    /// Identity of the model the environment was built from, if any.
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing entry for a registered connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub name: String,
    pub dialect: Dialect,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Manages all registered connections
pub struct ConnectionRegistry {
    drivers: Arc<DriverRegistry>,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    const CONNECT_TIMEOUT_MS: u64 = 15000;

    pub fn new(drivers: Arc<DriverRegistry>) -> Self {
        Self {
            drivers,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a driver for `dialect` and registers it under `name`,
    /// replacing any prior entry atomically.
    ///
    /// The driver is built before the lock is taken, so a failed build
    /// leaves any existing connection of the same name untouched.
    #[instrument(
        skip(self, environment, extra),
        fields(dialect = %dialect, model = ?model)
    )]
    pub async fn upsert(
        &self,
        name: &str,
        dialect: Dialect,
        environment: Environment,
        model: Option<String>,
        extra: &ConnectionExtra,
    ) -> EngineResult<()> {
        let factory = self
            .drivers
            .get(dialect)
            .ok_or_else(|| EngineError::unsupported_dialect(dialect.as_str()))?;

        let driver = match timeout(
            Duration::from_millis(Self::CONNECT_TIMEOUT_MS),
            factory.build_driver(&environment, extra),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::connection_failed(format!(
                    "timed out after {}ms opening {} connection",
                    Self::CONNECT_TIMEOUT_MS,
                    dialect
                )))
            }
        };

        let connection = Arc::new(Connection {
            name: name.to_string(),
            dialect,
            driver,
            environment,
            model,
            created_at: Utc::now(),
        });

        let replaced = {
            let mut connections = self.connections.write().await;
            connections.insert(name.to_string(), connection).is_some()
        };
        tracing::info!(replaced, driver = factory.driver_name(), "Connection registered");

        Ok(())
    }

    /// Gets a connection by name
    pub async fn get(&self, name: &str) -> EngineResult<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::connection_not_found(name))
    }

    /// Lists all registered connections, sorted by name
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let connections = self.connections.read().await;
        let mut summaries: Vec<ConnectionSummary> = connections
            .values()
            .map(|connection| ConnectionSummary {
                name: connection.name.clone(),
                dialect: connection.dialect,
                model: connection.model.clone(),
                created_at: connection.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Checks if a connection exists
    pub async fn contains(&self, name: &str) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(name)
    }
}
