// SPDX-License-Identifier: Apache-2.0

// querygate - query gateway for dialect-typed SQL connections
// Core library

pub mod commands;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod server;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use config::GatewayConfig;
use engine::drivers::bigquery::credentials::CredentialSearch;
use engine::drivers::bigquery::BigQueryFactory;
use engine::drivers::duckdb::DuckDbFactory;
use engine::{ConnectionRegistry, DriverRegistry, QueryExecutor};
use model::{ModelCompiler, ModelInventory};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: GatewayConfig,
    pub connections: Arc<ConnectionRegistry>,
    pub models: Arc<ModelInventory>,
    pub executor: Arc<QueryExecutor>,
    /// Fired by `/terminate` or a shutdown signal.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let mut registry = DriverRegistry::new();

        registry.register(Arc::new(DuckDbFactory::new()));
        registry.register(Arc::new(BigQueryFactory::new(CredentialSearch::from_env(
            config.bigquery_secret_path.clone(),
        ))));

        let registry = Arc::new(registry);
        let connections = Arc::new(ConnectionRegistry::new(Arc::clone(&registry)));
        let models = Arc::new(load_models(&config));
        let shutdown = CancellationToken::new();
        let executor = Arc::new(QueryExecutor::new(
            Arc::clone(&connections),
            Arc::new(ModelCompiler::new()),
            shutdown.clone(),
        ));

        Self {
            config,
            connections,
            models,
            executor,
            shutdown,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

fn load_models(config: &GatewayConfig) -> ModelInventory {
    let mut inventory = ModelInventory::with_builtins();
    if let Some(dir) = &config.models_dir {
        match inventory.load_dir(dir) {
            Ok(loaded) => tracing::info!(dir = %dir.display(), loaded, "Models directory loaded"),
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to read models directory"),
        }
    }
    tracing::info!(models = inventory.len(), "Model inventory ready");
    inventory
}
