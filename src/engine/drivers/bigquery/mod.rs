// SPDX-License-Identifier: Apache-2.0

//! BigQuery Driver
//!
//! The factory is always registered so that credential problems surface as
//! configuration errors regardless of how the binary was built. Opening a
//! real client requires the `bigquery` cargo feature.

pub mod credentials;
pub mod paging;

#[cfg(feature = "bigquery")]
mod client;

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{DataEngine, DriverFactory};
use crate::engine::types::{ConnectionExtra, Dialect};
use crate::model::Environment;

pub use credentials::{
    resolve_credentials, CredentialSearch, CredentialSource, ResolvedCredentials,
    DEFAULT_SECRET_PATH,
};

/// Opens BigQuery clients for new connections.
pub struct BigQueryFactory {
    search: CredentialSearch,
}

impl BigQueryFactory {
    pub fn new(search: CredentialSearch) -> Self {
        Self { search }
    }
}

#[async_trait]
impl DriverFactory for BigQueryFactory {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    fn driver_name(&self) -> &'static str {
        "BigQuery"
    }

    async fn build_driver(
        &self,
        _environment: &Environment,
        extra: &ConnectionExtra,
    ) -> EngineResult<Arc<dyn DataEngine>> {
        let resolved = resolve_credentials(extra, &self.search)?;

        #[cfg(feature = "bigquery")]
        {
            let driver = client::BigQueryDriver::connect(resolved).await?;
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "bigquery"))]
        {
            tracing::warn!(
                project = %resolved.project_id,
                "BigQuery requested but the gateway was built without the `bigquery` feature"
            );
            Err(EngineError::unsupported_dialect(format!(
                "{} (built without the `bigquery` feature)",
                Dialect::BigQuery
            )))
        }
    }
}
