// SPDX-License-Identifier: Apache-2.0

//! BigQuery client-backed `DataEngine`, built on `gcp-bigquery-client`.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job_reference::JobReference;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_row::TableRow;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::yup_oauth2;
use gcp_bigquery_client::Client;

use super::credentials::{CredentialSource, ResolvedCredentials};
use super::paging::{cell_value, NextFetch, QueryPage, ResultCollector, MAX_POLLS};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{Dialect, ResultSet, Row};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BigQueryDriver {
    client: Client,
    project_id: String,
}

impl BigQueryDriver {
    pub async fn connect(resolved: ResolvedCredentials) -> EngineResult<Self> {
        let client = match &resolved.source {
            CredentialSource::Inline(json) => {
                let key = yup_oauth2::parse_service_account_key(json.expose()).map_err(|e| {
                    EngineError::missing_configuration(format!(
                        "Invalid BigQuery service account key: {e}"
                    ))
                })?;
                Client::from_service_account_key(key, false).await
            }
            CredentialSource::SecretFile(path) | CredentialSource::EnvironmentFile(path) => {
                let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
                    EngineError::connection_failed(format!(
                        "Failed to read BigQuery service account key '{}': {e}",
                        path.display()
                    ))
                })?;
                Client::from_service_account_key(key, false).await
            }
            CredentialSource::ApplicationDefault => {
                Client::from_application_default_credentials().await
            }
        }
        .map_err(|e| EngineError::connection_failed(format!("BigQuery client: {e}")))?;

        Ok(Self {
            client,
            project_id: resolved.project_id,
        })
    }
}

fn to_page<E: Debug>(
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    rows: Option<Vec<TableRow>>,
    page_token: Option<String>,
    errors: Option<Vec<E>>,
) -> QueryPage {
    let (job_id, location) = job_reference
        .map(|reference| (reference.job_id, reference.location))
        .unwrap_or_default();
    let headers = schema.map(|schema| {
        schema
            .fields
            .unwrap_or_default()
            .into_iter()
            .map(|field| field.name)
            .collect()
    });
    let rows = rows
        .unwrap_or_default()
        .into_iter()
        .map(|row| Row {
            values: row
                .columns
                .unwrap_or_default()
                .into_iter()
                .map(|cell| cell_value(cell.value))
                .collect(),
        })
        .collect();

    QueryPage {
        // An absent flag on a response that carries a schema means done.
        job_complete: job_complete.unwrap_or(true),
        job_id,
        location,
        headers,
        rows,
        page_token: page_token.filter(|token| !token.is_empty()),
        errors: errors
            .unwrap_or_default()
            .iter()
            .map(|e| format!("{e:?}"))
            .collect(),
    }
}

impl BigQueryDriver {
    async fn fetch_results(
        &self,
        job_id: &str,
        location: Option<String>,
        page_token: Option<String>,
    ) -> EngineResult<QueryPage> {
        let parameters = GetQueryResultsParameters {
            location,
            page_token,
            ..Default::default()
        };
        let response = self
            .client
            .job()
            .get_query_results(&self.project_id, job_id, parameters)
            .await
            .map_err(|e| EngineError::execution_failure(e.to_string()))?;

        Ok(to_page(
            response.job_complete,
            response.job_reference,
            response.schema,
            response.rows,
            response.page_token,
            response.errors,
        ))
    }
}

#[async_trait]
impl DataEngine for BigQueryDriver {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    async fn execute(&self, sql: &str) -> EngineResult<Option<ResultSet>> {
        let response = self
            .client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(|e| EngineError::execution_failure(e.to_string()))?;

        let mut collector = ResultCollector::new(MAX_POLLS);
        let mut next = collector.absorb(to_page(
            response.job_complete,
            response.job_reference,
            response.schema,
            response.rows,
            response.page_token,
            response.errors,
        ))?;

        loop {
            let page = match next {
                NextFetch::Done => break,
                NextFetch::Poll { job_id, location } => {
                    tracing::debug!(job_id = %job_id, "BigQuery job still running");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    self.fetch_results(&job_id, location, None).await?
                }
                NextFetch::Page {
                    job_id,
                    location,
                    page_token,
                } => self.fetch_results(&job_id, location, Some(page_token)).await?,
            };
            next = collector.absorb(page)?;
        }

        Ok(collector.finish())
    }
}
