// SPDX-License-Identifier: Apache-2.0

//! Connection commands
//!
//! Create, replace and list named connections.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::{ConnectionExtra, ConnectionSummary, Dialect, EngineError, EngineResult};
use crate::model::{Environment, ModelInventory};
use crate::AppState;

/// One source text of a custom model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSourceInSchema {
    /// Namespace the source is bound to. Empty or absent means the default one.
    #[serde(default)]
    pub alias: Option<String>,
    pub contents: String,
}

/// A custom model supplied inline with the connection request
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInSchema {
    pub name: String,
    pub sources: Vec<ModelSourceInSchema>,
}

/// Request body for creating or replacing a connection
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInSchema {
    pub name: String,
    /// Parsed leniently so an unknown tag is reported as an unsupported dialect.
    pub dialect: String,
    #[serde(default)]
    pub extra: Option<ConnectionExtra>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub full_model: Option<ModelInSchema>,
}

/// Response for connection create/replace
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionResponse {
    pub name: String,
    pub dialect: Dialect,
    pub model: Option<String>,
    /// Non-fatal conditions the caller should know about.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionListOutput {
    pub connections: Vec<ConnectionSummary>,
}

/// Environment picked for a connection request.
#[derive(Debug)]
pub struct BuiltEnvironment {
    pub environment: Environment,
    /// Identity recorded for listing.
    pub model: Option<String>,
    pub warnings: Vec<String>,
}

/// Builds the schema environment for a connection request.
///
/// A full custom model wins over a named model. An unknown named model
/// falls back to an empty environment with a warning.
pub fn build_environment(
    models: &ModelInventory,
    request: &ConnectionInSchema,
) -> EngineResult<BuiltEnvironment> {
    if let Some(full_model) = &request.full_model {
        let mut environment = Environment::new();
        for source in &full_model.sources {
            environment
                .parse(&source.contents, source.alias.as_deref())
                .map_err(|e| {
                    EngineError::invalid_model(format!("model '{}': {e}", full_model.name))
                })?;
        }
        return Ok(BuiltEnvironment {
            environment,
            model: Some(full_model.name.clone()),
            warnings: Vec::new(),
        });
    }

    if let Some(name) = &request.model {
        return Ok(match models.get(name) {
            Some(environment) => BuiltEnvironment {
                environment,
                model: Some(name.clone()),
                warnings: Vec::new(),
            },
            None => {
                tracing::warn!(
                    model = %name,
                    fallback = "empty_environment",
                    "Unknown model requested"
                );
                BuiltEnvironment {
                    environment: Environment::new(),
                    model: Some(name.clone()),
                    warnings: vec![format!(
                        "model '{name}' is not registered; using an empty environment"
                    )],
                }
            }
        });
    }

    Ok(BuiltEnvironment {
        environment: Environment::new(),
        model: None,
        warnings: Vec::new(),
    })
}

/// Creates a connection, replacing any existing one with the same name
#[instrument(skip(state, request), fields(connection = %request.name, dialect = %request.dialect))]
pub async fn create_connection(
    state: &AppState,
    request: ConnectionInSchema,
) -> EngineResult<ConnectionResponse> {
    let dialect: Dialect = request.dialect.parse()?;
    let built = build_environment(&state.models, &request)?;
    let extra = request.extra.unwrap_or_default();

    state
        .connections
        .upsert(&request.name, dialect, built.environment, built.model.clone(), &extra)
        .await?;

    Ok(ConnectionResponse {
        name: request.name,
        dialect,
        model: built.model,
        warnings: built.warnings,
    })
}

/// Lists registered connections
pub async fn list_connections(state: &AppState) -> ConnectionListOutput {
    ConnectionListOutput {
        connections: state.connections.list().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: Option<&str>, full_model: Option<ModelInSchema>) -> ConnectionInSchema {
        ConnectionInSchema {
            name: "t1".to_string(),
            dialect: "duck_db".to_string(),
            extra: None,
            model: model.map(str::to_string),
            full_model,
        }
    }

    #[test]
    fn test_full_model_binds_aliases() {
        let full_model = ModelInSchema {
            name: "custom".to_string(),
            sources: vec![
                ModelSourceInSchema {
                    alias: None,
                    contents: "key order_id int;".to_string(),
                },
                ModelSourceInSchema {
                    alias: Some("geo".to_string()),
                    contents: "key region string; property region.label string;".to_string(),
                },
            ],
        };
        let built = build_environment(&ModelInventory::new(), &request(Some("ignored"), Some(full_model)))
            .unwrap();

        assert_eq!(built.model.as_deref(), Some("custom"));
        assert!(built.environment.concept("local.order_id").is_some());
        assert!(built.environment.concept("geo.region").is_some());
        assert!(built.environment.concept("geo.label").is_some());
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_full_model_parse_failure_is_invalid_model() {
        let full_model = ModelInSchema {
            name: "broken".to_string(),
            sources: vec![ModelSourceInSchema {
                alias: None,
                contents: "key ;".to_string(),
            }],
        };
        let err = build_environment(&ModelInventory::new(), &request(None, Some(full_model))).unwrap_err();
        assert!(matches!(err, EngineError::InvalidModel { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_named_model_is_copied() {
        let models = ModelInventory::with_builtins();
        let mut built = build_environment(&models, &request(Some("duckdb.demo"), None)).unwrap();
        assert!(built.warnings.is_empty());

        built.environment.parse("key scratch int;", None).unwrap();
        assert!(models.get("duckdb.demo").unwrap().concept("local.scratch").is_none());
    }

    #[test]
    fn test_unknown_model_falls_back_with_warning() {
        let built = build_environment(&ModelInventory::new(), &request(Some("nope"), None)).unwrap();
        assert!(built.environment.is_empty());
        assert_eq!(built.model.as_deref(), Some("nope"));
        assert_eq!(built.warnings.len(), 1);
    }

    #[test]
    fn test_no_model_is_empty() {
        let built = build_environment(&ModelInventory::new(), &request(None, None)).unwrap();
        assert!(built.environment.is_empty());
        assert!(built.model.is_none());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: ConnectionInSchema =
            serde_json::from_str(r#"{"name": "t1", "dialect": "duck_db"}"#).unwrap();
        assert!(request.extra.is_none());
        assert!(request.full_model.is_none());

        let request: ConnectionInSchema = serde_json::from_str(
            r#"{"name": "bq", "dialect": "bigquery", "extra": {"project": "p1", "user_or_service_auth_json": "{}"}}"#,
        )
        .unwrap();
        let extra = request.extra.unwrap();
        assert_eq!(extra.project.as_deref(), Some("p1"));
        assert_eq!(format!("{:?}", extra.user_or_service_auth_json), "Some([REDACTED])");
    }
}
