// SPDX-License-Identifier: Apache-2.0

//! BigQuery credential and project resolution.
//!
//! Sources are tried in order, first hit wins:
//!
//! 1. inline JSON from `extra.user_or_service_auth_json`
//! 2. the mounted secret file (default `/run/secrets/bigquery_auth`)
//! 3. the file named by `GOOGLE_APPLICATION_CREDENTIALS`
//! 4. application default credentials
//!
//! The project comes from the chosen credentials unless `extra.project`
//! overrides it. Ending up without a project is a configuration error.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::ConnectionExtra;
use crate::observability::Sensitive;

pub const DEFAULT_SECRET_PATH: &str = "/run/secrets/bigquery_auth";

const MISSING_PROJECT: &str =
    "BigQuery dialect requires a project to be specified in the extra field";

/// Where the credential material was found.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    Inline(Sensitive<String>),
    SecretFile(PathBuf),
    EnvironmentFile(PathBuf),
    ApplicationDefault,
}

impl CredentialSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::SecretFile(_) => "secret_file",
            Self::EnvironmentFile(_) => "environment_file",
            Self::ApplicationDefault => "application_default",
        }
    }
}

/// Process-level inputs to the credential chain.
#[derive(Debug, Clone)]
pub struct CredentialSearch {
    pub secret_path: PathBuf,
    pub env_credentials_path: Option<PathBuf>,
    /// Project advertised by the ambient environment for default credentials.
    pub adc_project: Option<String>,
}

impl CredentialSearch {
    /// Reads `GOOGLE_APPLICATION_CREDENTIALS` and the usual project variables.
    pub fn from_env(secret_path: impl Into<PathBuf>) -> Self {
        let env_credentials_path = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let adc_project = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));

        Self {
            secret_path: secret_path.into(),
            env_credentials_path,
            adc_project,
        }
    }
}

impl Default for CredentialSearch {
    fn default() -> Self {
        Self::from_env(DEFAULT_SECRET_PATH)
    }
}

/// Credentials picked by the chain plus the effective project.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub source: CredentialSource,
    pub project_id: String,
}

#[derive(Deserialize)]
struct CredentialProject {
    project_id: Option<String>,
    quota_project_id: Option<String>,
}

fn project_from_json(raw: &str) -> EngineResult<Option<String>> {
    let parsed: CredentialProject = serde_json::from_str(raw).map_err(|e| {
        EngineError::missing_configuration(format!("Invalid BigQuery credentials JSON: {e}"))
    })?;
    Ok(parsed
        .project_id
        .or(parsed.quota_project_id)
        .filter(|p| !p.is_empty()))
}

fn project_from_file(path: &Path) -> EngineResult<Option<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        EngineError::connection_failed(format!(
            "Failed to read BigQuery credentials '{}': {e}",
            path.display()
        ))
    })?;
    project_from_json(&raw)
}

/// Walks the credential chain for one connection request.
pub fn resolve_credentials(
    extra: &ConnectionExtra,
    search: &CredentialSearch,
) -> EngineResult<ResolvedCredentials> {
    let inline = extra
        .user_or_service_auth_json
        .as_ref()
        .filter(|json| !json.expose().trim().is_empty());

    let (source, discovered) = if let Some(json) = inline {
        (
            CredentialSource::Inline(json.clone()),
            project_from_json(json.expose())?,
        )
    } else if search.secret_path.is_file() {
        (
            CredentialSource::SecretFile(search.secret_path.clone()),
            project_from_file(&search.secret_path)?,
        )
    } else if let Some(path) = search.env_credentials_path.as_ref() {
        (
            CredentialSource::EnvironmentFile(path.clone()),
            project_from_file(path)?,
        )
    } else {
        (CredentialSource::ApplicationDefault, search.adc_project.clone())
    };

    let project_id = extra
        .project
        .clone()
        .filter(|p| !p.is_empty())
        .or(discovered)
        .ok_or_else(|| EngineError::missing_configuration(MISSING_PROJECT))?;

    tracing::debug!(source = source.label(), project = %project_id, "BigQuery credentials resolved");

    Ok(ResolvedCredentials { source, project_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn empty_search() -> CredentialSearch {
        CredentialSearch {
            secret_path: PathBuf::from("/nonexistent/querygate/bigquery_auth"),
            env_credentials_path: None,
            adc_project: None,
        }
    }

    fn inline(json: &str) -> ConnectionExtra {
        ConnectionExtra {
            user_or_service_auth_json: Some(Sensitive::new(json.to_string())),
            ..ConnectionExtra::default()
        }
    }

    #[test]
    fn test_inline_credentials_carry_project() {
        let resolved = resolve_credentials(
            &inline(r#"{"type": "service_account", "project_id": "from-json"}"#),
            &empty_search(),
        )
        .unwrap();
        assert_eq!(resolved.project_id, "from-json");
        assert_eq!(resolved.source.label(), "inline");
    }

    #[test]
    fn test_explicit_project_overrides() {
        let mut extra = inline(r#"{"project_id": "from-json"}"#);
        extra.project = Some("override".into());
        let resolved = resolve_credentials(&extra, &empty_search()).unwrap();
        assert_eq!(resolved.project_id, "override");
    }

    #[test]
    fn test_authorized_user_uses_quota_project() {
        let resolved = resolve_credentials(
            &inline(r#"{"type": "authorized_user", "quota_project_id": "quota"}"#),
            &empty_search(),
        )
        .unwrap();
        assert_eq!(resolved.project_id, "quota");
    }

    #[test]
    fn test_no_project_is_missing_configuration() {
        let err = resolve_credentials(&ConnectionExtra::default(), &empty_search()).unwrap_err();
        assert_eq!(err, EngineError::missing_configuration(MISSING_PROJECT));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_default_credentials_with_project() {
        let extra = ConnectionExtra {
            project: Some("explicit".into()),
            ..ConnectionExtra::default()
        };
        let resolved = resolve_credentials(&extra, &empty_search()).unwrap();
        assert_eq!(resolved.source, CredentialSource::ApplicationDefault);
        assert_eq!(resolved.project_id, "explicit");
    }

    #[test]
    fn test_secret_file_before_environment_file() {
        let mut secret = tempfile::NamedTempFile::new().unwrap();
        write!(secret, r#"{{"project_id": "secret-project"}}"#).unwrap();
        let mut env_file = tempfile::NamedTempFile::new().unwrap();
        write!(env_file, r#"{{"project_id": "env-project"}}"#).unwrap();

        let search = CredentialSearch {
            secret_path: secret.path().to_path_buf(),
            env_credentials_path: Some(env_file.path().to_path_buf()),
            adc_project: None,
        };
        let resolved = resolve_credentials(&ConnectionExtra::default(), &search).unwrap();
        assert_eq!(resolved.project_id, "secret-project");
        assert!(matches!(resolved.source, CredentialSource::SecretFile(_)));

        let search = CredentialSearch {
            secret_path: PathBuf::from("/nonexistent/querygate/bigquery_auth"),
            ..search
        };
        let resolved = resolve_credentials(&ConnectionExtra::default(), &search).unwrap();
        assert_eq!(resolved.project_id, "env-project");
    }

    #[test]
    fn test_malformed_inline_json() {
        let err = resolve_credentials(&inline("not json"), &empty_search()).unwrap_err();
        assert!(matches!(err, EngineError::MissingConfiguration { .. }));
    }
}
