// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration
//!
//! Flags with environment fallbacks. A `.env` file in the working directory
//! is loaded before parsing (see `main`).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::engine::drivers::bigquery::credentials::DEFAULT_SECRET_PATH;
use crate::observability::LogConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "querygate", version, about = "Query gateway for dialect-typed SQL connections")]
pub struct GatewayConfig {
    /// Address to bind
    #[arg(long, env = "QUERYGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "QUERYGATE_PORT", default_value_t = 5678)]
    pub port: u16,

    /// Directory scanned for additional `.preql` models
    #[arg(long, env = "QUERYGATE_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Write JSON logs to daily rolling files in this directory
    #[arg(long, env = "QUERYGATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Write JSON logs to the platform data directory when no log dir is given
    #[arg(long, env = "QUERYGATE_FILE_LOGS", default_value_t = false)]
    pub file_logs: bool,

    /// Mounted service-account file tried before GOOGLE_APPLICATION_CREDENTIALS
    #[arg(long, env = "QUERYGATE_BIGQUERY_SECRET", default_value = DEFAULT_SECRET_PATH)]
    pub bigquery_secret_path: PathBuf,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn log_config(&self) -> LogConfig {
        let file_dir = match (&self.log_dir, self.file_logs) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(default_log_dir()),
            (None, false) => None,
        };
        LogConfig { file_dir }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5678,
            models_dir: None,
            log_dir: None,
            file_logs: false,
            bigquery_secret_path: PathBuf::from(DEFAULT_SECRET_PATH),
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("querygate")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parser() {
        let parsed = GatewayConfig::try_parse_from(["querygate"]).unwrap();
        let defaults = GatewayConfig::default();
        assert_eq!(parsed.port, defaults.port);
        assert_eq!(parsed.bigquery_secret_path, defaults.bigquery_secret_path);
    }

    #[test]
    fn test_flags() {
        let config = GatewayConfig::try_parse_from([
            "querygate",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--log-dir",
            "/tmp/qg",
        ])
        .unwrap();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.log_config().file_dir, Some(PathBuf::from("/tmp/qg")));
    }

    #[test]
    fn test_file_logs_default_dir() {
        let config = GatewayConfig {
            file_logs: true,
            ..GatewayConfig::default()
        };
        let dir = config.log_config().file_dir.unwrap();
        assert!(dir.ends_with("querygate/logs"));
        assert!(GatewayConfig::default().log_config().file_dir.is_none());
    }
}
