// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the querygate engine
//!
//! Every failure is mapped onto one of these variants at its point of
//! origin. Two of them are deliberately kept apart: `CompileFailure` means
//! "fix your query text", `ExecutionFailure` means "the database rejected
//! the rendered SQL".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all gateway operations
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
pub enum EngineError {
    #[error("Connection not found: {name}")]
    ConnectionNotFound { name: String },

    #[error("Dialect not supported: {dialect}")]
    UnsupportedDialect { dialect: String },

    #[error("Missing configuration: {message}")]
    MissingConfiguration { message: String },

    #[error("Invalid model: {message}")]
    InvalidModel { message: String },

    #[error("{message}")]
    CompileFailure { message: String },

    #[error("{message}")]
    ExecutionFailure { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation cancelled: server is shutting down")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::ConnectionNotFound { name: name.into() }
    }

    pub fn unsupported_dialect(dialect: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            dialect: dialect.into(),
        }
    }

    pub fn missing_configuration(msg: impl Into<String>) -> Self {
        Self::MissingConfiguration { message: msg.into() }
    }

    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel { message: msg.into() }
    }

    pub fn compile_failure(msg: impl Into<String>) -> Self {
        Self::CompileFailure { message: msg.into() }
    }

    pub fn execution_failure(msg: impl Into<String>) -> Self {
        Self::ExecutionFailure { message: msg.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// Stable identifier used in responses, logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionNotFound { .. } => "connection_not_found",
            Self::UnsupportedDialect { .. } => "unsupported_dialect",
            Self::MissingConfiguration { .. } => "missing_configuration",
            Self::InvalidModel { .. } => "invalid_model",
            Self::CompileFailure { .. } => "compile_failure",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }

    /// True when the caller, not the gateway or the database, must act.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionNotFound { .. }
                | Self::UnsupportedDialect { .. }
                | Self::MissingConfiguration { .. }
                | Self::InvalidModel { .. }
                | Self::CompileFailure { .. }
        )
    }

    /// Reclassifies anything raised while compiling as a compile failure.
    /// Cancellation passes through untouched.
    pub fn into_compile_failure(self) -> Self {
        match self {
            Self::CompileFailure { .. } | Self::Cancelled => self,
            other => Self::compile_failure(other.to_string()),
        }
    }

    /// Reclassifies anything raised while rendering or executing as an
    /// execution failure. Cancellation passes through untouched.
    pub fn into_execution_failure(self) -> Self {
        match self {
            Self::ExecutionFailure { .. } | Self::Cancelled => self,
            other => Self::execution_failure(other.to_string()),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
