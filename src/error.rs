//! Error types for llmlens.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for llmlens operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for llmlens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("No default configuration found")]
    ConfigurationMissing,

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Provider '{provider}' is not currently supported")]
    ProviderNotImplemented { provider: String },

    #[error("Missing credential for provider '{provider}': environment variable '{var}' is not set")]
    MissingCredential { provider: String, var: String },

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Same error payload shape for every failure in the forwarding path
        let body = serde_json::json!({ "error": self.to_string() });

        (status, axum::Json(body)).into_response()
    }
}
