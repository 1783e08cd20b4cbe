//! Fetch OAuth access tokens for deployment connectors
//!
//! Apps running inside a deployment that includes OAuth connectors (for example Google Drive)
//! can ask the backend deployment service for a short-lived access token for a connector.
//! The token is valid for roughly an hour and can be used directly as a bearer token against
//! the provider's API.
//!
//! The deployment system injects two environment variables when OAuth connectors are part of
//! the deployment:
//!
//! - `MEMEX_DEPLOYMENT_TOKEN`: the credential authorizing requests to the backend
//! - `MEMEX_BACKEND_URL`: the base URL of the backend deployment service
//!
//! This crate does not cache tokens and does not retry failed requests; every call makes
//! exactly one request. Fetch a fresh token whenever one is needed.
//!
//! ## Simple usage
//!
//! ```rust,no_run
//! # async fn get_token() -> Result<(), memex_connector_auth::Error> {
//! let connector_id = std::env::var("DRIVE_CONNECTOR_ID").unwrap_or_default();
//! let access_token = memex_connector_auth::access_token(&connector_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Explicit configuration
//!
//! A [`TokenFetcher`] is built from a [`DeploymentConfig`], which can be read from the
//! environment once at startup or constructed from explicit values. Sharing one fetcher lets
//! requests reuse connections.
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! # async fn get_token() -> Result<(), memex_connector_auth::Error> {
//! use memex_connector_auth::{DeploymentConfig, TokenFetcher};
//!
//! let config = DeploymentConfig::new("deployment-token", "https://backend.example.com")?
//!     .with_timeout(Duration::from_secs(10));
//! let fetcher = TokenFetcher::new(config)?;
//! let token = fetcher.fetch("3f9c2a6e-5d1b-4c7e-9a0f-2b8d6e4c1a7f").await?;
//! println!("Authorization: Bearer {}", token.as_str());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;
use tracing::{instrument, Level};

mod config;
pub use config::{DeploymentConfig, BACKEND_URL_ENV, DEFAULT_TIMEOUT, DEPLOYMENT_TOKEN_ENV};

mod token_fetcher;
pub use token_fetcher::TokenFetcher;

mod types;
pub use types::AccessToken;

/// Fetch a fresh access token for `connector_id`
///
/// Reads `MEMEX_DEPLOYMENT_TOKEN` and `MEMEX_BACKEND_URL` from the environment on every call
/// and fails with [`Error::MissingEnv`] before making any request if either is unset or empty.
#[instrument(level = Level::DEBUG)]
pub async fn access_token(connector_id: &str) -> Result<String, Error> {
    let fetcher = TokenFetcher::new(DeploymentConfig::from_env()?)?;
    Ok(fetcher.fetch(connector_id).await?.into_string())
}

/// Enumerates all possible errors returned by this library.
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration value was unset or empty
    ///
    /// Raised both for environment variables and for empty values passed to
    /// [`DeploymentConfig::new()`]; the message names the matching variable.
    #[error("{0} not set. Ensure OAuth connectors are included in the deployment.")]
    MissingEnv(&'static str),

    /// The backend URL could not be parsed
    #[error("{0} is not a valid URL. Ensure OAuth connectors are included in the deployment.")]
    InvalidUrl(&'static str, #[source] url::ParseError),

    /// The request could not be built from the configured values
    ///
    /// Happens when the deployment token cannot be sent as a header value, or the backend URL
    /// is accepted by [`url::Url`] but not by the HTTP client.
    #[error("{0}")]
    InvalidRequest(&'static str, #[source] http::Error),

    /// The backend answered with a non-success status
    #[error("access token request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The backend did not answer before the deadline
    #[error("access token request timed out after {0:?}")]
    Timeout(Duration),

    /// Could not connect to the backend
    #[error("{0}")]
    Connection(
        &'static str,
        #[source] hyper_util::client::legacy::Error,
    ),

    /// The connection failed while reading the response
    #[error("{0}")]
    Http(&'static str, #[source] hyper::Error),

    /// Local I/O failure, such as loading TLS root certificates
    #[error("{0}")]
    Io(&'static str, #[source] std::io::Error),

    /// The response body was not JSON or had no `access_token` string
    #[error("{0}")]
    Json(&'static str, #[source] serde_json::Error),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEnv(_) | Self::InvalidUrl(..) | Self::InvalidRequest(..) => {
                ErrorKind::Configuration
            }
            Self::Status { .. } => ErrorKind::HttpStatus,
            Self::Timeout(_) | Self::Connection(..) | Self::Http(..) | Self::Io(..) => {
                ErrorKind::Network
            }
            Self::Json(..) => ErrorKind::Parse,
        }
    }

    /// Whether the request was abandoned because the deadline expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The HTTP status returned by the backend, if the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Broad classes of [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration was missing or malformed; no request was sent
    Configuration,
    /// The backend returned a non-success status
    HttpStatus,
    /// The request failed in transit or timed out
    Network,
    /// The response could not be parsed
    Parse,
}
