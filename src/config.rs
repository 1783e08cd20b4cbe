use std::time::Duration;
use std::{env, fmt};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::debug;
use url::Url;

use crate::Error;

/// Connection settings for the backend deployment service
///
/// The deployment system injects both values into the environment when OAuth connectors are
/// part of a deployment, so [`DeploymentConfig::from_env()`] is usually all that is needed.
#[derive(Clone)]
pub struct DeploymentConfig {
    deployment_token: String,
    backend_url: String,
    timeout: Duration,
}

impl DeploymentConfig {
    /// Read `MEMEX_DEPLOYMENT_TOKEN` and `MEMEX_BACKEND_URL` from the environment
    ///
    /// Unset and empty variables are both reported as [`Error::MissingEnv`].
    pub fn from_env() -> Result<Self, Error> {
        debug!("reading deployment credentials from the environment");
        let deployment_token = env_value(DEPLOYMENT_TOKEN_ENV)?;
        let backend_url = env_value(BACKEND_URL_ENV)?;
        Self::new(deployment_token, backend_url)
    }

    /// Build the configuration from explicit values
    ///
    /// Empty values are rejected with the same [`Error::MissingEnv`] that
    /// [`DeploymentConfig::from_env()`] reports for the matching variable.
    pub fn new(
        deployment_token: impl Into<String>,
        backend_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let deployment_token = deployment_token.into();
        if deployment_token.is_empty() {
            return Err(Error::MissingEnv(DEPLOYMENT_TOKEN_ENV));
        }

        let backend_url = backend_url.into();
        if backend_url.is_empty() {
            return Err(Error::MissingEnv(BACKEND_URL_ENV));
        }

        // Only validated; the request URL is composed from the string as given.
        Url::parse(&backend_url).map_err(|err| Error::InvalidUrl(BACKEND_URL_ENV, err))?;

        debug!(%backend_url, "found deployment credentials");
        Ok(Self {
            deployment_token,
            backend_url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the deadline for a single token request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the access token endpoint for `connector_id`
    ///
    /// The connector ID is inserted as-is, `/` included. Only spaces, control characters and
    /// non-ASCII bytes are percent-encoded.
    pub fn access_token_url(&self, connector_id: &str) -> String {
        format!(
            "{}/deployments/connectors/{}/access_token",
            self.backend_url,
            utf8_percent_encode(connector_id, CONNECTOR_ID_ENCODE_SET)
        )
    }

    /// Base URL of the backend, exactly as configured
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Deadline for a single token request
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.deployment_token)
    }
}

impl fmt::Debug for DeploymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentConfig")
            .field("deployment_token", &"****")
            .field("backend_url", &self.backend_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn env_value(name: &'static str) -> Result<String, Error> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(Error::MissingEnv(name))
}

const CONNECTOR_ID_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ');

/// Environment variable holding the bearer credential for the backend
pub const DEPLOYMENT_TOKEN_ENV: &str = "MEMEX_DEPLOYMENT_TOKEN";
/// Environment variable holding the base URL of the backend deployment service
pub const BACKEND_URL_ENV: &str = "MEMEX_BACKEND_URL";
/// Deadline applied to each access token request unless overridden
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                (DEPLOYMENT_TOKEN_ENV, Some("deploy-token")),
                (BACKEND_URL_ENV, Some("https://backend.memex.test")),
            ],
            || {
                let config = DeploymentConfig::from_env().unwrap();
                assert_eq!(config.backend_url(), "https://backend.memex.test");
                assert_eq!(config.bearer(), "Bearer deploy-token");
                assert_eq!(config.timeout(), Duration::from_secs(30));
            },
        );
    }

    #[test]
    fn test_missing_token() {
        temp_env::with_vars(
            [
                (DEPLOYMENT_TOKEN_ENV, None),
                (BACKEND_URL_ENV, Some("https://backend.memex.test")),
            ],
            || {
                let err = DeploymentConfig::from_env().unwrap_err();
                assert!(matches!(err, Error::MissingEnv(DEPLOYMENT_TOKEN_ENV)));
                assert_eq!(err.kind(), ErrorKind::Configuration);
                let msg = err.to_string();
                assert!(msg.contains("MEMEX_DEPLOYMENT_TOKEN not set"), "{msg}");
                assert!(msg.contains("Ensure OAuth connectors are included in the deployment"));
            },
        );
    }

    #[test]
    fn test_missing_backend_url() {
        temp_env::with_vars(
            [
                (DEPLOYMENT_TOKEN_ENV, Some("deploy-token")),
                (BACKEND_URL_ENV, None),
            ],
            || {
                let err = DeploymentConfig::from_env().unwrap_err();
                assert!(matches!(err, Error::MissingEnv(BACKEND_URL_ENV)));
                assert!(err.to_string().contains("MEMEX_BACKEND_URL not set"));
            },
        );
    }

    #[test]
    fn test_token_reported_before_url() {
        temp_env::with_vars(
            [(DEPLOYMENT_TOKEN_ENV, None::<&str>), (BACKEND_URL_ENV, None)],
            || {
                let err = DeploymentConfig::from_env().unwrap_err();
                assert!(matches!(err, Error::MissingEnv(DEPLOYMENT_TOKEN_ENV)));
            },
        );
    }

    #[test]
    fn test_empty_values_are_missing() {
        temp_env::with_vars(
            [
                (DEPLOYMENT_TOKEN_ENV, Some("")),
                (BACKEND_URL_ENV, Some("https://backend.memex.test")),
            ],
            || {
                let err = DeploymentConfig::from_env().unwrap_err();
                assert!(matches!(err, Error::MissingEnv(DEPLOYMENT_TOKEN_ENV)));
            },
        );

        let err = DeploymentConfig::new("deploy-token", "").unwrap_err();
        assert!(matches!(err, Error::MissingEnv(BACKEND_URL_ENV)));

        let err = DeploymentConfig::new("", "https://backend.memex.test").unwrap_err();
        assert!(matches!(err, Error::MissingEnv(DEPLOYMENT_TOKEN_ENV)));
    }

    #[test]
    fn test_invalid_backend_url() {
        let err = DeploymentConfig::new("deploy-token", "backend.memex.test").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(BACKEND_URL_ENV, _)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_access_token_url_is_verbatim() {
        let config = DeploymentConfig::new("deploy-token", "https://backend.memex.test").unwrap();
        assert_eq!(
            config.access_token_url("conn-1"),
            "https://backend.memex.test/deployments/connectors/conn-1/access_token"
        );
        assert_eq!(
            config.access_token_url("team/conn-1"),
            "https://backend.memex.test/deployments/connectors/team/conn-1/access_token"
        );
        assert_eq!(
            config.access_token_url("a|b\"{c}"),
            "https://backend.memex.test/deployments/connectors/a|b\"{c}/access_token"
        );
    }

    #[test]
    fn test_access_token_url_encodes_unsendable_bytes() {
        let config = DeploymentConfig::new("deploy-token", "https://backend.memex.test").unwrap();
        assert_eq!(
            config.access_token_url("conn 1"),
            "https://backend.memex.test/deployments/connectors/conn%201/access_token"
        );
        assert_eq!(
            config.access_token_url("conn\t1\n"),
            "https://backend.memex.test/deployments/connectors/conn%091%0A/access_token"
        );
        assert_eq!(
            config.access_token_url("café"),
            "https://backend.memex.test/deployments/connectors/caf%C3%A9/access_token"
        );
    }

    #[test]
    fn test_with_timeout() {
        let config = DeploymentConfig::new("deploy-token", "https://backend.memex.test")
            .unwrap()
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_debug_hides_deployment_token() {
        let config = DeploymentConfig::new("deploy-secret", "https://backend.memex.test").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("deploy-secret"));
        assert!(debug.contains("https://backend.memex.test"));
    }
}
