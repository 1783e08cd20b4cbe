use bytes::Bytes;
use http_body_util::Full;
use hyper::header::AUTHORIZATION;
use hyper::{Method, Request};
use tracing::{debug, instrument, Level};

use crate::config::DeploymentConfig;
use crate::types::{AccessToken, HttpClient};
use crate::Error;

/// Fetches connector access tokens from the backend deployment service
///
/// Every call to [`TokenFetcher::fetch()`] makes exactly one request; nothing is cached or
/// retried. The fetcher itself can be shared between tasks, which lets the underlying HTTP
/// client reuse connections.
#[derive(Debug)]
pub struct TokenFetcher {
    client: HttpClient,
    config: DeploymentConfig,
}

impl TokenFetcher {
    /// Create a fetcher for the given backend configuration
    pub fn new(config: DeploymentConfig) -> Result<Self, Error> {
        Ok(Self {
            client: HttpClient::new()?,
            config,
        })
    }

    /// Get a fresh access token for `connector_id`
    #[instrument(level = Level::DEBUG, skip(self))]
    pub async fn fetch(&self, connector_id: &str) -> Result<AccessToken, Error> {
        let req = self.request(connector_id)?;
        let body = self.client.request(req, self.config.timeout()).await?;
        let token = AccessToken::from_slice(&body)?;
        debug!("received access token");
        Ok(token)
    }

    /// The configuration this fetcher sends requests with
    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    fn request(&self, connector_id: &str) -> Result<Request<Full<Bytes>>, Error> {
        Request::builder()
            .method(Method::GET)
            .uri(self.config.access_token_url(connector_id))
            .header(AUTHORIZATION, self.config.bearer())
            .body(Full::from(Bytes::new()))
            .map_err(|err| Error::InvalidRequest("failed to build access token request", err))
    }
}
