use std::fmt;
use std::time::Duration;

use bytes::Buf;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Error;

#[derive(Clone, Debug)]
pub(crate) struct HttpClient {
    inner: Client<
        hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        Full<Bytes>,
    >,
}

impl HttpClient {
    pub(crate) fn new() -> Result<Self, Error> {
        #[cfg(feature = "webpki-roots")]
        let https = HttpsConnectorBuilder::new().with_webpki_roots();
        #[cfg(not(feature = "webpki-roots"))]
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|err| {
                Error::Io("failed to load native TLS root certificates for HTTPS", err)
            })?;

        Ok(Self {
            inner: Client::builder(TokioExecutor::new())
                .build(https.https_or_http().enable_http2().build()),
        })
    }

    /// Send a single request and return the response body
    ///
    /// The deadline covers the whole exchange, including reading the body. Non-success
    /// statuses are turned into [`Error::Status`] carrying the body the server sent.
    pub(crate) async fn request(
        &self,
        req: Request<Full<Bytes>>,
        deadline: Duration,
    ) -> Result<Bytes, Error> {
        debug!(url = ?req.uri(), ?deadline, "requesting access token");
        match tokio::time::timeout(deadline, self.send(req)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?deadline, "access token request timed out");
                Err(Error::Timeout(deadline))
            }
        }
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Bytes, Error> {
        let (parts, body) = self
            .inner
            .request(req)
            .await
            .map_err(|err| Error::Connection("HTTP request failed", err))?
            .into_parts();

        let mut body = body
            .collect()
            .await
            .map_err(|err| Error::Http("failed to read HTTP response body", err))?
            .aggregate();

        let body = body.copy_to_bytes(body.remaining());
        if !parts.status.is_success() {
            let body = String::from_utf8_lossy(body.as_ref()).into_owned();
            warn!(%body, status = ?parts.status, "access token request failed");
            return Err(Error::Status {
                status: parts.status,
                body,
            });
        }

        Ok(body)
    }
}

/// A connector access token that can be used as a bearer token against the provider's API
///
/// Tokens are valid for roughly an hour and are not cached by this crate; fetch a new one
/// when the provider starts rejecting the old one.
///
/// The token does not implement [`Display`] to avoid accidentally printing the token in log
/// files, likewise [`Debug`] does not expose the token value itself which is only available
/// using [`AccessToken::as_str()`] or [`AccessToken::into_string()`].
///
/// [`Display`]: fmt::Display
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    access_token: String,
}

impl AccessToken {
    pub(crate) fn from_slice(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body)
            .map_err(|err| Error::Json("failed to deserialize access token from response", err))
    }

    /// Get str representation of the token.
    pub fn as_str(&self) -> &str {
        &self.access_token
    }

    /// Consume the token, returning the raw string
    pub fn into_string(self) -> String {
        self.access_token
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"****")
            .finish()
    }
}
