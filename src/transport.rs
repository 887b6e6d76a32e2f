use crate::search::{SearchRequest, SearchResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode request: {0}")]
    Encode(sonic_rs::Error),
    #[error("failed to decode response: {0}")]
    Decode(sonic_rs::Error),
    #[error("service returned {status} ({code}): {msg}")]
    Status { status: u16, code: String, msg: String },
}

/// Sends one search and returns the service's reply. Implementations must be
/// usable from many tasks at once.
pub trait SearchClient: Send + Sync + 'static {
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<SearchResponse, TransportError>> + Send;
}

/// Error body the service sends with non-2xx replies.
#[derive(Debug, Deserialize)]
struct TwirpErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

/// Twirp JSON client over a pooled HTTP connection set.
#[derive(Debug, Clone)]
pub struct TwirpClient {
    http: reqwest::Client,
    url: Url,
}

impl TwirpClient {
    pub fn new(endpoint: &Url, service_path: &str) -> Result<Self, TransportError> {
        // Joining onto a path without a trailing slash would replace its
        // last segment.
        let mut base = endpoint.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base.join(service_path.trim_start_matches('/'))?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl SearchClient for TwirpClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let body = sonic_rs::to_vec(request).map_err(TransportError::Encode)?;

        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let (code, msg) = match sonic_rs::from_slice::<TwirpErrorBody>(&bytes) {
                Ok(error) => (error.code, error.msg),
                Err(_) => (
                    "unknown".to_string(),
                    String::from_utf8_lossy(&bytes).into_owned(),
                ),
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                code,
                msg,
            });
        }

        sonic_rs::from_slice(&bytes).map_err(TransportError::Decode)
    }
}
