//! The wire underneath the gateway.
//!
//! [`Transport`] sends exactly one request and reports exactly what came
//! back. It knows nothing about renewal or retries.

use std::future::Future;

use reqwest::{header, Client};
use tracing::debug;

use super::{ApiRequest, ApiResponse, TransportError};
use crate::auth::AccessToken;
use crate::config::GatewayConfig;

pub trait Transport: Send + Sync + 'static {
    /// Dispatch `request`, attaching `credential` as a bearer token if given.
    fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&AccessToken>,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// reqwest-backed transport. Keeps a cookie store so the backend's
/// HTTP-only refresh cookie travels with renewal calls.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: GatewayConfig,
}

impl HttpTransport {
    pub fn new(config: &GatewayConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&AccessToken>,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.config.url_for(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::CONTENT_TYPE, "application/json")
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = credential {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
