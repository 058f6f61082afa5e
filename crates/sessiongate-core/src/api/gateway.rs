//! Authenticated request gateway.
//!
//! This module provides the `Gateway` struct through which every backend
//! call flows. It attaches the in-memory access credential, and when the
//! backend rejects it, renews the session once for the whole batch of
//! rejected requests and replays each of them a single time.

use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::transport::{HttpTransport, Transport};
use super::{ApiError, ApiRequest, ApiResponse, Attempt, TransportError};
use crate::auth::session::Session;
use crate::auth::{AccessToken, ReauthHook, RenewalError, RenewalOutcome};
use crate::config::GatewayConfig;
use crate::models::{
    Admin, LoginRequest, Page, PasswordResetConfirmRequest, PasswordResetRequest, TokenResponse,
};

/// Decides which requests bypass renewal entirely.
pub type RequestFilter = Arc<dyn Fn(&ApiRequest) -> bool + Send + Sync>;

struct Inner<T> {
    transport: T,
    config: GatewayConfig,
    session: Session,
    excluded: RequestFilter,
}

/// Gateway to the admin backend.
/// Clone is cheap - all clones share one credential and one renewal.
pub struct Gateway<T = HttpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Gateway<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct GatewayBuilder<T> {
    config: GatewayConfig,
    transport: T,
    reauth: Option<ReauthHook>,
    excluded: Option<RequestFilter>,
}

impl<T: Transport> GatewayBuilder<T> {
    /// Called once for every renewal that fails terminally.
    pub fn on_reauthenticate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RenewalError) + Send + Sync + 'static,
    {
        self.reauth = Some(Arc::new(hook));
        self
    }

    /// Replace the default exclusion policy (session endpoints plus the
    /// configured prefixes).
    pub fn exclude_when<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ApiRequest) -> bool + Send + Sync + 'static,
    {
        self.excluded = Some(Arc::new(filter));
        self
    }

    pub fn build(self) -> Gateway<T> {
        let excluded = self.excluded.unwrap_or_else(|| {
            let config = self.config.clone();
            Arc::new(move |request: &ApiRequest| config.is_retry_excluded(&request.path))
        });

        Gateway {
            inner: Arc::new(Inner {
                transport: self.transport,
                config: self.config,
                session: Session::new(self.reauth),
                excluded,
            }),
        }
    }
}

impl Gateway<HttpTransport> {
    /// Gateway over HTTP with default policies.
    pub fn new(config: GatewayConfig) -> Result<Self, TransportError> {
        Ok(Self::http_builder(config)?.build())
    }

    pub fn http_builder(config: GatewayConfig) -> Result<GatewayBuilder<HttpTransport>, TransportError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::builder(config, transport))
    }
}

impl<T: Transport> Gateway<T> {
    pub fn builder(config: GatewayConfig, transport: T) -> GatewayBuilder<T> {
        GatewayBuilder {
            config,
            transport,
            reauth: None,
            excluded: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Hand the gateway a credential obtained out of band.
    pub fn set_credential(&self, token: impl Into<AccessToken>) {
        self.inner.session.set_credential(token.into());
    }

    pub fn has_credential(&self) -> bool {
        self.inner.session.has_credential()
    }

    pub fn is_renewing(&self) -> bool {
        self.inner.session.is_renewing()
    }

    fn is_auth_rejected(&self, status: StatusCode) -> bool {
        status.as_u16() == self.inner.config.auth_rejected_status
    }

    /// Map a non-success response to an error.
    fn check_response(&self, response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else if self.is_auth_rejected(response.status) {
            Err(ApiError::Unauthorized)
        } else {
            Err(ApiError::from_status(response))
        }
    }

    /// Send a request with the current credential.
    ///
    /// A rejected credential is renewed (sharing any renewal already in
    /// flight) and the request is sent one more time. A second rejection is
    /// returned as [`ApiError::Unauthorized`]; every other failure is
    /// returned as-is without retrying.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if (self.inner.excluded)(&request) {
            return self.send_once(&request).await;
        }

        let snapshot = self.inner.session.snapshot();
        let mut credential = snapshot.token;
        let mut attempt = Attempt::First;

        loop {
            debug!(
                method = %request.method,
                path = %request.path,
                ?attempt,
                authenticated = credential.is_some(),
                "Dispatching request"
            );
            let response = self
                .inner
                .transport
                .dispatch(&request, credential.as_ref())
                .await?;

            if !self.is_auth_rejected(response.status) {
                return self.check_response(response);
            }

            attempt = match attempt.next() {
                Some(next) => next,
                None => {
                    warn!(path = %request.path, "Credential rejected again after renewal");
                    return Err(ApiError::Unauthorized);
                }
            };
            debug!(path = %request.path, "Credential rejected, renewing");
            credential = Some(self.credential_for_retry(snapshot.generation).await?);
        }
    }

    /// Send without any renewal handling.
    async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let credential = self.inner.session.snapshot().token;
        let response = self
            .inner
            .transport
            .dispatch(request, credential.as_ref())
            .await?;
        self.check_response(response)
    }

    /// Credential to retry with after a rejection of a request sent under
    /// `generation`. A renewal that settled while the request was on the wire
    /// answers it directly: its credential is reused, and its failure is
    /// returned without renewing again.
    async fn credential_for_retry(&self, generation: u64) -> Result<AccessToken, RenewalError> {
        match self.inner.session.settled_since(generation) {
            Some(outcome) => {
                debug!(renewed = outcome.is_ok(), "Session settled while request was in flight");
                outcome
            }
            None => self.renew().await,
        }
    }

    /// Renew the access credential from the backend's session cookie.
    ///
    /// Only one renewal runs at a time: concurrent callers wait for the one
    /// in flight and all receive its outcome. The renewal runs as its own
    /// task, so it completes even if every caller stops waiting.
    pub async fn renew(&self) -> Result<AccessToken, RenewalError> {
        let (settled, leader) = self.inner.session.register_renewal();
        match leader {
            Some(epoch) => {
                let guard = SettleGuard {
                    inner: Arc::clone(&self.inner),
                    epoch,
                    armed: true,
                };
                tokio::spawn(async move {
                    let outcome = guard.inner.perform_renewal().await;
                    guard.settle(outcome);
                });
            }
            None => debug!("Joining renewal already in flight"),
        }
        settled.await.unwrap_or(Err(RenewalError::Abandoned))
    }

    /// Re-establish a session after startup, when no credential is held.
    pub async fn restore_session(&self) -> Result<(), RenewalError> {
        if self.has_credential() {
            return Ok(());
        }
        self.renew().await.map(|_| ())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = ApiRequest::post(&self.inner.config.endpoints.login).json(&body)?;
        let token: TokenResponse = self.send_once(&request).await?.json()?;
        self.set_credential(token.access_token);
        info!(email, "Logged in");
        Ok(())
    }

    /// Invalidate the session server-side and forget it locally. Local state
    /// is cleared even when the logout call fails.
    pub async fn logout(&self) {
        let request = ApiRequest::post(&self.inner.config.endpoints.logout);
        if let Err(e) = self.send_once(&request).await {
            debug!(error = %e, "Logout call failed, clearing local session anyway");
        }
        self.inner.session.end();
        info!("Logged out");
    }

    pub async fn current_admin(&self) -> Result<Admin, ApiError> {
        self.get_json(&self.inner.config.endpoints.me).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        self.send(ApiRequest::post(&self.inner.config.endpoints.password_reset).json(&body)?)
            .await?;
        Ok(())
    }

    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let body = PasswordResetConfirmRequest {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        let request =
            ApiRequest::post(&self.inner.config.endpoints.password_reset_confirm).json(&body)?;
        self.send(request).await?;
        Ok(())
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    /// Stream the pages of a cursor-paginated collection. Every page after
    /// the first is requested with `cursor=<nextCursor>`.
    pub fn pages<'a, R>(&'a self, path: &str) -> impl Stream<Item = Result<Page<R>, ApiError>> + 'a
    where
        R: DeserializeOwned + 'a,
    {
        let path = path.to_string();
        stream::try_unfold(Some(None::<u64>), move |state| {
            let path = path.clone();
            async move {
                let Some(cursor) = state else {
                    return Ok(None);
                };
                let mut request = ApiRequest::get(path);
                if let Some(cursor) = cursor {
                    request = request.query("cursor", cursor);
                }
                let page: Page<R> = self.send(request).await?.json()?;
                let next = page.next_cursor.map(Some);
                Ok::<_, ApiError>(Some((page, next)))
            }
        })
    }

    /// Every item of a cursor-paginated collection.
    pub async fn fetch_all<R: DeserializeOwned>(&self, path: &str) -> Result<Vec<R>, ApiError> {
        self.pages(path).map_ok(|page| page.data).try_concat().await
    }
}

/// Owned by the renewal task. If the task unwinds or is dropped before
/// reporting, its waiters are released with [`RenewalError::Abandoned`].
struct SettleGuard<T> {
    inner: Arc<Inner<T>>,
    epoch: u64,
    armed: bool,
}

impl<T> SettleGuard<T> {
    fn settle(mut self, outcome: RenewalOutcome) {
        self.armed = false;
        self.inner.session.settle(self.epoch, outcome);
    }
}

impl<T> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            warn!(epoch = self.epoch, "Renewal task stopped before settling");
            self.inner.session.settle(self.epoch, Err(RenewalError::Abandoned));
        }
    }
}

impl<T: Transport> Inner<T> {
    /// The one renewal call. Never goes through `send`, so a rejection here
    /// cannot trigger another renewal.
    async fn perform_renewal(&self) -> RenewalOutcome {
        let request = ApiRequest::post(&self.config.endpoints.refresh);
        let timeout = self.config.renewal_timeout();
        debug!(path = %request.path, ?timeout, "Renewing session");

        let response = match tokio::time::timeout(timeout, self.transport.dispatch(&request, None)).await {
            Err(_) => return Err(RenewalError::TimedOut(timeout)),
            Ok(Err(e)) => return Err(RenewalError::Transport(Arc::new(e))),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(RenewalError::Rejected {
                status: response.status.as_u16(),
            });
        }

        let body: TokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(RenewalError::InvalidResponse("empty access token".to_string()));
        }
        Ok(AccessToken::new(body.access_token))
    }
}
