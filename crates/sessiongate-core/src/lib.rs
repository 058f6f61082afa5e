//! # SessionGate core
//!
//! Client-side access to the storefront admin API.
//!
//! The main entry point is [`Gateway`]. It sends every request with the
//! current access token and renews the session transparently when the token
//! expires, with concurrent rejections sharing a single renewal.
//! [`GatewayConfig`] holds the backend URL, timeouts and session endpoint
//! paths. Failures are reported as [`ApiError`] or [`RenewalError`], and
//! [`ApiError::requires_login`] tells whether the user has to log in again.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use sessiongate_core::{ApiRequest, Gateway, GatewayConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::http_builder(GatewayConfig::load()?)?
//!     .on_reauthenticate(|err| eprintln!("session expired ({err}), please log in"))
//!     .build();
//!
//! gateway.login("admin@shop.example", "secret").await?;
//! let products: serde_json::Value = gateway.get_json("/products").await?;
//! # let _ = (products, ApiRequest::get("/brands"));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiRequest, ApiResponse, Gateway, Transport, TransportError};
pub use auth::{AccessToken, RenewalError};
pub use config::{ConfigError, GatewayConfig};
pub use models::{Admin, Page};
