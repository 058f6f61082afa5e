//! REST API access for the admin backend.
//!
//! This module provides the `Gateway` for making authenticated requests.
//! The backend authenticates with short-lived JWT bearer tokens; when one
//! expires the gateway renews it from the HTTP-only refresh cookie and
//! replays the rejected requests.

pub mod error;
pub mod gateway;
pub mod request;
pub mod transport;

pub use error::{ApiError, TransportError};
pub use gateway::{Gateway, GatewayBuilder, RequestFilter};
pub use request::{ApiRequest, ApiResponse, Attempt};
pub use transport::{HttpTransport, Transport};
