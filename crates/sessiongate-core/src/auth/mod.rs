//! Session state for the gateway.
//!
//! This module provides:
//! - `AccessToken`: the in-memory bearer credential
//! - `Session`: the credential plus single-flight renewal bookkeeping
//! - `RenewalError`: why a renewal failed, shared by every waiter
//!
//! Nothing here is persisted; a restarted process starts logged out and
//! must restore its session from the backend's refresh cookie.

pub mod credential;
pub mod renewal;
pub(crate) mod session;

pub use credential::AccessToken;
pub use renewal::{ReauthHook, RenewalError, RenewalOutcome};
