//! Wire types exchanged with the admin backend.

mod auth;
mod page;

pub use auth::{Admin, LoginRequest, PasswordResetConfirmRequest, PasswordResetRequest, TokenResponse};
pub use page::Page;
