//! HTTP-facing components
//!
//! - Prober: bounded-time liveness checks for configured servers
//! - Auth: bearer-token requests with refresh-once retry

pub mod auth;
pub mod prober;

pub use auth::{AuthError, AuthTokens, AuthorizedClient, OAuthRefresher, TokenRefresher, TokenVault};
pub use prober::{HttpProber, Probe};
