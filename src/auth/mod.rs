//! OAuth credentials for connected mailboxes.
//!
//! - [`OAuthClient`]: authorization URLs, code exchange and refresh against
//!   Google and Microsoft identity platforms
//! - [`TokenManager`]: keeps an account's access token fresh and persists
//!   rotated credentials

mod oauth;
mod token_manager;

pub use oauth::{OAuthClient, OAuthClients};
pub use token_manager::{RefreshedToken, TokenManager, TokenRefresher, TokenStorage};

#[cfg(test)]
pub use token_manager::MockTokenRefresher;

use thiserror::Error;

use crate::domain::AccountId;

/// Errors from OAuth flows and token maintenance.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No OAuth client is registered for the provider.
    #[error("no OAuth client configured for {0}")]
    MissingClientConfig(String),

    /// The account has no refresh token, so it must be reconnected.
    #[error("account {0} has no refresh token")]
    MissingRefreshToken(AccountId),

    /// An authorization, token or redirect URL could not be parsed.
    #[error("invalid OAuth endpoint: {0}")]
    InvalidEndpoint(String),

    /// The token endpoint rejected the request or could not be reached.
    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),

    /// Rotated tokens could not be saved.
    #[error("failed to persist tokens: {0}")]
    Storage(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
