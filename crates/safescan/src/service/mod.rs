//! Token resolution.
//!
//! A [`ResolutionService`] turns an opaque token into a full
//! [`EmergencyProfile`], enforcing expiry and recording the access. Two
//! implementations are provided:
//!
//! - [`HttpResolutionService`] calls a remote endpoint
//!   (`GET <base>?token=…` with an `apikey` header);
//! - [`LocalResolutionService`] answers from the local [`crate::Storage`],
//!   and backs the HTTP endpoint in [`server`].

pub mod http;
pub mod local;
pub mod server;

use async_trait::async_trait;
use thiserror::Error;

use crate::profile::EmergencyProfile;

pub use http::HttpResolutionService;
pub use local::LocalResolutionService;

/// Why a token lookup did not produce a profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Transport(String),

    /// The service reported that no token was sent (400).
    #[error("token missing")]
    MissingToken,

    /// The token is unknown (404).
    #[error("token not found")]
    NotFound,

    /// The token exists but has expired (410).
    #[error("token expired")]
    Expired,

    /// The API key was rejected (401/403).
    #[error("request not authorized")]
    Unauthorized,

    /// The service failed internally (5xx).
    #[error("service error (status {0})")]
    Internal(u16),

    /// Any other non-success status.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    /// The success body was not a profile.
    #[error("malformed response body: {0}")]
    MalformedBody(String),

    /// The success body had no name to show.
    #[error("response has no full name")]
    Incomplete,
}

impl LookupError {
    /// Map a non-success HTTP status to a lookup error.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::MissingToken,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            410 => Self::Expired,
            500..=599 => Self::Internal(status),
            other => Self::UnexpectedStatus(other),
        }
    }

    /// The HTTP status a server should answer with for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingToken => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Expired => 410,
            Self::Internal(status) | Self::UnexpectedStatus(status) => *status,
            Self::Transport(_) | Self::MalformedBody(_) | Self::Incomplete => 500,
        }
    }

    /// The short message put in an error response body.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingToken => "Token required",
            Self::Unauthorized => "Invalid API key",
            Self::NotFound => "Invalid or expired token",
            Self::Expired => "Token expired",
            _ => "Internal error",
        }
    }
}

/// Look up the profile behind a token.
#[async_trait]
pub trait ResolutionService: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Resolve `token` to a profile.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] for every outcome other than a usable
    /// profile, including bodies without a full name.
    async fn lookup(&self, token: &str) -> Result<EmergencyProfile, LookupError>;
}

#[async_trait]
impl<S: ResolutionService + ?Sized> ResolutionService for std::sync::Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn lookup(&self, token: &str) -> Result<EmergencyProfile, LookupError> {
        (**self).lookup(token).await
    }
}

/// Reject profiles that have nothing to show.
pub(crate) fn require_name(profile: EmergencyProfile) -> Result<EmergencyProfile, LookupError> {
    if profile.full_name.is_empty() {
        Err(LookupError::Incomplete)
    } else {
        Ok(profile)
    }
}
