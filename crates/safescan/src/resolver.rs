//! The emergency resolver.
//!
//! Given what a scanned link carried (an optional token and an optional
//! offline fragment) the resolver picks a strategy, performs at most one
//! online lookup and at most one offline decode, and ends in exactly one
//! terminal [`Resolution`]. Nothing but the profile or the generic
//! [`INVALID_TITLE`] message is meant to reach the responder.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{decode_fragment, CodecError};
use crate::profile::EmergencyProfile;
use crate::service::{LookupError, ResolutionService};
use crate::storage::tokens::token_prefix;

/// Heading shown when nothing could be resolved.
pub const INVALID_TITLE: &str = "Invalid Emergency Profile";

/// Detail shown when nothing could be resolved.
pub const INVALID_DETAIL: &str = "This QR code may be expired or damaged.";

/// Base for parsing bare paths like `/emergency?token=…`.
const RELATIVE_BASE: &str = "http://localhost";

/// What a scanned link carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanInput {
    /// The `token` query parameter.
    pub token: Option<String>,
    /// The URL fragment, without the leading `#`.
    pub fragment: Option<String>,
}

impl ScanInput {
    /// Build an input, treating empty values as absent.
    #[must_use]
    pub fn new(token: Option<String>, fragment: Option<String>) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        Self {
            token: present(token),
            fragment: present(fragment),
        }
    }

    /// Extract the token and fragment from an absolute URL or a bare path.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a URL even relative to a base.
    pub fn from_url(raw: &str) -> Result<Self, url::ParseError> {
        let raw = raw.trim();
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)?.join(raw)?,
            Err(e) => return Err(e),
        };

        let token = url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned());
        let fragment = url.fragment().map(str::to_string);
        Ok(Self::new(token, fragment))
    }
}

/// How a scan will be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Ask the resolution service, keeping the fragment as a fallback.
    OnlineLookup {
        /// The token to look up.
        token: String,
        /// Offline payload to decode if the lookup fails.
        fallback: Option<String>,
    },
    /// Decode the embedded payload.
    DirectDecode {
        /// The offline payload.
        fragment: String,
    },
    /// Nothing to work with.
    NoData,
}

impl Strategy {
    /// Choose a strategy. A token always takes priority over a fragment.
    #[must_use]
    pub fn determine(input: &ScanInput) -> Self {
        match (&input.token, &input.fragment) {
            (Some(token), fallback) => Self::OnlineLookup {
                token: token.clone(),
                fallback: fallback.clone(),
            },
            (None, Some(fragment)) => Self::DirectDecode {
                fragment: fragment.clone(),
            },
            (None, None) => Self::NoData,
        }
    }
}

/// Where a resolved profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// The resolution service.
    Online,
    /// The payload embedded in the link.
    Embedded,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Embedded => "embedded",
        })
    }
}

/// Why a scan could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The link carried neither a token nor a fragment.
    #[error("no token or embedded profile")]
    MissingInput,
    /// The lookup failed and there was no fallback.
    #[error("lookup failed: {0}")]
    LookupFailed(LookupError),
    /// The embedded payload could not be decoded.
    #[error("embedded profile unreadable: {0}")]
    DecodeFailed(CodecError),
}

/// The lifecycle of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// Inspecting the input.
    DeterminingStrategy,
    /// Waiting for the resolution service.
    Loading,
    /// A profile is ready to show.
    Resolved,
    /// Show the generic invalid message.
    Error,
}

/// The terminal outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A profile was resolved directly.
    Resolved {
        /// The profile to show.
        profile: EmergencyProfile,
        /// Where it came from.
        source: ProfileSource,
    },
    /// The lookup failed but the embedded payload decoded.
    FellBackToOffline {
        /// The embedded profile.
        profile: EmergencyProfile,
        /// Why the lookup failed.
        cause: LookupError,
    },
    /// Nothing could be shown.
    Failed(FailureReason),
}

impl Resolution {
    /// The terminal state this outcome maps to.
    #[must_use]
    pub fn state(&self) -> ResolverState {
        match self {
            Self::Resolved { .. } | Self::FellBackToOffline { .. } => ResolverState::Resolved,
            Self::Failed(_) => ResolverState::Error,
        }
    }

    /// The profile to show, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&EmergencyProfile> {
        match self {
            Self::Resolved { profile, .. } | Self::FellBackToOffline { profile, .. } => {
                Some(profile)
            }
            Self::Failed(_) => None,
        }
    }

    /// Take the profile out, if any.
    #[must_use]
    pub fn into_profile(self) -> Option<EmergencyProfile> {
        match self {
            Self::Resolved { profile, .. } | Self::FellBackToOffline { profile, .. } => {
                Some(profile)
            }
            Self::Failed(_) => None,
        }
    }

    /// Where the shown profile came from.
    #[must_use]
    pub fn source(&self) -> Option<ProfileSource> {
        match self {
            Self::Resolved { source, .. } => Some(*source),
            Self::FellBackToOffline { .. } => Some(ProfileSource::Embedded),
            Self::Failed(_) => None,
        }
    }

    /// The title and detail for the responder when nothing resolved.
    #[must_use]
    pub fn user_message(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Failed(_) => Some((INVALID_TITLE, INVALID_DETAIL)),
            _ => None,
        }
    }
}

/// Resolves scans against a [`ResolutionService`].
#[derive(Debug, Clone)]
pub struct EmergencyResolver<S> {
    service: S,
}

impl<S: ResolutionService> EmergencyResolver<S> {
    /// Create a resolver using `service` for online lookups.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Resolve a scan.
    pub async fn resolve(&self, input: &ScanInput) -> Resolution {
        self.resolve_observed(input, |_| {}).await
    }

    /// Resolve a scan, reporting each state the resolver passes through.
    pub async fn resolve_observed<F>(&self, input: &ScanInput, mut on_state: F) -> Resolution
    where
        F: FnMut(ResolverState) + Send,
    {
        on_state(ResolverState::DeterminingStrategy);
        let strategy = Strategy::determine(input);
        debug!("Resolving scan with strategy {}", strategy_name(&strategy));

        let resolution = match strategy {
            Strategy::NoData => {
                warn!("Scan carried neither a token nor an embedded profile");
                Resolution::Failed(FailureReason::MissingInput)
            }
            Strategy::DirectDecode { fragment } => direct_decode(&fragment, None),
            Strategy::OnlineLookup { token, fallback } => {
                on_state(ResolverState::Loading);
                info!(
                    "Looking up token {}… via {} service",
                    token_prefix(&token),
                    self.service.name()
                );
                match self.service.lookup(&token).await {
                    Ok(profile) => Resolution::Resolved {
                        profile,
                        source: ProfileSource::Online,
                    },
                    Err(cause) => match fallback {
                        Some(fragment) => {
                            warn!("Lookup failed ({}), falling back to embedded profile", cause);
                            direct_decode(&fragment, Some(cause))
                        }
                        None => {
                            warn!("Lookup failed ({}) with no embedded profile", cause);
                            Resolution::Failed(FailureReason::LookupFailed(cause))
                        }
                    },
                }
            }
        };

        info!(
            "Resolution finished in state {:?} (source {})",
            resolution.state(),
            resolution
                .source()
                .map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        on_state(resolution.state());
        resolution
    }
}

fn strategy_name(strategy: &Strategy) -> &'static str {
    match strategy {
        Strategy::OnlineLookup { fallback: Some(_), .. } => "online+fallback",
        Strategy::OnlineLookup { fallback: None, .. } => "online",
        Strategy::DirectDecode { .. } => "direct",
        Strategy::NoData => "none",
    }
}

fn direct_decode(fragment: &str, lookup_failure: Option<LookupError>) -> Resolution {
    match (decode_fragment(fragment), lookup_failure) {
        (Ok(profile), None) => Resolution::Resolved {
            profile,
            source: ProfileSource::Embedded,
        },
        (Ok(profile), Some(cause)) => Resolution::FellBackToOffline { profile, cause },
        (Err(e), _) => {
            warn!("Embedded profile could not be decoded: {}", e);
            Resolution::Failed(FailureReason::DecodeFailed(e))
        }
    }
}
