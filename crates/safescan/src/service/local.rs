//! Token lookup answered from the local backing store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::{LookupError, ResolutionService};
use crate::profile::EmergencyProfile;
use crate::storage::tokens::token_prefix;
use crate::storage::Storage;

/// Shown for fields the published profile left blank.
const UNKNOWN: &str = "Unknown";

/// Recorded when the scanner's address is not known.
pub const UNKNOWN_SCANNER: &str = "unknown";

/// Resolves tokens against a shared [`Storage`].
#[derive(Debug, Clone)]
pub struct LocalResolutionService {
    storage: Arc<Mutex<Storage>>,
}

impl LocalResolutionService {
    /// Wrap a shared storage handle.
    #[must_use]
    pub fn new(storage: Arc<Mutex<Storage>>) -> Self {
        Self { storage }
    }

    /// The shared storage handle.
    #[must_use]
    pub fn storage(&self) -> &Arc<Mutex<Storage>> {
        &self.storage
    }

    /// Resolve `token`, recording the scan against `scanner_ip`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::MissingToken`] for an empty token
    /// - [`LookupError::NotFound`] for an unknown token
    /// - [`LookupError::Expired`] once the token's expiry has passed
    /// - [`LookupError::Internal`] if the store fails
    ///
    /// A token whose user has no published profile answers with `"Unknown"`
    /// fields.
    pub fn lookup_from(
        &self,
        token: &str,
        scanner_ip: &str,
    ) -> Result<EmergencyProfile, LookupError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(LookupError::MissingToken);
        }

        let storage = self.storage.lock().map_err(|_| {
            error!("Storage lock poisoned");
            LookupError::Internal(500)
        })?;

        let record = storage
            .find_token(token)
            .map_err(|e| internal("token lookup", &e))?
            .ok_or_else(|| {
                debug!("Unknown token {}…", token_prefix(token));
                LookupError::NotFound
            })?;

        if record.is_expired_at(Utc::now()) {
            info!("Token {} expired at {}", record.id, record.expires_at);
            return Err(LookupError::Expired);
        }

        let mut profile = storage
            .published_profile(&record.user_id)
            .map_err(|e| internal("profile fetch", &e))?
            .unwrap_or_else(|| {
                warn!(
                    "Token {} points at user {} with no published profile",
                    record.id, record.user_id
                );
                EmergencyProfile::default()
            });

        if profile.full_name.is_empty() {
            profile.full_name = UNKNOWN.to_string();
        }
        if profile.blood_group.is_empty() {
            profile.blood_group = UNKNOWN.to_string();
        }

        if let Err(e) = storage.record_scan(&record.user_id, record.id, scanner_ip) {
            warn!("Failed to record scan of token {}: {}", record.id, e);
        } else {
            info!("Token {} scanned from {}", record.id, scanner_ip);
        }

        Ok(profile)
    }
}

fn internal(what: &str, err: &crate::error::Error) -> LookupError {
    error!("{} failed: {}", what, err);
    LookupError::Internal(500)
}

#[async_trait]
impl ResolutionService for LocalResolutionService {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn lookup(&self, token: &str) -> Result<EmergencyProfile, LookupError> {
        self.lookup_from(token, UNKNOWN_SCANNER)
    }
}
