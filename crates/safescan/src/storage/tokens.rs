//! Backing store operations: published profiles, emergency tokens and the
//! scan access log.
//!
//! Tokens are opaque random strings handed out once; only their BLAKE3 hash
//! is kept, so a copy of the database cannot be used to mint scan links.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, Storage};
use crate::error::{Error, Result};
use crate::profile::{EmergencyProfile, Profile};

/// A freshly issued token. The plain token is only available here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Row id of the token.
    pub id: i64,
    /// The opaque token to embed in links.
    pub token: String,
    /// When the token stops resolving.
    pub expires_at: DateTime<Utc>,
}

/// A stored token, found by its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Row id of the token.
    pub id: i64,
    /// The user the token resolves to.
    pub user_id: String,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// When the token stops resolving.
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// One entry of the scan access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Row id.
    pub id: i64,
    /// The user whose profile was shown.
    pub user_id: String,
    /// The token that was scanned.
    pub token_id: i64,
    /// Best-effort address of the scanner.
    pub scanner_ip: String,
    /// When the scan happened.
    pub scanned_at: DateTime<Utc>,
}

/// Hash a token for storage and lookup.
#[must_use]
pub fn token_hash(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// A short, log-safe prefix of a token.
#[must_use]
pub fn token_prefix(token: &str) -> &str {
    token.get(..6).unwrap_or(token)
}

impl Storage {
    /// Publish (or replace) the full profile for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn publish_profile(&self, user_id: &str, profile: &EmergencyProfile) -> Result<()> {
        let body = serde_json::to_string(profile)?;
        self.conn.execute(
            r"
            INSERT INTO published_profiles (user_id, body, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            ",
            params![user_id, body, format_timestamp(Utc::now())],
        )?;
        info!("Published emergency profile for user {}", user_id);
        Ok(())
    }

    /// Get the published profile for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored body
    /// is corrupt.
    pub fn published_profile(&self, user_id: &str) -> Result<Option<EmergencyProfile>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM published_profiles WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    /// Publish `profile` for `user_id`, drop expired tokens and issue a
    /// fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is invalid or a database operation
    /// fails.
    pub fn publish_and_issue(
        &self,
        user_id: &str,
        profile: &Profile,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        profile.validate()?;
        self.publish_profile(user_id, &EmergencyProfile::from(profile))?;
        self.prune_expired_tokens(Utc::now())?;
        self.issue_token(user_id, ttl)
    }

    /// Issue a new token for `user_id` that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn issue_token(&self, user_id: &str, ttl: Duration) -> Result<IssuedToken> {
        self.issue_token_at(user_id, Utc::now(), ttl)
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if `now + ttl` is out of range or the database
    /// operation fails.
    pub fn issue_token_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::config(format!("token TTL too large: {ttl}")))?;
        let token = Uuid::new_v4().simple().to_string();
        self.conn.execute(
            r"
            INSERT INTO emergency_tokens (token_hash, user_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                token_hash(&token),
                user_id,
                format_timestamp(now),
                format_timestamp(expires_at)
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(
            "Issued token {}… (id {}) for user {}, expires {}",
            token_prefix(&token),
            id,
            user_id,
            expires_at
        );
        Ok(IssuedToken {
            id,
            token,
            expires_at,
        })
    }

    /// Find a token by its plain value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_token(&self, token: &str) -> Result<Option<TokenRecord>> {
        let row = self
            .conn
            .query_row(
                r"
                SELECT id, user_id, created_at, expires_at
                FROM emergency_tokens WHERE token_hash = ?1
                ",
                [token_hash(token)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, user_id, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let (Some(created_at), Some(expires_at)) =
            (parse_timestamp(&created_at), parse_timestamp(&expires_at))
        else {
            warn!("Token {} has unreadable timestamps", id);
            return Err(Error::internal(format!("token {id} has unreadable timestamps")));
        };
        Ok(Some(TokenRecord {
            id,
            user_id,
            created_at,
            expires_at,
        }))
    }

    /// Delete tokens that expired before `now`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM emergency_tokens WHERE expires_at < ?1",
            [format_timestamp(now)],
        )?;
        if affected > 0 {
            info!("Pruned {} expired tokens", affected);
        }
        Ok(affected)
    }

    /// Append an entry to the scan access log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_scan(&self, user_id: &str, token_id: i64, scanner_ip: &str) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO scan_logs (user_id, token_id, scanner_ip, scanned_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![user_id, token_id, scanner_ip, format_timestamp(Utc::now())],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The most recent scans of `user_id`'s profile, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_scans(&self, user_id: &str, limit: usize) -> Result<Vec<ScanRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, user_id, token_id, scanner_ip, scanned_at
            FROM scan_logs WHERE user_id = ?1
            ORDER BY scanned_at DESC, id DESC LIMIT ?2
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let scans = stmt
            .query_map(params![user_id, limit_i64], |row| {
                let scanned_at: String = row.get(4)?;
                Ok(ScanRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    token_id: row.get(2)?,
                    scanner_ip: row.get(3)?,
                    scanned_at: parse_timestamp(&scanned_at).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(scans)
    }
}
