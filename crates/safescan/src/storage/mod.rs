//! Storage layer for safescan.
//!
//! This module provides `SQLite`-based persistence for the single local
//! emergency profile ([`ProfileRepository`]) and for the backing store that
//! answers token lookups (published profiles, tokens and scan logs, see
//! [`tokens`]).

pub mod migrations;
pub mod schema;
pub mod tokens;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::profile::Profile;

pub use tokens::{IssuedToken, ScanRecord, TokenRecord};

/// Name of the record holding the local emergency profile.
pub const PROFILE_RECORD: &str = "safescan_profile";

/// Load and save the one emergency profile.
///
/// Injected into every command that reads or writes the profile. Saves
/// replace the record wholesale; there is no read-modify-write guarantee and
/// the last writer wins.
pub trait ProfileRepository {
    /// Load the saved profile, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read or the record is
    /// corrupt.
    fn load(&self) -> Result<Option<Profile>>;

    /// Replace the saved profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProfile`] for an invalid profile, or a storage
    /// error if the write fails.
    fn save(&self, profile: &Profile) -> Result<()>;

    /// Load the saved profile or fail with [`Error::ProfileNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] if nothing was saved yet.
    fn require(&self) -> Result<Profile> {
        self.load()?.ok_or(Error::ProfileNotFound)
    }
}

/// `SQLite` database shared by the profile store and the backing store.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the local profile was last saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn profile_saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        let saved: Option<String> = self
            .conn
            .query_row(
                "SELECT saved_at FROM profile_records WHERE name = ?1",
                [PROFILE_RECORD],
                |row| row.get(0),
            )
            .optional()?;
        Ok(saved.as_deref().and_then(parse_timestamp))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        let now = format_timestamp(Utc::now());
        let active_tokens: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM emergency_tokens WHERE expires_at >= ?1",
            [now],
            |row| row.get(0),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            profile_saved_at: self.profile_saved_at()?,
            published_profiles: count("SELECT COUNT(*) FROM published_profiles")?,
            total_tokens: count("SELECT COUNT(*) FROM emergency_tokens")?,
            active_tokens,
            total_scans: count("SELECT COUNT(*) FROM scan_logs")?,
            db_size_bytes,
        })
    }
}

impl ProfileRepository for Storage {
    fn load(&self) -> Result<Option<Profile>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM profile_records WHERE name = ?1",
                [PROFILE_RECORD],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        let body = serde_json::to_string(profile)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO profile_records (name, body, saved_at) VALUES (?1, ?2, ?3)",
            params![PROFILE_RECORD, body, format_timestamp(Utc::now())],
        )?;
        debug!("Saved emergency profile for {}", profile.full_name);
        Ok(())
    }
}

/// An in-memory profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    record: Mutex<Option<Profile>>,
}

impl MemoryProfileStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileRepository for MemoryProfileStore {
    fn load(&self) -> Result<Option<Profile>> {
        Ok(self
            .record
            .lock()
            .map_err(|_| Error::internal("profile store lock poisoned"))?
            .clone())
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        *self
            .record
            .lock()
            .map_err(|_| Error::internal("profile store lock poisoned"))? = Some(profile.clone());
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// When the local profile was last saved.
    pub profile_saved_at: Option<DateTime<Utc>>,
    /// Number of profiles published to the backing store.
    pub published_profiles: i64,
    /// Number of tokens ever issued and not pruned.
    pub total_tokens: i64,
    /// Number of tokens that have not expired.
    pub active_tokens: i64,
    /// Number of recorded scans.
    pub total_scans: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Fixed-width UTC timestamps, so text comparison in SQL orders correctly.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BloodGroup, Contact};

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn jane() -> Profile {
        Profile::new(
            "Jane Doe",
            BloodGroup::ONegative,
            vec![Contact::new("Sam", "555-1234")],
        )
    }

    #[test]
    fn test_open_in_memory() {
        assert!(Storage::open_in_memory().is_ok());
    }

    #[test]
    fn test_load_empty() {
        let storage = create_test_storage();
        assert!(storage.load().unwrap().is_none());
        assert!(storage.require().unwrap_err().is_profile_not_found());
    }

    #[test]
    fn test_save_and_load() {
        let storage = create_test_storage();
        let profile = jane();
        storage.save(&profile).unwrap();

        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(storage.profile_saved_at().unwrap().is_some());
    }

    #[test]
    fn test_save_replaces_wholesale() {
        let storage = create_test_storage();
        let mut first = jane();
        first.allergies = vec!["Latex".into()];
        storage.save(&first).unwrap();

        let second = Profile::new(
            "John Roe",
            BloodGroup::APositive,
            vec![Contact::new("Kim", "555-9999")],
        );
        storage.save(&second).unwrap();

        let loaded = storage.require().unwrap();
        assert_eq!(loaded.full_name, "John Roe");
        assert!(loaded.allergies.is_empty());
    }

    #[test]
    fn test_save_rejects_invalid_profile() {
        let storage = create_test_storage();
        let mut profile = jane();
        profile.contacts.clear();
        assert!(storage.save(&profile).is_err());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let storage = create_test_storage();
        storage
            .conn
            .execute(
                "INSERT INTO profile_records (name, body, saved_at) VALUES (?1, '{bad', '')",
                [PROFILE_RECORD],
            )
            .unwrap();
        assert!(matches!(storage.load(), Err(Error::Json(_))));
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("safescan.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.save(&jane()).unwrap();
        }
        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.require().unwrap().full_name, "Jane Doe");
        assert!(reopened.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryProfileStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&jane()).unwrap();
        assert_eq!(store.require().unwrap().full_name, "Jane Doe");
    }

    #[test]
    fn test_stats_empty() {
        let stats = create_test_storage().stats().unwrap();
        assert!(stats.profile_saved_at.is_none());
        assert_eq!(stats.published_profiles, 0);
        assert_eq!(stats.total_tokens, 0);
        assert_eq!(stats.total_scans, 0);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_path() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }
}
