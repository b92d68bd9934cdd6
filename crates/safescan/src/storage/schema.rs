//! `SQLite` schema definitions for safescan.
//!
//! One database holds both sides of the system: the local profile record and
//! the backing store that answers token lookups.

/// SQL statement to create the named profile record table.
pub const CREATE_PROFILE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS profile_records (
    name TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    saved_at TEXT NOT NULL
)
";

/// SQL statement to create the published profiles table.
pub const CREATE_PUBLISHED_PROFILES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS published_profiles (
    user_id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the emergency tokens table.
///
/// Only the BLAKE3 hash of each token is stored.
pub const CREATE_TOKENS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS emergency_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_hash TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
)
";

/// SQL statement to create an index on token expiry for pruning.
pub const CREATE_TOKEN_EXPIRY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tokens_expires ON emergency_tokens(expires_at)
";

/// SQL statement to create the scan access log table.
pub const CREATE_SCAN_LOGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS scan_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    token_id INTEGER NOT NULL,
    scanner_ip TEXT NOT NULL,
    scanned_at TEXT NOT NULL
)
";

/// SQL statement to create an index on scan time per user.
pub const CREATE_SCAN_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_scans_user ON scan_logs(user_id, scanned_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_PROFILE_RECORDS_TABLE,
    CREATE_PUBLISHED_PROFILES_TABLE,
    CREATE_TOKENS_TABLE,
    CREATE_TOKEN_EXPIRY_INDEX,
    CREATE_SCAN_LOGS_TABLE,
    CREATE_SCAN_USER_INDEX,
    CREATE_METADATA_TABLE,
];
