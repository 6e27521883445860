// Durable credential storage (JSON file or SQLite key/value table)

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::OptionalExtension;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::types::{CachedToken, CredentialRecord, StoredToken};

/// Key under which the token document lives in the SQLite store
const SQLITE_TOKEN_KEY: &str = "webinar-gateway:token";

/// Store failures. Logged and recovered inside the store, never returned to callers.
#[derive(Error, Debug)]
enum StoreError {
    #[error("failed to read token record from {location}: {reason}")]
    StoreReadFailure { location: String, reason: String },

    #[error("failed to write token record to {location}: {reason}")]
    StoreWriteFailure { location: String, reason: String },
}

/// Durable mirror of the credential record.
///
/// `load` never fails: anything unreadable is an empty record. `save` and
/// `clear` log failures and leave the in-memory record authoritative.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> CredentialRecord;
    fn save(&self, record: &CredentialRecord);
    fn clear(&self);
    /// Location shown in diagnostics
    fn location(&self) -> String;
}

/// Pick a backend from the file extension
pub fn open_store(path: &Path) -> Arc<dyn CredentialStore> {
    let is_sqlite = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "sqlite" | "sqlite3" | "db"))
        .unwrap_or(false);

    if is_sqlite {
        tracing::debug!("Using SQLite token store: {}", path.display());
        Arc::new(SqliteStore::new(path.to_path_buf()))
    } else {
        tracing::debug!("Using JSON file token store: {}", path.display());
        Arc::new(FileStore::new(path.to_path_buf()))
    }
}

// === JSON file backend ===

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_record(&self) -> Result<CredentialRecord, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No token file at {}", self.path.display());
                return Ok(CredentialRecord::empty());
            }
            Err(e) => return Err(self.read_failure(e)),
        };

        if content.trim().is_empty() {
            return Err(self.read_failure("file is empty"));
        }

        let stored: StoredToken =
            serde_json::from_str(&content).map_err(|e| self.read_failure(e))?;
        into_record(stored).map_err(|reason| self.read_failure(reason))
    }

    fn write_record(&self, stored: &StoredToken) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_failure(e))?;
        }

        let json = serde_json::to_string_pretty(stored).map_err(|e| self.write_failure(e))?;

        // Write beside the target and rename over it so the file is replaced in full
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = open_private(&tmp_path).map_err(|e| self.write_failure(e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| self.write_failure(e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.write_failure(e)
        })
    }

    fn read_failure(&self, reason: impl ToString) -> StoreError {
        StoreError::StoreReadFailure {
            location: self.location(),
            reason: reason.to_string(),
        }
    }

    fn write_failure(&self, reason: impl ToString) -> StoreError {
        StoreError::StoreWriteFailure {
            location: self.location(),
            reason: reason.to_string(),
        }
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> CredentialRecord {
        self.read_record().unwrap_or_else(|e| {
            tracing::warn!("{}; starting without a cached token", e);
            CredentialRecord::empty()
        })
    }

    fn save(&self, record: &CredentialRecord) {
        let Some(token) = record.token() else {
            self.clear();
            return;
        };

        match self.write_record(&StoredToken::from(token)) {
            Ok(()) => tracing::debug!("Token persisted to {}", self.path.display()),
            Err(e) => tracing::error!("{}; keeping token in memory only", e),
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed token file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("{}", self.write_failure(e)),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

// === SQLite backend ===

pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn open(&self) -> rusqlite::Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(conn)
    }

    fn read_record(&self) -> Result<CredentialRecord, StoreError> {
        if !self.path.exists() {
            tracing::debug!("No token database at {}", self.path.display());
            return Ok(CredentialRecord::empty());
        }

        let conn = self.open().map_err(|e| self.read_failure(e))?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM auth_kv WHERE key = ?",
                [SQLITE_TOKEN_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.read_failure(e))?;

        let Some(json) = value else {
            return Ok(CredentialRecord::empty());
        };

        if json.trim().is_empty() {
            return Err(self.read_failure("stored value is empty"));
        }

        let stored: StoredToken = serde_json::from_str(&json).map_err(|e| self.read_failure(e))?;
        into_record(stored).map_err(|reason| self.read_failure(reason))
    }

    fn write_record(&self, stored: &StoredToken) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_failure(e))?;
        }

        let json = serde_json::to_string(stored).map_err(|e| self.write_failure(e))?;
        let conn = self.open().map_err(|e| self.write_failure(e))?;
        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SQLITE_TOKEN_KEY, json.as_str()],
        )
        .map_err(|e| self.write_failure(e))?;
        Ok(())
    }

    fn read_failure(&self, reason: impl ToString) -> StoreError {
        StoreError::StoreReadFailure {
            location: self.location(),
            reason: reason.to_string(),
        }
    }

    fn write_failure(&self, reason: impl ToString) -> StoreError {
        StoreError::StoreWriteFailure {
            location: self.location(),
            reason: reason.to_string(),
        }
    }
}

impl CredentialStore for SqliteStore {
    fn load(&self) -> CredentialRecord {
        self.read_record().unwrap_or_else(|e| {
            tracing::warn!("{}; starting without a cached token", e);
            CredentialRecord::empty()
        })
    }

    fn save(&self, record: &CredentialRecord) {
        let Some(token) = record.token() else {
            self.clear();
            return;
        };

        match self.write_record(&StoredToken::from(token)) {
            Ok(()) => tracing::debug!("Token persisted to {}", self.location()),
            Err(e) => tracing::error!("{}; keeping token in memory only", e),
        }
    }

    fn clear(&self) {
        if !self.path.exists() {
            return;
        }

        let result = self.open().and_then(|conn| {
            conn.execute("DELETE FROM auth_kv WHERE key = ?", [SQLITE_TOKEN_KEY])
        });
        if let Err(e) = result {
            tracing::error!("{}", self.write_failure(e));
        }
    }

    fn location(&self) -> String {
        format!("{}#{}", self.path.display(), SQLITE_TOKEN_KEY)
    }
}

// === Shared decoding ===

/// Turn a durable record into an in-memory one, normalizing every instant to UTC
fn into_record(stored: StoredToken) -> Result<CredentialRecord, String> {
    let access_token = match stored.access_token {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(CredentialRecord::empty()),
    };

    let raw_expiry = stored
        .expires_at
        .ok_or_else(|| "record has access_token but no expires_at".to_string())?;
    let expires_at = parse_datetime(&raw_expiry)
        .ok_or_else(|| format!("unparsable expires_at: {}", raw_expiry))?;

    // issued_at is informational; drop it if it breaks the ordering invariant
    let issued_at = stored
        .issued_at
        .as_deref()
        .and_then(parse_datetime)
        .filter(|issued| *issued < expires_at);

    Ok(CachedToken {
        access_token,
        issued_at,
        expires_at,
        account_id: stored.account_id,
    }
    .into())
}

/// Parse an ISO 8601 timestamp into UTC.
///
/// Offset-carrying input is converted; naive input is taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
