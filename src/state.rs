//! Durable local state
//!
//! Small per-install files kept next to the queue snapshot:
//!
//! - `session_id`: durable session identifier (UUID v4)
//! - `signing_secret`: hex secret used by the envelope signer
//! - `endpoint_override`: optional ingest endpoint override
//! - `ingest_api_key`: optional ingest API key
//!
//! Identifiers are created on first use and read back afterwards. A file
//! that exists but is unreadable or malformed is regenerated.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Directory name under the platform data dir
pub const STATE_DIR_NAME: &str = "intel-gate";

/// Queue snapshot file name
pub const QUEUE_FILE: &str = "queue.json";

const SESSION_FILE: &str = "session_id";
const SECRET_FILE: &str = "signing_secret";
const ENDPOINT_FILE: &str = "endpoint_override";
const API_KEY_FILE: &str = "ingest_api_key";

/// Secret length in bytes (hex-encoded on disk)
const SECRET_BYTES: usize = 32;

/// Local state errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to create state directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Default state directory
///
/// Platform local data dir (e.g. `~/.local/share/intel-gate`), falling back
/// to the home directory and finally the working directory.
pub fn default_state_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join(STATE_DIR_NAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(format!(".{}", STATE_DIR_NAME));
    }
    PathBuf::from(format!("./{}", STATE_DIR_NAME))
}

/// Handle to the state directory
#[derive(Debug, Clone)]
pub struct LocalState {
    root: PathBuf,
}

impl LocalState {
    /// Open a state directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StateError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StateError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Path of the queue snapshot
    pub fn queue_path(&self) -> PathBuf {
        self.root.join(QUEUE_FILE)
    }

    /// Read or create the durable session id
    pub fn session_id(&self) -> Result<String, StateError> {
        self.read_or_create(SESSION_FILE, is_uuid, || uuid::Uuid::new_v4().to_string())
    }

    /// Read or create the signing secret
    pub fn signing_secret(&self) -> Result<String, StateError> {
        self.read_or_create(SECRET_FILE, is_secret, generate_secret)
    }

    /// Persisted endpoint override, if any
    pub fn endpoint_override(&self) -> Option<String> {
        self.read_trimmed(ENDPOINT_FILE)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
    }

    /// Persist an endpoint override
    pub fn set_endpoint_override(&self, endpoint: &str) -> Result<(), StateError> {
        self.write(ENDPOINT_FILE, endpoint)
    }

    /// Persisted ingest API key, if any
    pub fn api_key(&self) -> Option<String> {
        self.read_trimmed(API_KEY_FILE)
    }

    /// Persist an ingest API key
    pub fn set_api_key(&self, key: &str) -> Result<(), StateError> {
        self.write(API_KEY_FILE, key)
    }

    fn read_trimmed(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.root.join(name))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn read_or_create(
        &self,
        name: &str,
        is_valid: fn(&str) -> bool,
        generate: fn() -> String,
    ) -> Result<String, StateError> {
        if let Some(existing) = self.read_trimmed(name) {
            if is_valid(&existing) {
                return Ok(existing);
            }
            warn!(file = %name, "Malformed state file, regenerating");
        }

        let value = generate();
        self.write(name, &value)?;
        debug!(file = %name, "Created state file");
        Ok(value)
    }

    fn write(&self, name: &str, value: &str) -> Result<(), StateError> {
        let path = self.root.join(name);
        fs::write(&path, value).map_err(|source| StateError::Write { path, source })
    }
}

fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

fn is_secret(value: &str) -> bool {
    value.len() == SECRET_BYTES * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Fresh random signing secret, hex-encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
