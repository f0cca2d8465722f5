//! Obfuscated credential store
//!
//! File-per-key persistence for session credentials, with a reversible text
//! transform applied to the sensitive entries. The transform keeps raw
//! credentials out of plain sight on disk; it is not encryption and must not
//! be treated as a security boundary.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, warn};
use std::path::PathBuf;

const STORE_DIR_NAME: &str = "AgentWorkbench";

// Fixed keystream for the additive shift between the two base64 passes.
// Prevents casual reading only.
const KEYSTREAM: &[u8] = b"AgentWorkbench2025Session";

pub const TOKEN_KEY: &str = "token";
pub const USER_ID_KEY: &str = "user_id";
pub const USER_EMAIL_KEY: &str = "user_email";
pub const NAME_KEY: &str = "name";
pub const ROLE_KEY: &str = "role";

const SESSION_KEYS: [&str; 5] = [TOKEN_KEY, USER_ID_KEY, USER_EMAIL_KEY, NAME_KEY, ROLE_KEY];

/// Result of [`decode`]. The degraded path is observable so callers can log
/// or count it instead of silently trusting a raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Input decoded cleanly through both passes
    Clean(String),
    /// Input was not valid ciphertext; returned unchanged
    Passthrough(String),
}

impl DecodeOutcome {
    pub fn into_value(self) -> String {
        match self {
            DecodeOutcome::Clean(value) | DecodeOutcome::Passthrough(value) => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, DecodeOutcome::Passthrough(_))
    }
}

/// Obfuscate a value for storage: base64 over the UTF-8 bytes, a per-byte
/// additive shift keyed by the repeating keystream, then a second base64
/// pass so the result stays printable. Total over all strings; never fails.
pub fn encode(plaintext: &str) -> String {
    let first = BASE64.encode(plaintext.as_bytes());
    let shifted: Vec<u8> = first
        .bytes()
        .enumerate()
        .map(|(i, b)| b.wrapping_add(KEYSTREAM[i % KEYSTREAM.len()]))
        .collect();
    BASE64.encode(shifted)
}

/// Exact inverse of [`encode`]. Inputs that were never encoded come back
/// unchanged as a [`DecodeOutcome::Passthrough`] rather than an error; a
/// corrupt entry must not take the client down.
pub fn decode(ciphertext: &str) -> DecodeOutcome {
    match try_decode(ciphertext) {
        Some(plaintext) => DecodeOutcome::Clean(plaintext),
        None => {
            warn!("Credential decode failed; passing raw value through");
            DecodeOutcome::Passthrough(ciphertext.to_string())
        }
    }
}

fn try_decode(ciphertext: &str) -> Option<String> {
    let shifted = BASE64.decode(ciphertext.trim()).ok()?;
    let first: Vec<u8> = shifted
        .iter()
        .enumerate()
        .map(|(i, &b)| b.wrapping_sub(KEYSTREAM[i % KEYSTREAM.len()]))
        .collect();
    let inner = String::from_utf8(first).ok()?;
    let plain = BASE64.decode(inner.trim()).ok()?;
    String::from_utf8(plain).ok()
}

/// File-backed key/value store for session credentials.
///
/// Each key is an independent file under the store root, so a crash between
/// writes can leave entries inconsistent with each other; that matches the
/// persistence model this client has always had and is accepted. When no
/// root directory is available the store is inert: writes are no-ops and
/// reads return `None`, so callers never crash on a missing backing store.
pub struct CredentialStore {
    root: Option<PathBuf>,
}

impl CredentialStore {
    /// Create a store rooted at an explicit directory, creating it if needed.
    /// Falls back to an inert store when the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        match std::fs::create_dir_all(&root) {
            Ok(()) => {
                debug!("Credential store at {}", root.display());
                Self { root: Some(root) }
            }
            Err(e) => {
                warn!(
                    "Could not create credential store at {}: {}. Store is inert.",
                    root.display(),
                    e
                );
                Self { root: None }
            }
        }
    }

    /// Open the store under the platform data directory
    pub fn open_default() -> Self {
        match dirs::data_local_dir() {
            Some(dir) => Self::new(dir.join(STORE_DIR_NAME)),
            None => {
                warn!("No data directory available; credential store is inert");
                Self { root: None }
            }
        }
    }

    /// A store with no backing directory; every operation is a safe no-op
    pub fn inert() -> Self {
        Self { root: None }
    }

    pub fn is_available(&self) -> bool {
        self.root.is_some()
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        debug_assert!(
            key.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_'),
            "store keys are fixed identifiers"
        );
        self.root.as_ref().map(|root| root.join(key))
    }

    /// Write an entry as-is
    pub fn set_plain(&self, key: &str, value: &str) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if let Err(e) = std::fs::write(&path, value) {
            warn!("Failed to write {} entry: {}", key, e);
        }
    }

    /// Read an entry as-is; missing key is `None`
    pub fn get_plain(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to read {} entry: {}", key, e);
                None
            }
        }
    }

    /// Write an entry through the obfuscation transform
    pub fn set_secret(&self, key: &str, value: &str) {
        self.set_plain(key, &encode(value));
    }

    /// Read an entry through the inverse transform. A missing key is `None`
    /// without invoking decode; an undecodable entry comes back raw.
    pub fn get_secret(&self, key: &str) -> Option<String> {
        let raw = self.get_plain(key)?;
        let outcome = decode(&raw);
        if outcome.is_degraded() {
            warn!("Entry {} did not decode; using raw value", key);
        }
        Some(outcome.into_value())
    }

    pub fn remove(&self, key: &str) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove {} entry: {}", key, e);
            }
        }
    }

    /// Remove every session entry (logout)
    pub fn clear_session(&self) {
        for key in SESSION_KEYS {
            self.remove(key);
        }
    }
}
