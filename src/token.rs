//! Token cache persistence
//!
//! This module handles saving and loading bearer tokens across sessions.
//! The cache is a flat JSON object keyed by account identity; each value
//! is the token record for that account. The cache file is rewritten
//! atomically after every successful token operation and entries for
//! other identities are never touched.

use crate::error::Result;
use crate::logging::get_logger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bearer token record for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Opaque bearer credential sent with each API request
    pub access_token: String,

    /// Credential used to obtain a new access token
    pub refresh_token: String,

    /// Unix timestamp after which the access token is no longer usable
    pub expires_at: i64,

    /// OpenID Connect identity token, when the provider returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Regional API base URL resolved during authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_base_url: Option<String>,
}

impl TokenRecord {
    /// Whether the access token expires within the given margin from now
    pub fn is_expired(&self, margin_seconds: i64) -> bool {
        self.expires_at <= Utc::now().timestamp() + margin_seconds
    }
}

/// Persisted token cache keyed by account identity
pub struct TokenCache {
    file_path: PathBuf,
    entries: HashMap<String, TokenRecord>,
    logger: crate::logging::StructuredLogger,
}

impl TokenCache {
    /// Create a cache bound to the given file, loading existing entries.
    /// A missing file yields an empty cache.
    pub fn load<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let logger = get_logger("token_cache");
        let file_path = file_path.as_ref().to_path_buf();

        let entries = if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            let entries: HashMap<String, TokenRecord> = serde_json::from_str(&contents)?;
            logger.debug(&format!("Loaded {} cached token(s)", entries.len()));
            entries
        } else {
            logger.debug("No token cache file found, starting empty");
            HashMap::new()
        };

        Ok(Self {
            file_path,
            entries,
            logger,
        })
    }

    /// Get the cached token for an identity
    pub fn get(&self, identity: &str) -> Option<&TokenRecord> {
        self.entries.get(identity)
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a token for an identity and rewrite the cache file atomically.
    /// Entries for other identities are preserved.
    pub fn store(&mut self, identity: &str, record: TokenRecord) -> Result<()> {
        self.entries.insert(identity.to_string(), record);
        self.flush()?;
        self.logger
            .debug(&format!("Updated cache entry for {}", identity));
        Ok(())
    }

    /// Remove the token for an identity and rewrite the cache file
    pub fn remove(&mut self, identity: &str) -> Result<Option<TokenRecord>> {
        let removed = self.entries.remove(identity);
        if removed.is_some() {
            self.flush()?;
        }
        Ok(removed)
    }

    // Write-then-rename so a crash mid-write cannot truncate the cache
    fn flush(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp_path, &self.file_path)?;
        Ok(())
    }
}
