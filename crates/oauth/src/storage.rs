use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::{Context, Result},
    secrecy::ExposeSecret,
    tracing::{debug, warn},
};

use crate::types::{TokenGrant, TokenSet};

/// Token file name inside the data directory.
pub const TOKEN_FILE: &str = "spotify_tokens.json";

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Subtracted from every lifetime so a token is refreshed before the
/// provider starts rejecting it.
pub const EXPIRY_BUFFER_SECS: u64 = 60;

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `None` until the token file has been read.
type Cache = Option<Option<TokenSet>>;

/// File-based token storage at `~/.cadenza/spotify_tokens.json`, cached in
/// memory after the first read.
///
/// Assumes a single writer process; the file is not locked.
pub struct TokenStore {
    path: PathBuf,
    cache: Mutex<Cache>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::with_path(cadenza_config::data_dir().join(TOKEN_FILE))
    }

    /// Create a token store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token set. The first call reads the file; the result, absent
    /// or not, is cached until the next `store`/`clear`.
    pub fn get(&self) -> Option<TokenSet> {
        self.lock().get_or_insert_with(|| self.load()).clone()
    }

    fn load(&self) -> Option<TokenSet> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file, logged out");
                return None;
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token file");
                return None;
            },
        };
        match serde_json::from_str::<TokenSet>(&data) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable token file");
                None
            },
        }
    }

    /// Derive a [`TokenSet`] from `grant`, cache it and persist it.
    ///
    /// A grant without a refresh token keeps the previously stored one.
    /// Returns `false` if the file could not be written; the cached set is
    /// still updated so the running process stays logged in.
    pub fn store(&self, grant: TokenGrant) -> bool {
        let mut cache = self.lock();
        let previous = cache.get_or_insert_with(|| self.load()).take();
        let now = now_secs();

        let tokens = TokenSet {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .or_else(|| previous.as_ref().and_then(|p| p.refresh_token.clone())),
            expires_at: (now + grant.expires_in.unwrap_or(DEFAULT_TTL_SECS))
                .saturating_sub(EXPIRY_BUFFER_SECS),
            scope: grant
                .scope
                .or_else(|| previous.map(|p| p.scope))
                .unwrap_or_default(),
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".into()),
            stored_at: now,
        };

        let written = match self.persist(&tokens) {
            Ok(()) => {
                debug!(path = %self.path.display(), expires_at = tokens.expires_at, "stored tokens");
                true
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to persist tokens");
                false
            },
        };
        *cache = Some(Some(tokens));
        written
    }

    /// Write via a sibling temp file and rename so readers never observe a
    /// truncated file.
    fn persist(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let data = serde_json::to_string_pretty(tokens).context("serializing tokens")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &data).with_context(|| format!("writing {}", tmp.display()))?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// True when there is no token set or it has expired.
    pub fn is_expired(&self) -> bool {
        self.get().is_none_or(|t| t.is_expired_at(now_secs()))
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get()
            .and_then(|t| t.refresh_token)
            .map(|r| r.expose_secret().clone())
    }

    /// Forget the cached set and delete the file. Safe when nothing is stored.
    pub fn clear(&self) {
        let mut cache = self.lock();
        *cache = Some(None);
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "deleted token file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to delete token file"),
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
