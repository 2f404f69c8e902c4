use std::{fmt, time::Instant};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Endpoints and client registration for the authorization code flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    /// Empty when the user has not configured an application yet.
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    /// Loopback port the callback listener binds; `0` picks a free port.
    pub redirect_port: u16,
    pub callback_path: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Redirect URI for a listener bound to `port`.
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://127.0.0.1:{port}{}", self.callback_path)
    }
}

/// Serialize a secret string as plain text (token file only).
pub fn serialize_secret<S: Serializer>(secret: &Secret<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

/// Serialize an optional secret string as plain text or null.
pub fn serialize_option_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => s.serialize_some(secret.expose_secret()),
        None => s.serialize_none(),
    }
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// The persisted credential set.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<Secret<String>>,
    /// Epoch seconds, already reduced by the expiry buffer.
    pub expires_at: u64,
    #[serde(default)]
    pub scope: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Epoch seconds.
    #[serde(default)]
    pub stored_at: u64,
}

impl TokenSet {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Seconds of validity left at `now` (zero once expired).
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("stored_at", &self.stored_at)
            .finish()
    }
}

/// A token endpoint grant: the fields the Token Store derives a
/// [`TokenSet`] from.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: None,
            expires_in: None,
            scope: None,
            token_type: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token.into()));
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A PKCE S256 verifier/challenge pair.
pub struct PkceChallenge {
    pub verifier: Secret<String>,
    pub challenge: String,
}

/// Single-use, memory-only state for one login attempt.
pub struct PkceSession {
    pub code_verifier: Secret<String>,
    pub code_challenge: String,
    pub state: String,
    pub created_at: Instant,
}

impl fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceSession")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_set_round_trips_through_json() {
        let json = r#"{
            "access_token": "at",
            "refresh_token": "rt",
            "expires_at": 1700003540,
            "scope": "user-read-playback-state",
            "stored_at": 1700000000
        }"#;
        let set: TokenSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.access_token.expose_secret(), "at");
        assert_eq!(set.token_type, "Bearer");

        let out = serde_json::to_value(&set).unwrap();
        assert_eq!(out["access_token"], "at");
        assert_eq!(out["refresh_token"], "rt");
        assert_eq!(out["expires_at"], 1700003540);
    }

    #[test]
    fn token_set_without_expiry_is_rejected() {
        let json = r#"{"access_token": "at"}"#;
        assert!(serde_json::from_str::<TokenSet>(json).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let set: TokenSet = serde_json::from_str(
            r#"{"access_token":"super-secret","refresh_token":"also-secret","expires_at":1}"#,
        )
        .unwrap();
        let out = format!("{set:?}");
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("super-secret"));
        assert!(!out.contains("also-secret"));

        let grant = TokenGrant::new("grant-secret").with_refresh_token("r");
        assert!(!format!("{grant:?}").contains("grant-secret"));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let set: TokenSet =
            serde_json::from_str(r#"{"access_token":"a","expires_at":100}"#).unwrap();
        assert!(!set.is_expired_at(99));
        assert!(set.is_expired_at(100));
        assert_eq!(set.remaining_secs(40), 60);
        assert_eq!(set.remaining_secs(400), 0);
    }

    #[test]
    fn redirect_uri_uses_loopback_ip() {
        let cfg = OAuthConfig {
            client_id: "id".into(),
            auth_url: "https://a".into(),
            token_url: "https://t".into(),
            redirect_port: 8888,
            callback_path: "/callback".into(),
            scopes: vec![],
        };
        assert_eq!(cfg.redirect_uri(8888), "http://127.0.0.1:8888/callback");
    }
}
