use {cadenza_config::CadenzaConfig, url::Url};

use crate::{
    error::{AuthError, Result},
    types::OAuthConfig,
};

pub const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_REDIRECT_PORT: u16 = 8888;
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes needed for playback control, search and library lookups.
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "user-library-read",
];

const ENV_PREFIX: &str = "CADENZA_SPOTIFY_";

/// Built-in endpoint configuration. No client ID ships with the binary;
/// users register their own application.
pub fn builtin_defaults() -> OAuthConfig {
    OAuthConfig {
        client_id: String::new(),
        auth_url: AUTH_URL.into(),
        token_url: TOKEN_URL.into(),
        redirect_port: DEFAULT_REDIRECT_PORT,
        callback_path: CALLBACK_PATH.into(),
        scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}

/// Load the OAuth config.
///
/// Priority (highest last):
/// 1. Built-in defaults
/// 2. The `[spotify]` section of the config file
/// 3. Environment variables (`CADENZA_SPOTIFY_CLIENT_ID`, etc.)
pub fn load_oauth_config(config: &CadenzaConfig) -> OAuthConfig {
    resolve_oauth_config(config, |key| std::env::var(key).ok())
}

/// [`load_oauth_config`] against an arbitrary environment lookup.
pub fn resolve_oauth_config(
    config: &CadenzaConfig,
    env: impl Fn(&str) -> Option<String>,
) -> OAuthConfig {
    let mut oauth = builtin_defaults();

    let spotify = &config.spotify;
    if let Some(id) = spotify.client_id() {
        oauth.client_id = id.to_string();
    }
    if let Some(port) = spotify.redirect_port {
        oauth.redirect_port = port;
    }
    if let Some(scopes) = &spotify.scopes {
        oauth.scopes = scopes.clone();
    }

    let var = |name: &str| {
        env(&format!("{ENV_PREFIX}{name}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    if let Some(v) = var("CLIENT_ID") {
        oauth.client_id = v;
    }
    if let Some(v) = var("AUTH_URL") {
        oauth.auth_url = v;
    }
    if let Some(v) = var("TOKEN_URL") {
        oauth.token_url = v;
    }
    if let Some(port) = var("REDIRECT_PORT").and_then(|v| v.parse().ok()) {
        oauth.redirect_port = port;
    }

    oauth
}

/// Check that a login can be attempted with `config`.
pub fn validate(config: &OAuthConfig) -> Result<()> {
    if config.client_id.trim().is_empty() {
        return Err(AuthError::Config(
            "no Spotify client ID configured; set `spotify.client_id` in cadenza.toml \
             or CADENZA_SPOTIFY_CLIENT_ID"
                .into(),
        ));
    }
    for (name, endpoint) in [("auth_url", &config.auth_url), ("token_url", &config.token_url)] {
        let url = Url::parse(endpoint)
            .map_err(|e| AuthError::Config(format!("invalid {name} {endpoint:?}: {e}")))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(AuthError::Config(format!(
                "{name} must be an http(s) URL, got {endpoint:?}"
            )));
        }
    }
    if !config.callback_path.starts_with('/') {
        return Err(AuthError::Config(format!(
            "callback path must start with '/', got {:?}",
            config.callback_path
        )));
    }
    Ok(())
}
