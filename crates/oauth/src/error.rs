use thiserror::Error;

/// Failures of the login flow and token lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("PKCE challenge generation failed: {0}")]
    Crypto(String),

    #[error("failed to bind OAuth callback listener on 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("OAuth state mismatch on callback (possible CSRF); login aborted")]
    Csrf,

    #[error("authorization server returned {error}{}", with_description(.description))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("callback listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("not authenticated; run `cadenza auth login` to connect your Spotify account")]
    NotAuthenticated,

    #[error("no refresh token available; run `cadenza auth login` again")]
    NoRefreshToken,

    #[error("timed out after {0}s waiting for the OAuth callback")]
    Timeout(u64),

    #[error("a login is already in progress")]
    LoginInProgress,

    #[error("login task ended unexpectedly: {0}")]
    Task(String),
}

impl AuthError {
    /// Whether the caller must run the interactive login again to recover.
    pub fn needs_login(&self) -> bool {
        match self {
            Self::NotAuthenticated | Self::NoRefreshToken => true,
            Self::Provider { error, .. } => error == "invalid_grant",
            _ => false,
        }
    }
}

fn with_description(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
