//! Config schema types (Spotify application, playback behaviour).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenzaConfig {
    pub spotify: SpotifyConfig,
    pub playback: PlaybackConfig,
}

/// Spotify application registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// Client ID of the user's Spotify developer application. Login is
    /// refused until this is set (here or via `CADENZA_SPOTIFY_CLIENT_ID`).
    pub client_id: Option<String>,

    /// Loopback port for the OAuth redirect. Must match the redirect URI
    /// registered with the application.
    pub redirect_port: Option<u16>,

    /// Override the requested scopes.
    pub scopes: Option<Vec<String>>,

    /// Override the Web API base URL.
    pub api_base: Option<String>,
}

/// Playback command behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay after transferring playback to a device before retrying the
    /// original command, in milliseconds.
    pub device_settle_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_settle_ms: 1000,
        }
    }
}

impl SpotifyConfig {
    /// The configured client ID, ignoring blank values.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_client_id_is_unset() {
        let cfg = SpotifyConfig {
            client_id: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(cfg.client_id(), None);
    }

    #[test]
    fn playback_defaults_apply_to_partial_section() {
        let cfg: CadenzaConfig = toml::from_str("[playback]\n").unwrap();
        assert_eq!(cfg.playback.device_settle_ms, 1000);
        assert!(cfg.spotify.client_id.is_none());
    }
}
