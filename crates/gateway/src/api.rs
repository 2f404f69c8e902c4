use std::{sync::Arc, time::Duration};

use {
    cadenza_config::{CadenzaConfig, PlaybackConfig},
    cadenza_oauth::{OAuthFlow, TokenStore, load_oauth_config},
};

use crate::client::{ApiClient, resolve_api_base};

/// Spotify Web API operations on top of an authenticated [`ApiClient`].
///
/// Playback commands live in `player`, catalog lookups in `catalog`.
#[derive(Clone)]
pub struct SpotifyApi {
    pub(crate) client: ApiClient,
    pub(crate) settle_delay: Duration,
}

impl SpotifyApi {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            settle_delay: Duration::from_millis(PlaybackConfig::default().device_settle_ms),
        }
    }

    /// Wire up token storage, the OAuth flow and the API client from config
    /// and the process environment.
    pub fn from_config(config: &CadenzaConfig) -> Self {
        let store = Arc::new(TokenStore::new());
        let auth = OAuthFlow::new(load_oauth_config(config), store);
        let base = resolve_api_base(config, |key| std::env::var(key).ok());
        Self::new(ApiClient::new(auth, base))
            .with_settle_delay(Duration::from_millis(config.playback.device_settle_ms))
    }

    /// Pause between transferring playback and retrying the command.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &OAuthFlow {
        self.client.auth()
    }
}
