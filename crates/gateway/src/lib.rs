//! Authenticated access to the Spotify Web API.
//!
//! Requests carry a token from [`cadenza_oauth::OAuthFlow::ensure_token`],
//! survive one 401 through a refresh, and player commands activate a device
//! when Spotify reports that none is active.

pub mod api;
pub mod catalog;
pub mod client;
pub mod error;
pub mod player;
pub mod types;

pub use {
    api::SpotifyApi,
    client::{ApiClient, DEFAULT_API_BASE, resolve_api_base},
    error::{ApiError, NO_ACTIVE_DEVICE, Result},
    types::{Device, PlayRequest, SearchType},
};
