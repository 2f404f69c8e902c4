//! Spotify authorization: PKCE, the loopback callback listener, token
//! storage and the flow that ties them together.

pub mod callback_server;
pub mod defaults;
pub mod error;
pub mod flow;
pub mod http;
pub mod pkce;
pub mod storage;
pub mod types;

pub use {
    callback_server::{CallbackServer, ListenerState},
    defaults::{load_oauth_config, resolve_oauth_config},
    error::{AuthError, Result},
    flow::{OAuthFlow, PendingLogin},
    storage::TokenStore,
    types::{
        OAuthConfig, PkceChallenge, PkceSession, TokenGrant, TokenSet, serialize_option_secret,
        serialize_secret,
    },
};
