use std::time::Duration;

use {
    cadenza_config::CadenzaConfig,
    cadenza_oauth::{OAuthFlow, http::encode_query},
    reqwest::{Method, StatusCode, header::CONTENT_TYPE},
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::error::{ApiError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

const API_BASE_ENV: &str = "CADENZA_SPOTIFY_API_BASE";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Web API base URL: `CADENZA_SPOTIFY_API_BASE`, then `spotify.api_base`,
/// then [`DEFAULT_API_BASE`].
pub fn resolve_api_base(config: &CadenzaConfig, env: impl Fn(&str) -> Option<String>) -> String {
    env(API_BASE_ENV)
        .or_else(|| config.spotify.api_base.clone())
        .map(|base| base.trim().trim_end_matches('/').to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

/// Bearer-authenticated JSON requests against the Web API.
///
/// Every request obtains its token through [`OAuthFlow::ensure_token`]; a
/// 401 is answered with exactly one refresh and replay.
#[derive(Clone)]
pub struct ApiClient {
    auth: OAuthFlow,
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(auth: OAuthFlow, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            auth,
            http,
            base_url: base_url.into(),
        }
    }

    pub fn auth(&self) -> &OAuthFlow {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `path` with `params` percent-encoded into the query.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}{path}", self.base_url);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(params.iter().map(|(k, v)| (*k, v.as_str()))));
        }
        url
    }

    /// Send one API request and decode the JSON response.
    ///
    /// An empty success body decodes to [`Value::Null`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url(path, params);
        let token = self.auth.ensure_token().await?;
        let resp = self.send(method.clone(), &url, body, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return decode(resp).await;
        }

        warn!(%method, path, "access token rejected, refreshing once");
        let refreshed = self.auth.refresh_rejected(&token).await?;
        let resp = self.send(method, &url, body, &refreshed).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "refreshed access token rejected");
            return Err(ApiError::Unauthorized);
        }
        decode(resp).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response> {
        debug!(%method, url, "Spotify API request");
        let builder = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json");
        let builder = match body {
            Some(body) => builder.json(body),
            // Spotify rejects body-less PUT/POST without a Content-Length.
            None => builder.body(""),
        };
        Ok(builder.send().await?)
    }
}

async fn decode(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await?;
    decode_body(status, &body)
}

fn decode_body(status: StatusCode, body: &str) -> Result<Value> {
    if !status.is_success() {
        let err = ApiError::from_response(status.as_u16(), body);
        debug!(error = %err, "Spotify API error response");
        return Err(err);
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        cadenza_config::SpotifyConfig,
        cadenza_oauth::{TokenStore, defaults::builtin_defaults},
        serde_json::json,
        std::sync::Arc,
    };

    fn client(base: &str) -> ApiClient {
        let store = Arc::new(TokenStore::with_path(
            std::env::temp_dir().join("cadenza-url-test-tokens.json"),
        ));
        ApiClient::new(OAuthFlow::new(builtin_defaults(), store), base)
    }

    #[test]
    fn empty_success_body_is_null() {
        assert_eq!(decode_body(StatusCode::NO_CONTENT, "").unwrap(), Value::Null);
        assert_eq!(decode_body(StatusCode::OK, "  \n").unwrap(), Value::Null);
        assert_eq!(
            decode_body(StatusCode::OK, r#"{"id":"x"}"#).unwrap(),
            json!({"id": "x"})
        );
    }

    #[test]
    fn malformed_success_body_is_a_parse_error() {
        assert!(matches!(
            decode_body(StatusCode::OK, "<html>"),
            Err(ApiError::Parse(_))
        ));
    }

    #[test]
    fn error_status_maps_to_api_error() {
        let err = decode_body(
            StatusCode::FORBIDDEN,
            r#"{"error":{"status":403,"message":"Premium required","reason":"PREMIUM_REQUIRED"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 403, .. }));
    }

    #[test]
    fn url_encodes_query_parameters() {
        let client = client("https://api.example.test/v1");
        assert_eq!(client.url("/me", &[]), "https://api.example.test/v1/me");
        assert_eq!(
            client.url("/search", &[
                ("type", "track".to_string()),
                ("q", "artist:Björk homogenic".to_string()),
            ]),
            "https://api.example.test/v1/search?q=artist%3ABj%C3%B6rk%20homogenic&type=track"
        );
    }

    #[test]
    fn api_base_resolution_order() {
        let mut config = CadenzaConfig::default();
        assert_eq!(resolve_api_base(&config, |_| None), DEFAULT_API_BASE);

        config.spotify = SpotifyConfig {
            api_base: Some("http://127.0.0.1:9000/v1/".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_base(&config, |_| None), "http://127.0.0.1:9000/v1");

        let env = |key: &str| (key == API_BASE_ENV).then(|| "http://localhost:1/v1".to_string());
        assert_eq!(resolve_api_base(&config, env), "http://localhost:1/v1");
    }
}
