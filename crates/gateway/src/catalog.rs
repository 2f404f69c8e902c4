use {reqwest::Method, serde_json::Value};

use crate::{api::SpotifyApi, error::Result, types::SearchType};

/// Spotify caps search pages at 50 results.
const MAX_SEARCH_LIMIT: u32 = 50;

impl SpotifyApi {
    /// Search the catalog. `kinds` defaults to tracks when empty; `limit` is
    /// clamped to 1..=50.
    pub async fn search(&self, query: &str, kinds: &[SearchType], limit: u32) -> Result<Value> {
        let kinds = if kinds.is_empty() {
            SearchType::Track.as_str().to_string()
        } else {
            kinds
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        let params = [
            ("q", query.to_string()),
            ("type", kinds),
            ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
        ];
        self.client
            .request(Method::GET, "/search", &params, None)
            .await
    }

    pub async fn track(&self, id: &str) -> Result<Value> {
        self.get_item("tracks", id).await
    }

    pub async fn album(&self, id: &str) -> Result<Value> {
        self.get_item("albums", id).await
    }

    pub async fn artist(&self, id: &str) -> Result<Value> {
        self.get_item("artists", id).await
    }

    pub async fn playlist(&self, id: &str) -> Result<Value> {
        self.get_item("playlists", id).await
    }

    async fn get_item(&self, collection: &str, id: &str) -> Result<Value> {
        let path = format!("/{collection}/{}", bare_id(id));
        self.client.request(Method::GET, &path, &[], None).await
    }
}

/// Accept `spotify:track:<id>`, an open.spotify.com link or a bare ID.
pub fn bare_id(id: &str) -> &str {
    let id = id.trim();
    let id = id.split(['?', '#']).next().unwrap_or(id).trim_end_matches('/');
    id.rsplit([':', '/']).next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_uri_and_link_prefixes() {
        assert_eq!(bare_id("4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(bare_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(
            bare_id("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3?si=abc"),
            "1DFixLWuPkv3KT3TnV35m3"
        );
    }

    #[test]
    fn trailing_slash_keeps_the_id() {
        assert_eq!(
            bare_id("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3/"),
            "1DFixLWuPkv3KT3TnV35m3"
        );
        assert_eq!(
            bare_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M/?si=x"),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
    }
}
