use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// A Spotify Connect device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Absent for some restricted devices.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub is_private_session: bool,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl Device {
    /// Whether playback can be transferred to this device.
    pub fn is_available(&self) -> bool {
        !self.is_restricted && self.id.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// What to start playing. The default resumes the current context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayRequest {
    /// Target device; the active one when `None`.
    pub device_id: Option<String>,
    /// Album, artist or playlist URI.
    pub context_uri: Option<String>,
    /// Track URIs. Ignored by Spotify when `context_uri` is set.
    pub uris: Vec<String>,
    /// Start position within the context.
    pub offset: Option<usize>,
    pub position_ms: Option<u64>,
}

impl PlayRequest {
    pub fn uris(uris: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn context(context_uri: impl Into<String>) -> Self {
        Self {
            context_uri: Some(context_uri.into()),
            ..Default::default()
        }
    }

    /// JSON body for `PUT /me/player/play`, or `None` to resume.
    pub fn body(&self) -> Option<Value> {
        let mut body = Map::new();
        if let Some(context) = &self.context_uri {
            body.insert("context_uri".into(), context.clone().into());
        }
        if !self.uris.is_empty() {
            body.insert("uris".into(), self.uris.clone().into());
        }
        if let Some(offset) = self.offset {
            body.insert("offset".into(), serde_json::json!({ "position": offset }));
        }
        if let Some(position) = self.position_ms {
            body.insert("position_ms".into(), position.into());
        }
        (!body.is_empty()).then_some(Value::Object(body))
    }
}

/// Catalog object types accepted by `/search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchType {
    Album,
    Artist,
    Playlist,
    Track,
    Show,
    Episode,
    Audiobook,
}

impl SearchType {
    pub const ALL: [Self; 7] = [
        Self::Album,
        Self::Artist,
        Self::Playlist,
        Self::Track,
        Self::Show,
        Self::Episode,
        Self::Audiobook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Track => "track",
            Self::Show => "show",
            Self::Episode => "episode",
            Self::Audiobook => "audiobook",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown search type {s:?} (expected one of {})", known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn device_from_api_payload() {
        let list: DeviceList = serde_json::from_value(json!({
            "devices": [
                {
                    "id": "d1",
                    "is_active": false,
                    "is_private_session": false,
                    "is_restricted": false,
                    "name": "Kitchen",
                    "type": "Speaker",
                    "volume_percent": 40,
                    "supports_volume": true
                },
                { "id": null, "is_restricted": true, "name": "Car", "type": "Automobile" }
            ]
        }))
        .unwrap();

        assert_eq!(list.devices.len(), 2);
        assert_eq!(list.devices[0].kind, "Speaker");
        assert_eq!(list.devices[0].volume_percent, Some(40));
        assert!(list.devices[0].is_available());
        assert!(!list.devices[1].is_available());
        assert!(!list.devices[1].is_active);
    }

    #[test]
    fn missing_device_list_is_empty() {
        let list: DeviceList = serde_json::from_value(json!({})).unwrap();
        assert!(list.devices.is_empty());
    }

    #[test]
    fn resume_has_no_body() {
        assert_eq!(PlayRequest::default().body(), None);
    }

    #[test]
    fn play_body_carries_only_set_fields() {
        let mut req = PlayRequest::context("spotify:album:1");
        req.offset = Some(3);
        assert_eq!(
            req.body(),
            Some(json!({"context_uri": "spotify:album:1", "offset": {"position": 3}}))
        );

        let req = PlayRequest::uris(["spotify:track:a", "spotify:track:b"]);
        assert_eq!(
            req.body(),
            Some(json!({"uris": ["spotify:track:a", "spotify:track:b"]}))
        );
    }

    #[test]
    fn search_type_parsing() {
        assert_eq!("Track".parse::<SearchType>().unwrap(), SearchType::Track);
        assert_eq!(" album ".parse::<SearchType>().unwrap(), SearchType::Album);
        let err = "song".parse::<SearchType>().unwrap_err();
        assert!(err.contains("track"));
    }
}
