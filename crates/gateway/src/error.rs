use {cadenza_oauth::AuthError, serde::Deserialize, thiserror::Error};

/// Reason code Spotify attaches to player commands when nothing is playing
/// anywhere.
pub const NO_ACTIVE_DEVICE: &str = "NO_ACTIVE_DEVICE";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Spotify API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        reason: Option<String>,
    },

    #[error("Spotify rejected the refreshed access token; run `cadenza auth login` again")]
    Unauthorized,

    #[error("request to Spotify failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response from Spotify: {0}")]
    Parse(String),

    #[error("no Spotify devices available; open Spotify on a device and try again")]
    NoDevices,
}

impl ApiError {
    /// Whether a player command failed only because no device is active.
    pub fn is_no_active_device(&self) -> bool {
        match self {
            Self::Api {
                status,
                message,
                reason,
            } => {
                reason.as_deref() == Some(NO_ACTIVE_DEVICE)
                    || (*status == 404 && message.to_lowercase().contains("no active device"))
            },
            _ => false,
        }
    }

    /// Build an [`ApiError::Api`] from an error response body.
    ///
    /// Handles the regular `{"error": {"status", "message", "reason"}}`
    /// shape and the flat `{"error": "...", "error_description": "..."}`
    /// shape some endpoints return; anything else becomes the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: ErrorField,
            #[serde(default)]
            error_description: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorField {
            Object {
                #[serde(default)]
                message: Option<String>,
                #[serde(default)]
                reason: Option<String>,
            },
            Code(String),
        }

        let (message, reason) = match serde_json::from_str::<Envelope>(body) {
            Ok(Envelope {
                error: ErrorField::Object { message, reason },
                ..
            }) => (message, reason),
            Ok(Envelope {
                error: ErrorField::Code(code),
                error_description,
            }) => (Some(error_description.unwrap_or(code)), None),
            Err(_) => {
                let trimmed = body.trim();
                ((!trimmed.is_empty()).then(|| trimmed.to_string()), None)
            },
        };

        Self::Api {
            status,
            message: message.unwrap_or_else(|| format!("request failed with status {status}")),
            reason,
        }
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spotify_error_object() {
        let err = ApiError::from_response(
            404,
            r#"{"error":{"status":404,"message":"Player command failed: No active device found","reason":"NO_ACTIVE_DEVICE"}}"#,
        );
        match &err {
            ApiError::Api {
                status,
                message,
                reason,
            } => {
                assert_eq!(*status, 404);
                assert_eq!(message, "Player command failed: No active device found");
                assert_eq!(reason.as_deref(), Some(NO_ACTIVE_DEVICE));
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_no_active_device());
    }

    #[test]
    fn message_alone_classifies_a_404() {
        let err = ApiError::from_response(
            404,
            r#"{"error":{"status":404,"message":"No active device found"}}"#,
        );
        assert!(err.is_no_active_device());

        let err = ApiError::from_response(
            403,
            r#"{"error":{"status":403,"message":"No active device found"}}"#,
        );
        assert!(!err.is_no_active_device());
    }

    #[test]
    fn other_failures_are_not_device_errors() {
        let err = ApiError::from_response(
            403,
            r#"{"error":{"status":403,"message":"Player command failed: Premium required","reason":"PREMIUM_REQUIRED"}}"#,
        );
        assert!(!err.is_no_active_device());
        assert!(err.to_string().contains("Premium required"));
        assert!(!ApiError::NoDevices.is_no_active_device());
    }

    #[test]
    fn flat_and_raw_error_bodies() {
        let err = ApiError::from_response(
            400,
            r#"{"error":"invalid_request","error_description":"Only valid bearer authentication supported"}"#,
        );
        assert!(err.to_string().contains("Only valid bearer authentication supported"));

        let err = ApiError::from_response(502, "Bad gateway");
        assert_eq!(err.to_string(), "Spotify API error (HTTP 502): Bad gateway");

        let err = ApiError::from_response(500, "");
        assert!(err.to_string().contains("request failed with status 500"));
    }

    #[test]
    fn no_devices_tells_user_what_to_do() {
        assert!(
            ApiError::NoDevices
                .to_string()
                .contains("open Spotify on a device")
        );
    }
}
