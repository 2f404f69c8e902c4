use {
    reqwest::Method,
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use crate::{
    api::SpotifyApi,
    error::{ApiError, Result},
    types::{Device, DeviceList, PlayRequest},
};

impl SpotifyApi {
    /// Devices visible to the user's account.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let value = self
            .client
            .request(Method::GET, "/me/player/devices", &[], None)
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let list: DeviceList =
            serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(list.devices)
    }

    /// Move playback to `device_id`, starting it when `play` is set.
    pub async fn transfer_playback(&self, device_id: &str, play: bool) -> Result<()> {
        let body = json!({ "device_ids": [device_id], "play": play });
        self.client
            .request(Method::PUT, "/me/player", &[], Some(&body))
            .await?;
        Ok(())
    }

    /// The playing item, or `None` when nothing is playing.
    pub async fn currently_playing(&self) -> Result<Option<Value>> {
        let value = self
            .client
            .request(Method::GET, "/me/player/currently-playing", &[], None)
            .await?;
        Ok((!value.is_null()).then_some(value))
    }

    pub async fn play(&self, request: &PlayRequest) -> Result<Value> {
        let params = device_param(request.device_id.as_deref());
        let body = request.body();
        self.player_command(Method::PUT, "/me/player/play", &params, body.as_ref())
            .await
    }

    pub async fn pause(&self) -> Result<Value> {
        self.player_command(Method::PUT, "/me/player/pause", &[], None)
            .await
    }

    pub async fn next(&self) -> Result<Value> {
        self.player_command(Method::POST, "/me/player/next", &[], None)
            .await
    }

    pub async fn previous(&self) -> Result<Value> {
        self.player_command(Method::POST, "/me/player/previous", &[], None)
            .await
    }

    /// Append a track or episode URI to the queue.
    pub async fn queue(&self, uri: &str) -> Result<Value> {
        let params = [("uri", uri.to_string())];
        self.player_command(Method::POST, "/me/player/queue", &params, None)
            .await
    }

    /// Issue a playback command. If it fails because no device is active,
    /// activate one and retry exactly once.
    async fn player_command(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        match self
            .client
            .request(method.clone(), path, params, body)
            .await
        {
            Err(e) if e.is_no_active_device() => {
                self.activate_device(e).await?;
                self.client.request(method, path, params, body).await
            },
            other => other,
        }
    }

    /// Transfer playback to the first available device after a
    /// no-active-device failure. Gives back `original` when a device is
    /// already active, since the failure was then about something else.
    async fn activate_device(&self, original: ApiError) -> Result<()> {
        let devices = self.devices().await?;
        if devices.is_empty() {
            warn!("no Spotify devices available");
            return Err(ApiError::NoDevices);
        }
        if devices.iter().any(|d| d.is_active) {
            debug!("a device is already active, not retrying");
            return Err(original);
        }
        let Some((id, device)) = devices
            .iter()
            .find_map(|d| d.id.as_deref().filter(|_| d.is_available()).map(|id| (id, d)))
        else {
            warn!(count = devices.len(), "all Spotify devices are restricted");
            return Err(ApiError::NoDevices);
        };

        info!(device = %device.name, kind = %device.kind, "activating Spotify device");
        self.transfer_playback(id, false).await?;
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }
}

fn device_param(device_id: Option<&str>) -> Vec<(&'static str, String)> {
    device_id
        .map(|id| vec![("device_id", id.to_string())])
        .unwrap_or_default()
}
