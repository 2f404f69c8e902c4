use {
    anyhow::Result,
    cadenza_gateway::{Device, PlayRequest, SearchType, SpotifyApi},
    clap::Subcommand,
    serde_json::Value,
};

#[derive(Subcommand)]
pub enum PlayerCommand {
    /// List Spotify Connect devices.
    Devices,
    /// Show the currently playing item.
    NowPlaying,
    /// Search the catalog.
    Search {
        query: String,
        /// Comma-separated result types (track, album, artist, playlist, ...).
        #[arg(long = "type", value_delimiter = ',', default_value = "track")]
        kinds: Vec<SearchType>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Start or resume playback.
    Play {
        /// Track URI to play; repeat for several.
        #[arg(long = "uri")]
        uris: Vec<String>,
        /// Album, artist or playlist URI to play.
        #[arg(long, conflicts_with = "uris")]
        context: Option<String>,
        /// Device to play on instead of the active one.
        #[arg(long)]
        device: Option<String>,
    },
    /// Pause playback.
    Pause,
    /// Skip to the next track.
    Next,
    /// Go back to the previous track.
    Previous,
    /// Add a track or episode to the queue.
    Queue { uri: String },
    /// Move playback to another device.
    Transfer {
        device_id: String,
        /// Start playing on the new device.
        #[arg(long)]
        play: bool,
    },
    /// Show a track.
    Track { id: String },
    /// Show an album.
    Album { id: String },
    /// Show an artist.
    Artist { id: String },
    /// Show a playlist.
    Playlist { id: String },
}

pub async fn handle_player(command: PlayerCommand, api: &SpotifyApi) -> Result<()> {
    match command {
        PlayerCommand::Devices => {
            let devices = api.devices().await?;
            if devices.is_empty() {
                println!("No devices found. Open Spotify on a device.");
            }
            for device in &devices {
                println!("{}", describe_device(device));
            }
        },
        PlayerCommand::NowPlaying => match api.currently_playing().await? {
            Some(playing) => println!("{}", describe_playing(&playing)),
            None => println!("Nothing is playing."),
        },
        PlayerCommand::Search {
            query,
            kinds,
            limit,
        } => {
            let results = api.search(&query, &kinds, limit).await?;
            for line in describe_search(&results) {
                println!("{line}");
            }
        },
        PlayerCommand::Play {
            uris,
            context,
            device,
        } => {
            let request = PlayRequest {
                device_id: device,
                context_uri: context,
                uris,
                ..Default::default()
            };
            api.play(&request).await?;
            println!("Playing.");
        },
        PlayerCommand::Pause => {
            api.pause().await?;
            println!("Paused.");
        },
        PlayerCommand::Next => {
            api.next().await?;
            println!("Skipped.");
        },
        PlayerCommand::Previous => {
            api.previous().await?;
            println!("Back to the previous track.");
        },
        PlayerCommand::Queue { uri } => {
            api.queue(&uri).await?;
            println!("Queued {uri}.");
        },
        PlayerCommand::Transfer { device_id, play } => {
            api.transfer_playback(&device_id, play).await?;
            println!("Playback transferred to {device_id}.");
        },
        PlayerCommand::Track { id } => print_json(&api.track(&id).await?)?,
        PlayerCommand::Album { id } => print_json(&api.album(&id).await?)?,
        PlayerCommand::Artist { id } => print_json(&api.artist(&id).await?)?,
        PlayerCommand::Playlist { id } => print_json(&api.playlist(&id).await?)?,
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_device(device: &Device) -> String {
    let marker = if device.is_active { "*" } else { " " };
    let mut line = format!(
        "{marker} {} ({}) {}",
        device.name,
        device.kind,
        device.id.as_deref().unwrap_or("-")
    );
    if let Some(volume) = device.volume_percent {
        line.push_str(&format!(" vol {volume}%"));
    }
    if device.is_restricted {
        line.push_str(" [restricted]");
    }
    line
}

fn artist_names(item: &Value) -> String {
    item["artists"]
        .as_array()
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a["name"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn describe_playing(playing: &Value) -> String {
    let item = &playing["item"];
    let name = item["name"].as_str().unwrap_or("unknown");
    let state = if playing["is_playing"].as_bool().unwrap_or(false) {
        "playing"
    } else {
        "paused"
    };
    let artists = artist_names(item);
    if artists.is_empty() {
        format!("{name} [{state}]")
    } else {
        format!("{name} by {artists} [{state}]")
    }
}

/// One line per result, grouped by type in the order Spotify returns them.
fn describe_search(results: &Value) -> Vec<String> {
    let Some(groups) = results.as_object() else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    for (kind, group) in groups {
        let items = group["items"].as_array().map(Vec::as_slice).unwrap_or_default();
        lines.push(format!("{kind}: {} result(s)", items.len()));
        // Playlist searches can contain null entries.
        for item in items.iter().filter(|i| !i.is_null()) {
            let name = item["name"].as_str().unwrap_or("unknown");
            let uri = item["uri"].as_str().unwrap_or("-");
            let artists = artist_names(item);
            if artists.is_empty() {
                lines.push(format!("  {name}  {uri}"));
            } else {
                lines.push(format!("  {name} by {artists}  {uri}"));
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn now_playing_summary() {
        let playing = json!({
            "is_playing": true,
            "item": {"name": "Hyperballad", "artists": [{"name": "Björk"}]}
        });
        assert_eq!(describe_playing(&playing), "Hyperballad by Björk [playing]");
    }

    #[test]
    fn search_summary_skips_null_items() {
        let results = json!({
            "playlists": {"items": [null, {"name": "Mix", "uri": "spotify:playlist:1"}]}
        });
        assert_eq!(describe_search(&results), vec![
            "playlists: 2 result(s)".to_string(),
            "  Mix  spotify:playlist:1".to_string(),
        ]);
    }

    #[test]
    fn device_line_marks_active() {
        let device = Device {
            id: Some("d1".into()),
            name: "Kitchen".into(),
            kind: "Speaker".into(),
            is_active: true,
            is_restricted: false,
            is_private_session: false,
            volume_percent: Some(30),
        };
        assert_eq!(describe_device(&device), "* Kitchen (Speaker) d1 vol 30%");
    }
}
