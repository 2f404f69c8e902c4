mod auth_commands;
mod player_commands;

use {
    cadenza_gateway::SpotifyApi,
    clap::{Parser, Subcommand},
    tracing::{Subscriber, debug},
    tracing_subscriber::{
        EnvFilter,
        fmt::{self, MakeWriter},
        layer::SubscriberExt,
        util::SubscriberInitExt,
    },
};

#[derive(Parser)]
#[command(name = "cadenza", about = "Cadenza: Spotify playback from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Spotify account authorization.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    #[command(flatten)]
    Player(player_commands::PlayerCommand),
}

/// Logs go to `writer` in either format; stdout is reserved for command
/// output.
fn telemetry<W>(cli: &Cli, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(writer),
            ),
        )
    } else {
        Box::new(
            registry.with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(writer),
            ),
        )
    }
}

fn init_telemetry(cli: &Cli) {
    telemetry(cli, std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "cadenza starting");
    let config = cadenza_config::discover_and_load();

    match cli.command {
        Commands::Auth { action } => auth_commands::handle_auth(action, &config).await,
        Commands::Player(command) => {
            let api = SpotifyApi::from_config(&config);
            player_commands::handle_player(command, &api).await
        },
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth_commands::AuthAction, player_commands::PlayerCommand},
        cadenza_gateway::SearchType,
        std::{
            io,
            sync::{Arc, Mutex},
        },
    };

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_logs_go_to_the_log_writer() {
        let cli = Cli::try_parse_from(["cadenza", "devices", "--json-logs"]).unwrap();
        let captured = Captured::default();
        let sink = captured.clone();

        tracing::subscriber::with_default(telemetry(&cli, move || sink.clone()), || {
            tracing::error!(port = 8888, "listener failed");
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["fields"]["message"], "listener failed");
        assert_eq!(line["fields"]["port"], 8888);
    }

    #[test]
    fn parses_search_types() {
        let cli = Cli::try_parse_from([
            "cadenza",
            "search",
            "homogenic",
            "--type",
            "album,artist",
            "--limit",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Player(PlayerCommand::Search {
                query,
                kinds,
                limit,
            }) => {
                assert_eq!(query, "homogenic");
                assert_eq!(kinds, vec![SearchType::Album, SearchType::Artist]);
                assert_eq!(limit, 5);
            },
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn rejects_unknown_search_type() {
        assert!(Cli::try_parse_from(["cadenza", "search", "x", "--type", "song"]).is_err());
    }

    #[test]
    fn play_takes_repeated_uris() {
        let cli = Cli::try_parse_from([
            "cadenza",
            "play",
            "--uri",
            "spotify:track:a",
            "--uri",
            "spotify:track:b",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Player(PlayerCommand::Play { ref uris, .. }) if uris.len() == 2
        ));
        assert!(
            Cli::try_parse_from([
                "cadenza",
                "play",
                "--uri",
                "spotify:track:a",
                "--context",
                "spotify:album:b"
            ])
            .is_err()
        );
    }

    #[test]
    fn auth_subcommands_parse() {
        let cli = Cli::try_parse_from(["cadenza", "auth", "login", "--no-browser"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auth {
                action: AuthAction::Login { no_browser: true }
            }
        ));
        assert!(Cli::try_parse_from(["cadenza", "now-playing", "--json-logs"]).is_ok());
    }
}
