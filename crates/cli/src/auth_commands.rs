use std::sync::Arc;

use {
    anyhow::Result,
    cadenza_config::CadenzaConfig,
    cadenza_oauth::{OAuthFlow, TokenStore, load_oauth_config, storage::now_secs},
    clap::Subcommand,
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Connect your Spotify account in the browser.
    Login {
        /// Print the authorization URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },
    /// Show whether a Spotify account is connected.
    Status,
    /// Forget stored Spotify tokens.
    Logout,
}

pub async fn handle_auth(action: AuthAction, config: &CadenzaConfig) -> Result<()> {
    let flow = OAuthFlow::new(load_oauth_config(config), Arc::new(TokenStore::new()));
    match action {
        AuthAction::Login { no_browser } => login(flow.with_browser(!no_browser), !no_browser).await,
        AuthAction::Status => status(&flow),
        AuthAction::Logout => logout(&flow),
    }
}

async fn login(flow: OAuthFlow, open_browser: bool) -> Result<()> {
    let pending = flow.login().await?;

    println!("{}", login_banner(open_browser, &pending.url));
    println!(
        "Waiting for callback on {} ...",
        flow.config().redirect_uri(pending.port)
    );

    let tokens = pending.wait().await?;
    let scopes = if tokens.scope.is_empty() {
        "none".to_string()
    } else {
        tokens.scope.replace(' ', ", ")
    };
    println!("Logged in to Spotify (scopes: {scopes})");
    Ok(())
}

fn login_banner(open_browser: bool, url: &str) -> String {
    if open_browser {
        format!("Opening browser for Spotify authorization...\nIf it does not open, visit:\n{url}")
    } else {
        format!("Visit this URL to authorize Cadenza with Spotify:\n{url}")
    }
}

fn status(flow: &OAuthFlow) -> Result<()> {
    let Some(tokens) = flow.store().get() else {
        println!("Not logged in. Run `cadenza auth login`.");
        return Ok(());
    };

    let remaining = tokens.remaining_secs(now_secs());
    let validity = if remaining > 0 {
        let hours = remaining / 3600;
        let mins = (remaining % 3600) / 60;
        format!("valid ({hours}h {mins}m remaining)")
    } else if tokens.refresh_token.is_some() {
        "expired (refreshes on next request)".to_string()
    } else {
        "expired (log in again)".to_string()
    };
    println!("spotify [{validity}]");
    if !tokens.scope.is_empty() {
        println!("scopes: {}", tokens.scope);
    }
    println!("token file: {}", flow.store().path().display());
    Ok(())
}

fn logout(flow: &OAuthFlow) -> Result<()> {
    flow.logout();
    println!("Logged out from Spotify");
    Ok(())
}
