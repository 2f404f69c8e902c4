use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    reqwest::StatusCode,
    secrecy::ExposeSecret,
    serde::Deserialize,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    callback_server::{CALLBACK_TIMEOUT, CallbackServer},
    defaults::validate,
    error::{AuthError, Result},
    http::encode_query,
    storage::{TokenStore, now_secs},
    types::{OAuthConfig, PkceSession, TokenGrant, TokenSet},
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the authorization URL for `session`.
pub fn build_authorize_url(config: &OAuthConfig, redirect_uri: &str, session: &PkceSession) -> String {
    let scope = config.scopes.join(" ");
    let query = encode_query([
        ("client_id", config.client_id.as_str()),
        ("code_challenge", session.code_challenge.as_str()),
        ("code_challenge_method", "S256"),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", scope.as_str()),
        ("state", session.state.as_str()),
    ]);
    format!("{}?{query}", config.auth_url)
}

/// A login whose browser leg is in flight.
pub struct PendingLogin {
    /// Authorization URL opened in the browser.
    pub url: String,
    /// Port the callback listener bound.
    pub port: u16,
    handle: JoinHandle<Result<TokenSet>>,
}

impl PendingLogin {
    /// Wait for the callback and the code exchange.
    pub async fn wait(self) -> Result<TokenSet> {
        self.handle
            .await
            .map_err(|e| AuthError::Task(e.to_string()))?
    }
}

/// Releases the one-login-at-a-time flag when dropped.
struct LoginGuard(Arc<AtomicBool>);

impl LoginGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AuthError::LoginInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for LoginGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authorization code + PKCE flow and the token lifecycle behind it.
#[derive(Clone)]
pub struct OAuthFlow {
    config: OAuthConfig,
    store: Arc<TokenStore>,
    client: reqwest::Client,
    login_active: Arc<AtomicBool>,
    refresh_lock: Arc<Mutex<()>>,
    callback_timeout: Duration,
    open_browser: bool,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig, store: Arc<TokenStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            config,
            store,
            client,
            login_active: Arc::new(AtomicBool::new(false)),
            refresh_lock: Arc::new(Mutex::new(())),
            callback_timeout: CALLBACK_TIMEOUT,
            open_browser: true,
        }
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Whether `login` launches the system browser.
    #[must_use]
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Start a login: bind the callback listener, open the browser and return
    /// without waiting. The returned handle resolves once the callback has
    /// been answered and the code exchanged.
    ///
    /// Only one login may be pending at a time.
    pub async fn login(&self) -> Result<PendingLogin> {
        validate(&self.config)?;
        let guard = LoginGuard::acquire(&self.login_active)?;

        let session = PkceSession::generate()?;
        let mut server = CallbackServer::bind(
            self.config.redirect_port,
            self.config.callback_path.clone(),
            session.state.clone(),
        )
        .await?
        .with_timeout(self.callback_timeout);

        let port = server.port();
        let redirect_uri = self.config.redirect_uri(port);
        let url = build_authorize_url(&self.config, &redirect_uri, &session);
        info!(port, "waiting for Spotify authorization");

        if self.open_browser {
            launch_browser(url.clone());
        }

        let flow = self.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            // The success page is already flushed when this returns.
            let code = server.wait_for_code().await?;
            drop(server);
            let tokens = flow
                .exchange_code_at(&code, session.verifier(), &redirect_uri)
                .await;
            match &tokens {
                Ok(_) => info!("Spotify login complete"),
                Err(e) => warn!(error = %e, "authorization code exchange failed"),
            }
            tokens
        });

        Ok(PendingLogin { url, port, handle })
    }

    /// Exchange an authorization code for tokens and store them.
    ///
    /// The redirect URI is derived from the configured port, so that port
    /// must be fixed; codes from a [`login`](Self::login) on an ephemeral
    /// port are exchanged by the login task itself.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet> {
        if self.config.redirect_port == 0 {
            return Err(AuthError::Config(
                "cannot exchange a code for redirect port 0; the redirect URI must name the \
                 port the callback was received on"
                    .into(),
            ));
        }
        let redirect_uri = self.config.redirect_uri(self.config.redirect_port);
        self.exchange_code_at(code, verifier, &redirect_uri).await
    }

    async fn exchange_code_at(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        let grant = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", &self.config.client_id),
                ("code_verifier", verifier),
            ])
            .await?;
        Ok(self.save(grant))
    }

    /// Refresh the access token using the stored refresh token.
    pub async fn refresh_token(&self) -> Result<TokenSet> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(AuthError::NoRefreshToken);
        };

        debug!("refreshing Spotify access token");
        let grant = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.config.client_id),
            ])
            .await
            .inspect_err(|e| warn!(error = %e, "token refresh failed"))?;
        Ok(self.save(grant))
    }

    /// A currently valid access token, refreshing first if the stored one
    /// has expired. Every API call goes through here.
    pub async fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.valid_access_token()? {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_access_token()? {
            return Ok(token);
        }

        let tokens = self.refresh_token().await?;
        usable_access_token(&tokens)
    }

    /// Replace an access token the API rejected with 401.
    ///
    /// Refreshes under the same lock as [`ensure_token`](Self::ensure_token).
    /// If another caller already replaced `rejected`, the newer token is
    /// returned without spending the refresh token again.
    pub async fn refresh_rejected(&self, rejected: &str) -> Result<String> {
        let _refreshing = self.refresh_lock.lock().await;
        if let Some(tokens) = self.store.get()
            && tokens.access_token.expose_secret() != rejected
            && !tokens.is_expired_at(now_secs())
        {
            debug!("rejected access token already replaced");
            return Ok(tokens.access_token.expose_secret().clone());
        }

        let tokens = self.refresh_token().await?;
        usable_access_token(&tokens)
    }

    /// `Ok(None)` when stored tokens exist but have expired.
    fn valid_access_token(&self) -> Result<Option<String>> {
        let tokens = self.store.get().ok_or(AuthError::NotAuthenticated)?;
        if tokens.is_expired_at(now_secs()) {
            return Ok(None);
        }
        Ok(Some(tokens.access_token.expose_secret().clone()))
    }

    /// Whether tokens are stored. Expired tokens count: they can be refreshed.
    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Forget stored tokens.
    pub fn logout(&self) {
        self.store.clear();
        info!("logged out of Spotify");
    }

    fn save(&self, grant: TokenGrant) -> TokenSet {
        let written = self.store.store(grant.clone());
        if !written {
            warn!("tokens kept in memory only; the next start will require login");
        }
        // The store caches even when the write fails.
        self.store.get().unwrap_or_else(|| TokenSet {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now_secs(),
            scope: grant.scope.unwrap_or_default(),
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".into()),
            stored_at: now_secs(),
        })
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_token_response(status, &body)
    }
}

/// The access token of a freshly refreshed set, which must not already be
/// expired.
fn usable_access_token(tokens: &TokenSet) -> Result<String> {
    if tokens.is_expired_at(now_secs()) {
        return Err(AuthError::Provider {
            error: "invalid_token_lifetime".into(),
            description: Some("refreshed access token is already expired".into()),
        });
    }
    Ok(tokens.access_token.expose_secret().clone())
}

/// Decode a token endpoint response. An `error` field wins over the status.
fn parse_token_response(status: StatusCode, body: &str) -> Result<TokenGrant> {
    if let Ok(err) = serde_json::from_str::<TokenErrorBody>(body) {
        return Err(AuthError::Provider {
            error: err.error,
            description: err.error_description,
        });
    }
    if !status.is_success() {
        return Err(AuthError::Provider {
            error: format!("HTTP {}", status.as_u16()),
            description: (!body.trim().is_empty()).then(|| body.trim().to_string()),
        });
    }
    serde_json::from_str(body).map_err(|e| AuthError::Parse(format!("token response: {e}")))
}

/// Open `url` on a blocking thread; failure only means the user copies the
/// URL by hand.
fn launch_browser(url: String) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = open::that(&url) {
            warn!(error = %e, "could not open browser; visit the login URL manually");
        }
    });
}
