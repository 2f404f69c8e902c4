//! Single-use loopback listener receiving the OAuth redirect.

use std::{net::SocketAddr, time::Duration};

use {
    subtle::ConstantTimeEq,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        time::{Instant, timeout_at},
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{AuthError, Result},
    http::{CallbackRequest, header_complete, html_response, parse_request},
};

/// Watchdog for one login attempt.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// How long one connection may take to send its request headers. Browsers
/// open speculative connections that never send anything; those must not
/// hold up the real redirect.
pub const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_HEADER_BYTES: usize = 16 * 1024;

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>Cadenza connected</title>
<style>body{font-family:system-ui;display:flex;align-items:center;justify-content:center;height:100vh;margin:0;background:#121212;color:#e8e8e8}
.box{text-align:center;padding:40px}.ok{color:#1ed760;font-size:2em;margin-bottom:16px}</style></head>
<body><div class="box"><div class="ok">&#10003;</div><p>Spotify is connected. You can close this window.</p></div></body></html>"#;

const NOT_FOUND_HTML: &str = "<!DOCTYPE html><html><body><p>Not found.</p></body></html>";

const BAD_REQUEST_HTML: &str = "<!DOCTYPE html><html><body><p>Bad request.</p></body></html>";

const METHOD_NOT_ALLOWED_HTML: &str =
    "<!DOCTYPE html><html><body><p>Method not allowed.</p></body></html>";

/// Lifecycle of the listener. A server only exists once bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Bound,
    Listening,
    Accepted,
    Completed,
    Errored,
    TimedOut,
}

impl ListenerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::TimedOut)
    }
}

/// What one accepted connection amounted to.
enum Outcome {
    KeepListening,
    Code(String),
    Failed(AuthError),
    Deadline,
}

/// Loopback HTTP listener that accepts exactly one valid OAuth redirect.
#[derive(Debug)]
pub struct CallbackServer {
    listener: Option<TcpListener>,
    port: u16,
    callback_path: String,
    expected_state: String,
    timeout: Duration,
    read_timeout: Duration,
    state: ListenerState,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` (`0` picks a free port).
    pub async fn bind(
        port: u16,
        callback_path: impl Into<String>,
        expected_state: impl Into<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))
            .await
            .map_err(|source| AuthError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| AuthError::Bind { port, source })?
            .port();
        debug!(port, "callback listener bound");

        Ok(Self {
            listener: Some(listener),
            port,
            callback_path: callback_path.into(),
            expected_state: expected_state.into(),
            timeout: CALLBACK_TIMEOUT,
            read_timeout: CONNECTION_READ_TIMEOUT,
            state: ListenerState::Bound,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-connection limit for receiving the request headers.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Accept connections until a valid callback arrives, a terminal error
    /// occurs, or the watchdog fires. The listener is torn down on return.
    ///
    /// On success the 200 page has already been written and flushed, so the
    /// caller's code exchange never delays what the browser shows.
    pub async fn wait_for_code(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let accepted = {
                let Some(listener) = self.listener.as_ref() else {
                    return Err(AuthError::Listener(std::io::Error::other(
                        "callback listener already closed",
                    )));
                };
                self.state = ListenerState::Listening;
                timeout_at(deadline, listener.accept()).await
            };

            let (stream, peer) = match accepted {
                Err(_) => return Err(self.timed_out()),
                Ok(Err(e)) => {
                    warn!(port = self.port, error = %e, "callback listener accept failed");
                    self.teardown(ListenerState::Errored);
                    return Err(AuthError::Listener(e));
                },
                Ok(Ok(conn)) => conn,
            };

            self.state = ListenerState::Accepted;
            debug!(%peer, "callback connection accepted");

            match self.handle_connection(stream, deadline).await {
                Outcome::KeepListening => continue,
                Outcome::Code(code) => {
                    info!(port = self.port, "authorization code received");
                    self.teardown(ListenerState::Completed);
                    return Ok(code);
                },
                Outcome::Deadline => return Err(self.timed_out()),
                Outcome::Failed(e) => {
                    self.teardown(ListenerState::Errored);
                    return Err(e);
                },
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream, deadline: Instant) -> Outcome {
        let read_deadline = deadline.min(Instant::now() + self.read_timeout);
        let raw = match read_header_block(&mut stream, read_deadline, deadline).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Outcome::KeepListening,
            Err(HeaderError::TooLarge) => {
                respond(&mut stream, "431 Request Header Fields Too Large", BAD_REQUEST_HTML).await;
                return Outcome::KeepListening;
            },
            Err(HeaderError::Deadline) => return Outcome::Deadline,
        };

        let Some(request) = parse_request(&raw) else {
            debug!("unparseable request on callback listener");
            respond(&mut stream, "400 Bad Request", BAD_REQUEST_HTML).await;
            return Outcome::KeepListening;
        };

        if request.path != self.callback_path {
            debug!(path = %request.path, "ignoring request for unrelated path");
            respond(&mut stream, "404 Not Found", NOT_FOUND_HTML).await;
            return Outcome::KeepListening;
        }

        if request.method != "GET" {
            debug!(method = %request.method, "ignoring non-GET callback request");
            respond(&mut stream, "405 Method Not Allowed", METHOD_NOT_ALLOWED_HTML).await;
            return Outcome::KeepListening;
        }

        self.handle_callback(&mut stream, &request).await
    }

    async fn handle_callback(&self, stream: &mut TcpStream, request: &CallbackRequest) -> Outcome {
        let given_state = request.param("state").unwrap_or_default();
        if !states_match(given_state, &self.expected_state) {
            error!(
                port = self.port,
                "OAuth callback state mismatch, rejecting (possible CSRF)"
            );
            respond(
                stream,
                "400 Bad Request",
                &error_page(
                    "Login rejected",
                    "The login response did not match this session. Start the login again from Cadenza.",
                ),
            )
            .await;
            return Outcome::Failed(AuthError::Csrf);
        }

        if let Some(err) = request.param("error") {
            let description = request
                .param("error_description")
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            warn!(error = %err, "authorization declined");
            let detail = description.as_deref().unwrap_or(err);
            respond(stream, "400 Bad Request", &error_page("Login failed", detail)).await;
            return Outcome::Failed(AuthError::Provider {
                error: err.to_string(),
                description,
            });
        }

        match request.param("code").filter(|c| !c.is_empty()) {
            Some(code) => {
                respond(stream, "200 OK", SUCCESS_HTML).await;
                Outcome::Code(code.to_string())
            },
            None => {
                respond(
                    stream,
                    "400 Bad Request",
                    &error_page("Login failed", "The callback carried no authorization code."),
                )
                .await;
                Outcome::Failed(AuthError::Parse(
                    "OAuth callback carried neither code nor error".into(),
                ))
            },
        }
    }

    fn timed_out(&mut self) -> AuthError {
        warn!(
            port = self.port,
            timeout_secs = self.timeout.as_secs(),
            "no OAuth callback before the deadline, closing listener"
        );
        self.teardown(ListenerState::TimedOut);
        AuthError::Timeout(self.timeout.as_secs())
    }

    /// Close the socket and record the terminal state. Safe to call from
    /// any exit path, any number of times.
    fn teardown(&mut self, outcome: ListenerState) {
        if let Some(listener) = self.listener.take() {
            drop(listener);
            debug!(port = self.port, state = ?outcome, "callback listener closed");
        }
        if !self.state.is_terminal() {
            self.state = outcome;
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.teardown(ListenerState::Errored);
    }
}

enum HeaderError {
    TooLarge,
    Deadline,
}

/// Read until the blank line ending the header block.
///
/// `Ok(None)` means the peer went away first or stayed silent past
/// `read_deadline` (speculative browser connections do both); that is not a
/// malformed request. Only the listener `deadline` is an error.
async fn read_header_block(
    stream: &mut TcpStream,
    read_deadline: Instant,
    deadline: Instant,
) -> Result<Option<String>, HeaderError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = match timeout_at(read_deadline, stream.read(&mut chunk)).await {
            Err(_) if read_deadline < deadline => {
                debug!(buffered = buf.len(), "dropping idle callback connection");
                return Ok(None);
            },
            Err(_) => return Err(HeaderError::Deadline),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "callback connection read failed");
                return Ok(None);
            },
        };
        if n == 0 {
            debug!(buffered = buf.len(), "callback connection closed before header end");
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if header_complete(&buf) {
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(HeaderError::TooLarge);
        }
    }
}

async fn respond(stream: &mut TcpStream, status_line: &str, body: &str) {
    let response = html_response(status_line, body);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to write callback response");
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

fn states_match(given: &str, expected: &str) -> bool {
    bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

fn error_page(title: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{title}</title>
<style>body{{font-family:system-ui;display:flex;align-items:center;justify-content:center;height:100vh;margin:0;background:#121212;color:#e8e8e8}}
.box{{text-align:center;padding:40px}}.err{{color:#f15e6c;font-size:2em;margin-bottom:16px}}</style></head>
<body><div class="box"><div class="err">&#10007;</div><p>{}</p></div></body></html>"#,
        escape_html(detail)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
