//! OAuth 2.0 authorization-code flow with PKCE and a loopback redirect.
//!
//! Both the Google calendar login and the Supabase OAuth sign-in use the same
//! desktop flow:
//!
//! 1. Generate a code verifier and its SHA-256 challenge ([`PkceFlow`])
//! 2. Bind a local HTTP listener on the first free port of a range
//! 3. Open the browser on the provider's consent page
//! 4. Receive `/callback?code=...&state=...` on the listener
//! 5. Exchange the code (with the verifier) for tokens
//!
//! Steps 1 to 4 live here; the exchange is provider specific.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, ProviderResult};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long to wait for the browser to come back.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const CALLBACK_PATH: &str = "/callback";

/// Default loopback port range.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (8080, 8090);

/// PKCE verifier, challenge and CSRF state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    /// base64url(SHA-256(verifier)).
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    pub fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Parameters delivered to the loopback redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    /// Echoed CSRF state; some providers do not send one back.
    pub state: Option<String>,
}

impl AuthorizationCallback {
    /// Fails unless the echoed state matches the one we sent.
    pub fn verify_state(&self, expected: &str) -> ProviderResult<()> {
        match self.state.as_deref() {
            Some(state) if state == expected => Ok(()),
            _ => Err(ProviderError::authentication(
                "OAuth state mismatch, possible CSRF attack",
            )),
        }
    }
}

/// A bound loopback listener waiting for the OAuth redirect.
#[derive(Debug)]
pub struct LoopbackServer {
    listener: TcpListener,
    port: u16,
}

impl LoopbackServer {
    /// Binds the first available port in `port_range` (inclusive).
    pub fn bind(port_range: (u16, u16)) -> ProviderResult<Self> {
        for port in port_range.0..=port_range.1 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                debug!("bound loopback server on port {}", port);
                return Ok(Self { listener, port });
            }
        }
        Err(ProviderError::configuration(format!(
            "no available port in range {}-{}",
            port_range.0, port_range.1
        )))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH)
    }

    /// Waits for the redirect, up to `timeout`.
    pub async fn wait(self, timeout: Duration) -> ProviderResult<AuthorizationCallback> {
        tokio::task::spawn_blocking(move || self.wait_blocking(timeout))
            .await
            .map_err(|e| ProviderError::internal(format!("callback task failed: {}", e)))?
    }

    fn wait_blocking(self, timeout: Duration) -> ProviderResult<AuthorizationCallback> {
        self.listener
            .set_nonblocking(false)
            .map_err(|e| ProviderError::internal(format!("failed to set blocking: {}", e)))?;

        let (tx, rx) = mpsc::channel();
        let listener = self.listener;

        // The accept loop runs on its own thread so the receive below can time out.
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = handle_connection(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ProviderError::authentication("OAuth callback timeout"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ProviderError::internal("callback channel disconnected"))
            }
        }
    }
}

/// Opens `url` in the browser, printing it when no browser can be launched.
pub fn open_browser(url: &str) {
    info!("opening browser for sign-in");
    debug!("authorization URL: {}", url);
    if let Err(e) = open::that(url) {
        warn!("failed to open browser: {}", e);
        eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
    }
}

fn handle_connection(mut stream: TcpStream) -> Option<ProviderResult<AuthorizationCallback>> {
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line).ok()?;

    let result = parse_callback_request(&request_line)?;

    let response = if result.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
        <html><body><h1>Signed in</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
        <html><body><h1>Sign-in failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Some(result)
}

/// Parses `GET /callback?... HTTP/1.1`.
///
/// Returns `None` for requests that are not the callback (favicon requests and
/// the like) so the listener keeps waiting.
pub fn parse_callback_request(request_line: &str) -> Option<ProviderResult<AuthorizationCallback>> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != CALLBACK_PATH {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for param in query.split('&') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            "error_description" => error_description = Some(value),
            _ => {}
        }
    }

    if let Some(error) = error {
        let detail = error_description.map(|d| format!(" ({})", d)).unwrap_or_default();
        return Some(Err(ProviderError::authentication(format!(
            "authorization denied: {}{}",
            error, detail
        ))));
    }

    Some(match code.filter(|c| !c.is_empty()) {
        Some(code) => Ok(AuthorizationCallback { code, state }),
        None => Err(ProviderError::authentication(
            "missing authorization code in callback",
        )),
    })
}
