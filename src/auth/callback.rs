//! Loopback listener that receives the provider's authorization redirect.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::AuthError;

pub const CALLBACK_PATH: &str = "/callback";

pub(crate) const SUCCESS_BODY: &str = "Authorization successful! You can close this window.";
const MAX_REQUEST_BYTES: usize = 8192;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// How the loopback listener talks to the browser.
#[derive(Clone)]
pub enum CallbackTransport {
    Tls(TlsAcceptor),
    /// Plain HTTP. Only meant for driving the flow from local tooling and tests.
    Plain,
}

impl std::fmt::Debug for CallbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackTransport::Tls(_) => f.write_str("Tls"),
            CallbackTransport::Plain => f.write_str("Plain"),
        }
    }
}

impl CallbackTransport {
    pub fn tls_from_pem(cert_file: &Path, key_file: &Path) -> Result<Self, AuthError> {
        let certs = {
            let file = File::open(cert_file).map_err(|e| {
                AuthError::Tls(format!("cannot open {}: {e}", cert_file.display()))
            })?;
            rustls_pemfile::certs(&mut BufReader::new(file))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AuthError::Tls(format!("invalid certificate: {e}")))?
        };
        if certs.is_empty() {
            return Err(AuthError::Tls(format!(
                "no certificates found in {}",
                cert_file.display()
            )));
        }

        let key = {
            let file = File::open(key_file).map_err(|e| {
                AuthError::Tls(format!("cannot open {}: {e}", key_file.display()))
            })?;
            rustls_pemfile::private_key(&mut BufReader::new(file))
                .map_err(|e| AuthError::Tls(format!("invalid private key: {e}")))?
                .ok_or_else(|| {
                    AuthError::Tls(format!("no private key found in {}", key_file.display()))
                })?
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AuthError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| AuthError::Tls(e.to_string()))?;

        Ok(CallbackTransport::Tls(TlsAcceptor::from(Arc::new(config))))
    }
}

/// A bound, not yet serving, callback listener.
pub struct CallbackServer {
    listener: TcpListener,
    transport: CallbackTransport,
}

impl CallbackServer {
    pub async fn bind(addr: SocketAddr, transport: CallbackTransport) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::Listener { addr, source })?;
        Ok(Self {
            listener,
            transport,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        self.listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(e.to_string()))
    }

    /// Serve `/callback` until one redirect has been evaluated or `shutdown`
    /// fires. Each connection is handled on its own task, and the verdict for
    /// the first redirect is sent on `result_tx`.
    pub async fn serve(
        self,
        expected_state: String,
        result_tx: oneshot::Sender<Result<String, AuthError>>,
        shutdown: CancellationToken,
    ) {
        let mut result_tx = Some(result_tx);
        let expected_state = Arc::new(expected_state);
        let (verdict_tx, mut verdict_rx) = mpsc::channel(1);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(verdict) = verdict_rx.recv() => {
                    if let Some(tx) = result_tx.take() {
                        let _ = tx.send(verdict);
                    }
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Callback accept failed: {e}");
                            continue;
                        }
                    };
                    debug!("Callback connection from {peer}");
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        self.transport.clone(),
                        expected_state.clone(),
                        verdict_tx.clone(),
                    ));
                }
            }
        }

        connections.shutdown().await;
        info!("Callback listener stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    transport: CallbackTransport,
    expected_state: Arc<String>,
    verdicts: mpsc::Sender<Result<String, AuthError>>,
) {
    let handled = async {
        match transport {
            CallbackTransport::Tls(acceptor) => {
                let tls = acceptor.accept(stream).await?;
                handle_connection(tls, &expected_state).await
            }
            CallbackTransport::Plain => handle_connection(stream, &expected_state).await,
        }
    };

    match tokio::time::timeout(CONNECTION_TIMEOUT, handled).await {
        Ok(Ok(Some(verdict))) => {
            let _ = verdicts.send(verdict).await;
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => debug!("Callback connection from {peer} failed: {e}"),
        Err(_) => debug!("Callback connection from {peer} timed out"),
    }
}

/// Reads one request and answers it. Returns `Some(verdict)` when the request
/// was a redirect to the callback route.
async fn handle_connection<S>(
    mut stream: S,
    expected_state: &str,
) -> std::io::Result<Option<Result<String, AuthError>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(&mut stream).await?;
    let Some((method, target)) = parse_request_line(&head) else {
        write_response(&mut stream, "400 Bad Request", "Malformed request").await?;
        return Ok(None);
    };

    let Ok(url) = Url::parse(&format!("https://127.0.0.1{target}")) else {
        write_response(&mut stream, "400 Bad Request", "Malformed request").await?;
        return Ok(None);
    };
    if url.path() != CALLBACK_PATH {
        write_response(&mut stream, "404 Not Found", "Not found").await?;
        return Ok(None);
    }
    if method != "GET" {
        write_response(&mut stream, "405 Method Not Allowed", "Method not allowed").await?;
        return Ok(None);
    }

    let verdict = evaluate_callback(&url, expected_state);
    match &verdict {
        Ok(_) => write_response(&mut stream, "200 OK", SUCCESS_BODY).await?,
        Err(e) => {
            let body = format!("Authorization failed: {e}. You can close this window.");
            write_response(&mut stream, "400 Bad Request", &body).await?
        }
    }
    Ok(Some(verdict))
}

/// Checks the CSRF state first, then pulls out the grant code.
pub fn evaluate_callback(url: &Url, expected_state: &str) -> Result<String, AuthError> {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    let state = state.unwrap_or_default();
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err(AuthError::StateMismatch);
    }
    if let Some(error) = error {
        return Err(AuthError::MissingCode(Some(error)));
    }
    match code {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(AuthError::MissingCode(None)),
    }
}

async fn read_request_head<S>(stream: &mut S) -> std::io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    target.starts_with('/').then_some((method, target))
}

async fn write_response<S>(stream: &mut S, status: &str, body: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(query: &str) -> Url {
        Url::parse(&format!("https://127.0.0.1/callback?{query}")).unwrap()
    }

    #[test]
    fn test_evaluate_callback_extracts_code() {
        let code = evaluate_callback(&url("state=s1&code=abc"), "s1").unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_evaluate_callback_checks_state_before_code() {
        let err = evaluate_callback(&url("state=other"), "s1").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));

        let err = evaluate_callback(&url("code=abc"), "s1").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn test_evaluate_callback_missing_code() {
        let err = evaluate_callback(&url("state=s1&code="), "s1").unwrap_err();
        assert!(matches!(err, AuthError::MissingCode(None)));
    }

    #[test]
    fn test_evaluate_callback_provider_error() {
        let err = evaluate_callback(&url("state=s1&error=access_denied"), "s1").unwrap_err();
        assert!(matches!(err, AuthError::MissingCode(Some(reason)) if reason == "access_denied"));
    }

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_request_line("GET /callback?code=1 HTTP/1.1\r\nHost: x\r\n\r\n"),
            Some(("GET", "/callback?code=1"))
        );
        assert_eq!(parse_request_line("garbage"), None);
    }

    #[test]
    fn test_tls_from_missing_files_fails() {
        let err = CallbackTransport::tls_from_pem(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Tls(_)));
    }
}
