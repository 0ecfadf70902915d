//! One persistent HTTP/2 session with many concurrent request streams.
//!
//! # Architecture
//!
//! ```text
//! Connection::open(authority)
//!   ├─ TCP connect
//!   ├─ TLS + ALPN "h2" (https) / prior-knowledge h2c (http)
//!   ├─ HTTP/2 handshake ──► SendRequest (cloned per request)
//!   └─ tokio::spawn(driver) ── polls the session until it closes or is dropped
//!
//! Connection::request(path, options)
//!   ├─ header wait  (stream capacity + response headers, bounded by
//!   │                options.timeout, stream reset on expiry)
//!   └─ body wait    (chunks buffered in order, then UTF-8 → JSON)
//! ```
//!
//! Every `request` call opens its own stream, so callers may have any number
//! of requests in flight on one `Connection` at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http2::{self, SendRequest};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use crate::error::{BoxError, PushError};
use crate::response::Response;

/// Per-request settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Request method; `GET` when unset.
    pub method: Option<Method>,
    /// Extra request headers, merged after method and path.
    pub headers: HeaderMap,
    /// Request body. Without one the stream is half-closed with the headers.
    pub body: Option<Bytes>,
    /// Maximum time to wait for response headers.
    pub timeout: Option<Duration>,
}

/// A persistent HTTP/2 session to a single authority.
#[derive(Debug)]
pub struct Connection {
    authority: String,
    scheme: String,
    host: String,
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    open_streams: Arc<AtomicUsize>,
}

impl Connection {
    /// Connect to `authority` (`https://host[:port]` or `http://host[:port]`).
    ///
    /// Fails immediately if the TCP, TLS or HTTP/2 handshake fails.
    pub async fn open(authority: &str) -> Result<Self, PushError> {
        let uri: Uri = authority
            .parse()
            .map_err(|e| PushError::Config(format!("invalid endpoint {authority}: {e}")))?;
        let scheme = uri.scheme_str().unwrap_or("https").to_string();
        let host = uri
            .host()
            .ok_or_else(|| PushError::Config(format!("endpoint {authority} has no host")))?
            .to_string();
        let port = uri
            .port_u16()
            .unwrap_or(if scheme == "http" { 80 } else { 443 });

        let connect_err = |source: BoxError| PushError::Connection {
            authority: authority.to_string(),
            source,
        };

        if scheme != "https" && scheme != "http" {
            return Err(PushError::Config(format!(
                "unsupported scheme {scheme:?} in endpoint {authority}"
            )));
        }

        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| connect_err(e.into()))?;
        tcp.set_nodelay(true).map_err(|e| connect_err(e.into()))?;

        let (sender, driver) = if scheme == "https" {
            let server_name =
                ServerName::try_from(host.clone()).map_err(|e| connect_err(e.into()))?;
            let connector = tls_connector().map_err(|e| connect_err(e.into()))?;
            let tls = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| connect_err(e.into()))?;
            if tls.get_ref().1.alpn_protocol() != Some(b"h2".as_slice()) {
                return Err(connect_err("server did not negotiate HTTP/2".into()));
            }
            handshake(tls, authority).await.map_err(|e| connect_err(e.into()))?
        } else {
            handshake(tcp, authority).await.map_err(|e| connect_err(e.into()))?
        };

        log::info!("[H2] Session established to {}", authority);

        let host = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        Ok(Self {
            authority: authority.to_string(),
            scheme,
            host,
            sender,
            driver,
            open_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Authority this session was opened against.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Whether the session can no longer carry new streams.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Number of request streams currently held by in-flight `request` calls.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Tear down the session: the driver task is stopped and the transport
    /// closed.
    pub fn close(self) {
        log::debug!("[H2] Closing session to {}", self.authority);
        self.driver.abort();
    }

    /// Perform one request on a new stream and buffer the whole response.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Response, PushError> {
        let RequestOptions {
            method,
            headers,
            body,
            timeout,
        } = options;

        let uri: Uri = format!("{}://{}{}", self.scheme, self.host, path)
            .parse()
            .map_err(|e| PushError::Validation(format!("invalid request path {path:?}: {e}")))?;

        // An empty `Full` reports end-of-stream up front, so the HEADERS frame
        // goes out with END_STREAM set.
        let mut request = http::Request::new(Full::new(body.unwrap_or_default()));
        *request.method_mut() = method.unwrap_or(Method::GET);
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        let _stream = scopeguard::guard(Arc::clone(&self.open_streams), |count| {
            count.fetch_sub(1, Ordering::SeqCst);
        });

        let mut sender = self.sender.clone();
        let exchange = async move {
            sender.ready().await?;
            sender.send_request(request).await
        };

        // Dropping `exchange` on expiry resets the stream.
        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result?,
                Err(_) => {
                    log::warn!("[H2] No response headers for {} within {:?}", path, limit);
                    return Err(PushError::Timeout(limit));
                }
            },
            None => exchange.await?,
        };

        let (parts, incoming) = response.into_parts();
        let bytes = incoming.collect().await?.to_bytes();
        let body = decode_body(&bytes)?;

        Ok(Response::new(parts.status.as_u16(), parts.headers, body))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Decode a buffered body: empty → `None`, otherwise UTF-8 JSON.
pub fn decode_body(bytes: &[u8]) -> Result<Option<Value>, PushError> {
    let text = std::str::from_utf8(bytes).map_err(|e| PushError::Decode(e.into()))?;
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| PushError::Decode(e.into()))
}

async fn handshake<T>(
    io: T,
    authority: &str,
) -> Result<(SendRequest<Full<Bytes>>, JoinHandle<()>), hyper::Error>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (sender, session) = http2::handshake(TokioExecutor::new(), TokioIo::new(io)).await?;
    let label = authority.to_string();
    let driver = tokio::spawn(async move {
        match session.await {
            Ok(()) => log::debug!("[H2] Session to {} closed", label),
            Err(e) => log::warn!("[H2] Session to {} ended with error: {}", label, e),
        }
    });
    Ok((sender, driver))
}

fn tls_connector() -> Result<TlsConnector, rustls::Error> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}
