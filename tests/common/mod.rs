//! In-process HTTP/2 (h2c) gateway used by the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the gateway.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the gateway answers with.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            headers: vec![("apns-id", "00000000-0000-0000-0000-000000000001".to_string())],
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> Reply + Send + Sync>;

/// Gateway state shared with the tests.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    /// Handlers dropped before replying (the peer reset the stream).
    pub cancelled: Arc<AtomicUsize>,
    /// Client sessions that have ended.
    pub closed_sessions: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl TestGateway {
    /// Start a gateway that answers every request via `handler`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let closed_sessions = Arc::new(AtomicUsize::new(0));

        let handle = {
            let requests = Arc::clone(&requests);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let cancelled = Arc::clone(&cancelled);
            let closed_sessions = Arc::clone(&closed_sessions);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let handler = Arc::clone(&handler);
                    let requests = Arc::clone(&requests);
                    let in_flight = Arc::clone(&in_flight);
                    let max_in_flight = Arc::clone(&max_in_flight);
                    let cancelled = Arc::clone(&cancelled);
                    let closed_sessions = Arc::clone(&closed_sessions);
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let handler = Arc::clone(&handler);
                            let requests = Arc::clone(&requests);
                            let in_flight = Arc::clone(&in_flight);
                            let max_in_flight = Arc::clone(&max_in_flight);
                            let cancelled = Arc::clone(&cancelled);
                            async move {
                                let (parts, body) = req.into_parts();
                                let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
                                let recorded = RecordedRequest {
                                    method: parts.method,
                                    path: parts.uri.path().to_string(),
                                    headers: parts.headers,
                                    body,
                                };
                                requests.lock().unwrap().push(recorded.clone());
                                let reply = handler(&recorded);

                                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                                max_in_flight.fetch_max(now, Ordering::SeqCst);
                                // Runs only if hyper drops this future mid-sleep.
                                let waiting = scopeguard::guard((), |()| {
                                    in_flight.fetch_sub(1, Ordering::SeqCst);
                                    cancelled.fetch_add(1, Ordering::SeqCst);
                                });
                                tokio::time::sleep(reply.delay).await;
                                scopeguard::ScopeGuard::into_inner(waiting);
                                in_flight.fetch_sub(1, Ordering::SeqCst);

                                let mut response = Response::new(Full::new(Bytes::from(reply.body)));
                                *response.status_mut() = StatusCode::from_u16(reply.status).unwrap();
                                for (name, value) in reply.headers {
                                    response.headers_mut().append(name, value.parse().unwrap());
                                }
                                Ok::<_, Infallible>(response)
                            }
                        });
                        let _ = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                        closed_sessions.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            addr,
            requests,
            in_flight,
            max_in_flight,
            cancelled,
            closed_sessions,
            handle,
        }
    }

    /// `http://127.0.0.1:<port>`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far.
    pub fn received(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Poll `counter` until it reaches `expected` or `within` elapses, and
/// return its final value.
pub async fn wait_for(counter: &AtomicUsize, expected: usize, within: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + within;
    while counter.load(Ordering::SeqCst) < expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    counter.load(Ordering::SeqCst)
}
