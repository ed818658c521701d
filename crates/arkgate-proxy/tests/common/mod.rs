//! Fake Ark backend for integration tests.
//!
//! Binds an axum app to `127.0.0.1:0`, counts calls, records what it received,
//! and answers with a scripted [`Reply`].

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arkgate_core::{BackendConfig, GatewayConfig};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// What the fake backend answers with.
#[derive(Clone)]
pub enum Reply {
    /// A complete body with the given status.
    Json { status: u16, body: &'static str },
    /// A streamed body, one element per body frame.
    Frames(Vec<&'static str>),
    /// One line, then a tick line every 20ms until the connection is dropped.
    Endless { first: &'static str },
    /// Sleep before answering `{}`.
    Slow(Duration),
}

/// A request as seen by the backend.
#[derive(Debug, Clone)]
pub struct Received {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct FakeState {
    reply: Reply,
    calls: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
    released: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Handle to a running fake backend.
pub struct FakeBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
    released: Option<oneshot::Receiver<()>>,
}

impl FakeBackend {
    pub async fn start(reply: Reply) -> Self {
        let (released_tx, released_rx) = oneshot::channel();
        let state = FakeState {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(Mutex::new(Some(released_tx))),
        };

        let app = Router::new()
            .route("/api/v3/chat/completions", post(handle))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            calls: state.calls,
            received: state.received,
            released: Some(released_rx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v3", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Received {
        self.received.lock().unwrap().last().cloned().unwrap()
    }

    /// Resolves when an `Endless` body has been dropped by the server, i.e.
    /// the gateway closed its connection.
    pub fn released(&mut self) -> oneshot::Receiver<()> {
        self.released.take().unwrap()
    }

    /// Gateway configuration pointing at this backend.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            backend: BackendConfig {
                base_url: self.base_url(),
                timeout: Duration::from_secs(10),
            },
            ..GatewayConfig::default()
        }
    }
}

/// Drops its sender when the body stream holding it is dropped.
struct ReleaseGuard(Option<oneshot::Sender<()>>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(State(state): State<FakeState>, headers: HeaderMap, body: Bytes) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);

    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.received.lock().unwrap().push(Received {
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    match state.reply {
        Reply::Json { status, body } => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        Reply::Frames(frames) => {
            let stream = futures_util::stream::iter(
                frames
                    .into_iter()
                    .map(|frame| Ok::<_, io::Error>(Bytes::from_static(frame.as_bytes()))),
            );
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        Reply::Endless { first } => {
            let guard = ReleaseGuard(state.released.lock().unwrap().take());
            let ticks = futures_util::stream::unfold((), |()| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some((Bytes::from_static(b"data: {\"tick\":true}\n"), ()))
            });
            let stream = futures_util::stream::once(async move { Bytes::from_static(first.as_bytes()) })
                .chain(ticks)
                .map(move |chunk| {
                    let _held = &guard;
                    Ok::<_, io::Error>(chunk)
                });
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        Reply::Slow(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, "{}").into_response()
        }
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api/v3")
}
