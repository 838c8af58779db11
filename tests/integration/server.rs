//! Loopback HTTP server for integration tests.
//!
//! Serves a fixed set of files under `/files/<name>`. Unknown names get a 404.
//! Files can be gated on a [`Notify`] or made to stall after a prefix so that
//! tests can observe a download while it is in flight.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// One file the server can return.
#[derive(Clone, Default)]
pub struct ServedFile {
    body: Arc<Vec<u8>>,
    gate: Option<Arc<Notify>>,
    stall_after: Option<usize>,
}

impl ServedFile {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            ..Self::default()
        }
    }

    /// Holds the response until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sends the first `bytes` bytes, then never finishes the body.
    pub fn stalling_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }
}

#[derive(Clone, Default)]
struct ServerState {
    files: Arc<HashMap<String, ServedFile>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

/// A running server. It stops when the test runtime shuts down.
pub struct TestServer {
    base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub async fn start(files: Vec<(&str, ServedFile)>) -> anyhow::Result<Self> {
        let state = ServerState {
            files: Arc::new(files.into_iter().map(|(name, file)| (name.to_string(), file)).collect()),
            hits: Arc::default(),
        };
        let hits = Arc::clone(&state.hits);
        let app = Router::new().route("/files/{name}", get(serve_file)).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            hits,
        })
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.base_url)
    }

    /// Requests received for `name`, including 404s.
    pub fn hits(&self, name: &str) -> usize {
        self.hits.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Waits until `name` has been requested `count` times.
    pub async fn wait_for_hits(&self, name: &str, count: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while self.hits(name) < count {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for request");
    }
}

async fn serve_file(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    *state.hits.lock().unwrap().entry(name.clone()).or_default() += 1;

    let Some(file) = state.files.get(&name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(gate) = &file.gate {
        gate.notified().await;
    }

    let total = file.body.len();
    match file.stall_after {
        Some(prefix) => {
            let head = Bytes::copy_from_slice(&file.body[..prefix.min(total)]);
            let stream = futures::stream::iter([Ok::<_, Infallible>(head)]).chain(futures::stream::pending());
            Response::builder()
                .header(CONTENT_LENGTH, total)
                .body(Body::from_stream(stream))
                .unwrap()
        }
        None => Response::builder()
            .header(CONTENT_LENGTH, total)
            .body(Body::from(file.body.as_ref().clone()))
            .unwrap(),
    }
}
