//! HTTP transport.
//!
//! Two ways in, both backed by [`McpServer::handle_message`]:
//! - `POST /mcp`: one JSON-RPC message per request, answered in the body.
//! - `GET /sse` + `POST /messages?session_id=..`: the MCP SSE transport.
//!   The stream first sends an `endpoint` event naming the message URL, then
//!   one `message` event per response.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{McpServer, ServerError};

/// Listen address of the http transport.
pub const HTTP_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);

const MESSAGES_PATH: &str = "/messages";

/// Open SSE streams, keyed by session id.
#[derive(Default)]
struct SseSessions {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl SseSessions {
    fn senders(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<String>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, session_id: String, sender: mpsc::UnboundedSender<String>) {
        self.senders().insert(session_id, sender);
    }

    fn get(&self, session_id: &str) -> Option<mpsc::UnboundedSender<String>> {
        self.senders().get(session_id).cloned()
    }

    fn remove(&self, session_id: &str) {
        self.senders().remove(session_id);
    }

    /// Drop every sender, which ends every open stream.
    fn close_all(&self) {
        self.senders().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.senders().len()
    }
}

/// Removes its session once the SSE stream holding it is dropped.
struct SessionGuard {
    sessions: Arc<SseSessions>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "SSE client disconnected");
        self.sessions.remove(&self.session_id);
    }
}

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    sessions: Arc<SseSessions>,
}

impl HttpState {
    fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sessions: Arc::new(SseSessions::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

fn app(state: HttpState) -> Router {
    Router::new()
        .route("/mcp", post(handle_post))
        .route("/sse", get(handle_sse))
        .route(MESSAGES_PATH, post(handle_session_message))
        .with_state(state)
}

#[cfg(test)]
fn router(server: Arc<McpServer>) -> Router {
    app(HttpState::new(server))
}

async fn handle_post(State(state): State<HttpState>, body: String) -> Response {
    debug!(request = %body, "received message");
    match state.server.handle_message(&body).await {
        Some(response) => ([(header::CONTENT_TYPE, "application/json")], response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_sse(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    state.sessions.insert(session_id.clone(), tx);
    info!(session_id = %session_id, "SSE client connected");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGES_PATH}?session_id={session_id}"));
    let guard = SessionGuard {
        sessions: Arc::clone(&state.sessions),
        session_id,
    };
    let messages = UnboundedReceiverStream::new(rx).map(move |message| {
        let _session = &guard;
        Ok::<_, Infallible>(Event::default().event("message").data(message))
    });

    Sse::new(tokio_stream::once(Ok::<_, Infallible>(endpoint)).chain(messages))
        .keep_alive(KeepAlive::default())
}

async fn handle_session_message(
    State(state): State<HttpState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    let Some(tx) = state.sessions.get(&query.session_id) else {
        warn!(session_id = %query.session_id, "message for unknown session");
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };
    debug!(session_id = %query.session_id, request = %body, "received message");

    let server = Arc::clone(&state.server);
    tokio::spawn(async move {
        if let Some(response) = server.handle_message(&body).await {
            // Fails only when the client has already disconnected.
            let _ = tx.send(response);
        }
    });
    StatusCode::ACCEPTED.into_response()
}

/// Serve HTTP on `addr` until Ctrl-C.
pub async fn serve_http(server: Arc<McpServer>, addr: SocketAddr) -> Result<(), ServerError> {
    let state = HttpState::new(server);
    let sessions = Arc::clone(&state.sessions);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "MCP server ready, listening on http");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open SSE streams would otherwise hold shutdown forever.
            sessions.close_all();
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
