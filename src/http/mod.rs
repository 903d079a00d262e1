//! C12: the external HTTP/JSON boundary.
//!
//! An `axum` service driven by its own `tokio` runtime: it only ever touches the API queue, the response
//! queue, the session store and the album-cache read handle — never the
//! idle loop's `MpdState` directly.
pub mod jsonrpc;
mod ws;

use crate::album_cache::AlbumCacheHandle;
use crate::config::Config;
use crate::coverart::{self, CoverArtConfig, Resolved, Size};
use crate::error::{Facility, JsonRpcError, Severity};
use crate::notification::NotificationHub;
use crate::queue::Queue;
use crate::request::ApiRequest;
use crate::session::SessionStore;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use jsonrpc::{Request, Response, ResponseBody};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_HEADER: &str = "x-mympd-session";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api_queue: Arc<Queue<ApiRequest>>,
    pub response_queue: Arc<Queue<Response>>,
    pub session_store: Arc<SessionStore>,
    pub album_cache: Arc<AlbumCacheHandle>,
    pub coverart_cfg: Arc<CoverArtConfig>,
    pub notify: NotificationHub,
    pub next_connection_id: Arc<AtomicI64>,
    pub mpd_albumart_supported: Arc<AtomicBool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/:partition", post(jsonrpc_handler))
        .route("/ws", get(ws::handler))
        .route("/albumart", get(albumart_full))
        .route("/albumart-thumb", get(albumart_thumb))
        .route("/albumart/:albumid", get(albumart_by_album_id))
        .route("/playlistart", get(playlistart))
        .route("/proxy-covercache", get(proxy_covercache))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `POST /api/:partition` — decodes a JSON-RPC request, pushes it onto the
/// API queue, and blocks (off the async executor, via `spawn_blocking`)
/// until the matching response arrives.
async fn jsonrpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<Request>,
) -> Json<Value> {
    let connection_id = state.next_connection_id.fetch_add(1, Ordering::Relaxed);

    if let Some(err) = session_error(&state, &headers, &req.method) {
        return Json(serde_json::to_value(Response {
            connection_id,
            request_id: req.id,
            method: req.method,
            body: ResponseBody::Error(err),
        }).unwrap());
    }

    let api_req = ApiRequest::new(connection_id, req.id, req.method.clone(), req.params);
    state.api_queue.push(api_req, connection_id);

    let response_queue = state.response_queue.clone();
    let resp = tokio::task::spawn_blocking(move || {
        response_queue.shift(RESPONSE_TIMEOUT, connection_id)
    })
    .await
    .ok()
    .flatten();

    let resp = resp.unwrap_or_else(|| Response {
        connection_id,
        request_id: req.id,
        method: req.method,
        body: ResponseBody::Error(JsonRpcError::new(
            Facility::General,
            Severity::Error,
            "request timed out",
        )),
    });
    Json(serde_json::to_value(resp).unwrap())
}

/// `MYMPD_API_SESSION_VALIDATE`, `LOGIN` and `LOGOUT` bypass the session
/// check by design; every other method
/// requires a valid session header once any session exists, mirroring the
/// PIN-login model's "middleware" described there.
fn session_error(state: &AppState, headers: &HeaderMap, method: &str) -> Option<JsonRpcError> {
    if matches!(
        method,
        "MYMPD_API_SESSION_LOGIN" | "MYMPD_API_SESSION_LOGOUT" | "MYMPD_API_SESSION_VALIDATE"
    ) {
        return None;
    }
    if state.session_store.len() == 0 {
        // No PIN configured / no sessions ever issued: open access.
        return None;
    }
    let token = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    match token {
        Some(t) if state.session_store.validate(t) => None,
        _ => Some(JsonRpcError::new(
            Facility::Session,
            Severity::Error,
            "invalid or missing session",
        )),
    }
}

#[derive(serde::Deserialize)]
struct AlbumArtQuery {
    uri: String,
    #[serde(default)]
    offset: i64,
}

async fn albumart_full(
    State(state): State<AppState>,
    Query(q): Query<AlbumArtQuery>,
) -> AxumResponse {
    serve_cover(&state, &q.uri, q.offset, Size::Full).await
}

async fn albumart_thumb(
    State(state): State<AppState>,
    Query(q): Query<AlbumArtQuery>,
) -> AxumResponse {
    serve_cover(&state, &q.uri, q.offset, Size::Thumbnail).await
}

async fn albumart_by_album_id(
    State(state): State<AppState>,
    axum::extract::Path(albumid): axum::extract::Path<String>,
) -> AxumResponse {
    let cache = state.album_cache.get();
    let Some(rec) = cache.lookup(&albumid) else {
        return (StatusCode::NOT_FOUND, "no such album").into_response();
    };
    let uri = rec.first_seen_uri.clone();
    serve_cover(&state, &uri, 0, Size::Full).await
}

#[derive(serde::Deserialize)]
struct PlaylistArtQuery {
    #[allow(dead_code)]
    playlist: String,
    #[serde(default)]
    #[allow(dead_code)]
    r#type: String,
}

/// Playlist cover art is out of this core's scope beyond the named route
/// — always serves the placeholder.
async fn playlistart(Query(_q): Query<PlaylistArtQuery>) -> AxumResponse {
    placeholder_response()
}

#[derive(serde::Deserialize)]
struct ProxyQuery {
    uri: String,
}

/// `GET /proxy-covercache?uri=<full-url>` forwards a remote stream's
/// `#EXTIMG` URL. This core has no outbound HTTP
/// client in its dependency stack (see DESIGN.md); it redirects the
/// browser to fetch the URL directly rather than proxying the bytes
/// itself.
async fn proxy_covercache(Query(q): Query<ProxyQuery>) -> AxumResponse {
    Redirect::temporary(&q.uri).into_response()
}

async fn serve_cover(state: &AppState, uri: &str, offset: i64, size: Size) -> AxumResponse {
    let is_stream = uri.starts_with("http://") || uri.starts_with("https://");
    let supports_albumart = state.mpd_albumart_supported.load(Ordering::Relaxed);
    let cfg = state.coverart_cfg.clone();
    let uri_owned = uri.to_owned();
    let resolved = tokio::task::spawn_blocking(move || {
        coverart::resolve(&cfg, &uri_owned, offset, size, is_stream, supports_albumart)
    })
    .await
    .unwrap_or(Resolved::Placeholder);

    match resolved {
        Resolved::Bytes { data, mime_type } => image_response(data, &mime_type),
        Resolved::Redirect(url) => Redirect::temporary(&url).into_response(),
        Resolved::Async => fetch_via_mpd(state, uri, offset).await,
        Resolved::Placeholder => placeholder_response(),
    }
}

/// spec.md §4.7 step 5: forward to MPD's `albumart` command through the
/// idle loop's queue, replying asynchronously once bytes arrive.
async fn fetch_via_mpd(state: &AppState, uri: &str, _offset: i64) -> AxumResponse {
    let connection_id = state.next_connection_id.fetch_add(1, Ordering::Relaxed);
    let req = ApiRequest::new(
        connection_id,
        connection_id,
        "MYMPD_API_ALBUMART_BY_URI".to_owned(),
        serde_json::json!({ "uri": uri }),
    );
    state.api_queue.push(req, connection_id);
    let response_queue = state.response_queue.clone();
    let resp =
        tokio::task::spawn_blocking(move || response_queue.shift(RESPONSE_TIMEOUT, connection_id))
            .await
            .ok()
            .flatten();
    match resp.map(|r| r.body) {
        Some(ResponseBody::Result(v)) => {
            let data = v
                .get("data")
                .and_then(|d| d.as_str())
                .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok());
            let mime = v
                .get("mimeType")
                .and_then(|m| m.as_str())
                .unwrap_or("image/jpeg")
                .to_owned();
            match data {
                Some(bytes) => image_response(bytes, &mime),
                None => placeholder_response(),
            }
        }
        _ => placeholder_response(),
    }
}

fn image_response(data: Vec<u8>, mime_type: &str) -> AxumResponse {
    AxumResponse::builder()
        .status(StatusCode::OK)
        .header("Content-Type", mime_type)
        .header("Cache-Control", "max-age=604800")
        .body(axum::body::Body::from(Bytes::from(data)))
        .unwrap()
}

fn placeholder_response() -> AxumResponse {
    const PLACEHOLDER_SVG: &str =
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"></svg>"#;
    AxumResponse::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "image/svg+xml")
        .header("Cache-Control", "max-age=86400")
        .body(axum::body::Body::from(PLACEHOLDER_SVG))
        .unwrap()
}
