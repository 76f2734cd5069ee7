//! Route table and handlers.
//!
//! | Route          | GET                              | HEAD            |
//! |----------------|----------------------------------|-----------------|
//! | `/health`      | status, records `GET`            | 200, records `HEAD` |
//! | `/health-last` | last recorded health method      | 200             |
//! | `/crash`       | crashing notice, then exit 42    | 200             |
//! | anything else  | echo of the request              | 200             |

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

use crate::peer::PeerAddr;
use crate::shutdown::CRASH_EXIT_CODE;
use crate::state::{AppState, HealthMethod};

/// Name reported in echo payloads.
pub const BACKEND_NAME: &str = "echo-backend";

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health-last", get(health_last))
        .route("/crash", get(crash))
        .fallback(echo)
        .with_state(state)
}

/// `GET` routes also answer `HEAD`; the body is dropped for `HEAD`.
async fn health(State(state): State<AppState>, method: Method) -> Json<serde_json::Value> {
    let recorded = if method == Method::HEAD {
        HealthMethod::Head
    } else {
        HealthMethod::Get
    };
    state.last_health.record(recorded);
    debug!("Health probe via {}", recorded.as_str());
    Json(json!({ "status": "ok", "method": recorded.as_str() }))
}

async fn health_last(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last = state.last_health.get().map(HealthMethod::as_str);
    Json(json!({ "last_health_method": last }))
}

async fn crash(State(state): State<AppState>, method: Method) -> Response {
    if method == Method::HEAD {
        return StatusCode::OK.into_response();
    }
    warn!("Crash requested");
    state.request_exit(CRASH_EXIT_CODE);
    Json(json!({ "status": "crashing", "pid": std::process::id() })).into_response()
}

/// Request echo.
#[derive(Debug, Serialize)]
pub struct EchoPayload {
    pub backend: &'static str,
    pub pid: u32,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    /// Absent when the server was not started with connect info.
    pub peer: Option<String>,
}

impl EchoPayload {
    fn from_request(request: &Request) -> Self {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        let peer = request
            .extensions()
            .get::<ConnectInfo<PeerAddr>>()
            .map(|ConnectInfo(peer)| peer.to_string());

        Self {
            backend: BACKEND_NAME,
            pid: std::process::id(),
            path,
            headers: flatten_headers(request.headers()),
            peer,
        }
    }
}

async fn echo(request: Request) -> Response {
    match *request.method() {
        Method::GET => Json(EchoPayload::from_request(&request)).into_response(),
        Method::HEAD => StatusCode::OK.into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Repeated headers are joined with `", "`.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
