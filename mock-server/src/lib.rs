//! Loopback HTTP server for transfer-engine integration tests.
//!
//! # Design
//! httpbin-style routes: `/inspect` echoes back what the server saw so
//! tests can assert on the request that actually arrived, `/redirect/{n}`
//! builds a chain of `n` hops ending at `/inspect`, `/see-other` answers
//! 303 so redirect rules rewrite the method, and `/status/{code}` returns
//! an arbitrary status. Stateless on purpose: every test spins up its own
//! instance on a random port.

use std::collections::BTreeMap;

use axum::{
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What the server saw in a request, echoed back as JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InspectReport {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub data: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/inspect", any(inspect))
        .route("/redirect/{n}", any(redirect_chain))
        .route("/see-other", any(see_other))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Target of hop `n` in a redirect chain: the next hop down, or `/inspect`
/// once the chain is exhausted.
pub fn redirect_target(n: u32) -> String {
    if n > 1 {
        format!("/redirect/{}", n - 1)
    } else {
        "/inspect".to_string()
    }
}

async fn inspect(method: Method, headers: HeaderMap, body: String) -> Json<InspectReport> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(InspectReport {
        method: method.to_string(),
        headers,
        data: body,
    })
}

async fn redirect_chain(Path(n): Path<u32>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, redirect_target(n))],
    )
        .into_response()
}

async fn see_other() -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, "/inspect".to_string())],
    )
        .into_response()
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}
