//! HTTP endpoints for health checks, relay info, and filter queries.

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Query as AxumQuery, State},
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{future::Future, net::SocketAddr, sync::Arc};

use crate::config::csv_strings;
use crate::event::Event;
use crate::filter::Filter;
use crate::query::Limits;
use crate::store::{query_events_with_limits, EventStore};

#[derive(Clone)]
struct HttpState {
    store: Arc<dyn EventStore>,
    limits: Limits,
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Start an HTTP server exposing `/healthz`, `/query`, and relay info.
pub async fn serve_http(
    addr: SocketAddr,
    store: Arc<dyn EventStore>,
    limits: Limits,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = HttpState { store, limits };
    let app = Router::new()
        .route("/", get(relay_info))
        .route("/healthz", get(healthz))
        .route("/query", get(query).post(query_json))
        .with_state(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

/// Minimal NIP-11 relay information document.
#[derive(Serialize, Deserialize)]
struct RelayInfo {
    /// Human-readable relay name.
    name: String,
    /// Software identifier (here it is always "sievr").
    software: String,
    /// Semantic version string such as "0.1.0".
    version: String,
}

/// Basic NIP-11 relay information document.
async fn relay_info() -> impl axum::response::IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(RelayInfo {
            name: "sievr".into(),
            software: "sievr".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }),
    )
}

/// URL query parameters accepted by the `/query` endpoint.
#[derive(Deserialize)]
struct QueryParams {
    /// Comma-separated hex event ids.
    ids: Option<String>,
    /// Comma-separated hex public keys.
    authors: Option<String>,
    /// Comma-separated kind numbers (e.g. `1,30023`).
    kinds: Option<String>,
    /// Single `#d` tag value.
    d: Option<String>,
    /// Single `#t` topic value.
    t: Option<String>,
    /// Minimum `created_at` timestamp.
    since: Option<String>,
    /// Maximum `created_at` timestamp.
    until: Option<String>,
}

/// Convert query string parameters into a [`Filter`].
///
/// Supported URL parameters mirror Nostr filter fields:
/// - `ids` / `authors` – comma-separated hex lists
/// - `kinds` – comma-separated kind numbers
/// - `d` / `t` – single `#d` or `#t` tag value
/// - `since` / `until` – Unix timestamps bounding `created_at`
///
/// Example: `/query?authors=ab12..&kinds=1,30023&since=1700000000`
fn params_to_filter(params: QueryParams) -> Filter {
    let mut filter = Filter {
        ids: params.ids.map(csv_strings),
        authors: params.authors.map(csv_strings),
        kinds: params.kinds.map(|k| {
            k.split(',')
                .filter_map(|v| v.trim().parse::<u32>().ok())
                .collect()
        }),
        since: params.since.and_then(|v| v.parse().ok()),
        until: params.until.and_then(|v| v.parse().ok()),
        ..Default::default()
    };
    if let Some(d) = params.d {
        filter.tags.insert("d".into(), vec![d]);
    }
    if let Some(t) = params.t {
        filter.tags.insert("t".into(), vec![t]);
    }
    filter
}

/// Parse query parameters and return matching events as NDJSON.
async fn query(
    State(state): State<HttpState>,
    AxumQuery(params): AxumQuery<QueryParams>,
) -> axum::response::Response {
    let filter = params_to_filter(params);
    run_query(&state, Some(&filter)).await
}

/// Accept a raw Nostr filter JSON object and return matching events as
/// NDJSON. A JSON `null` body is the nil-filter case and is rejected.
async fn query_json(
    State(state): State<HttpState>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let filter = (!body.is_null()).then(|| Filter::from_value(&body));
    run_query(&state, filter.as_ref()).await
}

async fn run_query(state: &HttpState, filter: Option<&Filter>) -> axum::response::Response {
    match query_events_with_limits(state.store.as_ref(), filter, &state.limits).await {
        Ok(events) => ndjson(events),
        Err(err) if filter.is_none() => error_response(StatusCode::BAD_REQUEST, &err),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

/// Return newline-delimited JSON so clients can stream and parse
/// incrementally.
fn ndjson(events: Vec<Event>) -> axum::response::Response {
    let body = events
        .into_iter()
        .filter_map(|e| serde_json::to_string(&e).ok())
        .collect::<Vec<_>>()
        .join("\n");
    axum::response::Response::builder()
        .header("Content-Type", "application/x-ndjson")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn error_response(status: StatusCode, err: &anyhow::Error) -> axum::response::Response {
    axum::response::Response::builder()
        .status(status)
        .body(Body::from(err.to_string()))
        .unwrap_or_default()
}
