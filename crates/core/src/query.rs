//! HTTP query surface.
//!
//! `GET /sessionserver/v1/sessions?index_name=<N>&index_value=<V>&active_only=<bool>`

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::actor::SessionServerHandle;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    index_name: Option<String>,
    index_value: Option<String>,
    #[serde(default)]
    active_only: bool,
}

#[derive(Debug, Serialize)]
struct SessionsResponse {
    #[serde(rename = "Items")]
    items: Vec<Vec<std::collections::HashMap<String, String>>>,
}

/// Build the router for the session query endpoint, wired to the given
/// actor handle.
pub fn router(handle: SessionServerHandle) -> Router {
    Router::new()
        .route("/sessionserver/v1/sessions", get(sessions_handler))
        .with_state(handle)
}

async fn sessions_handler(
    State(handle): State<SessionServerHandle>,
    Query(params): Query<SessionsQuery>,
) -> Response {
    let index_name = params.index_name.filter(|s| !s.is_empty());
    let index_value = params.index_value.filter(|s| !s.is_empty());
    let (Some(index_name), Some(index_value)) = (index_name, index_value) else {
        // Empty index_name or index_value: 200 OK, empty Items —
        // health probes land here.
        handle.record_empty_params_query();
        return Json(SessionsResponse { items: Vec::new() }).into_response();
    };

    match handle
        .query(index_name, index_value, params.active_only)
        .await
    {
        Ok(snapshots) => {
            let items = snapshots
                .into_iter()
                .map(|snap| {
                    snap.attributes
                        .into_iter()
                        .map(|avp| std::collections::HashMap::from([(avp.name, avp.value)]))
                        .collect()
                })
                .collect();
            Json(SessionsResponse { items }).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
