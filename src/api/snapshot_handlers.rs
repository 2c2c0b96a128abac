//! Dashboard endpoints: snapshot accessor, refresh and range triggers,
//! assistant context and sparkline history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::state::AppState;
use crate::domain::{PricePoint, Provenance, RangeToken, Snapshot};

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn not_ready() -> Response {
    error(
        StatusCode::SERVICE_UNAVAILABLE,
        "No snapshot has been published yet",
    )
}

/// Snapshot plus pre-rendered axis labels per series.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotView<'a> {
    #[serde(flatten)]
    snapshot: &'a Snapshot,
    labels: BTreeMap<&'a str, Vec<String>>,
}

#[utoipa::path(
    get,
    path = "/v1/snapshot",
    tag = "dashboard",
    responses(
        (status = 200, description = "Latest published snapshot with series labels"),
        (status = 503, description = "No snapshot published yet", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn snapshot_handler(State(state): State<AppState>) -> Response {
    let Some(snapshot) = state.aggregator.latest() else {
        return not_ready();
    };

    let labels = snapshot
        .series
        .keys()
        .map(|key| (key.as_str(), snapshot.labels_for(key)))
        .collect();

    Json(SnapshotView {
        snapshot: &snapshot,
        labels,
    })
    .into_response()
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAccepted {
    #[schema(example = "accepted")]
    pub status: String,
    #[schema(example = "7d")]
    pub range: String,
    /// Sequence of the snapshot currently served
    pub last_sequence: Option<u64>,
}

fn accepted(state: &AppState, range: RangeToken) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(RefreshAccepted {
            status: "accepted".to_string(),
            range: range.to_string(),
            last_sequence: state.aggregator.latest().map(|s| s.sequence),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/refresh",
    tag = "dashboard",
    responses(
        (status = 202, description = "Refresh cycle scheduled", body = RefreshAccepted),
        (status = 503, description = "Scheduler stopped", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn refresh_handler(State(state): State<AppState>) -> Response {
    if !state.scheduler.trigger_refresh() {
        warn!("Manual refresh requested after scheduler stopped");
        return error(StatusCode::SERVICE_UNAVAILABLE, "Scheduler is not running");
    }
    info!("Manual refresh requested");
    accepted(&state, state.scheduler.current_range())
}

#[derive(Deserialize, ToSchema, Debug, Validate)]
pub struct RangeRequest {
    /// One of `24h`, `7d`, `30d`, `90d`, `1y`
    #[schema(example = "30d")]
    #[validate(length(min = 2, max = 3))]
    pub range: String,
}

#[utoipa::path(
    post,
    path = "/v1/range",
    tag = "dashboard",
    request_body = RangeRequest,
    responses(
        (status = 202, description = "Range changed, refresh scheduled", body = RefreshAccepted),
        (status = 400, description = "Unknown range token", body = ErrorResponse),
        (status = 503, description = "Scheduler stopped", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn range_handler(
    State(state): State<AppState>,
    Json(request): Json<RangeRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return error(StatusCode::BAD_REQUEST, format!("Invalid range: {}", e));
    }
    let range = match RangeToken::from_str(&request.range) {
        Ok(range) => range,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if !state.scheduler.change_range(range) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Scheduler is not running");
    }
    accepted(&state, range)
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub sequence: u64,
    pub range: String,
    #[schema(value_type = String, format = DateTime)]
    pub generated_at: DateTime<Utc>,
    /// Plain-text digest for the chat assistant
    pub summary: String,
}

#[utoipa::path(
    get,
    path = "/v1/context",
    tag = "dashboard",
    responses(
        (status = 200, description = "Last-known snapshot summarized for the assistant", body = ContextResponse),
        (status = 503, description = "No snapshot published yet", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn context_handler(State(state): State<AppState>) -> Response {
    match state.aggregator.latest() {
        Some(snapshot) => Json(ContextResponse {
            sequence: snapshot.sequence,
            range: snapshot.time_window.range.to_string(),
            generated_at: snapshot.generated_at,
            summary: snapshot.context_summary(),
        })
        .into_response(),
        None => not_ready(),
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    #[schema(example = "avalanche-2")]
    pub token_id: String,
    pub provenance: Provenance,
    pub points: Vec<PricePoint>,
}

#[utoipa::path(
    get,
    path = "/v1/history/{token_id}",
    tag = "dashboard",
    params(
        ("token_id" = String, Path, description = "Provider asset id", example = "avalanche-2")
    ),
    responses(
        (status = 200, description = "Rolling price history", body = HistoryResponse),
        (status = 404, description = "Token not tracked", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn history_handler(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Response {
    match state.aggregator.history(&token_id) {
        Some(spark) => Json(HistoryResponse {
            token_id,
            provenance: spark.provenance,
            points: spark.points,
        })
        .into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            format!("No history for token '{}'", token_id),
        ),
    }
}
