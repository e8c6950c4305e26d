use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::acquisition::AcquisitionStatus;
use crate::analyze::{
    analyze_or_fallback, DealAnalysis, DealAnalyzer, DealQuery, DisabledAnalyzer, InlineImage,
};
use crate::error::{AcquireError, CriteriaError};
use crate::ingest::scheduler::{CycleOutcome, SchedulerStatus};
use crate::ingest::types::{FilterCriteria, Listing};
use crate::monitor::Monitor;
use crate::operator::OperatorSnapshot;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub analyzer: Arc<dyn DealAnalyzer>,
}

impl AppState {
    /// Deal analysis starts disabled; see [`AppState::with_analyzer`].
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor: Arc::new(monitor),
            analyzer: Arc::new(DisabledAnalyzer),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn DealAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/feed", get(feed))
        .route("/monitor", get(monitor_status))
        .route("/monitor/arm", post(arm))
        .route("/monitor/disarm", post(disarm))
        .route("/monitor/criteria", post(update_criteria).put(update_criteria))
        .route("/monitor/scan", post(scan_now))
        .route("/notifications/enable", post(enable_notifications))
        .route("/notifications/disable", post(disable_notifications))
        .route("/acquire", get(acquire_status).delete(cancel_acquire))
        .route("/acquire/{id}", post(acquire))
        .route("/session", get(session).delete(logout))
        .route("/session/login", post(login))
        .route("/analyze", post(analyze))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn feed(State(state): State<AppState>) -> Json<Vec<Listing>> {
    Json(state.monitor.feed.snapshot())
}

async fn monitor_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.monitor.scheduler.status())
}

/// Body is optional: without it the stored criteria are used.
async fn arm(State(state): State<AppState>, body: Option<Json<FilterCriteria>>) -> Response {
    let scheduler = &state.monitor.scheduler;
    match body {
        Some(Json(criteria)) => {
            if let Err(e) = criteria.validate() {
                return invalid_criteria(e);
            }
            scheduler.arm(criteria)
        }
        None => scheduler.arm_current(),
    }
    Json(scheduler.status()).into_response()
}

async fn disarm(State(state): State<AppState>) -> Json<SchedulerStatus> {
    state.monitor.scheduler.disarm();
    Json(state.monitor.scheduler.status())
}

async fn update_criteria(
    State(state): State<AppState>,
    Json(criteria): Json<FilterCriteria>,
) -> Response {
    if let Err(e) = criteria.validate() {
        return invalid_criteria(e);
    }
    state.monitor.scheduler.update_criteria(criteria);
    Json(state.monitor.scheduler.status()).into_response()
}

fn invalid_criteria(e: CriteriaError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

async fn scan_now(State(state): State<AppState>) -> Json<CycleOutcome> {
    Json(state.monitor.scheduler.poll_now().await)
}

async fn enable_notifications(State(state): State<AppState>) -> Json<serde_json::Value> {
    let permission = state.monitor.dispatcher.enable().await;
    Json(json!({
        "permission": permission,
        "opted_in": state.monitor.dispatcher.opted_in(),
    }))
}

async fn disable_notifications(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.monitor.dispatcher.disable();
    Json(json!({ "opted_in": false }))
}

async fn acquire(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.monitor.acquire(&id) {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(json!({ "session": handle.id(), "listing_id": handle.listing_id() })),
        )
            .into_response(),
        Err(e) => {
            let status = match e {
                AcquireError::Busy { .. } => StatusCode::CONFLICT,
                AcquireError::UnknownListing(_) => StatusCode::NOT_FOUND,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn acquire_status(State(state): State<AppState>) -> Json<AcquisitionStatus> {
    Json(state.monitor.sequencer.status())
}

async fn cancel_acquire(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.monitor.sequencer.cancel_active();
    Json(json!({ "cancelled": cancelled }))
}

#[derive(Deserialize)]
struct LoginReq {
    username: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginReq>) -> Response {
    if state.monitor.operator.login(&body.username) {
        Json(state.monitor.operator.snapshot()).into_response()
    } else {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "username must not be blank" })),
        )
            .into_response()
    }
}

async fn logout(State(state): State<AppState>) -> Json<OperatorSnapshot> {
    state.monitor.operator.logout();
    Json(state.monitor.operator.snapshot())
}

async fn session(State(state): State<AppState>) -> Json<OperatorSnapshot> {
    Json(state.monitor.operator.snapshot())
}

/// Either a feed listing or a free-form description with a price.
#[derive(Deserialize)]
struct AnalyzeReq {
    listing_id: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    image_base64: Option<String>,
    mime_type: Option<String>,
}

async fn analyze(State(state): State<AppState>, Json(req): Json<AnalyzeReq>) -> Response {
    let (description, price) = match req.listing_id.as_deref() {
        Some(id) => match state.monitor.feed.get(id) {
            Some(l) => (l.title, l.price),
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": format!("listing {id} is not in the feed") })),
                )
                    .into_response()
            }
        },
        None => {
            let description = req.description.unwrap_or_default().trim().to_string();
            let price = req.price.unwrap_or(f64::NAN);
            if description.is_empty() || !(price.is_finite() && price >= 0.0) {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "description and a non-negative price are required" })),
                )
                    .into_response();
            }
            (description, price)
        }
    };

    let image = req.image_base64.filter(|d| !d.is_empty()).map(|data| InlineImage {
        data_base64: data,
        mime_type: req.mime_type.unwrap_or_else(|| "image/jpeg".to_string()),
    });
    let query = DealQuery {
        description,
        price,
        image,
    };
    let result: DealAnalysis = analyze_or_fallback(state.analyzer.as_ref(), &query).await;
    Json(result).into_response()
}
