// 🌐 HTTP Surface - import trigger plus read-only record queries

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::Store;
use crate::import::{ImportRequest, ImportService};
use crate::opportunities::OpportunityType;
use crate::record::{ImportRecordKey, RecordType, StateCode, ValidatedRecord};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub import: ImportService,
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Pub/Sub push envelope, or the attributes posted directly.
#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerBody {
    Envelope { message: PushMessage },
    Direct(ImportRequest),
}

#[derive(Deserialize)]
struct PushMessage {
    attributes: ImportRequest,
}

#[derive(Serialize)]
struct StoredRecordResponse {
    key: String,
    version: i64,
    updated_at: String,
    fields: crate::record::Fields,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /trigger_import - run one snapshot import
async fn trigger_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request = match serde_json::from_value::<TriggerBody>(body) {
        Ok(TriggerBody::Envelope { message }) => message.attributes,
        Ok(TriggerBody::Direct(request)) => request,
        Err(_) => return failure(StatusCode::BAD_REQUEST, "body must carry bucketId and objectId"),
    };
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let service = state.import.clone();
    let outcome = tokio::task::spawn_blocking(move || service.handle(authorization.as_deref(), &request)).await;

    match outcome {
        Ok(outcome) => {
            let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = if status.is_success() {
                ApiResponse::ok(outcome)
            } else {
                ApiResponse {
                    success: false,
                    error: Some(outcome.message.clone()),
                    data: Some(outcome),
                }
            };
            (status, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "import task panicked");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "import task failed")
        }
    }
}

/// GET /api/records/:state/:record_type - every stored row of one type
async fn get_records(
    State(state): State<AppState>,
    Path((state_code, record_type)): Path<(String, String)>,
) -> Response {
    let (state_code, record_type) = match (state_code.parse::<StateCode>(), record_type.parse::<RecordType>()) {
        (Ok(s), Ok(t)) => (s, t),
        (Err(e), _) | (_, Err(e)) => return failure(StatusCode::BAD_REQUEST, e),
    };

    let store = match state.import.connect() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "opening store failed");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable");
        }
    };
    match store.find_many(record_type, state_code) {
        Ok(records) => {
            let response: Vec<StoredRecordResponse> = records
                .into_iter()
                .map(|r| StoredRecordResponse {
                    key: r.key.to_string(),
                    version: r.version,
                    updated_at: r.updated_at.to_rfc3339(),
                    fields: r.fields,
                })
                .collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "listing records failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
        }
    }
}

/// GET /api/requirements/:state/:opportunity/:external_id - derived eligibility copy
async fn get_requirements(
    State(state): State<AppState>,
    Path((state_code, opportunity, external_id)): Path<(String, String, String)>,
) -> Response {
    let (state_code, opportunity) = match (state_code.parse::<StateCode>(), opportunity.parse::<OpportunityType>()) {
        (Ok(s), Ok(o)) => (s, o),
        (Err(e), _) | (_, Err(e)) => return failure(StatusCode::BAD_REQUEST, e),
    };
    if opportunity.state_code() != state_code {
        return failure(StatusCode::NOT_FOUND, format!("{} is not offered in {}", opportunity, state_code));
    }
    let config = match opportunity.config() {
        Ok(config) => config,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let key = ImportRecordKey::single("externalId", external_id);
    let stored = state
        .import
        .connect()
        .and_then(|store| store.get(RecordType::Referral(opportunity), state_code, &key));

    match stored {
        Ok(Some(stored)) => {
            let record = ValidatedRecord::new(stored.fields);
            let today = chrono::Local::now().date_naive();
            (StatusCode::OK, Json(ApiResponse::ok(config.summarize(&record, today)))).into_response()
        }
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("no {} record for {}", opportunity, key)),
        Err(e) => {
            tracing::error!(error = %e, "loading referral failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records/:state/:record_type", get(get_records))
        .route("/requirements/:state/:opportunity/:external_id", get(get_requirements));

    Router::new()
        .route("/trigger_import", post(trigger_import))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
