use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::card::{Flashcard, FlashcardUpdate, NewFlashcard, StudySession};
use crate::config::Config;
use crate::quiz::{self, QuizAccepted, QuizError, QuizItem};
use crate::review::StudyStats;
use crate::service::{
    CardHistory, FlashcardList, FlashcardService, ReviewRequest, ReviewResult, ServiceError,
};

type SharedState = Arc<FlashcardService>;

// -- Errors --

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            detail: detail.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { kind, .. } => {
                ApiError::new(StatusCode::NOT_FOUND, format!("{kind} not found"))
            }
            ServiceError::InvalidQuality(e) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ServiceError::Validation(msg) => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, msg),
            ServiceError::Persistence(e) => {
                tracing::error!(error = %e, "persistence failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::Invalid(msg) => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, msg),
            QuizError::Rejected(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
        }
    }
}

// Body and query extraction failures keep the `{"detail"}` shape.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;

// -- System --

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Spaced Repetition Flashcards API",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "SM-2 algorithm implementation",
            "Flashcard management (CRUD)",
            "Study session tracking",
            "Progress analytics",
        ],
        "endpoints": {
            "flashcards": "/api/flashcards",
            "study": "/api/study",
            "analytics": "/api/analytics",
        },
    }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn quiz_create(body: JsonBody<QuizItem>) -> ApiResult<QuizAccepted> {
    let Json(item) = body?;
    Ok(Json(quiz::validate(&item)?))
}

// -- Flashcards --

async fn create_flashcard(
    State(svc): State<SharedState>,
    body: JsonBody<NewFlashcard>,
) -> ApiResult<Flashcard> {
    let Json(input) = body?;
    Ok(Json(svc.create_flashcard(input)?))
}

async fn list_flashcards(State(svc): State<SharedState>) -> ApiResult<FlashcardList> {
    Ok(Json(svc.list_flashcards()?))
}

async fn get_flashcard(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Flashcard> {
    Ok(Json(svc.get_flashcard(&id)?))
}

async fn update_flashcard(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
    body: JsonBody<FlashcardUpdate>,
) -> ApiResult<Flashcard> {
    let Json(update) = body?;
    Ok(Json(svc.update_flashcard(&id, update)?))
}

async fn delete_flashcard(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    svc.delete_flashcard(&id)?;
    Ok(Json(json!({ "message": "Flashcard deleted successfully" })))
}

// -- Study --

async fn due_flashcards(State(svc): State<SharedState>) -> ApiResult<Vec<Flashcard>> {
    Ok(Json(svc.due_flashcards()?))
}

async fn start_session(State(svc): State<SharedState>) -> ApiResult<StudySession> {
    Ok(Json(svc.start_session()?))
}

async fn get_session(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StudySession> {
    Ok(Json(svc.get_session(&id)?))
}

async fn end_session(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StudySession> {
    Ok(Json(svc.end_session(&id)?))
}

#[derive(Debug, Deserialize)]
struct ReviewQuery {
    session_id: Option<String>,
}

async fn review_flashcard(
    State(svc): State<SharedState>,
    query: Result<Query<ReviewQuery>, QueryRejection>,
    body: JsonBody<ReviewRequest>,
) -> ApiResult<ReviewResult> {
    let Query(query) = query?;
    let Json(request) = body?;
    Ok(Json(
        svc.submit_review(&request, query.session_id.as_deref())?,
    ))
}

// -- Analytics --

async fn study_stats(State(svc): State<SharedState>) -> ApiResult<StudyStats> {
    Ok(Json(svc.study_stats()?))
}

async fn card_history(
    State(svc): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<CardHistory> {
    Ok(Json(svc.card_history(&id)?))
}

// -- Public entry points --

pub fn router(service: Arc<FlashcardService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/quiz/create", post(quiz_create))
        .route(
            "/api/flashcards",
            get(list_flashcards).post(create_flashcard),
        )
        .route(
            "/api/flashcards/{id}",
            get(get_flashcard)
                .put(update_flashcard)
                .delete(delete_flashcard),
        )
        .route("/api/study/due", get(due_flashcards))
        .route("/api/study/session", post(start_session))
        .route("/api/study/session/{id}", get(get_session))
        .route("/api/study/session/{id}/end", post(end_session))
        .route("/api/study/review", post(review_flashcard))
        .route("/api/analytics/stats", get(study_stats))
        .route("/api/analytics/cards/{id}/history", get(card_history))
        .with_state(service)
}

/// Cross-origin access for the listed browser origins, credentials allowed.
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub async fn serve(service: Arc<FlashcardService>, config: &Config) -> std::io::Result<()> {
    let addr = config.bind_addr();
    let app = router(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving flashcard API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
