//! HTTP request handlers

use super::types::{ChatRequest, Endpoints, ErrorResponse, HealthResponse, RootResponse};
use super::AppState;
use crate::service::{ChatReply, ServiceError, ThreadHistory};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

const SERVICE_NAME: &str = "thread-agent";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/threads/:thread_id/messages", get(thread_messages))
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Thread agent API is running",
        endpoints: Endpoints {
            health: "/health",
            chat: "/chat",
            thread_messages: "/threads/{thread_id}/messages",
        },
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        persistence: state.persistence,
    })
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let (Some(message), Some(thread_id)) = (req.message, req.thread_id) else {
        return Err(AppError::BadRequest(
            "Missing message or thread_id".to_string(),
        ));
    };

    match state.service.chat(&message, &thread_id).await {
        Ok(reply) => Ok(Json(reply)),
        Err(ServiceError::Validation(msg)) => Err(AppError::BadRequest(msg)),
        Err(e) => {
            tracing::error!(thread_id = %thread_id, error = %e, "Chat request failed");
            Err(AppError::Internal(format!("Error processing request: {e}")))
        }
    }
}

async fn thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadHistory>, AppError> {
    state
        .service
        .thread_messages(&thread_id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(thread_id = %thread_id, error = %e, "History read failed");
            AppError::Internal(format!("Error retrieving messages: {e}"))
        })
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
