use std::any::Any;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::{
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{error::AppError, state::AppState};

pub mod health;
pub mod legislation;
pub mod sync;

pub fn create_router(state: AppState) -> anyhow::Result<Router<()>> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let mut headers: Vec<HeaderValue> = Vec::new();
        for value in origins.split(',') {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                continue;
            }
            let header = trimmed
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS allowed origin: {trimmed}"))?;
            headers.push(header);
        }

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
    };

    Ok(Router::new()
        .route("/", get(service_descriptor))
        .route("/health", get(health::health_check))
        .route("/legislacoes", get(legislation::list_acts))
        .route("/legislacoes/ano/:ano", get(legislation::list_acts_by_year))
        .route("/legislacoes/tipo/:tipo", get(legislation::list_acts_by_type))
        .route(
            "/legislacoes/:id",
            get(legislation::get_act).delete(legislation::delete_act),
        )
        .route("/sync/manual", post(sync::run_manual_sync))
        .route("/sync/status", get(sync::sync_status))
        .route("/sync/ano/:ano", post(sync::sync_year))
        .route("/sync/tipo/:tipo", post(sync::sync_type))
        .route("/sync/jobs/:tipo", post(sync::configure_type_job))
        .route("/sync/stop", post(sync::stop_jobs))
        .route("/sync/start", post(sync::start_jobs))
        .fallback(route_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

async fn service_descriptor() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Senado Federal legislation sync API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/legislacoes": "GET - list every legislative act",
            "/legislacoes/:id": "GET, DELETE - a single act",
            "/legislacoes/ano/:ano": "GET - acts signed in a year",
            "/legislacoes/tipo/:tipo": "GET - acts of a type",
            "/sync/manual": "POST - synchronize the recent years now",
            "/sync/ano/:ano": "POST - synchronize one year now",
            "/sync/tipo/:tipo": "POST - synchronize one type now (optional ?ano=)",
            "/sync/jobs/:tipo": "POST - schedule a recurring type synchronization",
            "/sync/stop": "POST - stop every scheduled job",
            "/sync/start": "POST - start every scheduled job",
            "/sync/status": "GET - scheduled job status",
            "/health": "GET - service health",
        },
    }))
}

async fn route_not_found() -> AppError {
    AppError::new(axum::http::StatusCode::NOT_FOUND, "route not found")
}

fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    AppError::internal("request handler panicked").into_response()
}
