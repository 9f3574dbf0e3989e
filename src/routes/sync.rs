use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::mapper::parse_leading_int;
use crate::scheduler::JobStatus;
use crate::state::AppState;
use crate::sync::{SyncSummary, YearOutcome};

#[derive(Serialize)]
pub struct ManualSyncResponse {
    pub message: &'static str,
    pub years: Vec<YearOutcome>,
}

#[derive(Serialize)]
pub struct SyncStatusResponse {
    pub jobs: Vec<JobStatus>,
    pub running: bool,
    pub timestamp: String,
}

#[derive(Deserialize)]
pub struct TypeSyncQuery {
    pub ano: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfigureJobRequest {
    pub schedule: String,
}

#[derive(Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobStatus>,
}

pub async fn run_manual_sync(State(state): State<AppState>) -> AppResult<Json<ManualSyncResponse>> {
    let report = state.scheduler.run_manual().await?;
    Ok(Json(ManualSyncResponse {
        message: "manual synchronization completed",
        years: report.years,
    }))
}

pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        jobs: state.scheduler.list_jobs().await,
        running: state.sync().is_running(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn sync_year(
    State(state): State<AppState>,
    Path(ano): Path<String>,
) -> AppResult<Json<SyncSummary>> {
    let year = parse_leading_int(&ano).ok_or_else(|| AppError::bad_request("invalid year"))?;
    let summary = state.sync().run_year_exclusive(year).await?;
    Ok(Json(summary))
}

pub async fn sync_type(
    State(state): State<AppState>,
    Path(tipo): Path<String>,
    Query(query): Query<TypeSyncQuery>,
) -> AppResult<Json<SyncSummary>> {
    let year = match query.ano.as_deref() {
        Some(raw) => {
            Some(parse_leading_int(raw).ok_or_else(|| AppError::bad_request("invalid year"))?)
        }
        None => None,
    };
    let summary = state.sync().run_type_exclusive(&tipo, year).await?;
    Ok(Json(summary))
}

pub async fn configure_type_job(
    State(state): State<AppState>,
    Path(tipo): Path<String>,
    payload: Result<Json<ConfigureJobRequest>, JsonRejection>,
) -> AppResult<Json<JobsResponse>> {
    let Json(payload) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    if payload.schedule.trim().is_empty() {
        return Err(AppError::bad_request("schedule must not be empty"));
    }
    state
        .scheduler
        .configure_type_job(&tipo, &payload.schedule)
        .await?;
    Ok(Json(JobsResponse {
        jobs: state.scheduler.list_jobs().await,
    }))
}

pub async fn stop_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    state.scheduler.stop_all().await;
    Json(JobsResponse {
        jobs: state.scheduler.list_jobs().await,
    })
}

pub async fn start_jobs(State(state): State<AppState>) -> AppResult<Json<JobsResponse>> {
    state.scheduler.start_all().await?;
    Ok(Json(JobsResponse {
        jobs: state.scheduler.list_jobs().await,
    }))
}
