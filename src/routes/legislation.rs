use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::mapper::parse_leading_int;
use crate::models::LegislativeAct;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ActList {
    pub total: usize,
    pub data: Vec<LegislativeAct>,
}

#[derive(Serialize)]
pub struct ActsByYear {
    pub ano: i32,
    pub total: usize,
    pub data: Vec<LegislativeAct>,
}

#[derive(Serialize)]
pub struct ActsByType {
    pub tipo: String,
    pub total: usize,
    pub data: Vec<LegislativeAct>,
}

pub async fn list_acts(State(state): State<AppState>) -> AppResult<Json<ActList>> {
    let data = state.repository.find_all().await?;
    Ok(Json(ActList {
        total: data.len(),
        data,
    }))
}

pub async fn list_acts_by_year(
    State(state): State<AppState>,
    Path(ano): Path<String>,
) -> AppResult<Json<ActsByYear>> {
    let ano = parse_leading_int(&ano).ok_or_else(|| AppError::bad_request("invalid year"))?;
    let data = state.repository.find_by_year(ano).await?;
    Ok(Json(ActsByYear {
        ano,
        total: data.len(),
        data,
    }))
}

pub async fn list_acts_by_type(
    State(state): State<AppState>,
    Path(tipo): Path<String>,
) -> AppResult<Json<ActsByType>> {
    let data = state.repository.find_by_type(&tipo).await?;
    Ok(Json(ActsByType {
        tipo,
        total: data.len(),
        data,
    }))
}

pub async fn get_act(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<LegislativeAct>> {
    let id = parse_id(&id)?;
    state
        .repository
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn delete_act(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    if !state.repository.delete(id).await? {
        return Err(AppError::not_found());
    }
    tracing::info!(id, "legislative act deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(raw: &str) -> AppResult<i32> {
    raw.parse()
        .map_err(|_| AppError::bad_request("id must be an integer"))
}
