use crate::api::AppState;
use crate::domain::{derive_position_id, Address, Position, PositionId};
use crate::error::AppError;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionIdQuery {
    pub owner: String,
    pub index: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionIdResponse {
    pub owner: Address,
    pub index: u64,
    pub id: PositionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub branch: String,
    #[serde(flatten)]
    pub position: Position,
}

pub async fn get_position_id(
    Query(params): Query<PositionIdQuery>,
) -> Result<Json<PositionIdResponse>, AppError> {
    let owner = Address::from_str(&params.owner)
        .map_err(|_| AppError::BadRequest("Invalid owner address".into()))?;
    let id = derive_position_id(&owner, params.index);
    Ok(Json(PositionIdResponse {
        owner,
        index: params.index,
        id,
    }))
}

pub async fn get_position(
    Path((branch_key, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<PositionResponse>, AppError> {
    let branch = state.config.branch(&branch_key)?;
    let id = PositionId::from_str(&id)
        .map_err(|_| AppError::BadRequest("Invalid position id".into()))?;

    let position = state
        .ledger
        .get_position(branch.index, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Position {} on {}", id, branch.key)))?;

    Ok(Json(PositionResponse {
        branch: branch.key.clone(),
        position,
    }))
}
