use crate::api::AppState;
use crate::domain::{Decimal, InterestRate};
use crate::engine::InsertionHint;
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintQuery {
    /// Market key, e.g. "ETH".
    pub branch: String,
    /// Annual rate as a fraction, e.g. "0.055".
    pub rate: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    pub branch: String,
    pub rate: String,
    /// 1e18-scaled rate as a decimal string.
    pub rate_wad: String,
    #[serde(flatten)]
    pub hint: InsertionHint,
}

pub async fn get_hint(
    Query(params): Query<HintQuery>,
    State(state): State<AppState>,
) -> Result<Json<HintResponse>, AppError> {
    let branch = state.config.branch(&params.branch)?;
    let fraction = Decimal::from_str(&params.rate)
        .map_err(|_| AppError::BadRequest("Invalid rate".into()))?;
    if fraction > Decimal::from_u64(1) {
        return Err(AppError::BadRequest("rate must be a fraction between 0 and 1".into()));
    }
    let rate = InterestRate::from_fraction(fraction)
        .map_err(|e| AppError::BadRequest(format!("Invalid rate: {}", e)))?;

    let hint = state.hint_finder.hint_for(branch.index, rate).await;

    Ok(Json(HintResponse {
        branch: branch.key.clone(),
        rate: rate.to_string(),
        rate_wad: rate.as_wad().to_string(),
        hint,
    }))
}
