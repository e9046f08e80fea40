use crate::api::AppState;
use crate::domain::{Decimal, Quote, Side};
use crate::error::{AppError, ErrorKind};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub side: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    /// `None` when no eligible order exists.
    pub quote: Option<Quote>,
    pub fully_covered: bool,
    pub shortfall: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ErrorKind>,
}

pub async fn get_quote(
    Query(params): Query<QuoteQuery>,
    State(state): State<AppState>,
) -> Result<Json<QuoteResponse>, AppError> {
    let side = Side::parse(&params.side)
        .ok_or_else(|| AppError::BadRequest("side must be 'borrow' or 'lend'".into()))?;
    let amount = Decimal::from_str(&params.amount)
        .map_err(|_| AppError::BadRequest("Invalid amount".into()))?;
    if !amount.is_positive() {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    if state.aggregator.config().fee_schedule(side).estimate(amount).is_none() {
        return Err(AppError::BadRequest("amount is too large".into()));
    }
    if state.config.order_book_address.is_none() {
        return Err(AppError::Config("ORDER_BOOK_ADDRESS is not set".into()));
    }

    let quote = state.aggregator.quote(side, amount).await?;

    let response = match quote {
        Some(quote) => {
            let fully_covered = quote.is_fully_covered();
            QuoteResponse {
                fully_covered,
                shortfall: quote.shortfall(),
                warning: (!fully_covered).then_some(ErrorKind::InsufficientLiquidity),
                quote: Some(quote),
            }
        }
        None => QuoteResponse {
            quote: None,
            fully_covered: false,
            shortfall: amount,
            warning: Some(ErrorKind::InsufficientLiquidity),
        },
    };
    Ok(Json(response))
}
