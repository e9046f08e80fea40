//! Order-book fulfillment: one intent per quote route.

use super::{AllowanceRequirement, CallDescriptor, ExecutionIntent};
use crate::domain::{Address, Quote, Side, WadError};
use crate::error::ErrorKind;
use crate::ledger::abi;
use thiserror::Error;

const ACCEPT_OFFER: &str = "acceptOffer(uint256,uint256)";
const FILL_DEMAND: &str = "fillDemand(uint256,uint256)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FulfillmentError {
    #[error("not configured: {0}")]
    NotConfigured(&'static str),
    #[error("invalid route amount: {0}")]
    InvalidAmount(#[from] WadError),
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::NotConfigured(_) => ErrorKind::NotConfigured,
            FulfillmentError::InvalidAmount(_) => ErrorKind::InvalidAmount,
        }
    }
}

/// Build the fulfillment intents for `quote`, in route order.
///
/// Borrowing accepts lender offers and needs no allowance. Lending fills
/// borrower demands and needs a loan-token allowance for the order book
/// covering each route's amount.
pub fn fulfillment_intents(
    quote: &Quote,
    order_book: Option<&Address>,
    loan_token: Option<&Address>,
) -> Result<Vec<ExecutionIntent>, FulfillmentError> {
    let order_book = order_book.ok_or(FulfillmentError::NotConfigured("ORDER_BOOK_ADDRESS"))?;
    let loan_token = match quote.side {
        Side::Lend => {
            let token = loan_token.ok_or(FulfillmentError::NotConfigured("LOAN_TOKEN_ADDRESS"))?;
            Some(token)
        }
        Side::Borrow => None,
    };

    quote
        .routes
        .iter()
        .map(|route| -> Result<ExecutionIntent, FulfillmentError> {
            let args = vec![
                abi::word_from_u64(route.order_id),
                abi::word_from_u128(route.amount.to_wad()?),
            ];
            let intent = match (quote.side, loan_token) {
                (Side::Lend, Some(token)) => ExecutionIntent::new(
                    format!("Fill demand #{}", route.order_id),
                    CallDescriptor::new(order_book.clone(), FILL_DEMAND, args),
                )
                .with_allowance(AllowanceRequirement {
                    token: token.clone(),
                    spender: order_book.clone(),
                    amount: route.amount,
                }),
                _ => ExecutionIntent::new(
                    format!("Accept offer #{}", route.order_id),
                    CallDescriptor::new(order_book.clone(), ACCEPT_OFFER, args),
                ),
            };
            Ok(intent)
        })
        .collect()
}
