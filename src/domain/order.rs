//! Loan order-book entries.
//!
//! The ledger hands back loosely-shaped [`RawOrder`] records. They are
//! validated once, at the boundary, into strict [`LoanOffer`] / [`LoanDemand`]
//! values; nothing downstream sees an optional field it has to guess about.

use crate::domain::{Address, Decimal, Side};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order record as decoded from the ledger, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub id: u64,
    pub owner: Option<Address>,
    pub amount: Option<Decimal>,
    /// Offered rate for offers, maximum acceptable rate for demands.
    pub rate: Option<Decimal>,
    pub duration_secs: Option<u64>,
    pub active: Option<bool>,
    pub min_collateral_ratio: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedOrder {
    #[error("order {id}: missing field {field}")]
    MissingField { id: u64, field: &'static str },
    #[error("order {id}: amount must be positive, got {amount}")]
    NonPositiveAmount { id: u64, amount: Decimal },
    #[error("order {id}: rate must be positive, got {rate}")]
    NonPositiveRate { id: u64, rate: Decimal },
}

/// Lender-side order: capital available to borrowers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanOffer {
    pub id: u64,
    pub lender: Address,
    pub amount: Decimal,
    pub rate: Decimal,
    pub duration_secs: u64,
    pub active: bool,
    pub min_collateral_ratio: Option<Decimal>,
}

/// Borrower-side order: demand for capital at or below `max_rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDemand {
    pub id: u64,
    pub borrower: Address,
    pub amount: Decimal,
    pub max_rate: Decimal,
    pub duration_secs: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Order {
    Offer(LoanOffer),
    Demand(LoanDemand),
}

impl Order {
    /// Validate a raw record read from the `side` book.
    ///
    /// Inactive orders are valid records; filtering them is the aggregator's
    /// job. Amount and rate must be present and strictly positive.
    pub fn from_raw(side: Side, raw: RawOrder) -> Result<Order, MalformedOrder> {
        let id = raw.id;
        let missing = |field| MalformedOrder::MissingField { id, field };

        let owner = raw.owner.ok_or_else(|| missing("owner"))?;
        let amount = raw.amount.ok_or_else(|| missing("amount"))?;
        let rate = raw.rate.ok_or_else(|| missing("rate"))?;
        let duration_secs = raw.duration_secs.ok_or_else(|| missing("durationSecs"))?;
        let active = raw.active.ok_or_else(|| missing("active"))?;

        if !amount.is_positive() {
            return Err(MalformedOrder::NonPositiveAmount { id, amount });
        }
        if !rate.is_positive() {
            return Err(MalformedOrder::NonPositiveRate { id, rate });
        }

        Ok(match side {
            Side::Borrow => Order::Offer(LoanOffer {
                id,
                lender: owner,
                amount,
                rate,
                duration_secs,
                active,
                min_collateral_ratio: raw.min_collateral_ratio,
            }),
            Side::Lend => Order::Demand(LoanDemand {
                id,
                borrower: owner,
                amount,
                max_rate: rate,
                duration_secs,
                active,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        match self {
            Order::Offer(o) => o.id,
            Order::Demand(d) => d.id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Order::Offer(o) => o.amount,
            Order::Demand(d) => d.amount,
        }
    }

    /// Effective rate used for ranking.
    pub fn rate(&self) -> Decimal {
        match self {
            Order::Offer(o) => o.rate,
            Order::Demand(d) => d.max_rate,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Order::Offer(o) => o.active,
            Order::Demand(d) => d.active,
        }
    }

    pub fn owner(&self) -> &Address {
        match self {
            Order::Offer(o) => &o.lender,
            Order::Demand(d) => &d.borrower,
        }
    }

    /// The quote side this order can fill.
    pub fn fills_side(&self) -> Side {
        match self {
            Order::Offer(_) => Side::Borrow,
            Order::Demand(_) => Side::Lend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn raw(id: u64, amount: &str, rate: &str) -> RawOrder {
        RawOrder {
            id,
            owner: Some(Address::zero()),
            amount: Some(Decimal::from_str(amount).unwrap()),
            rate: Some(Decimal::from_str(rate).unwrap()),
            duration_secs: Some(86_400),
            active: Some(true),
            min_collateral_ratio: None,
        }
    }

    #[test]
    fn test_borrow_side_raw_becomes_offer() {
        let order = Order::from_raw(Side::Borrow, raw(1, "1000", "500")).unwrap();
        assert!(matches!(order, Order::Offer(_)));
        assert_eq!(order.fills_side(), Side::Borrow);
        assert_eq!(order.rate(), Decimal::from_str("500").unwrap());
    }

    #[test]
    fn test_lend_side_raw_becomes_demand() {
        let order = Order::from_raw(Side::Lend, raw(2, "1000", "450")).unwrap();
        match order {
            Order::Demand(d) => assert_eq!(d.max_rate, Decimal::from_str("450").unwrap()),
            other => panic!("expected demand, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut r = raw(3, "1000", "500");
        r.active = None;
        assert_eq!(
            Order::from_raw(Side::Borrow, r),
            Err(MalformedOrder::MissingField {
                id: 3,
                field: "active"
            })
        );
    }

    #[test]
    fn test_zero_amount_and_negative_rate_are_malformed() {
        assert!(matches!(
            Order::from_raw(Side::Borrow, raw(4, "0", "500")),
            Err(MalformedOrder::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            Order::from_raw(Side::Borrow, raw(5, "10", "-1")),
            Err(MalformedOrder::NonPositiveRate { .. })
        ));
    }

    #[test]
    fn test_inactive_order_still_validates() {
        let mut r = raw(6, "10", "5");
        r.active = Some(false);
        let order = Order::from_raw(Side::Borrow, r).unwrap();
        assert!(!order.is_active());
    }
}
