//! Builds position mutations (open, add/withdraw collateral, adjust rate,
//! close) as execution intents against a branch's borrower operations.
//!
//! Mutations that place a position in the rate-ordered list carry insertion
//! hints from [`HintFinder`]. Mutations that pull collateral from the owner
//! carry a collateral-token allowance for the borrower operations contract.

use super::{AllowanceRequirement, CallDescriptor, ExecutionIntent};
use crate::config::BranchConfig;
use crate::domain::{
    derive_position_id, Address, Decimal, InterestRate, Position, PositionId, WadError,
};
use crate::engine::{HintFinder, InsertionHint};
use crate::error::ErrorKind;
use crate::ledger::abi::{self, Word};
use crate::ledger::{LedgerError, LedgerReader};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const OPEN_TROVE: &str = "openTrove(address,uint256,uint256,uint256,uint256,uint256,uint256,uint256,address,address,address)";
const ADD_COLL: &str = "addColl(uint256,uint256)";
const WITHDRAW_COLL: &str = "withdrawColl(uint256,uint256)";
const ADJUST_RATE: &str = "adjustTroveInterestRate(uint256,uint256,uint256,uint256,uint256)";
const CLOSE_TROVE: &str = "closeTrove(uint256)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    #[error("position {id} not found on branch {branch}")]
    PositionNotFound { branch: String, id: PositionId },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::BranchNotFound(_) => ErrorKind::BranchNotFound,
            MutationError::PositionNotFound { .. } => ErrorKind::PositionNotFound,
            MutationError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            MutationError::Ledger(e) => ErrorKind::from_ledger(e),
        }
    }
}

impl From<WadError> for MutationError {
    fn from(err: WadError) -> Self {
        MutationError::InvalidAmount(err.to_string())
    }
}

/// Parameters for opening a new position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPosition {
    /// Market key of the collateral branch.
    pub branch: String,
    pub owner: Address,
    pub owner_index: u64,
    pub collateral: Decimal,
    pub debt: Decimal,
    pub rate: InterestRate,
    /// Upper bound on the upfront borrowing fee the owner accepts.
    pub max_upfront_fee: Decimal,
}

/// An intent targeting one position, with the hint it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionIntent {
    pub position_id: PositionId,
    pub hint: Option<InsertionHint>,
    pub intent: ExecutionIntent,
}

#[derive(Debug, Clone)]
pub struct PositionMutator {
    ledger: Arc<dyn LedgerReader>,
    hints: HintFinder,
    branches: Vec<BranchConfig>,
}

impl PositionMutator {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        hints: HintFinder,
        branches: Vec<BranchConfig>,
    ) -> Self {
        Self {
            ledger,
            hints,
            branches,
        }
    }

    fn branch(&self, key: &str) -> Result<&BranchConfig, MutationError> {
        self.branches
            .iter()
            .find(|b| b.key.eq_ignore_ascii_case(key))
            .ok_or_else(|| MutationError::BranchNotFound(key.to_string()))
    }

    async fn existing(
        &self,
        branch: &BranchConfig,
        id: PositionId,
    ) -> Result<Position, MutationError> {
        self.ledger
            .get_position(branch.index, id)
            .await?
            .ok_or_else(|| MutationError::PositionNotFound {
                branch: branch.key.clone(),
                id,
            })
    }

    pub async fn open_position(
        &self,
        params: &OpenPosition,
    ) -> Result<PositionIntent, MutationError> {
        let branch = self.branch(&params.branch)?;
        let collateral = positive_wad("collateral", params.collateral)?;
        let debt = positive_wad("debt", params.debt)?;
        let max_fee = params.max_upfront_fee.to_wad()?;

        let position_id = derive_position_id(&params.owner, params.owner_index);
        let hint = self.hints.hint_for(branch.index, params.rate).await;
        info!(
            "Opening position {} on {} at {} ({:?} hint)",
            position_id.short(),
            branch.key,
            params.rate,
            hint.quality
        );

        let none = Address::zero();
        let call = CallDescriptor::new(
            branch.borrower_operations.clone(),
            OPEN_TROVE,
            vec![
                abi::word_from_address(&params.owner),
                abi::word_from_u64(params.owner_index),
                abi::word_from_u128(collateral),
                abi::word_from_u128(debt),
                abi::word_from_id(&hint.upper_hint),
                abi::word_from_id(&hint.lower_hint),
                abi::word_from_u128(params.rate.as_wad()),
                abi::word_from_u128(max_fee),
                abi::word_from_address(&none),
                abi::word_from_address(&none),
                abi::word_from_address(&none),
            ],
        );
        let intent = ExecutionIntent::new(format!("Open position on {}", branch.key), call)
            .with_allowance(collateral_allowance(branch, params.collateral));

        Ok(PositionIntent {
            position_id,
            hint: Some(hint),
            intent,
        })
    }

    pub async fn add_collateral(
        &self,
        branch_key: &str,
        id: PositionId,
        amount: Decimal,
    ) -> Result<PositionIntent, MutationError> {
        let branch = self.branch(branch_key)?;
        let wad = positive_wad("collateral", amount)?;
        self.existing(branch, id).await?;

        let intent = ExecutionIntent::new(
            format!("Add collateral to {}", id.short()),
            position_call(branch, ADD_COLL, id, vec![abi::word_from_u128(wad)]),
        )
        .with_allowance(collateral_allowance(branch, amount));
        Ok(PositionIntent {
            position_id: id,
            hint: None,
            intent,
        })
    }

    /// Withdrawals beyond the recorded collateral are rejected here instead
    /// of reverting on the ledger.
    pub async fn withdraw_collateral(
        &self,
        branch_key: &str,
        id: PositionId,
        amount: Decimal,
    ) -> Result<PositionIntent, MutationError> {
        let branch = self.branch(branch_key)?;
        let wad = positive_wad("collateral", amount)?;
        let position = self.existing(branch, id).await?;
        if amount > position.collateral {
            return Err(MutationError::InvalidAmount(format!(
                "withdrawal {} exceeds collateral {}",
                amount, position.collateral
            )));
        }

        let intent = ExecutionIntent::new(
            format!("Withdraw collateral from {}", id.short()),
            position_call(branch, WITHDRAW_COLL, id, vec![abi::word_from_u128(wad)]),
        );
        Ok(PositionIntent {
            position_id: id,
            hint: None,
            intent,
        })
    }

    pub async fn adjust_rate(
        &self,
        branch_key: &str,
        id: PositionId,
        new_rate: InterestRate,
        max_upfront_fee: Decimal,
    ) -> Result<PositionIntent, MutationError> {
        let branch = self.branch(branch_key)?;
        let max_fee = max_upfront_fee.to_wad()?;
        let position = self.existing(branch, id).await?;
        if position.annual_interest_rate == new_rate {
            debug!("Position {} already at {}", id.short(), new_rate);
        }

        let hint = self.hints.hint_for(branch.index, new_rate).await;
        let intent = ExecutionIntent::new(
            format!("Adjust rate of {} to {}", id.short(), new_rate),
            position_call(
                branch,
                ADJUST_RATE,
                id,
                vec![
                    abi::word_from_u128(new_rate.as_wad()),
                    abi::word_from_id(&hint.upper_hint),
                    abi::word_from_id(&hint.lower_hint),
                    abi::word_from_u128(max_fee),
                ],
            ),
        );
        Ok(PositionIntent {
            position_id: id,
            hint: Some(hint),
            intent,
        })
    }

    /// Debt is repaid from the owner's balance by the borrower operations
    /// contract, which needs no allowance.
    pub async fn close_position(
        &self,
        branch_key: &str,
        id: PositionId,
    ) -> Result<PositionIntent, MutationError> {
        let branch = self.branch(branch_key)?;
        let position = self.existing(branch, id).await?;
        debug!(
            "Closing {} with debt {} and collateral {}",
            id.short(),
            position.debt,
            position.collateral
        );

        let intent = ExecutionIntent::new(
            format!("Close position {}", id.short()),
            position_call(branch, CLOSE_TROVE, id, vec![]),
        );
        Ok(PositionIntent {
            position_id: id,
            hint: None,
            intent,
        })
    }
}

fn positive_wad(what: &str, amount: Decimal) -> Result<u128, MutationError> {
    if !amount.is_positive() {
        return Err(MutationError::InvalidAmount(format!(
            "{} must be positive, got {}",
            what, amount
        )));
    }
    Ok(amount.to_wad()?)
}

fn position_call(
    branch: &BranchConfig,
    signature: &str,
    id: PositionId,
    rest: Vec<Word>,
) -> CallDescriptor {
    let mut args = Vec::with_capacity(rest.len() + 1);
    args.push(abi::word_from_id(&id));
    args.extend(rest);
    CallDescriptor::new(branch.borrower_operations.clone(), signature, args)
}

fn collateral_allowance(branch: &BranchConfig, amount: Decimal) -> AllowanceRequirement {
    AllowanceRequirement {
        token: branch.collateral_token.clone(),
        spender: branch.borrower_operations.clone(),
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HintConfig, HintQuality};
    use crate::ledger::MockLedger;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn eth_branch() -> BranchConfig {
        BranchConfig {
            key: "ETH".to_string(),
            index: 0,
            collateral_token: addr(0xc0),
            borrower_operations: addr(0xb0),
            trove_manager: addr(0xa0),
            sorted_troves: addr(0x50),
            hint_helpers: addr(0x40),
        }
    }

    fn position(id: u64, rate: u128) -> Position {
        Position {
            id: PositionId::from_u64(id),
            collateral: Decimal::from_u64(10),
            debt: Decimal::from_u64(2000),
            annual_interest_rate: InterestRate::from_wad(rate),
            last_rate_adjustment: 0,
            recorded_debt: Decimal::from_u64(2000),
            weighted_recorded_debt: Decimal::from_u64(100),
        }
    }

    fn mutator(mock: MockLedger) -> PositionMutator {
        let ledger: Arc<dyn LedgerReader> = Arc::new(mock);
        let hints = HintFinder::new(
            ledger.clone(),
            HintConfig {
                seed: Some(3),
                trials_per_probe: 0,
            },
        );
        PositionMutator::new(ledger, hints, vec![eth_branch()])
    }

    fn open_params() -> OpenPosition {
        OpenPosition {
            branch: "eth".to_string(),
            owner: addr(1),
            owner_index: 0,
            collateral: Decimal::from_u64(5),
            debt: Decimal::from_u64(3000),
            rate: InterestRate::from_wad(45),
            max_upfront_fee: Decimal::from_u64(10),
        }
    }

    #[tokio::test]
    async fn test_open_uses_derived_id_and_hints() {
        let m = mutator(MockLedger::new().with_rates(0, &[10, 20, 40, 50, 90]));
        let out = m.open_position(&open_params()).await.unwrap();

        assert_eq!(out.position_id, derive_position_id(&addr(1), 0));
        let hint = out.hint.unwrap();
        assert_eq!(hint.quality, HintQuality::Exact);
        // rate 40 -> id 3, rate 50 -> id 4
        assert_eq!(hint.upper_hint, PositionId::from_u64(3));
        assert_eq!(hint.lower_hint, PositionId::from_u64(4));

        let call = &out.intent.call;
        assert_eq!(call.method(), "openTrove");
        assert_eq!(call.target, addr(0xb0));
        assert_eq!(call.args.len(), 11);
        assert_eq!(call.args[4], abi::word_from_id(&PositionId::from_u64(3)));
        assert_eq!(call.args[5], abi::word_from_id(&PositionId::from_u64(4)));

        let allowance = out.intent.allowance.unwrap();
        assert_eq!(allowance.token, addr(0xc0));
        assert_eq!(allowance.spender, addr(0xb0));
        assert_eq!(allowance.amount, Decimal::from_u64(5));
    }

    #[tokio::test]
    async fn test_open_on_empty_list() {
        let m = mutator(MockLedger::new());
        let out = m.open_position(&open_params()).await.unwrap();
        let hint = out.hint.unwrap();
        assert!(hint.upper_hint.is_zero());
        assert!(hint.lower_hint.is_zero());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_branch_and_bad_amounts() {
        let m = mutator(MockLedger::new());
        let mut params = open_params();
        params.branch = "wBTC".to_string();
        let err = m.open_position(&params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BranchNotFound);

        let mut params = open_params();
        params.debt = Decimal::zero();
        assert!(matches!(
            m.open_position(&params).await,
            Err(MutationError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_add_collateral_requires_existing_position() {
        let m = mutator(MockLedger::new().with_position(0, position(7, 30)));
        let out = m
            .add_collateral("ETH", PositionId::from_u64(7), Decimal::from_u64(1))
            .await
            .unwrap();
        assert_eq!(out.intent.call.method(), "addColl");
        assert!(out.intent.allowance.is_some());

        let err = m
            .add_collateral("ETH", PositionId::from_u64(8), Decimal::from_u64(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PositionNotFound);
    }

    #[tokio::test]
    async fn test_withdraw_bounded_by_collateral() {
        let m = mutator(MockLedger::new().with_position(0, position(7, 30)));
        let ok = m
            .withdraw_collateral("ETH", PositionId::from_u64(7), Decimal::from_u64(4))
            .await
            .unwrap();
        assert!(ok.intent.allowance.is_none());

        let err = m
            .withdraw_collateral("ETH", PositionId::from_u64(7), Decimal::from_u64(11))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_adjust_rate_carries_hints() {
        let mock = MockLedger::new()
            .with_position(0, position(1, 10))
            .with_position(0, position(2, 20))
            .with_position(0, position(3, 30));
        let m = mutator(mock);
        let out = m
            .adjust_rate(
                "ETH",
                PositionId::from_u64(1),
                InterestRate::from_wad(25),
                Decimal::from_u64(5),
            )
            .await
            .unwrap();
        let call = &out.intent.call;
        assert_eq!(call.method(), "adjustTroveInterestRate");
        assert_eq!(call.args[0], abi::word_from_id(&PositionId::from_u64(1)));
        assert_eq!(call.args[2], abi::word_from_id(&PositionId::from_u64(2)));
        assert_eq!(call.args[3], abi::word_from_id(&PositionId::from_u64(3)));
    }

    #[tokio::test]
    async fn test_close_needs_no_allowance() {
        let m = mutator(MockLedger::new().with_position(0, position(7, 30)));
        let out = m.close_position("ETH", PositionId::from_u64(7)).await.unwrap();
        assert_eq!(out.intent.call.method(), "closeTrove");
        assert_eq!(out.intent.call.args.len(), 1);
        assert!(out.intent.allowance.is_none());
    }
}
