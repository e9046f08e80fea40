//! Write path: building ledger calls and driving them through a signer.

use crate::domain::{Address, Decimal};
use crate::error::ErrorKind;
use crate::ledger::abi::{self, Word};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub mod fulfillment;
pub mod mock;
pub mod mutator;
pub mod orchestrator;

pub use fulfillment::{fulfillment_intents, FulfillmentError};
pub use mock::{MockSigner, SignerCall};
pub use mutator::{MutationError, OpenPosition, PositionIntent, PositionMutator};
pub use orchestrator::{
    ExecutionError, ExecutionOrchestrator, ExecutionOutcome, ExecutionState, IntentControl,
    NoProgress, ProgressEvent, ProgressSink,
};

/// Transaction hash as returned by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TxHandle(pub String);

impl TxHandle {
    /// `0x1234abcd…` for progress messages.
    pub fn short(&self) -> String {
        let cut = self.0.char_indices().nth(10).map(|(i, _)| i);
        match cut {
            Some(i) => format!("{}…", &self.0[..i]),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx: TxHandle,
    pub block_number: u64,
    pub success: bool,
}

/// A contract call with static arguments, ready for a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub target: Address,
    /// Canonical signature, e.g. `addColl(uint256,uint256)`.
    pub signature: String,
    pub args: Vec<Word>,
}

impl CallDescriptor {
    pub fn new(target: Address, signature: &str, args: Vec<Word>) -> Self {
        Self {
            target,
            signature: signature.to_string(),
            args,
        }
    }

    pub fn method(&self) -> &str {
        self.signature
            .split('(')
            .next()
            .unwrap_or(self.signature.as_str())
    }

    pub fn calldata(&self) -> Vec<u8> {
        abi::encode_call(&self.signature, &self.args)
    }
}

/// Token allowance that must be in place before the main call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceRequirement {
    pub token: Address,
    pub spender: Address,
    pub amount: Decimal,
}

/// One write the orchestrator can carry from idle to confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionIntent {
    pub id: Uuid,
    pub label: String,
    pub call: CallDescriptor,
    pub allowance: Option<AllowanceRequirement>,
}

impl ExecutionIntent {
    pub fn new(label: impl Into<String>, call: CallDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            call,
            allowance: None,
        }
    }

    pub fn with_allowance(mut self, requirement: AllowanceRequirement) -> Self {
        self.allowance = Some(requirement);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("user rejected: {0}")]
    UserRejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("transaction {tx} reverted: {reason}")]
    Reverted { tx: String, reason: String },
    #[error("{0}")]
    Other(String),
}

impl SignerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignerError::UserRejected(_) => ErrorKind::UserRejected,
            SignerError::Network(_) | SignerError::Other(_) => ErrorKind::NetworkError,
            SignerError::Reverted { .. } => ErrorKind::Reverted,
        }
    }
}

/// Transaction-submission collaborator (wallet, custody service, ...).
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    /// Account that owns allowances and signs transactions.
    fn address(&self) -> Address;

    async fn get_allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Decimal, SignerError>;

    async fn approve(
        &self,
        token: &Address,
        spender: &Address,
        amount: Decimal,
    ) -> Result<TxHandle, SignerError>;

    async fn submit(&self, call: &CallDescriptor) -> Result<TxHandle, SignerError>;

    async fn wait_for_confirmation(&self, tx: &TxHandle) -> Result<Receipt, SignerError>;
}
