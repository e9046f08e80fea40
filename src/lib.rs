pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod ledger;

pub use config::{BranchConfig, Config};
pub use domain::{
    derive_position_id, Address, Decimal, InterestRate, LoanDemand, LoanOffer, Order, Position,
    PositionId, Quote, Route, Side,
};
pub use engine::{aggregate, HintFinder, InsertionHint, QuoteAggregator};
pub use error::{AppError, ErrorKind};
pub use execution::{ExecutionOrchestrator, PositionMutator, Signer};
pub use ledger::{LedgerError, LedgerReader, MockLedger, RpcLedgerReader};
