//! Domain types for the position ledger and the loan order book.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: Address, Side, InterestRate
//! - Position identity (`derive_position_id`) and ledger state
//! - Strict order types validated from raw ledger records
//! - Route and Quote results of aggregation

pub mod decimal;
pub mod order;
pub mod position;
pub mod primitives;
pub mod quote;
pub mod rate;

pub use decimal::{Decimal, WadError};
pub use order::{LoanDemand, LoanOffer, MalformedOrder, Order, RawOrder};
pub use position::{derive_position_id, encode_owner_index, Position, PositionId};
pub use primitives::{Address, AddressParseError, Side};
pub use quote::{InsufficientLiquidity, Quote, Route, ScanStats};
pub use rate::InterestRate;
