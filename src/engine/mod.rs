//! Pure read-side computation over ledger data: insertion hints and quotes.
//!
//! Nothing here mutates local state; every call is an independent computation
//! over what the [`LedgerReader`](crate::ledger::LedgerReader) returns, so a
//! caller can drop a future at any point without side effects.

pub mod hint_finder;
pub mod quote_aggregator;

pub use hint_finder::{
    trial_count, HintConfig, HintFinder, HintQuality, InsertionHint, MAX_TRIALS,
};
pub use quote_aggregator::{aggregate, OpenOrders, QuoteAggregator, QuoteConfig};
