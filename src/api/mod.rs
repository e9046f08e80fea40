pub mod health;
pub mod hint;
pub mod positions;
pub mod quote;

use crate::config::Config;
use crate::engine::{HintConfig, HintFinder, QuoteAggregator, QuoteConfig};
use crate::ledger::LedgerReader;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<dyn LedgerReader>,
    pub hint_finder: HintFinder,
    pub aggregator: QuoteAggregator,
}

impl AppState {
    pub fn new(config: Config, ledger: Arc<dyn LedgerReader>) -> Self {
        let hint_finder = HintFinder::new(ledger.clone(), HintConfig::from_config(&config));
        let aggregator = QuoteAggregator::new(ledger.clone(), QuoteConfig::from_config(&config));
        Self {
            config,
            ledger,
            hint_finder,
            aggregator,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/quote", get(quote::get_quote))
        .route("/v1/hint", get(hint::get_hint))
        .route("/v1/positions/id", get(positions::get_position_id))
        .route("/v1/positions/:branch/:id", get(positions::get_position))
        .layer(cors)
        .with_state(state)
}
