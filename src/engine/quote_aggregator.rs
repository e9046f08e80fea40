//! Greedy best-price aggregation over the loan order book.

use crate::config::{Config, FeeSchedule};
use crate::domain::{Decimal, Order, Quote, Route, ScanStats, Side};
use crate::ledger::{LedgerError, LedgerReader};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteConfig {
    /// Maximum number of order ids scanned per quote.
    pub scan_window: u64,
    pub fetch_concurrency: usize,
    pub borrow_fee: FeeSchedule,
    pub lend_fee: FeeSchedule,
}

impl QuoteConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_window: config.order_scan_window,
            fetch_concurrency: config.order_fetch_concurrency,
            borrow_fee: config.borrow_fee,
            lend_fee: config.lend_fee,
        }
    }

    pub fn fee_schedule(&self, side: Side) -> FeeSchedule {
        match side {
            Side::Borrow => self.borrow_fee,
            Side::Lend => self.lend_fee,
        }
    }
}

/// Validated orders from one scan of the book.
#[derive(Debug, Clone, Default)]
pub struct OpenOrders {
    pub orders: Vec<Order>,
    pub stats: ScanStats,
}

/// Ranking order for `side`: ascending rate when borrowing (cheapest loans
/// first), descending when lending (best-paying demands first). Ties break
/// on order id so the result does not depend on fetch completion order.
fn rank(side: Side, a: &Order, b: &Order) -> Ordering {
    let by_rate = match side {
        Side::Borrow => a.rate().cmp(&b.rate()),
        Side::Lend => b.rate().cmp(&a.rate()),
    };
    by_rate.then_with(|| a.id().cmp(&b.id()))
}

/// Build a quote for `requested` from `orders`.
///
/// Orders are taken whole, best rate first, until coverage reaches the
/// requested amount; the order that crosses the threshold is included in
/// full. Returns `None` when no order is eligible or the fee for `requested`
/// is out of range. Under-coverage is not an error: the quote comes back
/// with `coverage < requested`. Orders whose totals would overflow are
/// counted as malformed and skipped.
pub fn aggregate(
    side: Side,
    requested: Decimal,
    orders: &[Order],
    fee: &FeeSchedule,
) -> Option<Quote> {
    if !requested.is_positive() {
        warn!("Refusing to quote non-positive amount {}", requested);
        return None;
    }
    let Some(estimated_fee) = fee.estimate(requested) else {
        warn!("Fee for {} is out of range, refusing to quote", requested);
        return None;
    };

    let mut stats = ScanStats {
        scanned: orders.len(),
        ..Default::default()
    };

    let mut eligible: Vec<&Order> = Vec::with_capacity(orders.len());
    for order in orders {
        if order.fills_side() != side {
            debug!("Order {} belongs to the other book, skipping", order.id());
            continue;
        }
        if !order.is_active() {
            stats.inactive += 1;
            continue;
        }
        if !order.amount().is_positive() || !order.rate().is_positive() {
            stats.malformed += 1;
            continue;
        }
        if order.rate().checked_mul(order.amount()).is_none() {
            debug!("Order {} rate times amount overflows, skipping", order.id());
            stats.malformed += 1;
            continue;
        }
        eligible.push(order);
    }
    stats.eligible = eligible.len();

    if eligible.is_empty() {
        debug!("No eligible {} orders out of {}", side, orders.len());
        return None;
    }

    eligible.sort_by(|a, b| rank(side, a, b));

    let mut routes = Vec::new();
    let mut coverage = Decimal::zero();
    let mut weighted = Decimal::zero();
    for order in eligible {
        if coverage >= requested {
            break;
        }
        let totals = order
            .rate()
            .checked_mul(order.amount())
            .and_then(|w| Some((coverage.checked_add(order.amount())?, weighted.checked_add(w)?)));
        let Some((next_coverage, next_weighted)) = totals else {
            debug!("Order {} overflows the running totals, skipping", order.id());
            stats.eligible -= 1;
            stats.malformed += 1;
            continue;
        };
        coverage = next_coverage;
        weighted = next_weighted;
        routes.push(Route {
            order_id: order.id(),
            rate: order.rate(),
            amount: order.amount(),
        });
    }

    let blended_rate = weighted.checked_div(coverage)?;
    let min_rate = routes.iter().map(|r| r.rate).min()?;
    let max_rate = routes.iter().map(|r| r.rate).max()?;

    Some(Quote {
        side,
        requested,
        coverage,
        blended_rate,
        min_rate,
        max_rate,
        estimated_fee,
        routes,
        stats,
        quoted_at: Utc::now(),
    })
}

/// Fetches the order book through the ledger and aggregates quotes.
#[derive(Debug, Clone)]
pub struct QuoteAggregator {
    ledger: Arc<dyn LedgerReader>,
    config: QuoteConfig,
}

impl QuoteAggregator {
    pub fn new(ledger: Arc<dyn LedgerReader>, config: QuoteConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    /// Scan ids `1..=min(counter, scan_window)` concurrently.
    ///
    /// A failed lookup is counted and treated as inactive; only a failure to
    /// read the counter aborts the scan.
    pub async fn fetch_open_orders(&self, side: Side) -> Result<OpenOrders, LedgerError> {
        let counter = self.ledger.get_order_counter(side).await?;
        let window = counter.min(self.config.scan_window);
        let truncated = counter > window;
        if truncated {
            warn!(
                "{} book has {} orders, scanning only the first {}; liquidity may be undercounted",
                side, counter, window
            );
        }

        let ledger = self.ledger.as_ref();
        let results: Vec<_> = stream::iter(1..=window)
            .map(move |id| async move { (id, ledger.get_order(side, id).await) })
            .buffer_unordered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;

        let mut open = OpenOrders {
            orders: Vec::with_capacity(results.len()),
            stats: ScanStats {
                scanned: window as usize,
                truncated,
                ..Default::default()
            },
        };

        for (id, result) in results {
            match result {
                Ok(Some(raw)) => match Order::from_raw(side, raw) {
                    Ok(order) => open.orders.push(order),
                    Err(e) => {
                        debug!("Skipping malformed order: {}", e);
                        open.stats.malformed += 1;
                    }
                },
                Ok(None) => open.stats.inactive += 1,
                Err(e) => {
                    debug!("Order {} lookup failed, treating as inactive: {}", id, e);
                    open.stats.failed += 1;
                }
            }
        }

        Ok(open)
    }

    /// Fetch and aggregate in one step.
    pub async fn quote(
        &self,
        side: Side,
        requested: Decimal,
    ) -> Result<Option<Quote>, LedgerError> {
        let open = self.fetch_open_orders(side).await?;
        let fee = self.config.fee_schedule(side);
        let quote = aggregate(side, requested, &open.orders, &fee).map(|mut quote| {
            quote.stats = ScanStats {
                scanned: open.stats.scanned,
                eligible: quote.stats.eligible,
                inactive: quote.stats.inactive + open.stats.inactive,
                malformed: quote.stats.malformed + open.stats.malformed,
                failed: open.stats.failed,
                truncated: open.stats.truncated,
            };
            quote
        });

        match &quote {
            Some(q) if !q.is_fully_covered() => warn!(
                "{} quote under-covered: requested {}, covered {}",
                side, q.requested, q.coverage
            ),
            Some(q) => debug!(
                "{} quote: {} routes, blended rate {}",
                side,
                q.routes.len(),
                q.blended_rate
            ),
            None => debug!("No {} liquidity for {}", side, requested),
        }
        Ok(quote)
    }
}
