//! In-memory ledger for tests and local runs without a node.

use super::{ApproxHint, LedgerError, LedgerReader};
use crate::domain::{InterestRate, Position, PositionId, RawOrder, Side};
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CallLog {
    approx_calls: AtomicU64,
    approx_trials: AtomicU64,
    insert_position_hints: Mutex<Vec<(PositionId, PositionId)>>,
    order_lookups: AtomicU64,
}

/// Mock ledger holding a rate-ordered list per branch and both order books.
///
/// Clones share the same call log.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    /// Ascending by rate; equal rates keep insertion order.
    lists: HashMap<u32, Vec<(PositionId, InterestRate)>>,
    positions: HashMap<(u32, PositionId), Position>,
    offers: BTreeMap<u64, RawOrder>,
    demands: BTreeMap<u64, RawOrder>,
    counters: HashMap<Side, u64>,
    failing_orders: HashSet<(Side, u64)>,
    list_size_unavailable: bool,
    approx_hint_unavailable: bool,
    insert_position_unavailable: bool,
    calls: Arc<CallLog>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node into a branch's rate-ordered list.
    pub fn with_list_entry(mut self, branch: u32, id: PositionId, rate: InterestRate) -> Self {
        let list = self.lists.entry(branch).or_default();
        let at = list.partition_point(|(_, r)| *r <= rate);
        list.insert(at, (id, rate));
        self
    }

    /// Populate a branch with ids `1..=rates.len()` carrying the given rates.
    pub fn with_rates(mut self, branch: u32, rates: &[u128]) -> Self {
        for (i, rate) in rates.iter().enumerate() {
            self = self.with_list_entry(
                branch,
                PositionId::from_u64(i as u64 + 1),
                InterestRate::from_wad(*rate),
            );
        }
        self
    }

    /// Add an open position; it is also linked into the rate-ordered list.
    pub fn with_position(mut self, branch: u32, position: Position) -> Self {
        let (id, rate) = (position.id, position.annual_interest_rate);
        self.positions.insert((branch, id), position);
        self.with_list_entry(branch, id, rate)
    }

    pub fn with_order(mut self, side: Side, order: RawOrder) -> Self {
        match side {
            Side::Borrow => self.offers.insert(order.id, order),
            Side::Lend => self.demands.insert(order.id, order),
        };
        self
    }

    pub fn with_orders(mut self, side: Side, orders: Vec<RawOrder>) -> Self {
        for order in orders {
            self = self.with_order(side, order);
        }
        self
    }

    /// Override the order counter (defaults to the highest id in the book).
    pub fn with_order_counter(mut self, side: Side, counter: u64) -> Self {
        self.counters.insert(side, counter);
        self
    }

    /// Make lookups of this order id fail with a network error.
    pub fn with_failing_order(mut self, side: Side, id: u64) -> Self {
        self.failing_orders.insert((side, id));
        self
    }

    pub fn with_list_size_unavailable(mut self) -> Self {
        self.list_size_unavailable = true;
        self
    }

    /// Simulate a deployment without the approximate-hint helper.
    pub fn with_approx_hint_unavailable(mut self) -> Self {
        self.approx_hint_unavailable = true;
        self
    }

    pub fn with_insert_position_unavailable(mut self) -> Self {
        self.insert_position_unavailable = true;
        self
    }

    pub fn approx_calls(&self) -> u64 {
        self.calls.approx_calls.load(Ordering::SeqCst)
    }

    pub fn approx_trials(&self) -> u64 {
        self.calls.approx_trials.load(Ordering::SeqCst)
    }

    /// `(prev, next)` hints passed to each `find_insert_position` call.
    pub fn insert_position_hints(&self) -> Vec<(PositionId, PositionId)> {
        self.calls
            .insert_position_hints
            .lock()
            .map(|hints| hints.clone())
            .unwrap_or_default()
    }

    pub fn order_lookups(&self) -> u64 {
        self.calls.order_lookups.load(Ordering::SeqCst)
    }

    /// Rate of a listed node, for assertions.
    pub fn rate_of(&self, branch: u32, id: PositionId) -> Option<InterestRate> {
        self.lists
            .get(&branch)?
            .iter()
            .find(|(node, _)| *node == id)
            .map(|(_, rate)| *rate)
    }

    fn list(&self, branch: u32) -> &[(PositionId, InterestRate)] {
        self.lists.get(&branch).map(|l| l.as_slice()).unwrap_or(&[])
    }

    fn book(&self, side: Side) -> &BTreeMap<u64, RawOrder> {
        match side {
            Side::Borrow => &self.offers,
            Side::Lend => &self.demands,
        }
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn get_list_size(&self, branch: u32) -> Result<u64, LedgerError> {
        if self.list_size_unavailable {
            return Err(LedgerError::NetworkError("list size unavailable".to_string()));
        }
        Ok(self.list(branch).len() as u64)
    }

    async fn get_approx_hint(
        &self,
        branch: u32,
        rate: InterestRate,
        num_trials: u64,
        seed: u64,
    ) -> Result<ApproxHint, LedgerError> {
        if self.approx_hint_unavailable {
            return Err(LedgerError::Unavailable(
                "approximate hint helper not deployed".to_string(),
            ));
        }
        self.calls.approx_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.approx_trials.fetch_add(num_trials, Ordering::SeqCst);

        let list = self.list(branch);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let Some((last_id, last_rate)) = list.last() else {
            return Ok(ApproxHint {
                hint_id: PositionId::ZERO,
                diff: u128::MAX,
                latest_seed: rng.gen(),
            });
        };

        let mut best = (*last_id, last_rate.abs_diff(rate));
        for _ in 0..num_trials {
            let (id, candidate_rate) = list[rng.gen_range(0..list.len())];
            let diff = candidate_rate.abs_diff(rate);
            if diff < best.1 {
                best = (id, diff);
            }
        }

        Ok(ApproxHint {
            hint_id: best.0,
            diff: best.1,
            latest_seed: rng.gen(),
        })
    }

    async fn find_insert_position(
        &self,
        branch: u32,
        rate: InterestRate,
        prev_id: PositionId,
        next_id: PositionId,
    ) -> Result<(PositionId, PositionId), LedgerError> {
        if self.insert_position_unavailable {
            return Err(LedgerError::NetworkError("connection reset".to_string()));
        }
        if let Ok(mut hints) = self.calls.insert_position_hints.lock() {
            hints.push((prev_id, next_id));
        }

        let list = self.list(branch);
        let split = list.partition_point(|(_, r)| *r <= rate);
        let upper = if split == 0 {
            PositionId::ZERO
        } else {
            list[split - 1].0
        };
        let lower = list.get(split).map(|(id, _)| *id).unwrap_or(PositionId::ZERO);
        Ok((upper, lower))
    }

    async fn get_position(
        &self,
        branch: u32,
        id: PositionId,
    ) -> Result<Option<Position>, LedgerError> {
        Ok(self.positions.get(&(branch, id)).cloned())
    }

    async fn get_order(&self, side: Side, id: u64) -> Result<Option<RawOrder>, LedgerError> {
        self.calls.order_lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_orders.contains(&(side, id)) {
            return Err(LedgerError::NetworkError(format!("timeout reading order {}", id)));
        }
        Ok(self.book(side).get(&id).cloned())
    }

    async fn get_order_counter(&self, side: Side) -> Result<u64, LedgerError> {
        Ok(self
            .counters
            .get(&side)
            .copied()
            .unwrap_or_else(|| self.book(side).keys().next_back().copied().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_kept_in_rate_order() {
        let mock = MockLedger::new().with_rates(0, &[50, 10, 30]);
        assert_eq!(mock.get_list_size(0).await.unwrap(), 3);
        let (upper, lower) = mock
            .find_insert_position(0, InterestRate::from_wad(20), PositionId::ZERO, PositionId::ZERO)
            .await
            .unwrap();
        // ids: rate 10 -> 2, rate 30 -> 3
        assert_eq!(upper, PositionId::from_u64(2));
        assert_eq!(lower, PositionId::from_u64(3));
    }

    #[tokio::test]
    async fn test_insert_position_at_ends() {
        let mock = MockLedger::new().with_rates(0, &[10, 20]);
        let (upper, lower) = mock
            .find_insert_position(0, InterestRate::from_wad(5), PositionId::ZERO, PositionId::ZERO)
            .await
            .unwrap();
        assert!(upper.is_zero());
        assert_eq!(lower, PositionId::from_u64(1));

        let (upper, lower) = mock
            .find_insert_position(0, InterestRate::from_wad(99), PositionId::ZERO, PositionId::ZERO)
            .await
            .unwrap();
        assert_eq!(upper, PositionId::from_u64(2));
        assert!(lower.is_zero());
    }

    #[tokio::test]
    async fn test_approx_hint_is_reproducible_for_seed() {
        let rates: Vec<u128> = (0..100).map(|i| i * 10).collect();
        let mock = MockLedger::new().with_rates(0, &rates);
        let a = mock
            .get_approx_hint(0, InterestRate::from_wad(333), 20, 7)
            .await
            .unwrap();
        let b = mock
            .get_approx_hint(0, InterestRate::from_wad(333), 20, 7)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(mock.approx_calls(), 2);
        assert_eq!(mock.approx_trials(), 40);
    }

    #[tokio::test]
    async fn test_order_counter_defaults_to_highest_id() {
        let mock = MockLedger::new()
            .with_order(
                Side::Borrow,
                RawOrder {
                    id: 9,
                    ..Default::default()
                },
            )
            .with_order_counter(Side::Lend, 4);
        assert_eq!(mock.get_order_counter(Side::Borrow).await.unwrap(), 9);
        assert_eq!(mock.get_order_counter(Side::Lend).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failing_order_lookup() {
        let mock = MockLedger::new().with_failing_order(Side::Borrow, 3);
        assert!(matches!(
            mock.get_order(Side::Borrow, 3).await,
            Err(LedgerError::NetworkError(_))
        ));
        assert_eq!(mock.get_order(Side::Borrow, 4).await.unwrap(), None);
        assert_eq!(mock.order_lookups(), 2);
    }
}
