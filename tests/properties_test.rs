use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use trovekit::config::FeeSchedule;
use trovekit::domain::{
    derive_position_id, Address, Decimal, InterestRate, Order, RawOrder, Side,
};
use trovekit::engine::{aggregate, HintConfig, HintFinder};
use trovekit::ledger::MockLedger;

fn fee() -> FeeSchedule {
    FeeSchedule {
        floor_usd: Decimal::from_u64(1),
        bps: Decimal::from_u64(30),
    }
}

fn build_orders(side: Side, specs: &[(u64, u64)]) -> Vec<Order> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(rate, amount))| {
            Order::from_raw(
                side,
                RawOrder {
                    id: i as u64 + 1,
                    owner: Some(Address::from_bytes([7; 20])),
                    amount: Some(Decimal::from_u64(amount)),
                    rate: Some(Decimal::from_u64(rate)),
                    duration_secs: Some(86_400),
                    active: Some(true),
                    min_collateral_ratio: None,
                },
            )
            .unwrap()
        })
        .collect()
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Borrow), Just(Side::Lend)]
}

proptest! {
    #[test]
    fn derived_ids_differ_for_distinct_pairs(
        a in any::<[u8; 20]>(),
        b in any::<[u8; 20]>(),
        i in any::<u64>(),
        j in any::<u64>(),
    ) {
        prop_assume!((a, i) != (b, j));
        let x = derive_position_id(&Address::from_bytes(a), i);
        let y = derive_position_id(&Address::from_bytes(b), j);
        prop_assert_ne!(x, y);
    }

    #[test]
    fn covered_quote_blends_within_route_rates(
        side in side_strategy(),
        specs in prop::collection::vec((1u64..2_000, 1u64..10_000), 1..40),
        fraction in 1u64..=100,
    ) {
        let orders = build_orders(side, &specs);
        let total: u64 = specs.iter().map(|(_, amount)| amount).sum();
        let requested = (total * fraction / 100).max(1);

        let quote = aggregate(side, Decimal::from_u64(requested), &orders, &fee()).unwrap();

        prop_assert!(quote.coverage >= Decimal::from_u64(requested));
        prop_assert!(quote.min_rate <= quote.blended_rate);
        prop_assert!(quote.blended_rate <= quote.max_rate);
        let summed: Decimal = quote.routes.iter().map(|r| r.amount).sum();
        prop_assert_eq!(summed, quote.coverage);
        // Dropping the last route must leave the request uncovered.
        let without_last = quote.coverage - quote.routes[quote.routes.len() - 1].amount;
        prop_assert!(without_last < Decimal::from_u64(requested));
    }

    #[test]
    fn oversized_request_exhausts_the_book(
        side in side_strategy(),
        specs in prop::collection::vec((1u64..2_000, 1u64..10_000), 1..40),
        extra in 1u64..10_000,
    ) {
        let orders = build_orders(side, &specs);
        let total: u64 = specs.iter().map(|(_, amount)| amount).sum();

        let quote = aggregate(side, Decimal::from_u64(total + extra), &orders, &fee()).unwrap();

        prop_assert_eq!(quote.coverage, Decimal::from_u64(total));
        prop_assert_eq!(quote.routes.len(), orders.len());
        prop_assert!(!quote.is_fully_covered());
    }

    #[test]
    fn greedy_never_skips_a_better_rate(
        side in side_strategy(),
        specs in prop::collection::vec((1u64..2_000, 1u64..10_000), 1..40),
        requested in 1u64..50_000,
    ) {
        let orders = build_orders(side, &specs);
        let quote = aggregate(side, Decimal::from_u64(requested), &orders, &fee()).unwrap();

        let chosen: HashSet<u64> = quote.routes.iter().map(|r| r.order_id).collect();
        for order in orders.iter().filter(|o| !chosen.contains(&o.id())) {
            for route in &quote.routes {
                match side {
                    Side::Borrow => prop_assert!(route.rate <= order.rate()),
                    Side::Lend => prop_assert!(route.rate >= order.rate()),
                }
            }
        }
        for pair in quote.routes.windows(2) {
            match side {
                Side::Borrow => prop_assert!(pair[0].rate <= pair[1].rate),
                Side::Lend => prop_assert!(pair[0].rate >= pair[1].rate),
            }
        }
    }

    #[test]
    fn hints_bracket_the_target_rate(
        mut rates in prop::collection::vec(0u128..1_000_000, 1..200),
        target in 0u128..1_100_000,
        seed in any::<u64>(),
        trials_per_probe in 0u64..30,
    ) {
        rates.sort_unstable();
        let mock = MockLedger::new().with_rates(0, &rates);
        let finder = HintFinder::new(
            Arc::new(mock.clone()),
            HintConfig { seed: Some(seed), trials_per_probe },
        );
        let target = InterestRate::from_wad(target);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let hint = rt.block_on(finder.hint_for(0, target));

        if hint.upper_hint.is_zero() {
            prop_assert!(rates[0] >= target.as_wad());
        } else {
            prop_assert!(mock.rate_of(0, hint.upper_hint).unwrap() <= target);
        }
        if hint.lower_hint.is_zero() {
            prop_assert!(rates[rates.len() - 1] <= target.as_wad());
        } else {
            prop_assert!(mock.rate_of(0, hint.lower_hint).unwrap() >= target);
        }
        prop_assert!(!(hint.upper_hint.is_zero() && hint.lower_hint.is_zero()));
    }
}

#[tokio::test]
async fn empty_list_yields_neutral_hint() {
    let mock = MockLedger::new();
    let finder = HintFinder::new(Arc::new(mock.clone()), HintConfig::default());
    let hint = finder.hint_for(0, InterestRate::from_wad(5)).await;
    assert!(hint.upper_hint.is_zero());
    assert!(hint.lower_hint.is_zero());
    assert_eq!(mock.approx_calls(), 0);
}

#[test]
fn derived_ids_are_unique_across_a_grid_of_owners() {
    let mut ids = HashSet::new();
    for owner in 0u8..64 {
        let mut bytes = [0u8; 20];
        bytes[19] = owner;
        let owner = Address::from_bytes(bytes);
        for index in (0u64..64).chain([u64::MAX - 1, u64::MAX]) {
            ids.insert(derive_position_id(&owner, index));
        }
    }
    assert_eq!(ids.len(), 64 * 66);
}
