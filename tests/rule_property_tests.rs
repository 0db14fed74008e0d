//! Property-based tests for approval rule matching and selection
//!
//! Matching is a pure predicate over (rule, warehouse, total quantity,
//! company) so it can be checked across randomly generated rule sets
//! without a store.

use proptest::prelude::*;
use stock_transport::rule::{ApprovalRule, select_rule};
use stock_transport::types::{CompanyId, RuleId, WarehouseId};

// PROPERTY TEST STRATEGIES

/// Strategy to generate a rule scoped to one of three warehouses and
/// optionally one of two companies
fn rule_strategy() -> impl Strategy<Value = ApprovalRule> {
    (
        1u64..=3,
        prop::option::of(1u64..=2),
        -5i32..=5,
        prop_oneof![Just(0.0), 1.0f64..500.0],
        prop::bool::ANY,
        1u64..=1_000,
    )
        .prop_map(|(warehouse, company, sequence, valid_qty, active, id)| {
            let mut rule = ApprovalRule::new(format!("rule {id}"), WarehouseId(warehouse))
                .set_sequence(sequence)
                .set_valid_qty(valid_qty)
                .set_active(active);
            if let Some(company) = company {
                rule = rule.set_company(CompanyId(company));
            }
            rule.id = RuleId(id);
            rule
        })
}

fn request_strategy() -> impl Strategy<Value = (WarehouseId, f64, CompanyId)> {
    (1u64..=3, 0.0f64..1_000.0, 1u64..=2)
        .prop_map(|(wh, qty, company)| (WarehouseId(wh), qty, CompanyId(company)))
}

// MATCHING PROPERTIES

proptest! {
    /// The same inputs always give the same answer
    #[test]
    fn matching_is_pure(rule in rule_strategy(), (wh, qty, company) in request_strategy()) {
        let first = rule.matches(wh, qty, company);
        prop_assert_eq!(first, rule.matches(wh, qty, company));
        prop_assert_eq!(first, rule.clone().matches(wh, qty, company));
    }

    /// An archived rule never matches anything
    #[test]
    fn inactive_rule_never_matches(rule in rule_strategy(), (wh, qty, company) in request_strategy()) {
        let rule = rule.set_active(false);
        prop_assert!(!rule.matches(wh, qty, company));
    }

    /// A zero ceiling accepts any quantity within the rule's scope
    #[test]
    fn zero_ceiling_matches_any_quantity(rule in rule_strategy(), qty in 0.0f64..1e9) {
        let rule = rule.set_valid_qty(0.0).set_active(true);
        let company = rule.company.unwrap_or(CompanyId(1));
        prop_assert!(rule.matches(rule.providing_warehouse, qty, company));
    }

    /// Rules never match outside their providing warehouse
    #[test]
    fn other_warehouse_never_matches(rule in rule_strategy(), (_, qty, company) in request_strategy()) {
        let elsewhere = WarehouseId(rule.providing_warehouse.0 + 10);
        prop_assert!(!rule.matches(elsewhere, qty, company));
    }
}

// SELECTION PROPERTIES

proptest! {
    /// The selected rule matches and no matching rule sorts before it
    #[test]
    fn selection_picks_lowest_sequence_then_id(
        rules in prop::collection::vec(rule_strategy(), 0..12),
        (wh, qty, company) in request_strategy(),
    ) {
        let selected = select_rule(&rules, wh, qty, company);
        let best = rules
            .iter()
            .filter(|rule| rule.matches(wh, qty, company))
            .map(|rule| (rule.sequence, rule.id))
            .min();

        prop_assert_eq!(selected.map(|rule| (rule.sequence, rule.id)), best);
    }

    /// Input order does not change the outcome
    #[test]
    fn selection_ignores_input_order(
        rules in prop::collection::vec(rule_strategy(), 0..12),
        (wh, qty, company) in request_strategy(),
    ) {
        let mut reversed = rules.clone();
        reversed.reverse();

        let forward = select_rule(&rules, wh, qty, company).map(|rule| (rule.sequence, rule.id));
        let backward = select_rule(&reversed, wh, qty, company).map(|rule| (rule.sequence, rule.id));
        prop_assert_eq!(forward, backward);
    }
}

#[test]
fn negative_ceiling_is_invalid() {
    let rule = ApprovalRule::new("broken", WarehouseId(1)).set_valid_qty(-1.0);
    assert!(rule.validate().is_err());
}
