//! Property-based tests for request totals
//!
//! Totals are folded from the lines in each product's canonical unit, so
//! they must not depend on how often or in which order they are computed.

use proptest::prelude::*;
use std::collections::HashMap;
use stock_transport::memory::UomTable;
use stock_transport::ports::Product;
use stock_transport::request::RequestLine;
use stock_transport::totals::Totals;
use stock_transport::types::{ProductId, UomId};

fn units() -> UomTable {
    let mut uom = UomTable::new();
    uom.add_unit(UomId(1), "Units", 1, 1.0);
    uom.add_unit(UomId(2), "Dozens", 1, 12.0);
    uom
}

fn catalogue() -> HashMap<ProductId, Product> {
    (1..=3)
        .map(|i| {
            let mut product = Product::new(format!("product {i}"), UomId(1), i as f64 * 0.5);
            product.id = ProductId(i);
            (product.id, product)
        })
        .collect()
}

/// Lines with whole quantities so sums stay exact in f64
fn lines_strategy() -> impl Strategy<Value = Vec<RequestLine>> {
    prop::collection::vec((1u64..=3, 0u32..1_000, 1u64..=2), 0..20).prop_map(|lines| {
        lines
            .into_iter()
            .map(|(product, qty, uom)| RequestLine::new(ProductId(product), qty as f64, UomId(uom)))
            .collect()
    })
}

proptest! {
    /// Computing twice from the same lines gives the same totals
    #[test]
    fn recomputation_is_idempotent(lines in lines_strategy()) {
        let (uom, products) = (units(), catalogue());
        let first = Totals::compute(&lines, &products, &uom).unwrap();
        let second = Totals::compute(&lines, &products, &uom).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Line order does not matter
    #[test]
    fn totals_ignore_line_order(lines in lines_strategy()) {
        let (uom, products) = (units(), catalogue());
        let mut reversed = lines.clone();
        reversed.reverse();

        let forward = Totals::compute(&lines, &products, &uom).unwrap();
        let backward = Totals::compute(&reversed, &products, &uom).unwrap();
        prop_assert_eq!(forward, backward);
    }

    /// Totals are never negative for non-negative lines
    #[test]
    fn totals_are_non_negative(lines in lines_strategy()) {
        let (uom, products) = (units(), catalogue());
        let totals = Totals::compute(&lines, &products, &uom).unwrap();
        prop_assert!(totals.qty >= 0.0);
        prop_assert!(totals.value >= 0.0);
    }
}

#[test]
fn empty_lines_total_zero() {
    let lines: Vec<RequestLine> = vec![];
    let totals = Totals::compute(&lines, &catalogue(), &units()).unwrap();
    assert_eq!(totals, Totals { qty: 0.0, value: 0.0 });
}

#[test]
fn unknown_product_is_reported() {
    let lines = vec![RequestLine::new(ProductId(99), 1.0, UomId(1))];
    assert!(Totals::compute(&lines, &catalogue(), &units()).is_err());
}
