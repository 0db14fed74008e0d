//! Aggregated quantity and value of a request, in each product's canonical unit
use crate::error::{Result, WorkflowError};
use crate::ports::{Product, UomConverter};
use crate::request::RequestLine;
use crate::types::ProductId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub qty: f64,
    pub value: f64,
}

impl Totals {
    /// Folds `lines` into totals. Each line's quantity is converted to its
    /// product's unit before it is summed and valued at the standard price.
    pub fn compute<'a>(
        lines: impl IntoIterator<Item = &'a RequestLine>,
        products: &HashMap<ProductId, Product>,
        uom: &dyn UomConverter,
    ) -> Result<Totals> {
        lines.into_iter().try_fold(Totals::default(), |acc, line| {
            let product = products
                .get(&line.product)
                .ok_or_else(|| WorkflowError::not_found("product", line.product))?;
            let qty = uom.convert(line.qty, line.uom, product.uom)?;

            Ok(Totals {
                qty: acc.qty + qty,
                value: acc.value + qty * product.standard_price,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::UomTable;
    use crate::types::UomId;

    fn catalog() -> (HashMap<ProductId, Product>, UomTable) {
        let mut units = UomTable::new();
        units.add_unit(UomId(1), "Units", 1, 1.0);
        units.add_unit(UomId(2), "Dozens", 1, 12.0);

        let mut screw = Product::new("Screw", UomId(1), 0.5);
        screw.id = ProductId(1);
        let mut bolt = Product::new("Bolt", UomId(1), 2.0);
        bolt.id = ProductId(2);

        (HashMap::from([(screw.id, screw), (bolt.id, bolt)]), units)
    }

    #[test]
    fn empty_lines_sum_to_zero() {
        let (products, units) = catalog();
        let lines: Vec<RequestLine> = vec![];
        let totals = Totals::compute(&lines, &products, &units).unwrap();
        assert_eq!(totals, Totals { qty: 0.0, value: 0.0 });
    }

    #[test]
    fn converts_before_summing() {
        let (products, units) = catalog();
        let lines = vec![
            RequestLine::new(ProductId(1), 2.0, UomId(2)), // 24 screws
            RequestLine::new(ProductId(2), 3.0, UomId(1)),
        ];

        let totals = Totals::compute(&lines, &products, &units).unwrap();
        assert_eq!(totals.qty, 27.0);
        assert_eq!(totals.value, 24.0 * 0.5 + 3.0 * 2.0);
    }

    #[test]
    fn unknown_product_is_reported() {
        let (products, units) = catalog();
        let lines = vec![RequestLine::new(ProductId(99), 1.0, UomId(1))];

        assert!(matches!(
            Totals::compute(&lines, &products, &units),
            Err(WorkflowError::NotFound { kind: "product", id: 99 })
        ));
    }
}
