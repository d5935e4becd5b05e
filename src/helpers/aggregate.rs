use std::collections::BTreeMap;
use tracing::info;

use crate::error::{ReportError, ReportResult};
use crate::models::sales::{ProductRollup, SalesRecord, SalesSummary};

#[derive(Default)]
struct Group {
    quantity: u64,
    price_sum: f64,
    rows: usize,
}

/// Computes the run summary and one rollup per product, ordered by product.
///
/// Ties for the top product resolve to the lowest product identifier, which is
/// the first maximum met while walking the ordered rollups.
pub fn aggregate(records: &[SalesRecord]) -> ReportResult<(SalesSummary, Vec<ProductRollup>)> {
    if records.is_empty() {
        return Err(ReportError::EmptyInput);
    }

    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();
    let mut total_units: u64 = 0;
    let mut price_sum = 0.0;

    for record in records {
        total_units = total_units
            .checked_add(record.quantity)
            .ok_or(ReportError::QuantityOverflow)?;
        price_sum += record.unit_price;

        let group = groups.entry(record.product.as_str()).or_default();
        // Never exceeds total_units, which was checked above.
        group.quantity += record.quantity;
        group.price_sum += record.unit_price;
        group.rows += 1;
    }

    let rollups: Vec<ProductRollup> = groups
        .into_iter()
        .map(|(product, group)| ProductRollup {
            product: product.to_string(),
            total_quantity: group.quantity,
            average_unit_price: group.price_sum / group.rows as f64,
        })
        .collect();

    let mut top = &rollups[0];
    for rollup in &rollups[1..] {
        if rollup.total_quantity > top.total_quantity {
            top = rollup;
        }
    }

    let summary = SalesSummary {
        total_units,
        average_unit_price: price_sum / records.len() as f64,
        top_product: top.product.clone(),
    };

    info!(
        "Aggregated {} records into {} products, top product: {}",
        records.len(),
        rollups.len(),
        summary.top_product
    );

    Ok((summary, rollups))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SalesRecord> {
        vec![
            SalesRecord::new("A", 2, 10.0),
            SalesRecord::new("B", 5, 4.0),
            SalesRecord::new("A", 3, 10.0),
        ]
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(aggregate(&[]), Err(ReportError::EmptyInput)));
    }

    #[test]
    fn sample_rows_aggregate_to_expected_values() {
        let (summary, rollups) = aggregate(&sample()).unwrap();

        assert_eq!(summary.total_units, 10);
        assert!((summary.average_unit_price - 8.0).abs() < 1e-9);
        assert_eq!(
            rollups,
            vec![
                ProductRollup {
                    product: "A".to_string(),
                    total_quantity: 5,
                    average_unit_price: 10.0,
                },
                ProductRollup {
                    product: "B".to_string(),
                    total_quantity: 5,
                    average_unit_price: 4.0,
                },
            ]
        );
    }

    #[test]
    fn ties_resolve_to_lowest_product_every_time() {
        for _ in 0..5 {
            let (summary, _) = aggregate(&sample()).unwrap();
            assert_eq!(summary.top_product, "A");
        }

        // Input order does not change the winner.
        let mut reversed = sample();
        reversed.reverse();
        let (summary, _) = aggregate(&reversed).unwrap();
        assert_eq!(summary.top_product, "A");
    }

    #[test]
    fn strict_maximum_wins_over_order() {
        let records = vec![
            SalesRecord::new("apple", 1, 1.0),
            SalesRecord::new("pear", 7, 2.0),
            SalesRecord::new("fig", 3, 3.0),
        ];
        let (summary, _) = aggregate(&records).unwrap();
        assert_eq!(summary.top_product, "pear");
    }

    #[test]
    fn rollups_are_unique_sorted_and_sum_to_total() {
        let records = vec![
            SalesRecord::new("zeta", 4, 1.5),
            SalesRecord::new("alpha", 0, 2.0),
            SalesRecord::new("mu", 9, 0.5),
            SalesRecord::new("alpha", 6, 4.0),
            SalesRecord::new("zeta", 1, 3.5),
            SalesRecord::new("Beta", 2, 9.0),
        ];
        let (summary, rollups) = aggregate(&records).unwrap();

        let products: Vec<&str> = rollups.iter().map(|r| r.product.as_str()).collect();
        assert_eq!(products, vec!["Beta", "alpha", "mu", "zeta"]);

        let sum: u64 = rollups.iter().map(|r| r.total_quantity).sum();
        assert_eq!(sum, summary.total_units);
        assert_eq!(summary.total_units, 22);

        let alpha = &rollups[1];
        assert_eq!(alpha.total_quantity, 6);
        assert!((alpha.average_unit_price - 3.0).abs() < 1e-9);
    }

    #[test]
    fn quantity_overflow_is_an_error() {
        let half = u64::MAX / 2 + 1;
        let records = vec![SalesRecord::new("A", half, 1.0), SalesRecord::new("B", half, 1.0)];
        assert!(matches!(
            aggregate(&records),
            Err(ReportError::QuantityOverflow)
        ));

        let records = vec![SalesRecord::new("A", u64::MAX, 1.0)];
        let (summary, rollups) = aggregate(&records).unwrap();
        assert_eq!(summary.total_units, u64::MAX);
        assert_eq!(rollups[0].total_quantity, u64::MAX);
    }

    #[test]
    fn average_price_is_unweighted_over_rows() {
        let records = vec![
            SalesRecord::new("A", 100, 1.0),
            SalesRecord::new("B", 1, 3.0),
        ];
        let (summary, _) = aggregate(&records).unwrap();
        assert!((summary.average_unit_price - 2.0).abs() < 1e-9);
    }
}
