//! Inventory valuation and purchase cost tracking.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BatchStock, InventoryResult};
use crate::db::Database;
use crate::models::{Medication, MovementType};
use crate::pricing::{round_to, to_decimal, to_money};

/// Decimal places kept for unit costs.
const COST_DECIMAL_PLACES: u32 = 4;

/// Moving-average unit cost after a receipt.
///
/// With no stock on hand the received cost replaces the average.
pub fn moving_average_cost(
    current_quantity: f64,
    current_average: f64,
    received_quantity: f64,
    received_cost: f64,
) -> f64 {
    if current_quantity <= 0.0 {
        return round_to(to_decimal(received_cost), COST_DECIMAL_PLACES);
    }
    if received_quantity <= 0.0 {
        return round_to(to_decimal(current_average), COST_DECIMAL_PLACES);
    }

    let qty = to_decimal(current_quantity);
    let rq = to_decimal(received_quantity);
    let value = qty * to_decimal(current_average) + rq * to_decimal(received_cost);
    round_to(value / (qty + rq), COST_DECIMAL_PLACES)
}

/// Percentage difference of `actual` against `expected`.
pub fn cost_variance_percent(expected: f64, actual: f64) -> Option<f64> {
    let expected = to_decimal(expected);
    if expected.is_zero() {
        return None;
    }
    let variance = (to_decimal(actual) - expected) / expected * Decimal::ONE_HUNDRED;
    Some(to_money(variance))
}

/// Value of one medication's stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationLine {
    pub medication_id: String,
    pub medication_name: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub value: f64,
}

/// Value of all stock on hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryValuation {
    pub total_value: f64,
    /// Sorted by value, highest first
    pub lines: Vec<ValuationLine>,
}

/// A receipt priced away from the running average.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostVariance {
    pub medication_id: String,
    pub medication_name: String,
    pub movement_id: String,
    pub batch_number: Option<String>,
    pub received_at: String,
    pub unit_cost: f64,
    pub average_cost: f64,
    pub variance_percent: f64,
}

pub struct InventoryValueCalculator<'a> {
    db: &'a Database,
}

impl<'a> InventoryValueCalculator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Quantity × average cost; nothing on hand is worth nothing.
    pub fn medication_value(&self, medication: &Medication, quantity: f64) -> f64 {
        if quantity <= 0.0 {
            return 0.0;
        }
        to_money(to_decimal(quantity) * to_decimal(medication.average_cost))
    }

    /// Batch quantity at its receipt cost, or `fallback_cost` when unknown.
    pub fn batch_value(&self, batch: &BatchStock, fallback_cost: f64) -> f64 {
        if batch.quantity <= 0.0 {
            return 0.0;
        }
        let cost = batch.unit_cost.unwrap_or(fallback_cost);
        to_money(to_decimal(batch.quantity) * to_decimal(cost))
    }

    /// Value of every active medication with stock on hand.
    pub fn total_value(&self) -> InventoryResult<InventoryValuation> {
        let mut quantities: HashMap<String, f64> = HashMap::new();
        for movement in self.db.list_all_movements()? {
            *quantities.entry(movement.medication_id.clone()).or_default() += movement.delta();
        }

        let mut lines: Vec<ValuationLine> = self
            .db
            .list_medications(true)?
            .into_iter()
            .filter_map(|med| {
                let quantity = quantities.get(&med.id).copied().unwrap_or(0.0);
                if quantity <= 0.0 {
                    return None;
                }
                Some(ValuationLine {
                    value: self.medication_value(&med, quantity),
                    medication_id: med.id,
                    medication_name: med.name,
                    quantity,
                    average_cost: med.average_cost,
                })
            })
            .collect();

        lines.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then_with(|| a.medication_name.cmp(&b.medication_name))
        });

        let total: Decimal = lines.iter().map(|l| to_decimal(l.value)).sum();
        debug!(lines = lines.len(), "Computed inventory valuation");

        Ok(InventoryValuation {
            total_value: to_money(total),
            lines,
        })
    }

    /// Receipts whose unit cost differs from the average by more than `threshold_percent`.
    pub fn cost_variances(&self, threshold_percent: f64) -> InventoryResult<Vec<CostVariance>> {
        let medications: HashMap<String, Medication> = self
            .db
            .list_medications(false)?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut variances = Vec::new();
        for movement in self.db.list_all_movements()? {
            if movement.movement_type != MovementType::Receipt {
                continue;
            }
            let (Some(unit_cost), Some(med)) = (movement.unit_cost, medications.get(&movement.medication_id))
            else {
                continue;
            };
            let Some(variance) = cost_variance_percent(med.average_cost, unit_cost) else {
                continue;
            };
            if variance.abs() > threshold_percent {
                variances.push(CostVariance {
                    medication_id: med.id.clone(),
                    medication_name: med.name.clone(),
                    movement_id: movement.id,
                    batch_number: movement.batch_number,
                    received_at: movement.created_at,
                    unit_cost,
                    average_cost: med.average_cost,
                    variance_percent: variance,
                });
            }
        }
        Ok(variances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::BatchKey;
    use crate::models::StockMovement;

    #[test]
    fn test_moving_average_cost() {
        // Empty shelf takes the new cost
        assert_eq!(moving_average_cost(0.0, 5.0, 10.0, 2.0), 2.0);
        assert_eq!(moving_average_cost(-3.0, 5.0, 10.0, 2.0), 2.0);

        // (100 * 1.00 + 50 * 1.30) / 150 = 1.1
        assert_eq!(moving_average_cost(100.0, 1.0, 50.0, 1.3), 1.1);

        // (3 * 1 + 1 * 2) / 4 = 1.25, (1 * 1 + 2 * 2) / 3 = 1.6667
        assert_eq!(moving_average_cost(3.0, 1.0, 1.0, 2.0), 1.25);
        assert_eq!(moving_average_cost(1.0, 1.0, 2.0, 2.0), 1.6667);
    }

    #[test]
    fn test_cost_variance_percent() {
        assert_eq!(cost_variance_percent(2.0, 2.2), Some(10.0));
        assert_eq!(cost_variance_percent(2.0, 1.5), Some(-25.0));
        assert_eq!(cost_variance_percent(0.0, 1.5), None);
    }

    #[test]
    fn test_medication_and_batch_value() {
        let db = Database::open_in_memory().unwrap();
        let calc = InventoryValueCalculator::new(&db);

        let mut med = Medication::new("Amoxicillin".into(), "capsule".into());
        med.average_cost = 0.125;
        assert_eq!(calc.medication_value(&med, 100.0), 12.5);
        assert_eq!(calc.medication_value(&med, -5.0), 0.0);

        let batch = BatchStock {
            key: BatchKey {
                medication_id: med.id.clone(),
                batch_number: Some("A".into()),
                expiry_date: None,
            },
            quantity: 10.0,
            first_received: None,
            unit_cost: None,
            movement_count: 1,
        };
        assert_eq!(calc.batch_value(&batch, 0.5), 5.0);
        let costed = BatchStock {
            unit_cost: Some(0.75),
            ..batch
        };
        assert_eq!(calc.batch_value(&costed, 0.5), 7.5);
    }

    #[test]
    fn test_total_value_and_variances() {
        let db = Database::open_in_memory().unwrap();

        let mut amox = Medication::new("Amoxicillin".into(), "capsule".into());
        amox.average_cost = 1.0;
        db.insert_medication(&amox).unwrap();
        let mut para = Medication::new("Paracetamol".into(), "tablet".into());
        para.average_cost = 0.1;
        db.insert_medication(&para).unwrap();
        let empty = Medication::new("Ibuprofen".into(), "tablet".into());
        db.insert_medication(&empty).unwrap();

        db.insert_movement(&StockMovement::new(amox.id.clone(), MovementType::Receipt, 10.0).with_unit_cost(1.0))
            .unwrap();
        db.insert_movement(&StockMovement::new(para.id.clone(), MovementType::Receipt, 500.0).with_unit_cost(0.12))
            .unwrap();

        let calc = InventoryValueCalculator::new(&db);
        let valuation = calc.total_value().unwrap();
        assert_eq!(valuation.lines.len(), 2);
        assert_eq!(valuation.lines[0].medication_id, para.id);
        assert_eq!(valuation.lines[0].value, 50.0);
        assert_eq!(valuation.total_value, 60.0);

        // 0.12 vs 0.10 is +20%
        let variances = calc.cost_variances(10.0).unwrap();
        assert_eq!(variances.len(), 1);
        assert_eq!(variances[0].medication_id, para.id);
        assert_eq!(variances[0].variance_percent, 20.0);
        assert!(calc.cost_variances(25.0).unwrap().is_empty());
    }
}
