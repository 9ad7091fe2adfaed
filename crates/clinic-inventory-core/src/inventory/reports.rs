//! Inventory reports.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    aggregate_batches, BatchInventoryManager, ExpiryStatus, ExpiryThresholds, InventoryResult,
    InventoryValuation, InventoryValueCalculator, StockLevel, StockStatus,
};
use crate::db::Database;
use crate::models::{Medication, MovementType};

/// Stock levels of all active medications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevelReport {
    pub generated_at: String,
    pub items: Vec<StockLevel>,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
}

/// Totals for one movement type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementSummaryLine {
    pub movement_type: MovementType,
    pub count: usize,
    /// Sum of absolute quantities
    pub total_quantity: f64,
}

/// Movement totals over a period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementSummary {
    pub from: String,
    pub to: String,
    pub lines: Vec<MovementSummaryLine>,
    pub net_change: f64,
}

/// A batch with stock on the expiry report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpiryLine {
    pub medication_id: String,
    pub medication_name: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: f64,
    pub days_to_expiry: Option<i64>,
    pub status: ExpiryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpiryReport {
    pub as_of: NaiveDate,
    pub expired: usize,
    pub critical: usize,
    pub warning: usize,
    pub good: usize,
    pub no_expiry: usize,
    /// Sorted by expiry date, undated batches last
    pub lines: Vec<ExpiryLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispensedLine {
    pub medication_id: String,
    pub medication_name: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReorderSuggestion {
    pub medication_id: String,
    pub medication_name: String,
    pub current_quantity: f64,
    pub reorder_level: f64,
    pub suggested_quantity: f64,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
}

/// Builds the inventory reports from the ledger.
pub struct InventoryReportsManager<'a> {
    db: &'a Database,
    thresholds: ExpiryThresholds,
}

impl<'a> InventoryReportsManager<'a> {
    pub fn new(db: &'a Database, thresholds: ExpiryThresholds) -> Self {
        Self { db, thresholds }
    }

    pub fn stock_level_report(&self) -> InventoryResult<StockLevelReport> {
        let items = BatchInventoryManager::new(self.db).stock_levels()?;
        let low_stock_count = items.iter().filter(|i| i.status == StockStatus::LowStock).count();
        let out_of_stock_count = items.iter().filter(|i| i.status == StockStatus::OutOfStock).count();

        Ok(StockLevelReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            items,
            low_stock_count,
            out_of_stock_count,
        })
    }

    /// Count, absolute quantity per type and net change for movements in `[from, to)`.
    pub fn movement_summary(&self, from: &str, to: &str) -> InventoryResult<MovementSummary> {
        let movements = self.db.list_movements(from, to)?;

        let mut totals: HashMap<MovementType, (usize, f64)> = HashMap::new();
        let mut net_change = 0.0;
        for movement in &movements {
            let delta = movement.delta();
            let entry = totals.entry(movement.movement_type).or_default();
            entry.0 += 1;
            entry.1 += delta.abs();
            net_change += delta;
        }

        let lines = MovementType::ALL
            .into_iter()
            .filter_map(|t| {
                totals.get(&t).map(|(count, total)| MovementSummaryLine {
                    movement_type: t,
                    count: *count,
                    total_quantity: *total,
                })
            })
            .collect();

        debug!(from, to, movements = movements.len(), "Built movement summary");
        Ok(MovementSummary {
            from: from.to_string(),
            to: to.to_string(),
            lines,
            net_change,
        })
    }

    /// Batches with stock bucketed by days to expiry.
    pub fn expiry_report(&self, today: NaiveDate) -> InventoryResult<ExpiryReport> {
        let names = self.medication_names()?;
        let batches = aggregate_batches(&self.db.list_all_movements()?);

        let mut report = ExpiryReport {
            as_of: today,
            expired: 0,
            critical: 0,
            warning: 0,
            good: 0,
            no_expiry: 0,
            lines: Vec::new(),
        };

        for batch in batches.into_iter().filter(|b| b.has_stock()) {
            let status = batch.expiry_status(today, &self.thresholds);
            match status {
                ExpiryStatus::Expired => report.expired += 1,
                ExpiryStatus::Critical => report.critical += 1,
                ExpiryStatus::Warning => report.warning += 1,
                ExpiryStatus::Good => report.good += 1,
                ExpiryStatus::NoExpiry => report.no_expiry += 1,
            }
            report.lines.push(ExpiryLine {
                medication_name: names.get(&batch.key.medication_id).cloned().unwrap_or_default(),
                days_to_expiry: batch.days_to_expiry(today),
                medication_id: batch.key.medication_id,
                batch_number: batch.key.batch_number,
                expiry_date: batch.key.expiry_date,
                quantity: batch.quantity,
                status,
            });
        }

        report.lines.sort_by(|a, b| match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.medication_name.cmp(&b.medication_name)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.medication_name.cmp(&b.medication_name),
        });

        Ok(report)
    }

    pub fn valuation_report(&self) -> InventoryResult<InventoryValuation> {
        InventoryValueCalculator::new(self.db).total_value()
    }

    /// Medications ranked by quantity dispensed in `[from, to)`.
    pub fn top_dispensed(&self, from: &str, to: &str, limit: usize) -> InventoryResult<Vec<DispensedLine>> {
        let names = self.medication_names()?;

        let mut totals: HashMap<String, f64> = HashMap::new();
        for movement in self.db.list_movements(from, to)? {
            if movement.movement_type == MovementType::Dispensed {
                *totals.entry(movement.medication_id).or_default() += movement.quantity.abs();
            }
        }

        let mut lines: Vec<DispensedLine> = totals
            .into_iter()
            .map(|(medication_id, quantity)| DispensedLine {
                medication_name: names.get(&medication_id).cloned().unwrap_or_default(),
                medication_id,
                quantity,
            })
            .collect();
        lines.sort_by(|a, b| {
            b.quantity
                .total_cmp(&a.quantity)
                .then_with(|| a.medication_name.cmp(&b.medication_name))
        });
        lines.truncate(limit);
        Ok(lines)
    }

    /// Medications at or under their reorder level, topped up to twice that level.
    pub fn reorder_suggestions(&self) -> InventoryResult<Vec<ReorderSuggestion>> {
        let levels = BatchInventoryManager::new(self.db).stock_levels()?;
        let medications: HashMap<String, Medication> = self
            .db
            .list_medications(true)?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut suggestions = Vec::new();
        for level in levels {
            if level.reorder_level <= 0.0 || level.quantity > level.reorder_level {
                continue;
            }
            let supplier_id = medications
                .get(&level.medication_id)
                .and_then(|m| m.default_supplier_id.clone());
            let supplier_name = match &supplier_id {
                Some(id) => self.db.get_supplier(id)?.map(|s| s.name),
                None => None,
            };

            suggestions.push(ReorderSuggestion {
                suggested_quantity: (level.reorder_level * 2.0 - level.quantity).max(0.0),
                medication_id: level.medication_id,
                medication_name: level.medication_name,
                current_quantity: level.quantity,
                reorder_level: level.reorder_level,
                supplier_id,
                supplier_name,
            });
        }
        Ok(suggestions)
    }

    fn medication_names(&self) -> InventoryResult<HashMap<String, String>> {
        Ok(self
            .db
            .list_medications(false)?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StockMovement, Supplier};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn movement(med: &str, t: MovementType, qty: f64, at: &str) -> StockMovement {
        let mut m = StockMovement::new(med.into(), t, qty);
        m.created_at = at.into();
        m
    }

    fn setup() -> (Database, Medication, Medication) {
        let db = Database::open_in_memory().unwrap();
        let supplier = Supplier::new("MedSupply Co".into());
        db.upsert_supplier(&supplier).unwrap();

        let mut amox = Medication::new("Amoxicillin".into(), "capsule".into());
        amox.reorder_level = 50.0;
        amox.default_supplier_id = Some(supplier.id.clone());
        db.insert_medication(&amox).unwrap();

        let mut para = Medication::new("Paracetamol".into(), "tablet".into());
        para.reorder_level = 10.0;
        db.insert_medication(&para).unwrap();
        (db, amox, para)
    }

    #[test]
    fn test_movement_summary() {
        let (db, amox, para) = setup();
        for m in [
            movement(&amox.id, MovementType::Receipt, 100.0, "2025-01-02T09:00:00Z"),
            movement(&amox.id, MovementType::Dispensed, 30.0, "2025-01-03T09:00:00Z"),
            movement(&para.id, MovementType::Dispensed, 5.0, "2025-01-04T09:00:00Z"),
            movement(&para.id, MovementType::Adjustment, -2.0, "2025-01-05T09:00:00Z"),
            movement(&para.id, MovementType::Receipt, 999.0, "2025-02-01T09:00:00Z"),
        ] {
            db.insert_movement(&m).unwrap();
        }

        let reports = InventoryReportsManager::new(&db, ExpiryThresholds::default());
        let summary = reports.movement_summary("2025-01-01", "2025-02-01").unwrap();

        assert_eq!(summary.lines.len(), 3);
        let dispensed = summary
            .lines
            .iter()
            .find(|l| l.movement_type == MovementType::Dispensed)
            .unwrap();
        assert_eq!(dispensed.count, 2);
        assert_eq!(dispensed.total_quantity, 35.0);
        assert_eq!(summary.net_change, 63.0);
    }

    #[test]
    fn test_expiry_report() {
        let (db, amox, para) = setup();
        let today = date(2025, 1, 1);
        let batches = [
            (&amox.id, "A1", Some(date(2024, 12, 20)), 5.0),
            (&amox.id, "A2", Some(date(2025, 1, 20)), 5.0),
            (&para.id, "P1", Some(date(2025, 3, 1)), 5.0),
            (&para.id, "P2", Some(date(2026, 1, 1)), 5.0),
            (&para.id, "P3", None, 5.0),
        ];
        for (med, batch, expiry, qty) in batches {
            db.insert_movement(
                &StockMovement::new(med.clone(), MovementType::Receipt, qty)
                    .with_batch(Some(batch.into()), expiry),
            )
            .unwrap();
        }

        let reports = InventoryReportsManager::new(&db, ExpiryThresholds::default());
        let report = reports.expiry_report(today).unwrap();

        assert_eq!(
            (report.expired, report.critical, report.warning, report.good, report.no_expiry),
            (1, 1, 1, 1, 1)
        );
        let order: Vec<_> = report
            .lines
            .iter()
            .map(|l| l.batch_number.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["A1", "A2", "P1", "P2", "P3"]);
        assert_eq!(report.lines[1].days_to_expiry, Some(19));
        assert_eq!(report.lines[0].medication_name, "Amoxicillin");
    }

    #[test]
    fn test_top_dispensed() {
        let (db, amox, para) = setup();
        for m in [
            movement(&amox.id, MovementType::Dispensed, 10.0, "2025-01-02T09:00:00Z"),
            movement(&para.id, MovementType::Dispensed, 40.0, "2025-01-03T09:00:00Z"),
            movement(&amox.id, MovementType::Dispensed, 5.0, "2025-01-04T09:00:00Z"),
            movement(&amox.id, MovementType::Expired, 100.0, "2025-01-04T09:00:00Z"),
        ] {
            db.insert_movement(&m).unwrap();
        }

        let reports = InventoryReportsManager::new(&db, ExpiryThresholds::default());
        let top = reports.top_dispensed("2025-01-01", "2025-02-01", 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].medication_id, para.id);
        assert_eq!(top[1].quantity, 15.0);

        let top_one = reports.top_dispensed("2025-01-01", "2025-02-01", 1).unwrap();
        assert_eq!(top_one.len(), 1);
    }

    #[test]
    fn test_reorder_suggestions_and_stock_report() {
        let (db, amox, para) = setup();
        db.insert_movement(&movement(&amox.id, MovementType::Receipt, 20.0, "2025-01-02T09:00:00Z"))
            .unwrap();
        db.insert_movement(&movement(&para.id, MovementType::Receipt, 200.0, "2025-01-02T09:00:00Z"))
            .unwrap();

        let reports = InventoryReportsManager::new(&db, ExpiryThresholds::default());
        let suggestions = reports.reorder_suggestions().unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].medication_id, amox.id);
        assert_eq!(suggestions[0].suggested_quantity, 80.0);
        assert_eq!(suggestions[0].supplier_name.as_deref(), Some("MedSupply Co"));

        let stock = reports.stock_level_report().unwrap();
        assert_eq!(stock.items.len(), 2);
        assert_eq!(stock.low_stock_count, 1);
        assert_eq!(stock.out_of_stock_count, 0);
    }
}
