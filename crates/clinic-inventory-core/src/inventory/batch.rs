//! Batch tracking, expiry classification and FIFO dispensing.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{InventoryError, InventoryResult};
use crate::db::Database;
use crate::models::{MovementType, StockMovement};

/// Quantities closer than this are treated as equal.
const QTY_EPSILON: f64 = 1e-9;

/// Day boundaries for expiry classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExpiryThresholds {
    /// At or under this many days left the batch is critical
    pub critical_days: i64,
    /// At or under this many days left the batch needs attention
    pub warning_days: i64,
}

impl Default for ExpiryThresholds {
    fn default() -> Self {
        Self {
            critical_days: 30,
            warning_days: 90,
        }
    }
}

/// Expiry bucket of a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    Critical,
    Warning,
    Good,
    NoExpiry,
}

impl ExpiryStatus {
    /// Bucket for a number of days left before expiry.
    pub fn classify(days_to_expiry: i64, thresholds: &ExpiryThresholds) -> Self {
        if days_to_expiry <= 0 {
            ExpiryStatus::Expired
        } else if days_to_expiry <= thresholds.critical_days {
            ExpiryStatus::Critical
        } else if days_to_expiry <= thresholds.warning_days {
            ExpiryStatus::Warning
        } else {
            ExpiryStatus::Good
        }
    }

    /// Bucket for an optional expiry date.
    pub fn for_date(expiry: Option<NaiveDate>, today: NaiveDate, thresholds: &ExpiryThresholds) -> Self {
        match expiry {
            Some(date) => Self::classify(days_to_expiry(date, today), thresholds),
            None => ExpiryStatus::NoExpiry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryStatus::Expired => "expired",
            ExpiryStatus::Critical => "critical",
            ExpiryStatus::Warning => "warning",
            ExpiryStatus::Good => "good",
            ExpiryStatus::NoExpiry => "no_expiry",
        }
    }
}

/// Whole days from `today` until `expiry` (negative once past).
pub fn days_to_expiry(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Identity of a batch: medication + batch number + expiry date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub medication_id: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl BatchKey {
    fn of(movement: &StockMovement) -> Self {
        Self {
            medication_id: movement.medication_id.clone(),
            batch_number: movement.batch_number.clone(),
            expiry_date: movement.expiry_date,
        }
    }
}

/// Quantity on hand of a single batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchStock {
    pub key: BatchKey,
    pub quantity: f64,
    /// Timestamp of the first inbound movement
    pub first_received: Option<String>,
    /// Cost of the latest receipt into this batch
    pub unit_cost: Option<f64>,
    pub movement_count: usize,
}

impl BatchStock {
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.key.expiry_date.map(|d| days_to_expiry(d, today))
    }

    pub fn expiry_status(&self, today: NaiveDate, thresholds: &ExpiryThresholds) -> ExpiryStatus {
        ExpiryStatus::for_date(self.key.expiry_date, today, thresholds)
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.days_to_expiry(today).map(|d| d <= 0).unwrap_or(false)
    }

    pub fn has_stock(&self) -> bool {
        self.quantity > QTY_EPSILON
    }
}

/// Group movements into batches, summing signed deltas.
///
/// Movements are expected oldest first. Output is ordered by batch key.
pub fn aggregate_batches(movements: &[StockMovement]) -> Vec<BatchStock> {
    let mut batches: BTreeMap<BatchKey, BatchStock> = BTreeMap::new();

    for movement in movements {
        let key = BatchKey::of(movement);
        let batch = batches.entry(key.clone()).or_insert_with(|| BatchStock {
            key,
            quantity: 0.0,
            first_received: None,
            unit_cost: None,
            movement_count: 0,
        });

        let delta = movement.delta();
        batch.quantity += delta;
        batch.movement_count += 1;

        if delta > 0.0 && batch.first_received.is_none() {
            batch.first_received = Some(movement.created_at.clone());
        }
        if movement.movement_type == MovementType::Receipt {
            if let Some(cost) = movement.unit_cost {
                batch.unit_cost = Some(cost);
            }
        }
    }

    batches.into_values().collect()
}

/// Quantity on hand: the sum of signed deltas.
pub fn current_quantity(movements: &[StockMovement]) -> f64 {
    movements.iter().map(StockMovement::delta).sum()
}

fn cmp_none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Dispensable batches in the order they should be used.
///
/// Only batches with stock that have not expired are kept. Earliest expiry
/// comes first and undated batches last; ties go to the batch received first.
pub fn fifo_order(batches: &[BatchStock], today: NaiveDate) -> Vec<BatchStock> {
    let mut ordered: Vec<BatchStock> = batches
        .iter()
        .filter(|b| b.has_stock() && !b.is_expired(today))
        .cloned()
        .collect();

    ordered.sort_by(|a, b| {
        cmp_none_last(&a.key.expiry_date, &b.key.expiry_date)
            .then_with(|| cmp_none_last(&a.first_received, &b.first_received))
            .then_with(|| a.key.batch_number.cmp(&b.key.batch_number))
    });
    ordered
}

/// The batch to dispense from next.
pub fn fifo_recommendation(batches: &[BatchStock], today: NaiveDate) -> Option<BatchStock> {
    fifo_order(batches, today).into_iter().next()
}

/// Quantity drawn from one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAllocation {
    pub key: BatchKey,
    pub quantity: f64,
    pub unit_cost: Option<f64>,
}

/// Split `quantity` across batches in FIFO order.
pub fn allocate_fifo(
    batches: &[BatchStock],
    quantity: f64,
    today: NaiveDate,
) -> InventoryResult<Vec<BatchAllocation>> {
    if !(quantity > 0.0) {
        return Err(InventoryError::InvalidInput(format!(
            "Quantity must be positive, got {}",
            quantity
        )));
    }

    let ordered = fifo_order(batches, today);
    let available: f64 = ordered.iter().map(|b| b.quantity).sum();
    if available + QTY_EPSILON < quantity {
        return Err(InventoryError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    let mut allocations = Vec::new();
    for batch in ordered {
        if remaining <= QTY_EPSILON {
            break;
        }
        let take = remaining.min(batch.quantity);
        allocations.push(BatchAllocation {
            key: batch.key,
            quantity: take,
            unit_cost: batch.unit_cost,
        });
        remaining -= take;
    }

    Ok(allocations)
}

/// Stock status of a medication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    pub fn classify(quantity: f64, reorder_level: f64) -> Self {
        if quantity <= 0.0 {
            StockStatus::OutOfStock
        } else if quantity <= reorder_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::InStock => "in_stock",
        }
    }
}

/// Quantity on hand of one medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub medication_id: String,
    pub medication_name: String,
    pub unit: String,
    pub quantity: f64,
    pub reorder_level: f64,
    pub status: StockStatus,
}

/// Batch-level view of the movement ledger.
pub struct BatchInventoryManager<'a> {
    db: &'a Database,
    today: NaiveDate,
}

impl<'a> BatchInventoryManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            today: chrono::Utc::now().date_naive(),
        }
    }

    /// Evaluate expiry against a fixed date instead of today.
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Validate and append a movement to the ledger.
    pub fn record_movement(&self, movement: &StockMovement) -> InventoryResult<()> {
        if !movement.quantity.is_finite() || movement.quantity.abs() <= QTY_EPSILON {
            return Err(InventoryError::InvalidInput(
                "Movement quantity must be non-zero".into(),
            ));
        }
        self.db.require_medication(&movement.medication_id)?;
        self.db.insert_movement(movement)?;

        info!(
            medication_id = %movement.medication_id,
            movement_type = movement.movement_type.as_str(),
            delta = movement.delta(),
            "Recorded stock movement"
        );
        Ok(())
    }

    pub fn batches_for_medication(&self, medication_id: &str) -> InventoryResult<Vec<BatchStock>> {
        let movements = self.db.list_movements_for_medication(medication_id)?;
        Ok(aggregate_batches(&movements))
    }

    pub fn all_batches(&self) -> InventoryResult<Vec<BatchStock>> {
        let movements = self.db.list_all_movements()?;
        Ok(aggregate_batches(&movements))
    }

    pub fn current_stock(&self, medication_id: &str) -> InventoryResult<f64> {
        let movements = self.db.list_movements_for_medication(medication_id)?;
        Ok(current_quantity(&movements))
    }

    /// Stock level of every active medication, ordered by name.
    pub fn stock_levels(&self) -> InventoryResult<Vec<StockLevel>> {
        let movements = self.db.list_all_movements()?;
        let mut quantities: HashMap<&str, f64> = HashMap::new();
        for movement in &movements {
            *quantities.entry(movement.medication_id.as_str()).or_default() += movement.delta();
        }

        let levels: Vec<StockLevel> = self
            .db
            .list_medications(true)?
            .into_iter()
            .map(|med| {
                let quantity = quantities.get(med.id.as_str()).copied().unwrap_or(0.0);
                StockLevel {
                    status: StockStatus::classify(quantity, med.reorder_level),
                    medication_id: med.id,
                    medication_name: med.name,
                    unit: med.unit,
                    quantity,
                    reorder_level: med.reorder_level,
                }
            })
            .collect();

        debug!(count = levels.len(), "Computed stock levels");
        Ok(levels)
    }

    /// Batch to dispense from next, if any is usable.
    pub fn recommend(&self, medication_id: &str) -> InventoryResult<Option<BatchStock>> {
        let batches = self.batches_for_medication(medication_id)?;
        Ok(fifo_recommendation(&batches, self.today))
    }

    /// Dispense across batches in FIFO order.
    ///
    /// Writes one `Dispensed` movement per batch drawn from, atomically.
    pub fn dispense_fifo(
        &self,
        medication_id: &str,
        quantity: f64,
        performed_by: Option<String>,
        reference_id: Option<&str>,
    ) -> InventoryResult<Vec<StockMovement>> {
        let movements = self.db.in_transaction(|db| {
            db.require_medication(medication_id)?;
            let batches = aggregate_batches(&db.list_movements_for_medication(medication_id)?);
            let allocations = allocate_fifo(&batches, quantity, self.today)?;

            let mut movements = Vec::with_capacity(allocations.len());
            for allocation in allocations {
                let mut movement =
                    StockMovement::new(medication_id.to_string(), MovementType::Dispensed, allocation.quantity)
                        .with_batch(allocation.key.batch_number, allocation.key.expiry_date)
                        .performed_by(performed_by.clone());
                if let Some(cost) = allocation.unit_cost {
                    movement = movement.with_unit_cost(cost);
                }
                if let Some(reference) = reference_id {
                    movement = movement.with_reference("dispense", reference);
                }
                db.insert_movement(&movement)?;
                movements.push(movement);
            }
            Ok::<_, InventoryError>(movements)
        })?;

        info!(
            medication_id,
            quantity,
            batches = movements.len(),
            "Dispensed stock (FIFO)"
        );
        Ok(movements)
    }

    /// Write off every expired batch that still has stock.
    pub fn write_off_expired(&self, performed_by: Option<String>) -> InventoryResult<Vec<StockMovement>> {
        let movements = self.db.in_transaction(|db| {
            let batches = aggregate_batches(&db.list_all_movements()?);

            let mut movements = Vec::new();
            for batch in batches.into_iter().filter(|b| b.has_stock() && b.is_expired(self.today)) {
                let mut movement = StockMovement::new(
                    batch.key.medication_id,
                    MovementType::Expired,
                    batch.quantity,
                )
                .with_batch(batch.key.batch_number, batch.key.expiry_date)
                .performed_by(performed_by.clone());
                movement.notes = Some("Expired stock write-off".into());
                db.insert_movement(&movement)?;
                movements.push(movement);
            }
            Ok::<_, InventoryError>(movements)
        })?;

        if !movements.is_empty() {
            info!(batches = movements.len(), "Wrote off expired batches");
        }
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Medication;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn receipt(med: &str, batch: &str, expiry: Option<NaiveDate>, qty: f64, at: &str) -> StockMovement {
        let mut m = StockMovement::new(med.into(), MovementType::Receipt, qty)
            .with_batch(Some(batch.into()), expiry)
            .with_unit_cost(1.0);
        m.created_at = at.into();
        m
    }

    fn dispensed(med: &str, batch: &str, expiry: Option<NaiveDate>, qty: f64) -> StockMovement {
        StockMovement::new(med.into(), MovementType::Dispensed, qty).with_batch(Some(batch.into()), expiry)
    }

    #[test]
    fn test_classify_expiry() {
        let t = ExpiryThresholds::default();
        assert_eq!(ExpiryStatus::classify(-3, &t), ExpiryStatus::Expired);
        assert_eq!(ExpiryStatus::classify(0, &t), ExpiryStatus::Expired);
        assert_eq!(ExpiryStatus::classify(1, &t), ExpiryStatus::Critical);
        assert_eq!(ExpiryStatus::classify(30, &t), ExpiryStatus::Critical);
        assert_eq!(ExpiryStatus::classify(31, &t), ExpiryStatus::Warning);
        assert_eq!(ExpiryStatus::classify(90, &t), ExpiryStatus::Warning);
        assert_eq!(ExpiryStatus::classify(91, &t), ExpiryStatus::Good);
        assert_eq!(
            ExpiryStatus::for_date(None, date(2025, 1, 1), &t),
            ExpiryStatus::NoExpiry
        );
    }

    #[test]
    fn test_aggregate_batches() {
        let exp_a = Some(date(2025, 6, 1));
        let exp_b = Some(date(2025, 3, 1));
        let movements = vec![
            receipt("med-1", "A", exp_a, 100.0, "2025-01-01T00:00:00Z"),
            receipt("med-1", "B", exp_b, 50.0, "2025-01-02T00:00:00Z"),
            dispensed("med-1", "A", exp_a, 30.0),
            dispensed("med-1", "B", exp_b, 10.0),
        ];

        let batches = aggregate_batches(&movements);
        assert_eq!(batches.len(), 2);

        let a = batches.iter().find(|b| b.key.batch_number.as_deref() == Some("A")).unwrap();
        assert_eq!(a.quantity, 70.0);
        assert_eq!(a.movement_count, 2);
        assert_eq!(a.first_received.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(a.unit_cost, Some(1.0));

        let total: f64 = batches.iter().map(|b| b.quantity).sum();
        assert_eq!(total, current_quantity(&movements));
    }

    #[test]
    fn test_fifo_order() {
        let today = date(2025, 1, 15);
        let movements = vec![
            receipt("med-1", "NODATE", None, 10.0, "2024-12-01T00:00:00Z"),
            receipt("med-1", "LATE", Some(date(2025, 9, 1)), 10.0, "2024-12-02T00:00:00Z"),
            receipt("med-1", "SOON", Some(date(2025, 2, 1)), 10.0, "2024-12-03T00:00:00Z"),
            receipt("med-1", "GONE", Some(date(2025, 1, 10)), 10.0, "2024-12-04T00:00:00Z"),
            receipt("med-1", "EMPTY", Some(date(2025, 1, 20)), 5.0, "2024-12-05T00:00:00Z"),
            dispensed("med-1", "EMPTY", Some(date(2025, 1, 20)), 5.0),
        ];
        let batches = aggregate_batches(&movements);

        let order: Vec<_> = fifo_order(&batches, today)
            .into_iter()
            .map(|b| b.key.batch_number.unwrap())
            .collect();
        assert_eq!(order, vec!["SOON", "LATE", "NODATE"]);

        let first = fifo_recommendation(&batches, today).unwrap();
        assert_eq!(first.key.batch_number.as_deref(), Some("SOON"));
    }

    #[test]
    fn test_fifo_ties_break_on_first_received() {
        let expiry = Some(date(2025, 6, 1));
        let movements = vec![
            receipt("med-1", "Z", expiry, 10.0, "2025-01-01T00:00:00Z"),
            receipt("med-1", "A", expiry, 10.0, "2025-01-05T00:00:00Z"),
        ];
        let batches = aggregate_batches(&movements);
        let first = fifo_recommendation(&batches, date(2025, 1, 10)).unwrap();
        assert_eq!(first.key.batch_number.as_deref(), Some("Z"));
    }

    #[test]
    fn test_allocate_fifo() {
        let today = date(2025, 1, 1);
        let movements = vec![
            receipt("med-1", "A", Some(date(2025, 3, 1)), 30.0, "2024-12-01T00:00:00Z"),
            receipt("med-1", "B", Some(date(2025, 6, 1)), 50.0, "2024-12-02T00:00:00Z"),
        ];
        let batches = aggregate_batches(&movements);

        let allocations = allocate_fifo(&batches, 45.0, today).unwrap();
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].key.batch_number.as_deref(), Some("A"));
        assert_eq!(allocations[0].quantity, 30.0);
        assert_eq!(allocations[1].quantity, 15.0);

        match allocate_fifo(&batches, 100.0, today) {
            Err(InventoryError::InsufficientStock { requested, available }) => {
                assert_eq!(requested, 100.0);
                assert_eq!(available, 80.0);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }

        assert!(matches!(
            allocate_fifo(&batches, 0.0, today),
            Err(InventoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stock_status() {
        assert_eq!(StockStatus::classify(0.0, 10.0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(-2.0, 10.0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(10.0, 10.0), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(11.0, 10.0), StockStatus::InStock);
    }

    fn setup_db() -> (Database, Medication) {
        let db = Database::open_in_memory().unwrap();
        let mut med = Medication::new("Amoxicillin 500mg".into(), "capsule".into());
        med.reorder_level = 20.0;
        db.insert_medication(&med).unwrap();
        (db, med)
    }

    #[test]
    fn test_dispense_fifo_records_movements() {
        let (db, med) = setup_db();
        let manager = BatchInventoryManager::new(&db).as_of(date(2025, 1, 1));

        manager
            .record_movement(&receipt(&med.id, "A", Some(date(2025, 3, 1)), 30.0, "2024-12-01T00:00:00Z"))
            .unwrap();
        manager
            .record_movement(&receipt(&med.id, "B", Some(date(2025, 6, 1)), 50.0, "2024-12-02T00:00:00Z"))
            .unwrap();

        let dispensed = manager
            .dispense_fifo(&med.id, 40.0, Some("nurse".into()), Some("rx-1"))
            .unwrap();
        assert_eq!(dispensed.len(), 2);
        assert!(dispensed.iter().all(|m| m.movement_type == MovementType::Dispensed));
        assert_eq!(dispensed[0].reference_id.as_deref(), Some("rx-1"));

        assert_eq!(manager.current_stock(&med.id).unwrap(), 40.0);
        let next = manager.recommend(&med.id).unwrap().unwrap();
        assert_eq!(next.key.batch_number.as_deref(), Some("B"));
        assert_eq!(next.quantity, 40.0);
    }

    #[test]
    fn test_dispense_fifo_insufficient_leaves_ledger_untouched() {
        let (db, med) = setup_db();
        let manager = BatchInventoryManager::new(&db).as_of(date(2025, 1, 1));
        manager
            .record_movement(&receipt(&med.id, "A", Some(date(2025, 3, 1)), 10.0, "2024-12-01T00:00:00Z"))
            .unwrap();

        let result = manager.dispense_fifo(&med.id, 15.0, None, None);
        assert!(matches!(result, Err(InventoryError::InsufficientStock { .. })));
        assert_eq!(db.list_movements_for_medication(&med.id).unwrap().len(), 1);
    }

    #[test]
    fn test_record_movement_validation() {
        let (db, med) = setup_db();
        let manager = BatchInventoryManager::new(&db);

        let zero = StockMovement::new(med.id.clone(), MovementType::Adjustment, 0.0);
        assert!(matches!(
            manager.record_movement(&zero),
            Err(InventoryError::InvalidInput(_))
        ));

        let unknown = StockMovement::new("missing".into(), MovementType::Receipt, 5.0);
        assert!(manager.record_movement(&unknown).is_err());
    }

    #[test]
    fn test_write_off_expired() {
        let (db, med) = setup_db();
        let manager = BatchInventoryManager::new(&db).as_of(date(2025, 4, 1));
        manager
            .record_movement(&receipt(&med.id, "OLD", Some(date(2025, 3, 1)), 12.0, "2024-12-01T00:00:00Z"))
            .unwrap();
        manager
            .record_movement(&receipt(&med.id, "NEW", Some(date(2025, 9, 1)), 8.0, "2024-12-02T00:00:00Z"))
            .unwrap();

        let written_off = manager.write_off_expired(Some("pharmacist".into())).unwrap();
        assert_eq!(written_off.len(), 1);
        assert_eq!(written_off[0].quantity, 12.0);
        assert_eq!(written_off[0].movement_type, MovementType::Expired);
        assert_eq!(manager.current_stock(&med.id).unwrap(), 8.0);

        // Nothing left to write off
        assert!(manager.write_off_expired(None).unwrap().is_empty());
    }

    #[test]
    fn test_stock_levels() {
        let (db, med) = setup_db();
        let other = Medication::new("Paracetamol".into(), "tablet".into());
        db.insert_medication(&other).unwrap();

        let manager = BatchInventoryManager::new(&db);
        manager
            .record_movement(&receipt(&med.id, "A", None, 15.0, "2024-12-01T00:00:00Z"))
            .unwrap();

        let levels = manager.stock_levels().unwrap();
        assert_eq!(levels.len(), 2);
        let amox = levels.iter().find(|l| l.medication_id == med.id).unwrap();
        assert_eq!(amox.quantity, 15.0);
        assert_eq!(amox.status, StockStatus::LowStock);
        let para = levels.iter().find(|l| l.medication_id == other.id).unwrap();
        assert_eq!(para.status, StockStatus::OutOfStock);
    }
}
