//! Clinic Inventory Core Library
//!
//! Local-first inventory, procurement and clinic configuration for small
//! clinics. All state lives in one SQLite database; stock on hand is never
//! stored, it is derived from the movement ledger.
//!
//! # Architecture
//!
//! ```text
//!   Supplier ──► Quotation ──► Purchase Order ──► Receipt
//!                                   │                │
//!                              audit chain      Receipt movements
//!                                                    │
//!                   Dispense (FIFO) / Adjust ──► stock_movements ledger
//!                                                    │
//!                        ┌───────────────┬───────────┼──────────────┐
//!                        ▼               ▼           ▼              ▼
//!                     Batches        Valuation    Reports        Alerts
//!                    (expiry)      (moving avg)  (CSV/JSON)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer with FTS5 medication search
//! - [`models`]: Domain types (Medication, StockMovement, PurchaseOrder, etc.)
//! - [`inventory`]: Batch/FIFO tracking, valuation, reports and alerts
//! - [`procurement`]: Purchase order workflow, receiving, quotations, supplier messages
//! - [`pricing`]: Price tiers and price resolution
//! - [`storage`]: Local storage for logos and documents
//! - [`export`]: CSV and JSON exports
//! - [`config`] / [`logging`]: Configuration and tracing setup

pub mod config;
pub mod db;
pub mod export;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod procurement;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use export::ReportExport;
pub use inventory::{BatchInventoryManager, InventoryReportsManager, InventoryValueCalculator};
pub use models::{
    ClinicSettings, Medication, MovementType, PoStatus, PurchaseOrder, Quotation, StockMovement,
    Supplier,
};
pub use procurement::{PurchaseOrderService, QuotationService, SupplierMessenger};
pub use storage::DocumentStorage;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::info;

use inventory::{BatchStock, InventoryAlert, InventoryError, StockLevel};
use models::{NotificationSettings, PaymentMethod, QuotationItem};
use procurement::{NewPoItem, ProcurementError, ReceiptLine, ReceiptOutcome};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicInventoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<db::DbError> for ClinicInventoryError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicInventoryError::NotFound(what),
            db::DbError::Constraint(msg) => ClinicInventoryError::InvalidInput(msg),
            db::DbError::Json(e) => ClinicInventoryError::SerializationError(e.to_string()),
            other => ClinicInventoryError::DatabaseError(other.to_string()),
        }
    }
}

impl From<InventoryError> for ClinicInventoryError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::Database(e) => e.into(),
            InventoryError::InvalidInput(msg) => ClinicInventoryError::InvalidInput(msg),
            e @ InventoryError::InsufficientStock { .. } => ClinicInventoryError::InvalidState(e.to_string()),
        }
    }
}

impl From<ProcurementError> for ClinicInventoryError {
    fn from(e: ProcurementError) -> Self {
        match e {
            ProcurementError::Database(e) => e.into(),
            ProcurementError::NotFound(what) => ClinicInventoryError::NotFound(what),
            ProcurementError::InvalidInput(msg) => ClinicInventoryError::InvalidInput(msg),
            e @ ProcurementError::UnmatchedItem(_) => ClinicInventoryError::InvalidInput(e.to_string()),
            other => ClinicInventoryError::InvalidState(other.to_string()),
        }
    }
}

impl From<storage::StorageError> for ClinicInventoryError {
    fn from(e: storage::StorageError) -> Self {
        match e {
            storage::StorageError::Database(e) => e.into(),
            storage::StorageError::NotFound(what) => ClinicInventoryError::NotFound(what),
            storage::StorageError::InvalidFile(msg) => ClinicInventoryError::InvalidInput(msg),
            other => ClinicInventoryError::StorageError(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for ClinicInventoryError {
    fn from(e: config::ConfigError) -> Self {
        ClinicInventoryError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicInventoryError {
    fn from(e: serde_json::Error) -> Self {
        ClinicInventoryError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicInventoryError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicInventoryError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicInventoryCore>, ClinicInventoryError> {
    let config = Config {
        database_path: path,
        ..Config::default()
    };
    ClinicInventoryCore::with_config(config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicInventoryCore>, ClinicInventoryError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicInventoryCore {
        db: Arc::new(Mutex::new(db)),
        config: Config::default(),
    }))
}

/// Open the database named in a TOML config file, with logging set up from it.
#[uniffi::export]
pub fn open_with_config_file(config_path: String) -> Result<Arc<ClinicInventoryCore>, ClinicInventoryError> {
    let config = Config::load(&config_path)?;
    logging::init_from_config(&config);
    ClinicInventoryCore::with_config(config)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicInventoryCore {
    db: Arc<Mutex<Database>>,
    config: Config,
}

impl ClinicInventoryCore {
    pub fn with_config(config: Config) -> Result<Arc<Self>, ClinicInventoryError> {
        config.validate()?;
        let db = Database::open(&config.database_path)?;
        info!(path = %config.database_path, "Opened clinic database");
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

#[uniffi::export]
impl ClinicInventoryCore {
    // =========================================================================
    // Medication Operations
    // =========================================================================

    /// Add or update a medication.
    pub fn upsert_medication(&self, medication: FfiMedication) -> Result<FfiMedication, ClinicInventoryError> {
        let db = self.db.lock()?;
        let mut med: Medication = medication.into();
        if let Some(existing) = db.get_medication(&med.id)? {
            med.created_at = existing.created_at;
            med.average_cost = existing.average_cost;
        }
        med.touch();
        db.upsert_medication(&med)?;
        info!(medication_id = %med.id, name = %med.name, "Saved medication");
        Ok(med.into())
    }

    pub fn get_medication(&self, id: String) -> Result<Option<FfiMedication>, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(db.get_medication(&id)?.map(|m| m.into()))
    }

    /// Search medications by name.
    pub fn search_medications(&self, query: String, limit: u32) -> Result<Vec<FfiMedication>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let meds = db.search_medications(&query, limit as usize)?;
        Ok(meds.into_iter().map(|m| m.into()).collect())
    }

    // =========================================================================
    // Stock Operations
    // =========================================================================

    /// Record a stock movement.
    pub fn record_movement(&self, movement: FfiNewMovement) -> Result<FfiStockMovement, ClinicInventoryError> {
        let db = self.db.lock()?;
        let movement = movement.into_movement()?;
        BatchInventoryManager::new(&db).record_movement(&movement)?;
        Ok(movement.into())
    }

    /// Current stock level of one medication.
    pub fn get_stock_level(&self, medication_id: String) -> Result<FfiStockLevel, ClinicInventoryError> {
        let db = self.db.lock()?;
        let med = db.require_medication(&medication_id)?;
        let quantity = BatchInventoryManager::new(&db).current_stock(&medication_id)?;
        Ok(StockLevel {
            status: inventory::StockStatus::classify(quantity, med.reorder_level),
            medication_id: med.id,
            medication_name: med.name,
            unit: med.unit,
            quantity,
            reorder_level: med.reorder_level,
        }
        .into())
    }

    /// Batches of a medication in FIFO order.
    pub fn list_batches(&self, medication_id: String) -> Result<Vec<FfiBatch>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let today = Self::today();
        let batches = BatchInventoryManager::new(&db).batches_for_medication(&medication_id)?;
        Ok(inventory::fifo_order(&batches, today)
            .into_iter()
            .map(|b| FfiBatch::from_batch(b, today, &self.config.expiry))
            .collect())
    }

    /// Batch to dispense from next.
    pub fn fifo_recommendation(&self, medication_id: String) -> Result<Option<FfiBatch>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let today = Self::today();
        let batch = BatchInventoryManager::new(&db).as_of(today).recommend(&medication_id)?;
        Ok(batch.map(|b| FfiBatch::from_batch(b, today, &self.config.expiry)))
    }

    /// Dispense across batches, earliest expiry first.
    pub fn dispense(
        &self,
        medication_id: String,
        quantity: f64,
        performed_by: Option<String>,
        reference_id: Option<String>,
    ) -> Result<Vec<FfiStockMovement>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let movements = BatchInventoryManager::new(&db)
            .as_of(Self::today())
            .dispense_fifo(&medication_id, quantity, performed_by, reference_id.as_deref())?;
        Ok(movements.into_iter().map(|m| m.into()).collect())
    }

    /// Write off all expired stock.
    pub fn write_off_expired(&self, performed_by: Option<String>) -> Result<Vec<FfiStockMovement>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let movements = BatchInventoryManager::new(&db)
            .as_of(Self::today())
            .write_off_expired(performed_by)?;
        Ok(movements.into_iter().map(|m| m.into()).collect())
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Expiry report as JSON. `as_of` is YYYY-MM-DD, today when absent.
    pub fn expiry_report_json(&self, as_of: Option<String>) -> Result<String, ClinicInventoryError> {
        let today = match as_of {
            Some(s) => parse_date(&s)?,
            None => Self::today(),
        };
        let db = self.db.lock()?;
        let report = InventoryReportsManager::new(&db, self.config.expiry).expiry_report(today)?;
        Ok(report.to_json()?)
    }

    pub fn inventory_valuation(&self) -> Result<FfiValuation, ClinicInventoryError> {
        let db = self.db.lock()?;
        let valuation = InventoryValueCalculator::new(&db).total_value()?;
        Ok(valuation.into())
    }

    /// Stock level report as CSV.
    pub fn export_stock_csv(&self) -> Result<String, ClinicInventoryError> {
        let db = self.db.lock()?;
        let report = InventoryReportsManager::new(&db, self.config.expiry).stock_level_report()?;
        Ok(report.to_csv())
    }

    /// Movement summary as CSV for the UTC days `from_date` through `to_date`, both included.
    pub fn export_movement_summary_csv(
        &self,
        from_date: String,
        to_date: String,
    ) -> Result<String, ClinicInventoryError> {
        let from = parse_date(&from_date)?;
        let to = parse_date(&to_date)?;
        if to < from {
            return Err(ClinicInventoryError::InvalidInput(format!(
                "End date {} is before start date {}",
                to, from
            )));
        }
        let end = to.succ_opt().ok_or_else(|| {
            ClinicInventoryError::InvalidInput(format!("End date {} is out of range", to))
        })?;

        let db = self.db.lock()?;
        let summary = InventoryReportsManager::new(&db, self.config.expiry)
            .movement_summary(&from.format("%Y-%m-%d").to_string(), &end.format("%Y-%m-%d").to_string())?;
        Ok(summary.to_csv())
    }

    /// Reorder suggestions as JSON.
    pub fn reorder_suggestions_json(&self) -> Result<String, ClinicInventoryError> {
        let db = self.db.lock()?;
        let suggestions = InventoryReportsManager::new(&db, self.config.expiry).reorder_suggestions()?;
        Ok(serde_json::to_string_pretty(&suggestions)?)
    }

    /// Inventory alerts enabled by the clinic's notification settings.
    pub fn get_alerts(&self) -> Result<Vec<FfiAlert>, ClinicInventoryError> {
        let db = self.db.lock()?;
        let settings = db.get_clinic_settings()?;
        let alerts =
            inventory::generate_alerts(&db, &settings.notifications, &self.config.expiry, Self::today())?;
        Ok(alerts.into_iter().map(|a| a.into()).collect())
    }

    // =========================================================================
    // Purchase Orders
    // =========================================================================

    pub fn create_purchase_order(
        &self,
        supplier_id: String,
        items: Vec<FfiPoItemInput>,
        created_by: Option<String>,
        notes: Option<String>,
    ) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        let items = items.into_iter().map(|i| i.into()).collect();
        let po = self.orders(&db).create_draft(&supplier_id, items, created_by, notes)?;
        Ok(po.into())
    }

    pub fn get_purchase_order(&self, po_id: String) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(self.orders(&db).get(&po_id)?.into())
    }

    pub fn submit_purchase_order(
        &self,
        po_id: String,
        performed_by: Option<String>,
    ) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(self.orders(&db).submit(&po_id, performed_by)?.into())
    }

    pub fn approve_purchase_order(
        &self,
        po_id: String,
        approved_by: Option<String>,
    ) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(self.orders(&db).approve(&po_id, approved_by)?.into())
    }

    pub fn cancel_purchase_order(
        &self,
        po_id: String,
        reason: Option<String>,
        performed_by: Option<String>,
    ) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(self.orders(&db).cancel(&po_id, reason, performed_by)?.into())
    }

    /// Receive goods against an approved order.
    pub fn receive_purchase_order(
        &self,
        po_id: String,
        lines: Vec<FfiReceiptLine>,
        performed_by: Option<String>,
    ) -> Result<FfiReceiptOutcome, ClinicInventoryError> {
        let db = self.db.lock()?;
        let lines = lines
            .into_iter()
            .map(ReceiptLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let outcome = self.orders(&db).receive_items(&po_id, lines, performed_by)?;
        Ok(outcome.into())
    }

    /// Purchase order as CSV (header fields on every line).
    pub fn export_purchase_order_csv(&self, po_id: String) -> Result<String, ClinicInventoryError> {
        let db = self.db.lock()?;
        let po = self.orders(&db).get(&po_id)?;
        Ok(export::PurchaseOrderExport::from_purchase_order(&db, &po)?.to_csv())
    }

    // =========================================================================
    // Quotations
    // =========================================================================

    pub fn record_quotation(&self, quotation: FfiNewQuotation) -> Result<FfiQuotation, ClinicInventoryError> {
        let db = self.db.lock()?;
        let quotation = quotation.into_quotation()?;
        let recorded = self.quotations(&db).record_quotation(quotation)?;
        Ok(recorded.into())
    }

    pub fn accept_quotation(&self, quotation_id: String) -> Result<FfiQuotation, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(self.quotations(&db).accept(&quotation_id)?.into())
    }

    /// Turn a quotation into a draft purchase order.
    pub fn convert_quotation(
        &self,
        quotation_id: String,
        created_by: Option<String>,
    ) -> Result<FfiPurchaseOrder, ClinicInventoryError> {
        let db = self.db.lock()?;
        let po = self.quotations(&db).convert_to_purchase_order(&quotation_id, created_by)?;
        Ok(po.into())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn get_settings(&self) -> Result<FfiClinicSettings, ClinicInventoryError> {
        let db = self.db.lock()?;
        Ok(db.get_clinic_settings()?.into())
    }

    pub fn save_settings(&self, settings: FfiClinicSettings) -> Result<(), ClinicInventoryError> {
        if !(settings.tax_rate >= 0.0) {
            return Err(ClinicInventoryError::InvalidInput("Tax rate must not be negative".into()));
        }
        let db = self.db.lock()?;
        let logo_path = db.get_clinic_settings()?.logo_path;
        let mut updated = ClinicSettings::from(settings);
        updated.logo_path = logo_path;
        db.save_clinic_settings(&updated)?;
        info!(clinic = %updated.clinic_name, "Updated clinic settings");
        Ok(())
    }

    /// Store a new clinic logo.
    pub fn upload_logo(&self, bytes: Vec<u8>, file_name: String) -> Result<String, ClinicInventoryError> {
        let db = self.db.lock()?;
        let doc = DocumentStorage::new(&db, &self.config.storage_dir).store_logo(&bytes, &file_name)?;
        Ok(doc.storage_path)
    }
}

impl ClinicInventoryCore {
    fn orders<'a>(&self, db: &'a Database) -> PurchaseOrderService<'a> {
        PurchaseOrderService::new(db, self.config.procurement_options()).as_of(Self::today())
    }

    fn quotations<'a>(&self, db: &'a Database) -> QuotationService<'a> {
        QuotationService::new(db, self.config.procurement_options()).as_of(Self::today())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ClinicInventoryError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ClinicInventoryError::InvalidInput(format!("Invalid date '{}', expected YYYY-MM-DD", s)))
}

fn parse_optional_date(s: Option<String>) -> Result<Option<NaiveDate>, ClinicInventoryError> {
    s.filter(|s| !s.trim().is_empty()).map(|s| parse_date(&s)).transpose()
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    /// Empty for a new medication
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub category: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub unit: String,
    pub reorder_level: f64,
    pub average_cost: f64,
    pub selling_price: f64,
    pub default_supplier_id: Option<String>,
    pub active: bool,
}

impl From<Medication> for FfiMedication {
    fn from(med: Medication) -> Self {
        Self {
            id: med.id,
            name: med.name,
            generic_name: med.generic_name,
            category: med.category,
            dosage_form: med.dosage_form,
            strength: med.strength,
            unit: med.unit,
            reorder_level: med.reorder_level,
            average_cost: med.average_cost,
            selling_price: med.selling_price,
            default_supplier_id: med.default_supplier_id,
            active: med.active,
        }
    }
}

impl From<FfiMedication> for Medication {
    fn from(med: FfiMedication) -> Self {
        let mut m = Medication::new(med.name, med.unit);
        if !med.id.is_empty() {
            m.id = med.id;
        }
        m.generic_name = med.generic_name;
        m.category = med.category;
        m.dosage_form = med.dosage_form;
        m.strength = med.strength;
        m.reorder_level = med.reorder_level;
        m.average_cost = med.average_cost;
        m.selling_price = med.selling_price;
        m.default_supplier_id = med.default_supplier_id;
        m.active = med.active;
        m
    }
}

/// FFI-safe movement input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewMovement {
    pub medication_id: String,
    /// "receipt", "dispensed", "adjustment", "expired", ...
    pub movement_type: String,
    pub quantity: f64,
    pub batch_number: Option<String>,
    /// YYYY-MM-DD
    pub expiry_date: Option<String>,
    pub unit_cost: Option<f64>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl FfiNewMovement {
    fn into_movement(self) -> Result<StockMovement, ClinicInventoryError> {
        let movement_type = MovementType::parse(&self.movement_type).ok_or_else(|| {
            ClinicInventoryError::InvalidInput(format!("Unknown movement type: {}", self.movement_type))
        })?;
        let mut movement = StockMovement::new(self.medication_id, movement_type, self.quantity)
            .with_batch(self.batch_number, parse_optional_date(self.expiry_date)?)
            .performed_by(self.performed_by);
        movement.unit_cost = self.unit_cost;
        movement.reference_type = self.reference_type;
        movement.reference_id = self.reference_id;
        movement.notes = self.notes;
        Ok(movement)
    }
}

/// FFI-safe recorded movement.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockMovement {
    pub id: String,
    pub medication_id: String,
    pub movement_type: String,
    pub quantity: f64,
    /// Signed change in stock on hand
    pub delta: f64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub unit_cost: Option<f64>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub performed_by: Option<String>,
    pub created_at: String,
}

impl From<StockMovement> for FfiStockMovement {
    fn from(m: StockMovement) -> Self {
        Self {
            delta: m.delta(),
            id: m.id,
            medication_id: m.medication_id,
            movement_type: m.movement_type.as_str().to_string(),
            quantity: m.quantity,
            batch_number: m.batch_number,
            expiry_date: m.expiry_date.map(|d| d.to_string()),
            unit_cost: m.unit_cost,
            reference_type: m.reference_type,
            reference_id: m.reference_id,
            performed_by: m.performed_by,
            created_at: m.created_at,
        }
    }
}

/// FFI-safe stock level.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockLevel {
    pub medication_id: String,
    pub medication_name: String,
    pub unit: String,
    pub quantity: f64,
    pub reorder_level: f64,
    pub status: String,
}

impl From<StockLevel> for FfiStockLevel {
    fn from(level: StockLevel) -> Self {
        Self {
            medication_id: level.medication_id,
            medication_name: level.medication_name,
            unit: level.unit,
            quantity: level.quantity,
            reorder_level: level.reorder_level,
            status: level.status.as_str().to_string(),
        }
    }
}

/// FFI-safe batch.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatch {
    pub medication_id: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub quantity: f64,
    pub unit_cost: Option<f64>,
    pub days_to_expiry: Option<i64>,
    pub expiry_status: String,
}

impl FfiBatch {
    fn from_batch(batch: BatchStock, today: NaiveDate, thresholds: &inventory::ExpiryThresholds) -> Self {
        Self {
            days_to_expiry: batch.days_to_expiry(today),
            expiry_status: batch.expiry_status(today, thresholds).as_str().to_string(),
            medication_id: batch.key.medication_id,
            batch_number: batch.key.batch_number,
            expiry_date: batch.key.expiry_date.map(|d| d.to_string()),
            quantity: batch.quantity,
            unit_cost: batch.unit_cost,
        }
    }
}

/// FFI-safe valuation line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValuationLine {
    pub medication_id: String,
    pub medication_name: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub value: f64,
}

/// FFI-safe inventory valuation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValuation {
    pub total_value: f64,
    pub lines: Vec<FfiValuationLine>,
}

impl From<inventory::InventoryValuation> for FfiValuation {
    fn from(v: inventory::InventoryValuation) -> Self {
        Self {
            total_value: v.total_value,
            lines: v
                .lines
                .into_iter()
                .map(|l| FfiValuationLine {
                    medication_id: l.medication_id,
                    medication_name: l.medication_name,
                    quantity: l.quantity,
                    average_cost: l.average_cost,
                    value: l.value,
                })
                .collect(),
        }
    }
}

/// FFI-safe inventory alert.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlert {
    pub kind: String,
    pub critical: bool,
    pub medication_id: String,
    pub medication_name: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub quantity: f64,
    pub message: String,
}

impl From<InventoryAlert> for FfiAlert {
    fn from(alert: InventoryAlert) -> Self {
        let kind = match alert.kind {
            inventory::AlertKind::LowStock => "low_stock",
            inventory::AlertKind::OutOfStock => "out_of_stock",
            inventory::AlertKind::ExpiringSoon => "expiring_soon",
            inventory::AlertKind::Expired => "expired",
        };
        Self {
            kind: kind.to_string(),
            critical: alert.severity == inventory::AlertSeverity::Critical,
            medication_id: alert.medication_id,
            medication_name: alert.medication_name,
            batch_number: alert.batch_number,
            expiry_date: alert.expiry_date.map(|d| d.to_string()),
            quantity: alert.quantity,
            message: alert.message,
        }
    }
}

/// FFI-safe order line input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPoItemInput {
    pub medication_id: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl From<FfiPoItemInput> for NewPoItem {
    fn from(item: FfiPoItemInput) -> Self {
        NewPoItem {
            medication_id: item.medication_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

/// FFI-safe order line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPurchaseOrderItem {
    pub id: String,
    pub medication_id: String,
    pub quantity_ordered: f64,
    pub quantity_received: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// FFI-safe purchase order.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub supplier_id: String,
    pub status: String,
    pub order_date: String,
    pub expected_delivery_date: Option<String>,
    pub items: Vec<FfiPurchaseOrderItem>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub quotation_id: Option<String>,
    pub notes: Option<String>,
}

impl From<PurchaseOrder> for FfiPurchaseOrder {
    fn from(po: PurchaseOrder) -> Self {
        Self {
            id: po.id,
            po_number: po.po_number,
            supplier_id: po.supplier_id,
            status: po.status.as_str().to_string(),
            order_date: po.order_date,
            expected_delivery_date: po.expected_delivery_date,
            items: po
                .items
                .into_iter()
                .map(|i| FfiPurchaseOrderItem {
                    id: i.id,
                    medication_id: i.medication_id,
                    quantity_ordered: i.quantity_ordered,
                    quantity_received: i.quantity_received,
                    unit_price: i.unit_price,
                    total_price: i.total_price,
                })
                .collect(),
            subtotal: po.subtotal,
            tax_amount: po.tax_amount,
            total_amount: po.total_amount,
            quotation_id: po.quotation_id,
            notes: po.notes,
        }
    }
}

/// FFI-safe receipt line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReceiptLine {
    pub item_id: String,
    pub quantity: f64,
    pub batch_number: Option<String>,
    /// YYYY-MM-DD
    pub expiry_date: Option<String>,
    pub unit_cost: Option<f64>,
}

impl TryFrom<FfiReceiptLine> for ReceiptLine {
    type Error = ClinicInventoryError;

    fn try_from(line: FfiReceiptLine) -> Result<Self, Self::Error> {
        Ok(ReceiptLine {
            item_id: line.item_id,
            quantity: line.quantity,
            batch_number: line.batch_number,
            expiry_date: parse_optional_date(line.expiry_date)?,
            unit_cost: line.unit_cost,
        })
    }
}

/// FFI-safe cost variance on a receipt.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReceiptVariance {
    pub item_id: String,
    pub medication_id: String,
    pub ordered_price: f64,
    pub received_cost: f64,
    pub variance_percent: f64,
}

/// FFI-safe receipt result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReceiptOutcome {
    pub purchase_order_id: String,
    pub status: String,
    pub movements: Vec<FfiStockMovement>,
    pub variances: Vec<FfiReceiptVariance>,
}

impl From<ReceiptOutcome> for FfiReceiptOutcome {
    fn from(outcome: ReceiptOutcome) -> Self {
        Self {
            purchase_order_id: outcome.purchase_order_id,
            status: outcome.status.as_str().to_string(),
            movements: outcome.movements.into_iter().map(|m| m.into()).collect(),
            variances: outcome
                .variances
                .into_iter()
                .map(|v| FfiReceiptVariance {
                    item_id: v.item_id,
                    medication_id: v.medication_id,
                    ordered_price: v.ordered_price,
                    received_cost: v.received_cost,
                    variance_percent: v.variance_percent,
                })
                .collect(),
        }
    }
}

/// FFI-safe quoted line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQuotationItem {
    pub medication_id: Option<String>,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

/// FFI-safe quotation input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewQuotation {
    pub quotation_request_id: Option<String>,
    pub supplier_id: String,
    pub quotation_number: Option<String>,
    pub items: Vec<FfiQuotationItem>,
    /// YYYY-MM-DD
    pub valid_until: Option<String>,
    pub notes: Option<String>,
}

impl FfiNewQuotation {
    fn into_quotation(self) -> Result<Quotation, ClinicInventoryError> {
        let items = self
            .items
            .into_iter()
            .map(|i| QuotationItem {
                medication_id: i.medication_id,
                description: i.description,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();
        let mut quotation = Quotation::new(self.supplier_id, items);
        quotation.quotation_request_id = self.quotation_request_id;
        quotation.quotation_number = self.quotation_number;
        quotation.valid_until = parse_optional_date(self.valid_until)?;
        quotation.notes = self.notes;
        Ok(quotation)
    }
}

/// FFI-safe quotation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQuotation {
    pub id: String,
    pub quotation_request_id: Option<String>,
    pub supplier_id: String,
    pub quotation_number: Option<String>,
    pub items: Vec<FfiQuotationItem>,
    pub valid_until: Option<String>,
    pub status: String,
    pub total: f64,
    pub converted_po_id: Option<String>,
}

impl From<Quotation> for FfiQuotation {
    fn from(q: Quotation) -> Self {
        Self {
            total: q.total(),
            id: q.id,
            quotation_request_id: q.quotation_request_id,
            supplier_id: q.supplier_id,
            quotation_number: q.quotation_number,
            items: q
                .items
                .into_iter()
                .map(|i| FfiQuotationItem {
                    medication_id: i.medication_id,
                    description: i.description,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            valid_until: q.valid_until.map(|d| d.to_string()),
            status: q.status.as_str().to_string(),
            converted_po_id: q.converted_po_id,
        }
    }
}

/// FFI-safe payment method.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPaymentMethod {
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub price_tier_id: Option<String>,
}

/// FFI-safe clinic settings.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClinicSettings {
    pub clinic_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub currency: String,
    pub tax_rate: f64,
    pub logo_path: Option<String>,
    pub payment_methods: Vec<FfiPaymentMethod>,
    pub low_stock_alerts: bool,
    pub expiry_alerts: bool,
    pub expiry_alert_days: i64,
    pub alert_recipients: Vec<String>,
}

impl From<ClinicSettings> for FfiClinicSettings {
    fn from(s: ClinicSettings) -> Self {
        Self {
            clinic_name: s.clinic_name,
            address: s.address,
            phone: s.phone,
            email: s.email,
            currency: s.currency,
            tax_rate: s.tax_rate,
            logo_path: s.logo_path,
            payment_methods: s
                .payment_methods
                .into_iter()
                .map(|m| FfiPaymentMethod {
                    code: m.code,
                    name: m.name,
                    enabled: m.enabled,
                    price_tier_id: m.price_tier_id,
                })
                .collect(),
            low_stock_alerts: s.notifications.low_stock_alerts,
            expiry_alerts: s.notifications.expiry_alerts,
            expiry_alert_days: s.notifications.expiry_alert_days,
            alert_recipients: s.notifications.recipients,
        }
    }
}

impl From<FfiClinicSettings> for ClinicSettings {
    fn from(s: FfiClinicSettings) -> Self {
        ClinicSettings {
            clinic_name: s.clinic_name,
            address: s.address,
            phone: s.phone,
            email: s.email,
            currency: s.currency,
            tax_rate: s.tax_rate,
            logo_path: s.logo_path,
            payment_methods: s
                .payment_methods
                .into_iter()
                .map(|m| PaymentMethod {
                    code: m.code,
                    name: m.name,
                    enabled: m.enabled,
                    price_tier_id: m.price_tier_id,
                })
                .collect(),
            notifications: NotificationSettings {
                low_stock_alerts: s.low_stock_alerts,
                expiry_alerts: s.expiry_alerts,
                expiry_alert_days: s.expiry_alert_days,
                recipients: s.alert_recipients,
            },
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medication(core: &ClinicInventoryCore, name: &str, reorder_level: f64) -> FfiMedication {
        core.upsert_medication(FfiMedication {
            id: String::new(),
            name: name.into(),
            generic_name: None,
            category: None,
            dosage_form: None,
            strength: None,
            unit: "tablet".into(),
            reorder_level,
            average_cost: 0.0,
            selling_price: 0.0,
            default_supplier_id: None,
            active: true,
        })
        .unwrap()
    }

    fn receipt(med_id: &str, qty: f64, batch: &str, expiry: &str) -> FfiNewMovement {
        FfiNewMovement {
            medication_id: med_id.into(),
            movement_type: "receipt".into(),
            quantity: qty,
            batch_number: Some(batch.into()),
            expiry_date: Some(expiry.into()),
            unit_cost: Some(0.5),
            reference_type: None,
            reference_id: None,
            notes: None,
            performed_by: None,
        }
    }

    #[test]
    fn test_medication_roundtrip_and_search() {
        let core = open_database_in_memory().unwrap();
        let med = medication(&core, "Paracetamol 500mg", 10.0);
        assert!(!med.id.is_empty());

        let fetched = core.get_medication(med.id.clone()).unwrap().unwrap();
        assert_eq!(fetched.name, "Paracetamol 500mg");

        let found = core.search_medications("paracetamol".into(), 10).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_stock_and_dispense() {
        let core = open_database_in_memory().unwrap();
        let med = medication(&core, "Paracetamol 500mg", 10.0);

        core.record_movement(receipt(&med.id, 20.0, "LATE", "2099-06-01")).unwrap();
        core.record_movement(receipt(&med.id, 5.0, "EARLY", "2099-01-01")).unwrap();

        let level = core.get_stock_level(med.id.clone()).unwrap();
        assert_eq!(level.quantity, 25.0);
        assert_eq!(level.status, "in_stock");

        let next = core.fifo_recommendation(med.id.clone()).unwrap().unwrap();
        assert_eq!(next.batch_number.as_deref(), Some("EARLY"));

        let dispensed = core.dispense(med.id.clone(), 8.0, None, None).unwrap();
        assert_eq!(dispensed.len(), 2);
        assert_eq!(dispensed[0].delta, -5.0);
        assert_eq!(core.get_stock_level(med.id.clone()).unwrap().quantity, 17.0);

        let err = core.dispense(med.id.clone(), 100.0, None, None);
        assert!(matches!(err, Err(ClinicInventoryError::InvalidState(_))));
    }

    #[test]
    fn test_invalid_movement_input() {
        let core = open_database_in_memory().unwrap();
        let med = medication(&core, "Paracetamol 500mg", 10.0);

        let mut bad_type = receipt(&med.id, 1.0, "B", "2099-01-01");
        bad_type.movement_type = "stolen".into();
        assert!(matches!(core.record_movement(bad_type), Err(ClinicInventoryError::InvalidInput(_))));

        let bad_date = receipt(&med.id, 1.0, "B", "01/02/2099");
        assert!(matches!(core.record_movement(bad_date), Err(ClinicInventoryError::InvalidInput(_))));
    }

    #[test]
    fn test_settings_roundtrip() {
        let core = open_database_in_memory().unwrap();
        let mut settings = core.get_settings().unwrap();
        settings.clinic_name = "Klinik Sejahtera".into();
        settings.tax_rate = 6.0;
        settings.expiry_alert_days = 60;
        core.save_settings(settings).unwrap();

        let saved = core.get_settings().unwrap();
        assert_eq!(saved.clinic_name, "Klinik Sejahtera");
        assert_eq!(saved.tax_rate, 6.0);
        assert_eq!(saved.expiry_alert_days, 60);
    }

    #[test]
    fn test_alerts_and_exports() {
        let core = open_database_in_memory().unwrap();
        let med = medication(&core, "Amoxicillin 250mg", 50.0);
        core.record_movement(receipt(&med.id, 5.0, "A1", "2099-01-01")).unwrap();

        let alerts = core.get_alerts().unwrap();
        assert!(alerts.iter().any(|a| a.kind == "low_stock" && a.medication_id == med.id));

        let csv = core.export_stock_csv().unwrap();
        assert_eq!(csv.lines().count(), 2);

        let json = core.expiry_report_json(Some("2025-01-01".into())).unwrap();
        assert!(json.contains("\"good\": 1"));

        let valuation = core.inventory_valuation().unwrap();
        assert_eq!(valuation.lines.len(), 1);
    }

    #[test]
    fn test_movement_summary_includes_end_date() {
        let core = open_database_in_memory().unwrap();
        let med = medication(&core, "Amoxicillin 250mg", 0.0);
        core.record_movement(receipt(&med.id, 5.0, "A1", "2099-01-01")).unwrap();

        let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let csv = core.export_movement_summary_csv(today.clone(), today.clone()).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains(",receipt,1,5"));

        assert!(matches!(
            core.export_movement_summary_csv(today, "2000-01-01".into()),
            Err(ClinicInventoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_not_found_maps_through() {
        let core = open_database_in_memory().unwrap();
        assert!(matches!(
            core.get_purchase_order("missing".into()),
            Err(ClinicInventoryError::NotFound(_))
        ));
    }
}
