//! Procurement: purchase orders, receiving, quotations and supplier messages.
//!
//! Multi-step operations (receiving goods, converting a quotation) run in a
//! single transaction so the ledger, the order and its audit trail never
//! disagree.

mod audit;
mod communication;
mod purchase_orders;
mod quotations;
mod receipts;

pub use audit::*;
pub use communication::*;
pub use purchase_orders::*;
pub use quotations::*;
pub use receipts::*;

use chrono::NaiveDate;
use thiserror::Error;

use crate::db::{Database, DbResult};
use crate::models::PoStatus;

/// Procurement errors.
#[derive(Error, Debug)]
pub enum ProcurementError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: PoStatus, to: PoStatus },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("No catalog medication matches quoted item: {0}")]
    UnmatchedItem(String),
}

pub type ProcurementResult<T> = Result<T, ProcurementError>;

/// Numbering and alerting knobs for procurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcurementOptions {
    pub po_number_prefix: String,
    pub rfq_number_prefix: String,
    /// Receipts priced further than this (percent) from the order are flagged
    pub cost_variance_alert_percent: f64,
}

impl Default for ProcurementOptions {
    fn default() -> Self {
        Self {
            po_number_prefix: "PO".into(),
            rfq_number_prefix: "RFQ".into(),
            cost_variance_alert_percent: 10.0,
        }
    }
}

/// Next document number of the form `PREFIX-YYYYMMDD-NNNN`.
pub(crate) fn next_document_number(
    db: &Database,
    sequence: &str,
    prefix: &str,
    today: NaiveDate,
) -> DbResult<String> {
    let n = db.next_sequence(sequence)?;
    Ok(format!("{}-{}-{:04}", prefix, today.format("%Y%m%d"), n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_document_number() {
        let db = Database::open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();

        assert_eq!(
            next_document_number(&db, "po", "PO", today).unwrap(),
            "PO-20250114-0001"
        );
        assert_eq!(
            next_document_number(&db, "po", "PO", today).unwrap(),
            "PO-20250114-0002"
        );
        assert_eq!(
            next_document_number(&db, "rfq", "RFQ", today).unwrap(),
            "RFQ-20250114-0001"
        );
    }
}
