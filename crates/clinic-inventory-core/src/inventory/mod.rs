//! Stock on hand derived from the movement ledger.
//!
//! Quantities are never stored directly: batches, stock levels, valuations
//! and reports are all aggregated from `stock_movements`.

mod alerts;
mod batch;
mod reports;
mod valuation;

pub use alerts::*;
pub use batch::*;
pub use reports::*;
pub use valuation::*;

use thiserror::Error;

/// Inventory errors.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DbError),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: f64, available: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type InventoryResult<T> = Result<T, InventoryError>;
