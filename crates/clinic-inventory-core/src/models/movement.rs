//! Stock movement models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};

/// Kind of change in quantity-on-hand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods received from a supplier
    Receipt,
    /// Dispensed to a patient
    Dispensed,
    /// Stock-take correction (signed)
    Adjustment,
    /// Written off past expiry
    Expired,
    /// Written off as damaged
    Damaged,
    /// Sent back to the supplier
    ReturnedToSupplier,
    /// Transferred in from another location
    TransferIn,
    /// Transferred out to another location
    TransferOut,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::Receipt,
        MovementType::Dispensed,
        MovementType::Adjustment,
        MovementType::Expired,
        MovementType::Damaged,
        MovementType::ReturnedToSupplier,
        MovementType::TransferIn,
        MovementType::TransferOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Dispensed => "dispensed",
            MovementType::Adjustment => "adjustment",
            MovementType::Expired => "expired",
            MovementType::Damaged => "damaged",
            MovementType::ReturnedToSupplier => "returned_to_supplier",
            MovementType::TransferIn => "transfer_in",
            MovementType::TransferOut => "transfer_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Whether this movement adds stock.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementType::Receipt | MovementType::TransferIn)
    }

    /// Signed change in quantity-on-hand for an entered quantity.
    ///
    /// Inbound types always add, outbound types always subtract, and
    /// adjustments carry their own sign.
    pub fn signed_delta(&self, quantity: f64) -> f64 {
        match self {
            MovementType::Adjustment => quantity,
            t if t.is_inbound() => quantity.abs(),
            _ => -quantity.abs(),
        }
    }
}

/// A recorded change in quantity-on-hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: String,
    pub medication_id: String,
    pub movement_type: MovementType,
    /// Quantity as entered (sign only matters for adjustments)
    pub quantity: f64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    /// Unit cost at the time of movement (receipts)
    pub unit_cost: Option<f64>,
    /// What caused the movement (e.g., "purchase_order", "dispense")
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
    pub created_at: String,
}

impl StockMovement {
    /// Create a new movement.
    pub fn new(medication_id: String, movement_type: MovementType, quantity: f64) -> Self {
        Self {
            id: new_id(),
            medication_id,
            movement_type,
            quantity,
            batch_number: None,
            expiry_date: None,
            unit_cost: None,
            reference_type: None,
            reference_id: None,
            notes: None,
            performed_by: None,
            created_at: now_rfc3339(),
        }
    }

    pub fn with_batch(mut self, batch_number: Option<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch_number = batch_number;
        self.expiry_date = expiry_date;
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: f64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_reference(mut self, reference_type: &str, reference_id: &str) -> Self {
        self.reference_type = Some(reference_type.to_string());
        self.reference_id = Some(reference_id.to_string());
        self
    }

    pub fn performed_by(mut self, who: Option<String>) -> Self {
        self.performed_by = who;
        self
    }

    /// Signed quantity delta of this movement.
    pub fn delta(&self) -> f64 {
        self.movement_type.signed_delta(self.quantity)
    }
}
