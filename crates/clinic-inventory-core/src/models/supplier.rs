//! Supplier models.

use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};

/// A supplier the clinic buys stock from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Free-form payment terms (e.g., "Net 30")
    pub payment_terms: Option<String>,
    /// Typical days from order to delivery
    pub lead_time_days: Option<u32>,
    pub active: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Supplier {
    pub fn new(name: String) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            name,
            contact_person: None,
            email: None,
            phone: None,
            address: None,
            payment_terms: None,
            lead_time_days: None,
            active: true,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A message sent to a supplier, kept for the communication history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierCommunication {
    pub id: String,
    pub supplier_id: String,
    /// Delivery channel (e.g., "email", "phone", "portal")
    pub channel: String,
    pub subject: String,
    pub body: String,
    /// Related record type ("purchase_order" or "quotation_request")
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub sent_by: Option<String>,
    pub created_at: String,
}
