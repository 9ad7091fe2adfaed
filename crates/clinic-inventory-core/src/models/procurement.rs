//! Purchase order models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};
use crate::pricing::{to_decimal, to_money};

/// Purchase order lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    /// Being prepared, items editable
    Draft,
    /// Sent for approval
    Submitted,
    /// Approved and awaiting delivery
    Approved,
    /// Some goods received
    PartiallyReceived,
    /// All goods received
    Received,
    /// Cancelled before completion
    Cancelled,
}

impl PoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::Draft => "draft",
            PoStatus::Submitted => "submitted",
            PoStatus::Approved => "approved",
            PoStatus::PartiallyReceived => "partially_received",
            PoStatus::Received => "received",
            PoStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PoStatus::Draft),
            "submitted" => Some(PoStatus::Submitted),
            "approved" => Some(PoStatus::Approved),
            "partially_received" => Some(PoStatus::PartiallyReceived),
            "received" => Some(PoStatus::Received),
            "cancelled" => Some(PoStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the workflow allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PoStatus) -> bool {
        use PoStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Cancelled)
                | (Approved, PartiallyReceived)
                | (Approved, Received)
                | (Approved, Cancelled)
                | (PartiallyReceived, PartiallyReceived)
                | (PartiallyReceived, Received)
        )
    }

    /// Whether goods can be received against an order in this status.
    pub fn accepts_receipts(&self) -> bool {
        matches!(self, PoStatus::Approved | PoStatus::PartiallyReceived)
    }
}

impl std::fmt::Display for PoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ordered line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub medication_id: String,
    pub quantity_ordered: f64,
    pub quantity_received: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

impl PurchaseOrderItem {
    pub fn new(purchase_order_id: &str, medication_id: String, quantity: f64, unit_price: f64) -> Self {
        Self {
            id: new_id(),
            purchase_order_id: purchase_order_id.to_string(),
            medication_id,
            quantity_ordered: quantity,
            quantity_received: 0.0,
            unit_price,
            total_price: to_money(to_decimal(quantity) * to_decimal(unit_price)),
        }
    }

    /// Quantity still outstanding.
    pub fn remaining(&self) -> f64 {
        (self.quantity_ordered - self.quantity_received).max(0.0)
    }

    pub fn is_fully_received(&self) -> bool {
        self.remaining() <= f64::EPSILON
    }
}

/// A purchase order with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrder {
    pub id: String,
    /// Human-readable number (e.g., "PO-20250114-0003")
    pub po_number: String,
    pub supplier_id: String,
    pub status: PoStatus,
    pub order_date: String,
    pub expected_delivery_date: Option<String>,
    pub items: Vec<PurchaseOrderItem>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    /// Quotation this order was converted from
    pub quotation_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PurchaseOrder {
    /// Create an empty draft order.
    pub fn new(po_number: String, supplier_id: String) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            po_number,
            supplier_id,
            status: PoStatus::Draft,
            order_date: chrono::Utc::now().date_naive().to_string(),
            expected_delivery_date: None,
            items: Vec::new(),
            subtotal: 0.0,
            tax_amount: 0.0,
            total_amount: 0.0,
            quotation_id: None,
            notes: None,
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Append a line for this order.
    pub fn add_item(&mut self, medication_id: String, quantity: f64, unit_price: f64) {
        let item = PurchaseOrderItem::new(&self.id, medication_id, quantity, unit_price);
        self.items.push(item);
    }

    /// Recompute subtotal, tax and total from the lines.
    pub fn recalculate_totals(&mut self, tax_rate_percent: f64) {
        let subtotal: Decimal = self
            .items
            .iter()
            .map(|item| to_decimal(item.quantity_ordered) * to_decimal(item.unit_price))
            .sum();
        let tax = subtotal * to_decimal(tax_rate_percent) / Decimal::ONE_HUNDRED;

        self.subtotal = to_money(subtotal);
        self.tax_amount = to_money(tax);
        self.total_amount = to_money(to_decimal(self.subtotal) + to_decimal(self.tax_amount));
    }

    pub fn is_fully_received(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.is_fully_received())
    }

    /// Status implied by the received quantities.
    pub fn receiving_status(&self) -> PoStatus {
        if self.is_fully_received() {
            PoStatus::Received
        } else if self.items.iter().any(|i| i.quantity_received > 0.0) {
            PoStatus::PartiallyReceived
        } else {
            self.status
        }
    }

    pub fn item(&self, item_id: &str) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

/// Audited action on a purchase order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    StatusChanged,
    ItemsReceived,
    Converted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::ItemsReceived => "items_received",
            AuditAction::Converted => "converted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(AuditAction::Created),
            "updated" => Some(AuditAction::Updated),
            "status_changed" => Some(AuditAction::StatusChanged),
            "items_received" => Some(AuditAction::ItemsReceived),
            "converted" => Some(AuditAction::Converted),
            _ => None,
        }
    }
}

/// One entry in a purchase order's hash-chained audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderAudit {
    pub id: String,
    pub purchase_order_id: String,
    pub action: AuditAction,
    pub from_status: Option<PoStatus>,
    pub to_status: Option<PoStatus>,
    pub details: serde_json::Value,
    pub performed_by: Option<String>,
    pub created_at: String,
    /// Hash of the previous entry for this order ("" for the first)
    pub prev_hash: String,
    /// Hash over prev_hash and this entry's content
    pub entry_hash: String,
}
