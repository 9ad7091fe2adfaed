//! Quotation request (RFQ) and supplier quotation models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};
use crate::pricing::{to_decimal, to_money};

/// Request-for-quotation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Sent,
    Closed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Sent => "sent",
            RequestStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RequestStatus::Draft),
            "sent" => Some(RequestStatus::Sent),
            "closed" => Some(RequestStatus::Closed),
            _ => None,
        }
    }
}

/// A medication line in a quotation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationRequestItem {
    pub medication_id: String,
    pub quantity: f64,
    pub notes: Option<String>,
}

/// A request sent to one or more suppliers asking for prices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationRequest {
    pub id: String,
    /// Human-readable number (e.g., "RFQ-20250114-0001")
    pub request_number: String,
    pub supplier_ids: Vec<String>,
    pub items: Vec<QuotationRequestItem>,
    pub status: RequestStatus,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl QuotationRequest {
    pub fn new(request_number: String, supplier_ids: Vec<String>, items: Vec<QuotationRequestItem>) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            request_number,
            supplier_ids,
            items,
            status: RequestStatus::Draft,
            due_date: None,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Quotation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Converted,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Pending => "pending",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
            QuotationStatus::Converted => "converted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QuotationStatus::Pending),
            "accepted" => Some(QuotationStatus::Accepted),
            "rejected" => Some(QuotationStatus::Rejected),
            "expired" => Some(QuotationStatus::Expired),
            "converted" => Some(QuotationStatus::Converted),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priced line offered by a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationItem {
    /// Catalog medication, when the supplier line was matched
    pub medication_id: Option<String>,
    /// Supplier's description of the item
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl QuotationItem {
    pub fn line_total(&self) -> Decimal {
        to_decimal(self.quantity) * to_decimal(self.unit_price)
    }
}

/// A supplier's price offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quotation {
    pub id: String,
    pub quotation_request_id: Option<String>,
    pub supplier_id: String,
    /// Supplier's own reference number
    pub quotation_number: Option<String>,
    pub items: Vec<QuotationItem>,
    pub valid_until: Option<NaiveDate>,
    pub status: QuotationStatus,
    pub converted_po_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Quotation {
    pub fn new(supplier_id: String, items: Vec<QuotationItem>) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            quotation_request_id: None,
            supplier_id,
            quotation_number: None,
            items,
            valid_until: None,
            status: QuotationStatus::Pending,
            converted_po_id: None,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Total quoted value.
    pub fn total(&self) -> f64 {
        to_money(self.items.iter().map(QuotationItem::line_total).sum())
    }

    /// Whether the offer has lapsed. Quotations without a validity date never expire.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.valid_until.map(|d| d < today).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(desc: &str, qty: f64, price: f64) -> QuotationItem {
        QuotationItem {
            medication_id: None,
            description: desc.into(),
            quantity: qty,
            unit_price: price,
        }
    }

    #[test]
    fn test_quotation_total() {
        let q = Quotation::new(
            "sup-1".into(),
            vec![item("Amoxicillin", 100.0, 0.12), item("Paracetamol", 200.0, 0.035)],
        );
        assert_eq!(q.total(), 19.0);
    }

    #[test]
    fn test_quotation_expiry() {
        let mut q = Quotation::new("sup-1".into(), vec![]);
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(!q.is_expired(today));

        q.valid_until = NaiveDate::from_ymd_opt(2025, 6, 1);
        assert!(!q.is_expired(today));

        q.valid_until = NaiveDate::from_ymd_opt(2025, 5, 31);
        assert!(q.is_expired(today));
    }
}
