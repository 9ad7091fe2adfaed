//! Clinic configuration models: settings, pricing tiers, staff, templates, documents.

use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};

/// A payment method accepted at the clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentMethod {
    /// Stable code (e.g., "cash", "card", "insurance_aia")
    pub code: String,
    pub name: String,
    pub enabled: bool,
    /// Price tier applied when paying this way
    pub price_tier_id: Option<String>,
}

/// Alert preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    pub low_stock_alerts: bool,
    pub expiry_alerts: bool,
    /// Batches expiring within this many days raise an alert
    pub expiry_alert_days: i64,
    /// Email addresses that receive alert digests
    pub recipients: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            low_stock_alerts: true,
            expiry_alerts: true,
            expiry_alert_days: 90,
            recipients: Vec::new(),
        }
    }
}

/// Clinic-wide settings (single record).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicSettings {
    pub clinic_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// ISO currency code
    pub currency: String,
    /// Tax rate applied to purchase orders, in percent
    pub tax_rate: f64,
    /// Storage path of the uploaded logo
    pub logo_path: Option<String>,
    pub payment_methods: Vec<PaymentMethod>,
    pub notifications: NotificationSettings,
    pub updated_at: String,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            clinic_name: "Clinic".into(),
            address: None,
            phone: None,
            email: None,
            currency: "USD".into(),
            tax_rate: 0.0,
            logo_path: None,
            payment_methods: vec![PaymentMethod {
                code: "cash".into(),
                name: "Cash".into(),
                enabled: true,
                price_tier_id: None,
            }],
            notifications: NotificationSettings::default(),
            updated_at: now_rfc3339(),
        }
    }
}

impl ClinicSettings {
    pub fn payment_method(&self, code: &str) -> Option<&PaymentMethod> {
        self.payment_methods.iter().find(|m| m.code == code)
    }
}

/// A named pricing profile applied to medications and services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTier {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Markup over average cost, in percent
    pub markup_percent: f64,
    /// Payment method codes mapped to this tier
    pub payment_methods: Vec<String>,
    /// Insurance/corporate panels mapped to this tier
    pub panels: Vec<String>,
    pub is_default: bool,
    pub active: bool,
}

impl PriceTier {
    pub fn new(name: String, markup_percent: f64) -> Self {
        Self {
            id: new_id(),
            name,
            description: None,
            markup_percent,
            payment_methods: Vec::new(),
            panels: Vec::new(),
            is_default: false,
            active: true,
        }
    }

    pub fn covers_payment_method(&self, code: &str) -> bool {
        self.payment_methods.iter().any(|m| m.eq_ignore_ascii_case(code))
    }

    pub fn covers_panel(&self, panel: &str) -> bool {
        self.panels.iter().any(|p| p.eq_ignore_ascii_case(panel))
    }
}

/// Explicit price for a medication under a tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationPrice {
    pub medication_id: String,
    pub price_tier_id: String,
    pub price: f64,
}

/// Staff role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Doctor,
    Nurse,
    Pharmacist,
    Receptionist,
    Procurement,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Doctor => "doctor",
            StaffRole::Nurse => "nurse",
            StaffRole::Pharmacist => "pharmacist",
            StaffRole::Receptionist => "receptionist",
            StaffRole::Procurement => "procurement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(StaffRole::Admin),
            "doctor" => Some(StaffRole::Doctor),
            "nurse" => Some(StaffRole::Nurse),
            "pharmacist" => Some(StaffRole::Pharmacist),
            "receptionist" => Some(StaffRole::Receptionist),
            "procurement" => Some(StaffRole::Procurement),
            _ => None,
        }
    }

    /// Roles allowed to approve purchase orders.
    pub fn can_approve_purchases(&self) -> bool {
        matches!(self, StaffRole::Admin | StaffRole::Procurement)
    }
}

/// A clinic staff member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub active: bool,
    pub created_at: String,
}

impl StaffMember {
    pub fn new(name: String, role: StaffRole) -> Self {
        Self {
            id: new_id(),
            name,
            email: None,
            phone: None,
            role,
            active: true,
            created_at: now_rfc3339(),
        }
    }
}

/// Which document a template produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    PurchaseOrder,
    QuotationRequest,
    Receipt,
    Invoice,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::PurchaseOrder => "purchase_order",
            TemplateKind::QuotationRequest => "quotation_request",
            TemplateKind::Receipt => "receipt",
            TemplateKind::Invoice => "invoice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase_order" => Some(TemplateKind::PurchaseOrder),
            "quotation_request" => Some(TemplateKind::QuotationRequest),
            "receipt" => Some(TemplateKind::Receipt),
            "invoice" => Some(TemplateKind::Invoice),
            _ => None,
        }
    }
}

/// A text template with `{{placeholder}}` tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentTemplate {
    pub id: String,
    pub kind: TemplateKind,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub is_default: bool,
    pub updated_at: String,
}

impl DocumentTemplate {
    pub fn new(kind: TemplateKind, name: String, subject: String, body: String) -> Self {
        Self {
            id: new_id(),
            kind,
            name,
            subject,
            body,
            is_default: false,
            updated_at: now_rfc3339(),
        }
    }
}

/// Metadata of a file held in document storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    /// Owning record type (e.g., "purchase_order", "clinic")
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub file_name: String,
    /// Path relative to the storage root
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: String,
}
