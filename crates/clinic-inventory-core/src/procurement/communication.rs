//! Supplier-facing messages rendered from document templates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ProcurementError, ProcurementResult};
use crate::db::Database;
use crate::models::{new_id, now_rfc3339, ClinicSettings, Supplier, SupplierCommunication, TemplateKind};

const FALLBACK_RFQ_SUBJECT: &str = "Request for quotation {{request_number}}";
const FALLBACK_RFQ_BODY: &str = "Dear {{contact_name}},

{{clinic_name}} would like a quotation for the following items:

{{items}}

Please reply by {{due_date}}.

{{notes}}

Regards,
{{clinic_name}}
{{clinic_phone}}";

const FALLBACK_PO_SUBJECT: &str = "Purchase order {{po_number}}";
const FALLBACK_PO_BODY: &str = "Dear {{contact_name}},

Please supply the following items under purchase order {{po_number}} dated {{order_date}}:

{{items}}

Subtotal: {{currency}} {{subtotal}}
Tax: {{currency}} {{tax_amount}}
Total: {{currency}} {{total_amount}}

Expected delivery: {{expected_delivery_date}}

{{notes}}

Regards,
{{clinic_name}}
{{clinic_phone}}";

/// Replace `{{key}}` tokens with values. Unknown tokens are left as written.
pub fn render_template(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// A message ready to send to a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierMessage {
    pub supplier_id: String,
    /// Supplier email, when known
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
    pub reference_type: String,
    pub reference_id: String,
}

pub struct SupplierMessenger<'a> {
    db: &'a Database,
}

impl<'a> SupplierMessenger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Request-for-quotation message to one of the request's suppliers.
    pub fn compose_quotation_request(
        &self,
        request_id: &str,
        supplier_id: &str,
    ) -> ProcurementResult<SupplierMessage> {
        let request = self
            .db
            .get_quotation_request(request_id)?
            .ok_or_else(|| ProcurementError::NotFound(format!("quotation request {}", request_id)))?;
        if !request.supplier_ids.iter().any(|id| id == supplier_id) {
            return Err(ProcurementError::InvalidInput(format!(
                "Supplier {} is not part of request {}",
                supplier_id, request.request_number
            )));
        }
        let supplier = self.db.require_supplier(supplier_id)?;
        let settings = self.db.get_clinic_settings()?;

        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let (name, unit) = self.medication_label(&item.medication_id)?;
            let mut line = format!("- {} x {} {}", name, format_quantity(item.quantity), unit);
            if let Some(notes) = &item.notes {
                line.push_str(&format!(" ({})", notes));
            }
            lines.push(line);
        }

        let mut values = base_values(&settings, &supplier);
        values.insert("request_number".into(), request.request_number.clone());
        values.insert(
            "due_date".into(),
            request.due_date.map(|d| d.to_string()).unwrap_or_else(|| "at your earliest convenience".into()),
        );
        values.insert("notes".into(), request.notes.clone().unwrap_or_default());
        values.insert("items".into(), lines.join("\n"));

        self.compose(
            TemplateKind::QuotationRequest,
            (FALLBACK_RFQ_SUBJECT, FALLBACK_RFQ_BODY),
            &values,
            &supplier,
            "quotation_request",
            &request.id,
        )
    }

    /// Purchase order message to the order's supplier.
    pub fn compose_purchase_order(&self, po_id: &str) -> ProcurementResult<SupplierMessage> {
        let po = self
            .db
            .get_purchase_order(po_id)?
            .ok_or_else(|| ProcurementError::NotFound(format!("purchase order {}", po_id)))?;
        let supplier = self.db.require_supplier(&po.supplier_id)?;
        let settings = self.db.get_clinic_settings()?;

        let mut lines = Vec::with_capacity(po.items.len());
        for item in &po.items {
            let (name, unit) = self.medication_label(&item.medication_id)?;
            lines.push(format!(
                "- {}: {} {} @ {:.2} = {:.2}",
                name,
                format_quantity(item.quantity_ordered),
                unit,
                item.unit_price,
                item.total_price
            ));
        }

        let mut values = base_values(&settings, &supplier);
        values.insert("po_number".into(), po.po_number.clone());
        values.insert("order_date".into(), po.order_date.clone());
        values.insert(
            "expected_delivery_date".into(),
            po.expected_delivery_date.clone().unwrap_or_else(|| "to be confirmed".into()),
        );
        values.insert("subtotal".into(), format!("{:.2}", po.subtotal));
        values.insert("tax_amount".into(), format!("{:.2}", po.tax_amount));
        values.insert("total_amount".into(), format!("{:.2}", po.total_amount));
        values.insert("notes".into(), po.notes.clone().unwrap_or_default());
        values.insert("items".into(), lines.join("\n"));

        self.compose(
            TemplateKind::PurchaseOrder,
            (FALLBACK_PO_SUBJECT, FALLBACK_PO_BODY),
            &values,
            &supplier,
            "purchase_order",
            &po.id,
        )
    }

    /// Keep a sent message in the supplier's communication history.
    pub fn record_sent(
        &self,
        message: &SupplierMessage,
        channel: &str,
        sent_by: Option<String>,
    ) -> ProcurementResult<SupplierCommunication> {
        let comm = SupplierCommunication {
            id: new_id(),
            supplier_id: message.supplier_id.clone(),
            channel: channel.to_string(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            reference_type: Some(message.reference_type.clone()),
            reference_id: Some(message.reference_id.clone()),
            sent_by,
            created_at: now_rfc3339(),
        };
        self.db.insert_communication(&comm)?;

        info!(
            supplier_id = %comm.supplier_id,
            channel,
            reference_type = %message.reference_type,
            "Recorded supplier communication"
        );
        Ok(comm)
    }

    fn compose(
        &self,
        kind: TemplateKind,
        fallback: (&str, &str),
        values: &HashMap<String, String>,
        supplier: &Supplier,
        reference_type: &str,
        reference_id: &str,
    ) -> ProcurementResult<SupplierMessage> {
        let (subject, body) = match self.db.get_default_template(kind)? {
            Some(template) => (
                render_template(&template.subject, values),
                render_template(&template.body, values),
            ),
            None => (
                render_template(fallback.0, values),
                render_template(fallback.1, values),
            ),
        };

        Ok(SupplierMessage {
            supplier_id: supplier.id.clone(),
            to: supplier.email.clone(),
            subject,
            body,
            reference_type: reference_type.to_string(),
            reference_id: reference_id.to_string(),
        })
    }

    fn medication_label(&self, medication_id: &str) -> ProcurementResult<(String, String)> {
        Ok(match self.db.get_medication(medication_id)? {
            Some(med) => (med.name, med.unit),
            None => (medication_id.to_string(), "unit".to_string()),
        })
    }
}

fn base_values(settings: &ClinicSettings, supplier: &Supplier) -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("clinic_name".into(), settings.clinic_name.clone());
    values.insert("clinic_address".into(), settings.address.clone().unwrap_or_default());
    values.insert("clinic_phone".into(), settings.phone.clone().unwrap_or_default());
    values.insert("clinic_email".into(), settings.email.clone().unwrap_or_default());
    values.insert("currency".into(), settings.currency.clone());
    values.insert("supplier_name".into(), supplier.name.clone());
    values.insert(
        "contact_name".into(),
        supplier.contact_person.clone().unwrap_or_else(|| supplier.name.clone()),
    );
    values
}

/// Whole quantities print without decimals.
fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{:.0}", quantity)
    } else {
        quantity.to_string()
    }
}
