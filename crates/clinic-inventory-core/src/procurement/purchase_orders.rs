//! Purchase order workflow.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{
    append_audit, next_document_number, verify_chain, ProcurementError, ProcurementOptions,
    ProcurementResult,
};
use crate::db::Database;
use crate::models::{AuditAction, PoStatus, PurchaseOrder, PurchaseOrderAudit, PurchaseOrderItem};

/// Sequence backing purchase order numbers.
const PO_SEQUENCE: &str = "purchase_order";

/// A line requested for a new or edited order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPoItem {
    pub medication_id: String,
    pub quantity: f64,
    pub unit_price: f64,
}

pub struct PurchaseOrderService<'a> {
    pub(super) db: &'a Database,
    pub(super) options: ProcurementOptions,
    pub(super) today: NaiveDate,
}

impl<'a> PurchaseOrderService<'a> {
    pub fn new(db: &'a Database, options: ProcurementOptions) -> Self {
        Self {
            db,
            options,
            today: chrono::Utc::now().date_naive(),
        }
    }

    /// Date used for numbering and order dates.
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Create a draft order for an active supplier.
    pub fn create_draft(
        &self,
        supplier_id: &str,
        items: Vec<NewPoItem>,
        created_by: Option<String>,
        notes: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        let po = self
            .db
            .in_transaction(|db| self.insert_draft(db, supplier_id, &items, created_by, notes, None))?;

        info!(
            po_id = %po.id,
            po_number = %po.po_number,
            total = po.total_amount,
            "Created purchase order"
        );
        Ok(po)
    }

    /// Insert a draft order and its `Created` audit entry. Caller owns the transaction.
    pub(super) fn insert_draft(
        &self,
        db: &Database,
        supplier_id: &str,
        items: &[NewPoItem],
        created_by: Option<String>,
        notes: Option<String>,
        quotation_id: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        let supplier = db
            .get_supplier(supplier_id)?
            .ok_or_else(|| ProcurementError::NotFound(format!("supplier {}", supplier_id)))?;
        if !supplier.active {
            return Err(ProcurementError::InvalidInput(format!(
                "Supplier {} is inactive",
                supplier.name
            )));
        }
        validate_items(db, items)?;

        let po_number = next_document_number(db, PO_SEQUENCE, &self.options.po_number_prefix, self.today)?;
        let mut po = PurchaseOrder::new(po_number, supplier.id);
        po.order_date = self.today.to_string();
        po.created_by = created_by.clone();
        po.notes = notes;
        po.quotation_id = quotation_id;
        for item in items {
            po.add_item(item.medication_id.clone(), item.quantity, item.unit_price);
        }
        po.recalculate_totals(db.get_clinic_settings()?.tax_rate);
        db.insert_purchase_order(&po)?;

        append_audit(
            db,
            &po.id,
            AuditAction::Created,
            None,
            Some(PoStatus::Draft),
            json!({
                "po_number": po.po_number,
                "item_count": po.items.len(),
                "total_amount": po.total_amount,
                "quotation_id": po.quotation_id,
            }),
            created_by,
        )?;
        Ok(po)
    }

    /// Replace the lines of a draft order.
    pub fn update_items(
        &self,
        po_id: &str,
        items: Vec<NewPoItem>,
        performed_by: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        let po = self.db.in_transaction(|db| {
            let mut po = require_po(db, po_id)?;
            if po.status != PoStatus::Draft {
                return Err(ProcurementError::InvalidState(format!(
                    "Purchase order {} is {} and can no longer be edited",
                    po.po_number, po.status
                )));
            }
            validate_items(db, &items)?;

            po.items = items
                .iter()
                .map(|i| PurchaseOrderItem::new(&po.id, i.medication_id.clone(), i.quantity, i.unit_price))
                .collect();
            po.recalculate_totals(db.get_clinic_settings()?.tax_rate);
            po.touch();

            db.replace_purchase_order_items(&po.id, &po.items)?;
            db.update_purchase_order_totals(&po)?;
            append_audit(
                db,
                &po.id,
                AuditAction::Updated,
                Some(po.status),
                Some(po.status),
                json!({"item_count": po.items.len(), "total_amount": po.total_amount}),
                performed_by,
            )?;
            Ok::<_, ProcurementError>(po)
        })?;

        info!(po_id = %po.id, total = po.total_amount, "Updated purchase order items");
        Ok(po)
    }

    pub fn submit(&self, po_id: &str, performed_by: Option<String>) -> ProcurementResult<PurchaseOrder> {
        self.transition(po_id, PoStatus::Submitted, performed_by, None)
    }

    /// Approve a submitted order.
    ///
    /// A known staff member must hold a purchasing role to approve.
    pub fn approve(&self, po_id: &str, approved_by: Option<String>) -> ProcurementResult<PurchaseOrder> {
        if let Some(staff_id) = approved_by.as_deref() {
            if let Some(staff) = self.db.get_staff(staff_id)? {
                if !staff.active || !staff.role.can_approve_purchases() {
                    warn!(po_id, staff_id, role = staff.role.as_str(), "Rejected purchase order approval");
                    return Err(ProcurementError::NotAuthorized(format!(
                        "{} cannot approve purchase orders",
                        staff.name
                    )));
                }
            }
        }
        self.transition(po_id, PoStatus::Approved, approved_by, None)
    }

    pub fn cancel(
        &self,
        po_id: &str,
        reason: Option<String>,
        performed_by: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        self.transition(po_id, PoStatus::Cancelled, performed_by, reason)
    }

    fn transition(
        &self,
        po_id: &str,
        to: PoStatus,
        performed_by: Option<String>,
        reason: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        let result: ProcurementResult<(PurchaseOrder, PoStatus)> = self.db.in_transaction(|db| {
            let mut po = require_po(db, po_id)?;
            let from = po.status;
            if !from.can_transition_to(to) {
                return Err(ProcurementError::InvalidTransition { from, to });
            }

            db.update_purchase_order_status(&po.id, to)?;
            append_audit(
                db,
                &po.id,
                AuditAction::StatusChanged,
                Some(from),
                Some(to),
                json!({"reason": reason}),
                performed_by,
            )?;
            po.status = to;
            po.touch();
            Ok((po, from))
        });

        match result {
            Ok((po, from)) => {
                info!(po_id = %po.id, from = %from, to = %to, "Purchase order status changed");
                Ok(po)
            }
            Err(e) => {
                warn!(po_id, to = %to, error = %e, "Purchase order transition rejected");
                Err(e)
            }
        }
    }

    pub fn get(&self, po_id: &str) -> ProcurementResult<PurchaseOrder> {
        require_po(self.db, po_id)
    }

    pub fn list(&self, status: Option<PoStatus>) -> ProcurementResult<Vec<PurchaseOrder>> {
        Ok(self.db.list_purchase_orders(status)?)
    }

    pub fn audit_trail(&self, po_id: &str) -> ProcurementResult<Vec<PurchaseOrderAudit>> {
        Ok(self.db.list_po_audit(po_id)?)
    }

    /// Index of the first broken audit entry, `None` when the chain is intact.
    pub fn verify_audit_chain(&self, po_id: &str) -> ProcurementResult<Option<usize>> {
        let entries = self.db.list_po_audit(po_id)?;
        let broken = verify_chain(&entries);
        if let Some(index) = broken {
            warn!(po_id, index, "Purchase order audit chain is broken");
        }
        Ok(broken)
    }
}

pub(super) fn require_po(db: &Database, po_id: &str) -> ProcurementResult<PurchaseOrder> {
    db.get_purchase_order(po_id)?
        .ok_or_else(|| ProcurementError::NotFound(format!("purchase order {}", po_id)))
}

fn validate_items(db: &Database, items: &[NewPoItem]) -> ProcurementResult<()> {
    if items.is_empty() {
        return Err(ProcurementError::InvalidInput(
            "Purchase order needs at least one item".into(),
        ));
    }
    for item in items {
        if !(item.quantity > 0.0) {
            return Err(ProcurementError::InvalidInput(format!(
                "Quantity for {} must be positive",
                item.medication_id
            )));
        }
        if !(item.unit_price >= 0.0) {
            return Err(ProcurementError::InvalidInput(format!(
                "Unit price for {} must not be negative",
                item.medication_id
            )));
        }
        if db.get_medication(&item.medication_id)?.is_none() {
            return Err(ProcurementError::NotFound(format!(
                "medication {}",
                item.medication_id
            )));
        }
    }
    Ok(())
}
