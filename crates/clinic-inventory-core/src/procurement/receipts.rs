//! Receiving goods against a purchase order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::purchase_orders::require_po;
use super::{append_audit, ProcurementError, ProcurementResult, PurchaseOrderService};
use crate::inventory::{cost_variance_percent, current_quantity, moving_average_cost};
use crate::models::{AuditAction, MovementType, PoStatus, StockMovement};

/// Received quantities over the ordered amount by less than this are tolerated.
const RECEIPT_TOLERANCE: f64 = 1e-9;

/// Goods received for one order line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptLine {
    pub item_id: String,
    pub quantity: f64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    /// Actual unit cost; the ordered price when absent
    pub unit_cost: Option<f64>,
}

/// A received line priced away from the order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptVariance {
    pub item_id: String,
    pub medication_id: String,
    pub ordered_price: f64,
    pub received_cost: f64,
    pub variance_percent: f64,
    pub previous_average_cost: f64,
    pub new_average_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptOutcome {
    pub purchase_order_id: String,
    pub status: PoStatus,
    pub movements: Vec<StockMovement>,
    /// Lines whose cost is beyond the alert threshold
    pub variances: Vec<ReceiptVariance>,
}

impl ReceiptOutcome {
    pub fn is_fully_received(&self) -> bool {
        self.status == PoStatus::Received
    }
}

impl<'a> PurchaseOrderService<'a> {
    /// Receive goods against an approved order.
    ///
    /// Every line becomes a `Receipt` movement and updates the received
    /// quantity and the medication's moving-average cost. The order moves to
    /// `PartiallyReceived` or `Received`. All of it commits together or not
    /// at all.
    pub fn receive_items(
        &self,
        po_id: &str,
        lines: Vec<ReceiptLine>,
        performed_by: Option<String>,
    ) -> ProcurementResult<ReceiptOutcome> {
        let threshold = self.options.cost_variance_alert_percent;

        let outcome = self.db.in_transaction(|db| {
            let mut po = require_po(db, po_id)?;
            let from = po.status;
            if !from.accepts_receipts() {
                return Err(ProcurementError::InvalidState(format!(
                    "Purchase order {} is {} and cannot receive goods",
                    po.po_number, from
                )));
            }
            if lines.is_empty() {
                return Err(ProcurementError::InvalidInput("No receipt lines given".into()));
            }

            let mut movements = Vec::with_capacity(lines.len());
            let mut variances = Vec::new();
            let mut received = Vec::with_capacity(lines.len());

            for line in &lines {
                let item = po
                    .items
                    .iter_mut()
                    .find(|i| i.id == line.item_id)
                    .ok_or_else(|| {
                        ProcurementError::NotFound(format!("purchase order item {}", line.item_id))
                    })?;

                if !(line.quantity > 0.0) {
                    return Err(ProcurementError::InvalidInput(format!(
                        "Received quantity for item {} must be positive",
                        line.item_id
                    )));
                }
                if line.quantity > item.remaining() + RECEIPT_TOLERANCE {
                    return Err(ProcurementError::InvalidInput(format!(
                        "Received quantity {} exceeds remaining {} for item {}",
                        line.quantity,
                        item.remaining(),
                        line.item_id
                    )));
                }

                if let Some(cost) = line.unit_cost {
                    if !cost.is_finite() || cost < 0.0 {
                        return Err(ProcurementError::InvalidInput(format!(
                            "Unit cost {} for item {} must be a non-negative number",
                            cost, line.item_id
                        )));
                    }
                }

                let medication = db.require_medication(&item.medication_id)?;
                let on_hand = current_quantity(&db.list_movements_for_medication(&medication.id)?);
                let unit_cost = line.unit_cost.unwrap_or(item.unit_price);
                let new_average = moving_average_cost(on_hand, medication.average_cost, line.quantity, unit_cost);
                db.update_average_cost(&medication.id, new_average)?;

                if let Some(variance) = cost_variance_percent(item.unit_price, unit_cost) {
                    if variance.abs() > threshold {
                        variances.push(ReceiptVariance {
                            item_id: item.id.clone(),
                            medication_id: medication.id.clone(),
                            ordered_price: item.unit_price,
                            received_cost: unit_cost,
                            variance_percent: variance,
                            previous_average_cost: medication.average_cost,
                            new_average_cost: new_average,
                        });
                    }
                }

                let movement = StockMovement::new(medication.id.clone(), MovementType::Receipt, line.quantity)
                    .with_batch(line.batch_number.clone(), line.expiry_date)
                    .with_unit_cost(unit_cost)
                    .with_reference("purchase_order", &po.id)
                    .performed_by(performed_by.clone());
                db.insert_movement(&movement)?;
                movements.push(movement);

                item.quantity_received = (item.quantity_received + line.quantity).min(item.quantity_ordered);
                db.update_item_received(&item.id, item.quantity_received)?;

                received.push(json!({
                    "item_id": item.id,
                    "medication_id": medication.id,
                    "quantity": line.quantity,
                    "batch_number": line.batch_number,
                    "expiry_date": line.expiry_date.map(|d| d.to_string()),
                    "unit_cost": unit_cost,
                }));
            }

            let to = po.receiving_status();
            if to != from {
                db.update_purchase_order_status(&po.id, to)?;
            }
            append_audit(
                db,
                &po.id,
                AuditAction::ItemsReceived,
                Some(from),
                Some(to),
                json!({ "lines": received }),
                performed_by.clone(),
            )?;

            Ok::<_, ProcurementError>(ReceiptOutcome {
                purchase_order_id: po.id,
                status: to,
                movements,
                variances,
            })
        })?;

        for v in &outcome.variances {
            warn!(
                po_id,
                medication_id = %v.medication_id,
                ordered_price = v.ordered_price,
                received_cost = v.received_cost,
                variance_percent = v.variance_percent,
                "Receipt cost variance above threshold"
            );
        }
        info!(
            po_id,
            lines = outcome.movements.len(),
            status = %outcome.status,
            "Processed goods receipt"
        );
        Ok(outcome)
    }
}
