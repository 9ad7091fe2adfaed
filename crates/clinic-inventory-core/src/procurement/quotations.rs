//! Requests for quotation, supplier quotations and conversion to orders.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use super::{
    append_audit, next_document_number, NewPoItem, ProcurementError, ProcurementOptions,
    ProcurementResult, PurchaseOrderService,
};
use crate::db::Database;
use crate::models::{
    AuditAction, PoStatus, PurchaseOrder, Quotation, QuotationRequest, QuotationRequestItem,
    QuotationStatus, RequestStatus,
};

/// Sequence backing request-for-quotation numbers.
const RFQ_SEQUENCE: &str = "quotation_request";

/// Minimum Jaro-Winkler similarity for matching a quoted line to a medication.
pub const NAME_MATCH_THRESHOLD: f64 = 0.88;

/// One quotation in a comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationSummary {
    pub quotation_id: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub status: QuotationStatus,
    pub total: f64,
    /// Whether every requested medication is priced
    pub covers_all_items: bool,
}

/// Lowest unit price offered for a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestPrice {
    pub medication_id: String,
    pub quotation_id: String,
    pub supplier_id: String,
    pub unit_price: f64,
}

/// Side-by-side view of the live quotations for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationComparison {
    pub request_id: String,
    /// Cheapest first
    pub quotations: Vec<QuotationSummary>,
    pub best_prices: Vec<BestPrice>,
    /// Cheapest quotation pricing every requested medication
    pub cheapest_complete: Option<String>,
}

pub struct QuotationService<'a> {
    db: &'a Database,
    options: ProcurementOptions,
    today: NaiveDate,
}

impl<'a> QuotationService<'a> {
    pub fn new(db: &'a Database, options: ProcurementOptions) -> Self {
        Self {
            db,
            options,
            today: chrono::Utc::now().date_naive(),
        }
    }

    /// Evaluate validity and number documents against a fixed date.
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Create a draft request for quotation.
    pub fn create_request(
        &self,
        supplier_ids: Vec<String>,
        items: Vec<QuotationRequestItem>,
        due_date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> ProcurementResult<QuotationRequest> {
        if supplier_ids.is_empty() {
            return Err(ProcurementError::InvalidInput("Request needs at least one supplier".into()));
        }
        if items.is_empty() {
            return Err(ProcurementError::InvalidInput("Request needs at least one item".into()));
        }

        let request = self.db.in_transaction(|db| {
            for supplier_id in &supplier_ids {
                db.get_supplier(supplier_id)?
                    .ok_or_else(|| ProcurementError::NotFound(format!("supplier {}", supplier_id)))?;
            }
            for item in &items {
                if !(item.quantity > 0.0) {
                    return Err(ProcurementError::InvalidInput(format!(
                        "Quantity for {} must be positive",
                        item.medication_id
                    )));
                }
                db.get_medication(&item.medication_id)?
                    .ok_or_else(|| ProcurementError::NotFound(format!("medication {}", item.medication_id)))?;
            }

            let number = next_document_number(db, RFQ_SEQUENCE, &self.options.rfq_number_prefix, self.today)?;
            let mut request = QuotationRequest::new(number, supplier_ids, items);
            request.due_date = due_date;
            request.notes = notes;
            db.insert_quotation_request(&request)?;
            Ok(request)
        })?;

        info!(
            request_id = %request.id,
            request_number = %request.request_number,
            suppliers = request.supplier_ids.len(),
            "Created quotation request"
        );
        Ok(request)
    }

    /// Mark a draft request as sent to its suppliers.
    pub fn mark_request_sent(&self, request_id: &str) -> ProcurementResult<QuotationRequest> {
        let mut request = self.require_request(request_id)?;
        if request.status != RequestStatus::Draft {
            return Err(ProcurementError::InvalidState(format!(
                "Request {} has already been {}",
                request.request_number,
                request.status.as_str()
            )));
        }
        self.db.update_quotation_request_status(&request.id, RequestStatus::Sent)?;
        request.status = RequestStatus::Sent;
        info!(request_id, "Quotation request sent");
        Ok(request)
    }

    /// Store a quotation received from a supplier.
    pub fn record_quotation(&self, mut quotation: Quotation) -> ProcurementResult<Quotation> {
        self.db
            .get_supplier(&quotation.supplier_id)?
            .ok_or_else(|| ProcurementError::NotFound(format!("supplier {}", quotation.supplier_id)))?;
        if let Some(request_id) = quotation.quotation_request_id.as_deref() {
            let request = self.require_request(request_id)?;
            if request.status == RequestStatus::Closed {
                return Err(ProcurementError::InvalidState(format!(
                    "Request {} is closed",
                    request.request_number
                )));
            }
        }
        if quotation.items.is_empty() {
            return Err(ProcurementError::InvalidInput("Quotation has no items".into()));
        }
        for item in &quotation.items {
            if !(item.quantity > 0.0) || !(item.unit_price >= 0.0) {
                return Err(ProcurementError::InvalidInput(format!(
                    "Invalid quantity or price for '{}'",
                    item.description
                )));
            }
        }

        quotation.status = QuotationStatus::Pending;
        quotation.converted_po_id = None;
        self.db.insert_quotation(&quotation)?;
        info!(
            quotation_id = %quotation.id,
            supplier_id = %quotation.supplier_id,
            total = quotation.total(),
            "Recorded quotation"
        );
        Ok(quotation)
    }

    /// Compare the pending and accepted quotations of a request.
    pub fn compare(&self, request_id: &str) -> ProcurementResult<QuotationComparison> {
        let request = self.require_request(request_id)?;
        let requested: HashSet<&str> = request.items.iter().map(|i| i.medication_id.as_str()).collect();

        let live: Vec<Quotation> = self
            .db
            .list_quotations_for_request(request_id)?
            .into_iter()
            .filter(|q| {
                matches!(q.status, QuotationStatus::Pending | QuotationStatus::Accepted) && !q.is_expired(self.today)
            })
            .collect();

        let mut supplier_names: HashMap<String, String> = HashMap::new();
        let mut summaries = Vec::with_capacity(live.len());
        let mut best: HashMap<String, BestPrice> = HashMap::new();

        for quotation in &live {
            if !supplier_names.contains_key(&quotation.supplier_id) {
                let name = self
                    .db
                    .get_supplier(&quotation.supplier_id)?
                    .map(|s| s.name)
                    .unwrap_or_default();
                supplier_names.insert(quotation.supplier_id.clone(), name);
            }

            // Lines without a catalog id are matched by name, as conversion does
            let mut resolved = Vec::with_capacity(quotation.items.len());
            for item in &quotation.items {
                let medication_id = match item.medication_id.clone() {
                    Some(id) => Some(id),
                    None => match_medication(self.db, &item.description)?,
                };
                if let Some(id) = medication_id {
                    resolved.push((id, item));
                }
            }
            let priced: HashSet<&str> = resolved.iter().map(|(id, _)| id.as_str()).collect();

            for (medication_id, item) in &resolved {
                let medication_id = medication_id.as_str();
                let better = best
                    .get(medication_id)
                    .map(|b| item.unit_price < b.unit_price)
                    .unwrap_or(true);
                if better {
                    best.insert(
                        medication_id.to_string(),
                        BestPrice {
                            medication_id: medication_id.to_string(),
                            quotation_id: quotation.id.clone(),
                            supplier_id: quotation.supplier_id.clone(),
                            unit_price: item.unit_price,
                        },
                    );
                }
            }

            summaries.push(QuotationSummary {
                quotation_id: quotation.id.clone(),
                supplier_id: quotation.supplier_id.clone(),
                supplier_name: supplier_names
                    .get(&quotation.supplier_id)
                    .cloned()
                    .unwrap_or_default(),
                status: quotation.status,
                total: quotation.total(),
                covers_all_items: requested.iter().all(|m| priced.contains(m)),
            });
        }

        summaries.sort_by(|a, b| a.total.total_cmp(&b.total));
        let cheapest_complete = summaries
            .iter()
            .find(|s| s.covers_all_items)
            .map(|s| s.quotation_id.clone());

        let mut best_prices: Vec<BestPrice> = best.into_values().collect();
        best_prices.sort_by(|a, b| a.medication_id.cmp(&b.medication_id));

        debug!(request_id, quotations = summaries.len(), "Compared quotations");
        Ok(QuotationComparison {
            request_id: request_id.to_string(),
            quotations: summaries,
            best_prices,
            cheapest_complete,
        })
    }

    /// Accept a quotation; the other pending quotations for its request are rejected.
    pub fn accept(&self, quotation_id: &str) -> ProcurementResult<Quotation> {
        let quotation = self.db.in_transaction(|db| {
            let mut quotation = db.require_quotation(quotation_id)?;
            if quotation.status != QuotationStatus::Pending {
                return Err(ProcurementError::InvalidState(format!(
                    "Quotation is {} and cannot be accepted",
                    quotation.status
                )));
            }
            if quotation.is_expired(self.today) {
                return Err(ProcurementError::InvalidState("Quotation has expired".into()));
            }
            accept_in(db, &quotation)?;
            quotation.status = QuotationStatus::Accepted;
            Ok(quotation)
        })?;

        info!(quotation_id, "Accepted quotation");
        Ok(quotation)
    }

    pub fn reject(&self, quotation_id: &str) -> ProcurementResult<Quotation> {
        let mut quotation = self.db.require_quotation(quotation_id)?;
        if !matches!(quotation.status, QuotationStatus::Pending | QuotationStatus::Accepted) {
            return Err(ProcurementError::InvalidState(format!(
                "Quotation is {} and cannot be rejected",
                quotation.status
            )));
        }
        self.db
            .update_quotation_status(&quotation.id, QuotationStatus::Rejected, None)?;
        quotation.status = QuotationStatus::Rejected;
        info!(quotation_id, "Rejected quotation");
        Ok(quotation)
    }

    /// Expire pending and accepted quotations past their validity date.
    pub fn expire_stale(&self, today: NaiveDate) -> ProcurementResult<Vec<String>> {
        let expired = self.db.in_transaction(|db| {
            let mut expired = Vec::new();
            for status in [QuotationStatus::Pending, QuotationStatus::Accepted] {
                for quotation in db.list_quotations_by_status(status)? {
                    if quotation.is_expired(today) {
                        db.update_quotation_status(&quotation.id, QuotationStatus::Expired, None)?;
                        expired.push(quotation.id);
                    }
                }
            }
            Ok::<_, ProcurementError>(expired)
        })?;

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale quotations");
        }
        Ok(expired)
    }

    /// Turn an accepted (or pending) quotation into a draft purchase order.
    ///
    /// Quoted lines without a medication are matched to the catalog by name.
    pub fn convert_to_purchase_order(
        &self,
        quotation_id: &str,
        created_by: Option<String>,
    ) -> ProcurementResult<PurchaseOrder> {
        let orders = PurchaseOrderService::new(self.db, self.options.clone()).as_of(self.today);

        let result: ProcurementResult<PurchaseOrder> = self.db.in_transaction(|db| {
            let quotation = db.require_quotation(quotation_id)?;
            if quotation.status == QuotationStatus::Converted || quotation.converted_po_id.is_some() {
                return Err(ProcurementError::InvalidState("Quotation was already converted".into()));
            }
            match quotation.status {
                QuotationStatus::Accepted => {}
                QuotationStatus::Pending => accept_in(db, &quotation)?,
                other => {
                    return Err(ProcurementError::InvalidState(format!(
                        "Quotation is {} and cannot be converted",
                        other
                    )))
                }
            }
            if quotation.is_expired(self.today) {
                return Err(ProcurementError::InvalidState("Quotation has expired".into()));
            }

            let mut items = Vec::with_capacity(quotation.items.len());
            for line in &quotation.items {
                let medication_id = match line.medication_id.as_deref() {
                    Some(id) => db
                        .get_medication(id)?
                        .map(|m| m.id)
                        .ok_or_else(|| ProcurementError::NotFound(format!("medication {}", id)))?,
                    None => match_medication(db, &line.description)?
                        .ok_or_else(|| ProcurementError::UnmatchedItem(line.description.clone()))?,
                };
                items.push(NewPoItem {
                    medication_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                });
            }

            let notes = Some(match &quotation.quotation_number {
                Some(number) => format!("From supplier quotation {}", number),
                None => "From supplier quotation".to_string(),
            });
            let po = orders.insert_draft(
                db,
                &quotation.supplier_id,
                &items,
                created_by.clone(),
                notes,
                Some(quotation.id.clone()),
            )?;

            db.update_quotation_status(&quotation.id, QuotationStatus::Converted, Some(&po.id))?;
            append_audit(
                db,
                &po.id,
                AuditAction::Converted,
                Some(PoStatus::Draft),
                Some(PoStatus::Draft),
                json!({
                    "quotation_id": quotation.id,
                    "quotation_request_id": quotation.quotation_request_id,
                }),
                created_by.clone(),
            )?;
            if let Some(request_id) = quotation.quotation_request_id.as_deref() {
                db.update_quotation_request_status(request_id, RequestStatus::Closed)?;
            }
            Ok(po)
        });

        match result {
            Ok(po) => {
                info!(quotation_id, po_id = %po.id, po_number = %po.po_number, "Converted quotation to purchase order");
                Ok(po)
            }
            Err(e) => {
                warn!(quotation_id, error = %e, "Quotation conversion failed");
                Err(e)
            }
        }
    }

    fn require_request(&self, request_id: &str) -> ProcurementResult<QuotationRequest> {
        self.db
            .get_quotation_request(request_id)?
            .ok_or_else(|| ProcurementError::NotFound(format!("quotation request {}", request_id)))
    }
}

/// Mark a quotation accepted and reject its pending siblings.
fn accept_in(db: &Database, quotation: &Quotation) -> ProcurementResult<()> {
    db.update_quotation_status(&quotation.id, QuotationStatus::Accepted, None)?;
    if let Some(request_id) = quotation.quotation_request_id.as_deref() {
        for other in db.list_quotations_for_request(request_id)? {
            if other.id != quotation.id && other.status == QuotationStatus::Pending {
                db.update_quotation_status(&other.id, QuotationStatus::Rejected, None)?;
            }
        }
    }
    Ok(())
}

/// Best catalog match for a supplier's item description.
pub fn match_medication(db: &Database, description: &str) -> ProcurementResult<Option<String>> {
    let needle = description.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(f64, String)> = None;
    for med in db.list_medications(true)? {
        let score = std::iter::once(med.name.as_str())
            .chain(med.generic_name.as_deref())
            .map(|name| jaro_winkler(&needle, &name.to_lowercase()))
            .fold(0.0, f64::max);
        if score >= NAME_MATCH_THRESHOLD && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, med.id));
        }
    }

    Ok(best.map(|(_, id)| id))
}
