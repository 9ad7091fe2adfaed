//! Purchase order, line item and audit trail database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{now_rfc3339, AuditAction, PoStatus, PurchaseOrder, PurchaseOrderAudit, PurchaseOrderItem};

const PO_COLUMNS: &str = "id, po_number, supplier_id, status, order_date, expected_delivery_date, \
     subtotal, tax_amount, total_amount, quotation_id, notes, created_by, created_at, updated_at";

impl Database {
    /// Insert a purchase order together with its lines.
    pub fn insert_purchase_order(&self, po: &PurchaseOrder) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO purchase_orders (
                id, po_number, supplier_id, status, order_date, expected_delivery_date,
                subtotal, tax_amount, total_amount, quotation_id, notes, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                po.id,
                po.po_number,
                po.supplier_id,
                po.status.as_str(),
                po.order_date,
                po.expected_delivery_date,
                po.subtotal,
                po.tax_amount,
                po.total_amount,
                po.quotation_id,
                po.notes,
                po.created_by,
                po.created_at,
                po.updated_at,
            ],
        )?;
        self.insert_po_items(&po.id, &po.items)?;
        Ok(())
    }

    fn insert_po_items(&self, po_id: &str, items: &[PurchaseOrderItem]) -> DbResult<()> {
        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO purchase_order_items (
                id, purchase_order_id, medication_id, quantity_ordered,
                quantity_received, unit_price, total_price, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for (position, item) in items.iter().enumerate() {
            stmt.execute(params![
                item.id,
                po_id,
                item.medication_id,
                item.quantity_ordered,
                item.quantity_received,
                item.unit_price,
                item.total_price,
                position as i64,
            ])?;
        }
        Ok(())
    }

    /// Get a purchase order with its lines.
    pub fn get_purchase_order(&self, id: &str) -> DbResult<Option<PurchaseOrder>> {
        let sql = format!("SELECT {} FROM purchase_orders WHERE id = ?", PO_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [id], PurchaseOrderRow::from_row)
            .optional()?;

        match row {
            Some(row) => {
                let mut po: PurchaseOrder = row.try_into()?;
                po.items = self.list_po_items(&po.id)?;
                Ok(Some(po))
            }
            None => Ok(None),
        }
    }

    /// Get a purchase order, failing when it does not exist.
    pub fn require_purchase_order(&self, id: &str) -> DbResult<PurchaseOrder> {
        self.get_purchase_order(id)?
            .ok_or_else(|| DbError::NotFound(format!("purchase order {}", id)))
    }

    /// List purchase orders (optionally by status), newest first.
    pub fn list_purchase_orders(&self, status: Option<PoStatus>) -> DbResult<Vec<PurchaseOrder>> {
        let rows: Vec<PurchaseOrderRow> = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM purchase_orders WHERE status = ? ORDER BY created_at DESC, rowid DESC",
                    PO_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([status.as_str()], PurchaseOrderRow::from_row)?;
                let collected = rows.collect::<Result<Vec<_>, _>>()?;
                collected
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM purchase_orders ORDER BY created_at DESC, rowid DESC",
                    PO_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], PurchaseOrderRow::from_row)?;
                let collected = rows.collect::<Result<Vec<_>, _>>()?;
                collected
            }
        };

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let mut po: PurchaseOrder = row.try_into()?;
            po.items = self.list_po_items(&po.id)?;
            orders.push(po);
        }
        Ok(orders)
    }

    fn list_po_items(&self, po_id: &str) -> DbResult<Vec<PurchaseOrderItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, purchase_order_id, medication_id, quantity_ordered,
                   quantity_received, unit_price, total_price
            FROM purchase_order_items
            WHERE purchase_order_id = ?
            ORDER BY position
            "#,
        )?;

        let rows = stmt.query_map([po_id], |row| {
            Ok(PurchaseOrderItem {
                id: row.get(0)?,
                purchase_order_id: row.get(1)?,
                medication_id: row.get(2)?,
                quantity_ordered: row.get(3)?,
                quantity_received: row.get(4)?,
                unit_price: row.get(5)?,
                total_price: row.get(6)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Set a purchase order's status.
    pub fn update_purchase_order_status(&self, id: &str, status: PoStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE purchase_orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the received quantity of a line.
    pub fn update_item_received(&self, item_id: &str, quantity_received: f64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE purchase_order_items SET quantity_received = ?2 WHERE id = ?1",
            params![item_id, quantity_received],
        )?;
        Ok(rows_affected > 0)
    }

    /// Store recomputed header totals.
    pub fn update_purchase_order_totals(&self, po: &PurchaseOrder) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE purchase_orders SET
                subtotal = ?2,
                tax_amount = ?3,
                total_amount = ?4,
                notes = ?5,
                expected_delivery_date = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                po.id,
                po.subtotal,
                po.tax_amount,
                po.total_amount,
                po.notes,
                po.expected_delivery_date,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Replace all lines of an order.
    pub fn replace_purchase_order_items(&self, po_id: &str, items: &[PurchaseOrderItem]) -> DbResult<()> {
        self.conn.execute(
            "DELETE FROM purchase_order_items WHERE purchase_order_id = ?",
            [po_id],
        )?;
        self.insert_po_items(po_id, items)
    }

    /// Append an audit entry (sequence assigned here).
    pub fn insert_po_audit(&self, entry: &PurchaseOrderAudit) -> DbResult<()> {
        let details_json = serde_json::to_string(&entry.details)?;
        self.conn.execute(
            r#"
            INSERT INTO purchase_order_audit (
                id, purchase_order_id, seq, action, from_status, to_status,
                details, performed_by, created_at, prev_hash, entry_hash
            ) VALUES (
                ?1, ?2,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM purchase_order_audit WHERE purchase_order_id = ?2),
                ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
            )
            "#,
            params![
                entry.id,
                entry.purchase_order_id,
                entry.action.as_str(),
                entry.from_status.map(|s| s.as_str()),
                entry.to_status.map(|s| s.as_str()),
                details_json,
                entry.performed_by,
                entry.created_at,
                entry.prev_hash,
                entry.entry_hash,
            ],
        )?;
        Ok(())
    }

    /// Audit trail of a purchase order in chain order.
    pub fn list_po_audit(&self, po_id: &str) -> DbResult<Vec<PurchaseOrderAudit>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, purchase_order_id, action, from_status, to_status, details,
                   performed_by, created_at, prev_hash, entry_hash
            FROM purchase_order_audit
            WHERE purchase_order_id = ?
            ORDER BY seq
            "#,
        )?;

        let rows = stmt.query_map([po_id], |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                purchase_order_id: row.get(1)?,
                action: row.get(2)?,
                from_status: row.get(3)?,
                to_status: row.get(4)?,
                details: row.get(5)?,
                performed_by: row.get(6)?,
                created_at: row.get(7)?,
                prev_hash: row.get(8)?,
                entry_hash: row.get(9)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Hash of the latest audit entry for an order ("" when none).
    pub fn last_po_audit_hash(&self, po_id: &str) -> DbResult<String> {
        let hash: Option<String> = self
            .conn
            .query_row(
                "SELECT entry_hash FROM purchase_order_audit WHERE purchase_order_id = ? ORDER BY seq DESC LIMIT 1",
                [po_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash.unwrap_or_default())
    }
}

/// Intermediate row struct for database mapping.
struct PurchaseOrderRow {
    id: String,
    po_number: String,
    supplier_id: String,
    status: String,
    order_date: String,
    expected_delivery_date: Option<String>,
    subtotal: f64,
    tax_amount: f64,
    total_amount: f64,
    quotation_id: Option<String>,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PurchaseOrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            po_number: row.get(1)?,
            supplier_id: row.get(2)?,
            status: row.get(3)?,
            order_date: row.get(4)?,
            expected_delivery_date: row.get(5)?,
            subtotal: row.get(6)?,
            tax_amount: row.get(7)?,
            total_amount: row.get(8)?,
            quotation_id: row.get(9)?,
            notes: row.get(10)?,
            created_by: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl TryFrom<PurchaseOrderRow> for PurchaseOrder {
    type Error = DbError;

    fn try_from(row: PurchaseOrderRow) -> Result<Self, Self::Error> {
        Ok(PurchaseOrder {
            id: row.id,
            po_number: row.po_number,
            supplier_id: row.supplier_id,
            status: parse_status(&row.status)?,
            order_date: row.order_date,
            expected_delivery_date: row.expected_delivery_date,
            items: Vec::new(),
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            quotation_id: row.quotation_id,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct AuditRow {
    id: String,
    purchase_order_id: String,
    action: String,
    from_status: Option<String>,
    to_status: Option<String>,
    details: String,
    performed_by: Option<String>,
    created_at: String,
    prev_hash: String,
    entry_hash: String,
}

impl TryFrom<AuditRow> for PurchaseOrderAudit {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AuditAction::parse(&row.action)
            .ok_or_else(|| DbError::Constraint(format!("Unknown audit action: {}", row.action)))?;

        Ok(PurchaseOrderAudit {
            id: row.id,
            purchase_order_id: row.purchase_order_id,
            action,
            from_status: row.from_status.as_deref().map(parse_status).transpose()?,
            to_status: row.to_status.as_deref().map(parse_status).transpose()?,
            details: serde_json::from_str(&row.details)?,
            performed_by: row.performed_by,
            created_at: row.created_at,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}

fn parse_status(s: &str) -> DbResult<PoStatus> {
    PoStatus::parse(s).ok_or_else(|| DbError::Constraint(format!("Unknown PO status: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medication, Supplier};

    fn setup_db() -> (Database, String, String) {
        let db = Database::open_in_memory().unwrap();
        let supplier = Supplier::new("MedSupply Co".into());
        db.upsert_supplier(&supplier).unwrap();
        let med = Medication::new("Amoxicillin".into(), "capsule".into());
        db.insert_medication(&med).unwrap();
        (db, supplier.id, med.id)
    }

    fn make_po(supplier_id: &str, med_id: &str, number: &str) -> PurchaseOrder {
        let mut po = PurchaseOrder::new(number.into(), supplier_id.into());
        po.add_item(med_id.into(), 100.0, 0.2);
        po.recalculate_totals(0.0);
        po
    }

    #[test]
    fn test_insert_and_get() {
        let (db, supplier_id, med_id) = setup_db();
        let po = make_po(&supplier_id, &med_id, "PO-1");
        db.insert_purchase_order(&po).unwrap();

        let retrieved = db.require_purchase_order(&po.id).unwrap();
        assert_eq!(retrieved, po);
        assert_eq!(retrieved.items.len(), 1);
        assert_eq!(retrieved.total_amount, 20.0);
    }

    #[test]
    fn test_list_by_status() {
        let (db, supplier_id, med_id) = setup_db();
        let po1 = make_po(&supplier_id, &med_id, "PO-1");
        let po2 = make_po(&supplier_id, &med_id, "PO-2");
        db.insert_purchase_order(&po1).unwrap();
        db.insert_purchase_order(&po2).unwrap();
        db.update_purchase_order_status(&po2.id, PoStatus::Submitted).unwrap();

        assert_eq!(db.list_purchase_orders(None).unwrap().len(), 2);
        let drafts = db.list_purchase_orders(Some(PoStatus::Draft)).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, po1.id);
    }

    #[test]
    fn test_status_update_stamps_rfc3339() {
        let (db, supplier_id, med_id) = setup_db();
        let mut po = make_po(&supplier_id, &med_id, "PO-1");
        db.insert_purchase_order(&po).unwrap();

        db.update_purchase_order_status(&po.id, PoStatus::Submitted).unwrap();
        po.notes = Some("Deliver to back door".into());
        db.update_purchase_order_totals(&po).unwrap();

        let stored = db.require_purchase_order(&po.id).unwrap();
        assert_eq!(stored.status, PoStatus::Submitted);
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.updated_at).is_ok());
    }

    #[test]
    fn test_duplicate_po_number_rejected() {
        let (db, supplier_id, med_id) = setup_db();
        db.insert_purchase_order(&make_po(&supplier_id, &med_id, "PO-1")).unwrap();
        assert!(db.insert_purchase_order(&make_po(&supplier_id, &med_id, "PO-1")).is_err());
    }

    #[test]
    fn test_replace_items_and_receive() {
        let (db, supplier_id, med_id) = setup_db();
        let mut po = make_po(&supplier_id, &med_id, "PO-1");
        db.insert_purchase_order(&po).unwrap();

        po.items.clear();
        po.add_item(med_id.clone(), 10.0, 1.0);
        po.add_item(med_id, 5.0, 2.0);
        db.replace_purchase_order_items(&po.id, &po.items).unwrap();

        db.update_item_received(&po.items[1].id, 5.0).unwrap();
        let retrieved = db.require_purchase_order(&po.id).unwrap();
        assert_eq!(retrieved.items.len(), 2);
        assert_eq!(retrieved.items[1].quantity_received, 5.0);

        // Over-receiving violates the table constraint
        assert!(db.update_item_received(&po.items[0].id, 11.0).is_err());
    }

    #[test]
    fn test_audit_sequence() {
        let (db, supplier_id, med_id) = setup_db();
        let po = make_po(&supplier_id, &med_id, "PO-1");
        db.insert_purchase_order(&po).unwrap();
        assert_eq!(db.last_po_audit_hash(&po.id).unwrap(), "");

        for (i, action) in [AuditAction::Created, AuditAction::StatusChanged].iter().enumerate() {
            let entry = PurchaseOrderAudit {
                id: format!("a{}", i),
                purchase_order_id: po.id.clone(),
                action: *action,
                from_status: None,
                to_status: Some(PoStatus::Draft),
                details: serde_json::json!({ "n": i }),
                performed_by: None,
                created_at: "2025-01-01T00:00:00Z".into(),
                prev_hash: String::new(),
                entry_hash: format!("hash{}", i),
            };
            db.insert_po_audit(&entry).unwrap();
        }

        let trail = db.list_po_audit(&po.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::Created);
        assert_eq!(trail[1].details["n"], 1);
        assert_eq!(db.last_po_audit_hash(&po.id).unwrap(), "hash1");
    }
}
