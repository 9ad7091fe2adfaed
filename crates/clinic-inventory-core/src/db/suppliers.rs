//! Supplier and supplier communication database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{now_rfc3339, Supplier, SupplierCommunication};

const SUPPLIER_COLUMNS: &str = "id, name, contact_person, email, phone, address, payment_terms, \
     lead_time_days, active, notes, created_at, updated_at";

impl Database {
    /// Insert or update a supplier.
    pub fn upsert_supplier(&self, supplier: &Supplier) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO suppliers (
                id, name, contact_person, email, phone, address, payment_terms,
                lead_time_days, active, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                contact_person = excluded.contact_person,
                email = excluded.email,
                phone = excluded.phone,
                address = excluded.address,
                payment_terms = excluded.payment_terms,
                lead_time_days = excluded.lead_time_days,
                active = excluded.active,
                notes = excluded.notes,
                updated_at = ?13
            "#,
            params![
                supplier.id,
                supplier.name,
                supplier.contact_person,
                supplier.email,
                supplier.phone,
                supplier.address,
                supplier.payment_terms,
                supplier.lead_time_days,
                supplier.active,
                supplier.notes,
                supplier.created_at,
                supplier.updated_at,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a supplier by id.
    pub fn get_supplier(&self, id: &str) -> DbResult<Option<Supplier>> {
        let sql = format!("SELECT {} FROM suppliers WHERE id = ?", SUPPLIER_COLUMNS);
        self.conn
            .query_row(&sql, [id], supplier_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get a supplier by id, failing when it does not exist.
    pub fn require_supplier(&self, id: &str) -> DbResult<Supplier> {
        self.get_supplier(id)?
            .ok_or_else(|| DbError::NotFound(format!("supplier {}", id)))
    }

    /// List suppliers ordered by name.
    pub fn list_suppliers(&self, active_only: bool) -> DbResult<Vec<Supplier>> {
        let sql = if active_only {
            format!("SELECT {} FROM suppliers WHERE active = 1 ORDER BY name", SUPPLIER_COLUMNS)
        } else {
            format!("SELECT {} FROM suppliers ORDER BY name", SUPPLIER_COLUMNS)
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], supplier_from_row)?;

        let mut suppliers = Vec::new();
        for row in rows {
            suppliers.push(row?);
        }
        Ok(suppliers)
    }

    /// Mark supplier as inactive (soft delete).
    pub fn deactivate_supplier(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE suppliers SET active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record a message sent to a supplier.
    pub fn insert_communication(&self, comm: &SupplierCommunication) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO supplier_communications (
                id, supplier_id, channel, subject, body, reference_type,
                reference_id, sent_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                comm.id,
                comm.supplier_id,
                comm.channel,
                comm.subject,
                comm.body,
                comm.reference_type,
                comm.reference_id,
                comm.sent_by,
                comm.created_at,
            ],
        )?;
        Ok(())
    }

    /// Communication history with a supplier, newest first.
    pub fn list_communications(&self, supplier_id: &str) -> DbResult<Vec<SupplierCommunication>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, supplier_id, channel, subject, body, reference_type,
                   reference_id, sent_by, created_at
            FROM supplier_communications
            WHERE supplier_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([supplier_id], |row| {
            Ok(SupplierCommunication {
                id: row.get(0)?,
                supplier_id: row.get(1)?,
                channel: row.get(2)?,
                subject: row.get(3)?,
                body: row.get(4)?,
                reference_type: row.get(5)?,
                reference_id: row.get(6)?,
                sent_by: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;

        let mut comms = Vec::new();
        for row in rows {
            comms.push(row?);
        }
        Ok(comms)
    }
}

fn supplier_from_row(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        id: row.get(0)?,
        name: row.get(1)?,
        contact_person: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        payment_terms: row.get(6)?,
        lead_time_days: row.get(7)?,
        active: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
