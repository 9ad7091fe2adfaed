//! Quotation request and quotation database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{date_from_sql, date_to_sql, Database, DbError, DbResult};
use crate::models::{now_rfc3339, Quotation, QuotationRequest, QuotationStatus, RequestStatus};

const REQUEST_COLUMNS: &str =
    "id, request_number, supplier_ids, items, status, due_date, notes, created_at, updated_at";

const QUOTATION_COLUMNS: &str = "id, quotation_request_id, supplier_id, quotation_number, items, \
     valid_until, status, converted_po_id, notes, created_at, updated_at";

impl Database {
    /// Insert a new quotation request.
    pub fn insert_quotation_request(&self, request: &QuotationRequest) -> DbResult<()> {
        let supplier_ids_json = serde_json::to_string(&request.supplier_ids)?;
        let items_json = serde_json::to_string(&request.items)?;

        self.conn.execute(
            r#"
            INSERT INTO quotation_requests (
                id, request_number, supplier_ids, items, status, due_date, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                request.id,
                request.request_number,
                supplier_ids_json,
                items_json,
                request.status.as_str(),
                date_to_sql(request.due_date),
                request.notes,
                request.created_at,
                request.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a quotation request by id.
    pub fn get_quotation_request(&self, id: &str) -> DbResult<Option<QuotationRequest>> {
        let sql = format!("SELECT {} FROM quotation_requests WHERE id = ?", REQUEST_COLUMNS);
        self.conn
            .query_row(&sql, [id], RequestRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List quotation requests, newest first.
    pub fn list_quotation_requests(&self) -> DbResult<Vec<QuotationRequest>> {
        let sql = format!(
            "SELECT {} FROM quotation_requests ORDER BY created_at DESC, rowid DESC",
            REQUEST_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], RequestRow::from_row)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?.try_into()?);
        }
        Ok(requests)
    }

    /// Set a quotation request's status.
    pub fn update_quotation_request_status(&self, id: &str, status: RequestStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE quotation_requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a supplier quotation.
    pub fn insert_quotation(&self, quotation: &Quotation) -> DbResult<()> {
        let items_json = serde_json::to_string(&quotation.items)?;

        self.conn.execute(
            r#"
            INSERT INTO quotations (
                id, quotation_request_id, supplier_id, quotation_number, items,
                valid_until, status, converted_po_id, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                quotation.id,
                quotation.quotation_request_id,
                quotation.supplier_id,
                quotation.quotation_number,
                items_json,
                date_to_sql(quotation.valid_until),
                quotation.status.as_str(),
                quotation.converted_po_id,
                quotation.notes,
                quotation.created_at,
                quotation.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a quotation by id.
    pub fn get_quotation(&self, id: &str) -> DbResult<Option<Quotation>> {
        let sql = format!("SELECT {} FROM quotations WHERE id = ?", QUOTATION_COLUMNS);
        self.conn
            .query_row(&sql, [id], QuotationRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a quotation, failing when it does not exist.
    pub fn require_quotation(&self, id: &str) -> DbResult<Quotation> {
        self.get_quotation(id)?
            .ok_or_else(|| DbError::NotFound(format!("quotation {}", id)))
    }

    /// Quotations received against a request, oldest first.
    pub fn list_quotations_for_request(&self, request_id: &str) -> DbResult<Vec<Quotation>> {
        let sql = format!(
            "SELECT {} FROM quotations WHERE quotation_request_id = ? ORDER BY created_at, rowid",
            QUOTATION_COLUMNS
        );
        self.query_quotations(&sql, params![request_id])
    }

    /// Quotations in a given status.
    pub fn list_quotations_by_status(&self, status: QuotationStatus) -> DbResult<Vec<Quotation>> {
        let sql = format!(
            "SELECT {} FROM quotations WHERE status = ? ORDER BY created_at, rowid",
            QUOTATION_COLUMNS
        );
        self.query_quotations(&sql, params![status.as_str()])
    }

    fn query_quotations<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<Quotation>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, QuotationRow::from_row)?;

        let mut quotations = Vec::new();
        for row in rows {
            quotations.push(row?.try_into()?);
        }
        Ok(quotations)
    }

    /// Set a quotation's status (and the PO it was converted to, if any).
    pub fn update_quotation_status(
        &self,
        id: &str,
        status: QuotationStatus,
        converted_po_id: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE quotations SET
                status = ?2,
                converted_po_id = COALESCE(?3, converted_po_id),
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![id, status.as_str(), converted_po_id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct RequestRow {
    id: String,
    request_number: String,
    supplier_ids: String,
    items: String,
    status: String,
    due_date: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_number: row.get(1)?,
            supplier_ids: row.get(2)?,
            items: row.get(3)?,
            status: row.get(4)?,
            due_date: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl TryFrom<RequestRow> for QuotationRequest {
    type Error = DbError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = RequestStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown request status: {}", row.status)))?;

        Ok(QuotationRequest {
            id: row.id,
            request_number: row.request_number,
            supplier_ids: serde_json::from_str(&row.supplier_ids)?,
            items: serde_json::from_str(&row.items)?,
            status,
            due_date: date_from_sql(row.due_date)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct QuotationRow {
    id: String,
    quotation_request_id: Option<String>,
    supplier_id: String,
    quotation_number: Option<String>,
    items: String,
    valid_until: Option<String>,
    status: String,
    converted_po_id: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl QuotationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            quotation_request_id: row.get(1)?,
            supplier_id: row.get(2)?,
            quotation_number: row.get(3)?,
            items: row.get(4)?,
            valid_until: row.get(5)?,
            status: row.get(6)?,
            converted_po_id: row.get(7)?,
            notes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl TryFrom<QuotationRow> for Quotation {
    type Error = DbError;

    fn try_from(row: QuotationRow) -> Result<Self, Self::Error> {
        let status = QuotationStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown quotation status: {}", row.status)))?;

        Ok(Quotation {
            id: row.id,
            quotation_request_id: row.quotation_request_id,
            supplier_id: row.supplier_id,
            quotation_number: row.quotation_number,
            items: serde_json::from_str(&row.items)?,
            valid_until: date_from_sql(row.valid_until)?,
            status,
            converted_po_id: row.converted_po_id,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
