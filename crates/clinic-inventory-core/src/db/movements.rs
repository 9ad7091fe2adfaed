//! Stock movement ledger operations.

use rusqlite::{params, Row};

use super::{date_from_sql, date_to_sql, Database, DbError, DbResult};
use crate::models::{MovementType, StockMovement};

const MOVEMENT_COLUMNS: &str = "id, medication_id, movement_type, quantity, batch_number, expiry_date, \
     unit_cost, reference_type, reference_id, notes, performed_by, created_at";

impl Database {
    /// Append a movement to the ledger.
    pub fn insert_movement(&self, movement: &StockMovement) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO stock_movements (
                id, medication_id, movement_type, quantity, batch_number, expiry_date,
                unit_cost, reference_type, reference_id, notes, performed_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                movement.id,
                movement.medication_id,
                movement.movement_type.as_str(),
                movement.quantity,
                movement.batch_number,
                date_to_sql(movement.expiry_date),
                movement.unit_cost,
                movement.reference_type,
                movement.reference_id,
                movement.notes,
                movement.performed_by,
                movement.created_at,
            ],
        )?;
        Ok(())
    }

    /// All movements for one medication, oldest first.
    pub fn list_movements_for_medication(&self, medication_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE medication_id = ? ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        self.query_movements(&sql, params![medication_id])
    }

    /// Movements created in `[from, to)` (RFC 3339 / ISO strings), oldest first.
    pub fn list_movements(&self, from: &str, to: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        self.query_movements(&sql, params![from, to])
    }

    /// The whole ledger, oldest first.
    pub fn list_all_movements(&self) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        self.query_movements(&sql, [])
    }

    /// Movements created by a given record (e.g., a purchase order).
    pub fn list_movements_by_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE reference_type = ?1 AND reference_id = ?2 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        self.query_movements(&sql, params![reference_type, reference_id])
    }

    fn query_movements<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<StockMovement>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, MovementRow::from_row)?;

        let mut movements = Vec::new();
        for row in rows {
            movements.push(row?.try_into()?);
        }
        Ok(movements)
    }
}

/// Intermediate row struct for database mapping.
struct MovementRow {
    id: String,
    medication_id: String,
    movement_type: String,
    quantity: f64,
    batch_number: Option<String>,
    expiry_date: Option<String>,
    unit_cost: Option<f64>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    notes: Option<String>,
    performed_by: Option<String>,
    created_at: String,
}

impl MovementRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            medication_id: row.get(1)?,
            movement_type: row.get(2)?,
            quantity: row.get(3)?,
            batch_number: row.get(4)?,
            expiry_date: row.get(5)?,
            unit_cost: row.get(6)?,
            reference_type: row.get(7)?,
            reference_id: row.get(8)?,
            notes: row.get(9)?,
            performed_by: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::parse(&row.movement_type).ok_or_else(|| {
            DbError::Constraint(format!("Unknown movement type: {}", row.movement_type))
        })?;

        Ok(StockMovement {
            id: row.id,
            medication_id: row.medication_id,
            movement_type,
            quantity: row.quantity,
            batch_number: row.batch_number,
            expiry_date: date_from_sql(row.expiry_date)?,
            unit_cost: row.unit_cost,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            notes: row.notes,
            performed_by: row.performed_by,
            created_at: row.created_at,
        })
    }
}
