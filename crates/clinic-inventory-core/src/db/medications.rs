//! Medication catalog database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{now_rfc3339, Medication};

const MEDICATION_COLUMNS: &str = "id, name, generic_name, category, dosage_form, strength, unit, \
     reorder_level, average_cost, selling_price, default_supplier_id, active, created_at, updated_at";

impl Database {
    /// Insert a new medication.
    pub fn insert_medication(&self, med: &Medication) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medications (
                id, name, generic_name, category, dosage_form, strength, unit,
                reorder_level, average_cost, selling_price, default_supplier_id,
                active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                med.id,
                med.name,
                med.generic_name,
                med.category,
                med.dosage_form,
                med.strength,
                med.unit,
                med.reorder_level,
                med.average_cost,
                med.selling_price,
                med.default_supplier_id,
                med.active,
                med.created_at,
                med.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing medication.
    pub fn update_medication(&self, med: &Medication) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medications SET
                name = ?2,
                generic_name = ?3,
                category = ?4,
                dosage_form = ?5,
                strength = ?6,
                unit = ?7,
                reorder_level = ?8,
                average_cost = ?9,
                selling_price = ?10,
                default_supplier_id = ?11,
                active = ?12,
                updated_at = ?13
            WHERE id = ?1
            "#,
            params![
                med.id,
                med.name,
                med.generic_name,
                med.category,
                med.dosage_form,
                med.strength,
                med.unit,
                med.reorder_level,
                med.average_cost,
                med.selling_price,
                med.default_supplier_id,
                med.active,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert the medication, or update it when the id already exists.
    pub fn upsert_medication(&self, med: &Medication) -> DbResult<()> {
        if !self.update_medication(med)? {
            self.insert_medication(med)?;
        }
        Ok(())
    }

    /// Get a medication by id.
    pub fn get_medication(&self, id: &str) -> DbResult<Option<Medication>> {
        let sql = format!("SELECT {} FROM medications WHERE id = ?", MEDICATION_COLUMNS);
        self.conn
            .query_row(&sql, [id], medication_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Get a medication by id, failing when it does not exist.
    pub fn require_medication(&self, id: &str) -> DbResult<Medication> {
        self.get_medication(id)?
            .ok_or_else(|| DbError::NotFound(format!("medication {}", id)))
    }

    /// List medications ordered by name.
    pub fn list_medications(&self, active_only: bool) -> DbResult<Vec<Medication>> {
        let sql = if active_only {
            format!(
                "SELECT {} FROM medications WHERE active = 1 ORDER BY name",
                MEDICATION_COLUMNS
            )
        } else {
            format!("SELECT {} FROM medications ORDER BY name", MEDICATION_COLUMNS)
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], medication_from_row)?;

        let mut meds = Vec::new();
        for row in rows {
            meds.push(row?);
        }
        Ok(meds)
    }

    /// Search active medications using FTS5 (BM25 ranking).
    pub fn search_medications(&self, query: &str, limit: usize) -> DbResult<Vec<Medication>> {
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT m.id, m.name, m.generic_name, m.category, m.dosage_form, m.strength, m.unit,
                   m.reorder_level, m.average_cost, m.selling_price, m.default_supplier_id,
                   m.active, m.created_at, m.updated_at
            FROM medications m
            JOIN medications_fts fts ON m.rowid = fts.rowid
            WHERE medications_fts MATCH ?
            AND m.active = 1
            ORDER BY bm25(medications_fts)
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![escaped_query, limit as i64], medication_from_row)?;

        let mut meds = Vec::new();
        for row in rows {
            meds.push(row?);
        }
        Ok(meds)
    }

    /// Mark medication as inactive (soft delete).
    pub fn deactivate_medication(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medications SET active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Store a new moving-average unit cost.
    pub fn update_average_cost(&self, id: &str, average_cost: f64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medications SET average_cost = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, average_cost, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

fn medication_from_row(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        name: row.get(1)?,
        generic_name: row.get(2)?,
        category: row.get(3)?,
        dosage_form: row.get(4)?,
        strength: row.get(5)?,
        unit: row.get(6)?,
        reorder_level: row.get(7)?,
        average_cost: row.get(8)?,
        selling_price: row.get(9)?,
        default_supplier_id: row.get(10)?,
        active: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Escape special FTS5 characters and prepare query for prefix matching.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut med = Medication::new("Amoxicillin 500mg capsules".into(), "capsule".into());
        med.generic_name = Some("amoxicillin".into());
        med.reorder_level = 100.0;
        med.selling_price = 0.5;
        db.insert_medication(&med).unwrap();

        let retrieved = db.get_medication(&med.id).unwrap().unwrap();
        assert_eq!(retrieved, med);
    }

    #[test]
    fn test_upsert_updates() {
        let db = setup_db();

        let mut med = Medication::new("Original".into(), "tablet".into());
        db.upsert_medication(&med).unwrap();

        med.name = "Renamed".into();
        db.upsert_medication(&med).unwrap();

        let retrieved = db.get_medication(&med.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Renamed");
        assert_eq!(db.list_medications(false).unwrap().len(), 1);
    }

    #[test]
    fn test_search_medications() {
        let db = setup_db();

        let mut med1 = Medication::new("Augmentin 625mg".into(), "tablet".into());
        med1.generic_name = Some("amoxicillin clavulanate".into());
        db.insert_medication(&med1).unwrap();

        let med2 = Medication::new("Paracetamol 500mg".into(), "tablet".into());
        db.insert_medication(&med2).unwrap();

        let results = db.search_medications("augmentin", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, med1.id);

        // By generic name
        let results = db.search_medications("amoxi", 10).unwrap();
        assert_eq!(results.len(), 1);

        // Punctuation only
        assert!(db.search_medications("***", 10).unwrap().is_empty());
    }

    #[test]
    fn test_deactivate_hides_from_search() {
        let db = setup_db();

        let med = Medication::new("Ibuprofen 400mg".into(), "tablet".into());
        db.insert_medication(&med).unwrap();
        db.deactivate_medication(&med.id).unwrap();

        assert!(db.search_medications("ibuprofen", 10).unwrap().is_empty());
        assert_eq!(db.list_medications(true).unwrap().len(), 0);
        assert!(!db.get_medication(&med.id).unwrap().unwrap().active);
    }

    #[test]
    fn test_update_average_cost() {
        let db = setup_db();

        let med = Medication::new("Cetirizine".into(), "tablet".into());
        db.insert_medication(&med).unwrap();

        assert!(db.update_average_cost(&med.id, 0.42).unwrap());
        assert_eq!(db.require_medication(&med.id).unwrap().average_cost, 0.42);
        assert!(!db.update_average_cost("missing", 1.0).unwrap());
        assert!(matches!(db.require_medication("missing"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_updates_keep_rfc3339_timestamps() {
        let db = setup_db();

        let mut med = Medication::new("Metformin 500mg".into(), "tablet".into());
        db.insert_medication(&med).unwrap();

        db.update_average_cost(&med.id, 0.3).unwrap();
        let stored = db.require_medication(&med.id).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.updated_at).is_ok());

        med.name = "Metformin 850mg".into();
        db.update_medication(&med).unwrap();
        db.deactivate_medication(&med.id).unwrap();
        let stored = db.require_medication(&med.id).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.updated_at).is_ok());
    }
}
