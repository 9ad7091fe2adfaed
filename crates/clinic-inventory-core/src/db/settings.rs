//! Clinic configuration database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    now_rfc3339, ClinicSettings, Document, DocumentTemplate, MedicationPrice, PriceTier, StaffMember,
    StaffRole, TemplateKind,
};

impl Database {
    // =========================================================================
    // Clinic settings
    // =========================================================================

    /// Load clinic settings, falling back to defaults when never saved.
    pub fn get_clinic_settings(&self) -> DbResult<ClinicSettings> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT settings FROM clinic_settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ClinicSettings::default()),
        }
    }

    /// Persist clinic settings.
    pub fn save_clinic_settings(&self, settings: &ClinicSettings) -> DbResult<()> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            r#"
            INSERT INTO clinic_settings (id, settings, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET settings = excluded.settings, updated_at = excluded.updated_at
            "#,
            params![json, now_rfc3339()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Price tiers
    // =========================================================================

    /// Insert or update a price tier.
    pub fn upsert_price_tier(&self, tier: &PriceTier) -> DbResult<()> {
        let payment_methods_json = serde_json::to_string(&tier.payment_methods)?;
        let panels_json = serde_json::to_string(&tier.panels)?;

        self.conn.execute(
            r#"
            INSERT INTO price_tiers (
                id, name, description, markup_percent, payment_methods, panels, is_default, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                markup_percent = excluded.markup_percent,
                payment_methods = excluded.payment_methods,
                panels = excluded.panels,
                is_default = excluded.is_default,
                active = excluded.active
            "#,
            params![
                tier.id,
                tier.name,
                tier.description,
                tier.markup_percent,
                payment_methods_json,
                panels_json,
                tier.is_default,
                tier.active,
            ],
        )?;

        if tier.is_default {
            self.set_default_price_tier(&tier.id)?;
        }
        Ok(())
    }

    /// Get a price tier by id.
    pub fn get_price_tier(&self, id: &str) -> DbResult<Option<PriceTier>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, description, markup_percent, payment_methods, panels, is_default, active
                FROM price_tiers WHERE id = ?
                "#,
                [id],
                TierRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List price tiers ordered by name.
    pub fn list_price_tiers(&self, active_only: bool) -> DbResult<Vec<PriceTier>> {
        let sql = if active_only {
            r#"
            SELECT id, name, description, markup_percent, payment_methods, panels, is_default, active
            FROM price_tiers WHERE active = 1 ORDER BY name
            "#
        } else {
            r#"
            SELECT id, name, description, markup_percent, payment_methods, panels, is_default, active
            FROM price_tiers ORDER BY name
            "#
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], TierRow::from_row)?;

        let mut tiers = Vec::new();
        for row in rows {
            tiers.push(row?.try_into()?);
        }
        Ok(tiers)
    }

    /// Delete a price tier (and its medication prices).
    pub fn delete_price_tier(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM price_tiers WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Make `id` the only default tier.
    pub fn set_default_price_tier(&self, id: &str) -> DbResult<()> {
        let exists: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM price_tiers WHERE id = ?", [id], |row| row.get(0))?;
        if exists == 0 {
            return Err(DbError::NotFound(format!("price tier {}", id)));
        }
        self.conn.execute(
            "UPDATE price_tiers SET is_default = CASE WHEN id = ?1 THEN 1 ELSE 0 END",
            [id],
        )?;
        Ok(())
    }

    /// The default tier, if one is set.
    pub fn get_default_price_tier(&self) -> DbResult<Option<PriceTier>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, description, markup_percent, payment_methods, panels, is_default, active
                FROM price_tiers WHERE is_default = 1 AND active = 1 LIMIT 1
                "#,
                [],
                TierRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Set an explicit price for a medication under a tier.
    pub fn set_medication_price(&self, price: &MedicationPrice) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medication_prices (medication_id, price_tier_id, price) VALUES (?1, ?2, ?3)
            ON CONFLICT(medication_id, price_tier_id) DO UPDATE SET price = excluded.price
            "#,
            params![price.medication_id, price.price_tier_id, price.price],
        )?;
        Ok(())
    }

    /// Explicit price of a medication under a tier, if any.
    pub fn get_medication_price(&self, medication_id: &str, tier_id: &str) -> DbResult<Option<f64>> {
        self.conn
            .query_row(
                "SELECT price FROM medication_prices WHERE medication_id = ?1 AND price_tier_id = ?2",
                params![medication_id, tier_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // =========================================================================
    // Staff
    // =========================================================================

    /// Insert or update a staff member.
    pub fn upsert_staff(&self, staff: &StaffMember) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO staff (id, name, email, phone, role, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                role = excluded.role,
                active = excluded.active
            "#,
            params![
                staff.id,
                staff.name,
                staff.email,
                staff.phone,
                staff.role.as_str(),
                staff.active,
                staff.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a staff member by id.
    pub fn get_staff(&self, id: &str) -> DbResult<Option<StaffMember>> {
        self.conn
            .query_row(
                "SELECT id, name, email, phone, role, active, created_at FROM staff WHERE id = ?",
                [id],
                StaffRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List staff ordered by name.
    pub fn list_staff(&self, active_only: bool) -> DbResult<Vec<StaffMember>> {
        let sql = if active_only {
            "SELECT id, name, email, phone, role, active, created_at FROM staff WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id, name, email, phone, role, active, created_at FROM staff ORDER BY name"
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], StaffRow::from_row)?;

        let mut staff = Vec::new();
        for row in rows {
            staff.push(row?.try_into()?);
        }
        Ok(staff)
    }

    // =========================================================================
    // Document templates
    // =========================================================================

    /// Insert or update a template. Saving a default clears other defaults of the same kind.
    pub fn upsert_document_template(&self, template: &DocumentTemplate) -> DbResult<()> {
        if template.is_default {
            self.conn.execute(
                "UPDATE document_templates SET is_default = 0 WHERE kind = ?1 AND id != ?2",
                params![template.kind.as_str(), template.id],
            )?;
        }

        self.conn.execute(
            r#"
            INSERT INTO document_templates (id, kind, name, subject, body, is_default, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                subject = excluded.subject,
                body = excluded.body,
                is_default = excluded.is_default,
                updated_at = ?8
            "#,
            params![
                template.id,
                template.kind.as_str(),
                template.name,
                template.subject,
                template.body,
                template.is_default,
                template.updated_at,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The default template of a kind, if one exists.
    pub fn get_default_template(&self, kind: TemplateKind) -> DbResult<Option<DocumentTemplate>> {
        self.conn
            .query_row(
                r#"
                SELECT id, kind, name, subject, body, is_default, updated_at
                FROM document_templates WHERE kind = ? AND is_default = 1 LIMIT 1
                "#,
                [kind.as_str()],
                TemplateRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all templates.
    pub fn list_document_templates(&self) -> DbResult<Vec<DocumentTemplate>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, name, subject, body, is_default, updated_at FROM document_templates ORDER BY kind, name",
        )?;
        let rows = stmt.query_map([], TemplateRow::from_row)?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?.try_into()?);
        }
        Ok(templates)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Record a stored document.
    pub fn insert_document(&self, doc: &Document) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO documents (
                id, entity_type, entity_id, file_name, storage_path, content_type, size_bytes, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                doc.id,
                doc.entity_type,
                doc.entity_id,
                doc.file_name,
                doc.storage_path,
                doc.content_type,
                doc.size_bytes as i64,
                doc.uploaded_at,
            ],
        )?;
        Ok(())
    }

    /// Get a document by id.
    pub fn get_document(&self, id: &str) -> DbResult<Option<Document>> {
        self.conn
            .query_row(
                r#"
                SELECT id, entity_type, entity_id, file_name, storage_path, content_type, size_bytes, uploaded_at
                FROM documents WHERE id = ?
                "#,
                [id],
                document_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Documents attached to a record, newest first.
    pub fn list_documents(&self, entity_type: &str, entity_id: Option<&str>) -> DbResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, entity_type, entity_id, file_name, storage_path, content_type, size_bytes, uploaded_at
            FROM documents
            WHERE entity_type = ?1 AND (?2 IS NULL OR entity_id = ?2)
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map(params![entity_type, entity_id], document_from_row)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Delete a document record.
    pub fn delete_document(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM documents WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct TierRow {
    id: String,
    name: String,
    description: Option<String>,
    markup_percent: f64,
    payment_methods: String,
    panels: String,
    is_default: bool,
    active: bool,
}

impl TierRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            markup_percent: row.get(3)?,
            payment_methods: row.get(4)?,
            panels: row.get(5)?,
            is_default: row.get(6)?,
            active: row.get(7)?,
        })
    }
}

impl TryFrom<TierRow> for PriceTier {
    type Error = DbError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        Ok(PriceTier {
            id: row.id,
            name: row.name,
            description: row.description,
            markup_percent: row.markup_percent,
            payment_methods: serde_json::from_str(&row.payment_methods)?,
            panels: serde_json::from_str(&row.panels)?,
            is_default: row.is_default,
            active: row.active,
        })
    }
}

struct StaffRow {
    id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    role: String,
    active: bool,
    created_at: String,
}

impl StaffRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            role: row.get(4)?,
            active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = DbError;

    fn try_from(row: StaffRow) -> Result<Self, Self::Error> {
        let role = StaffRole::parse(&row.role)
            .ok_or_else(|| DbError::Constraint(format!("Unknown staff role: {}", row.role)))?;
        Ok(StaffMember {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            role,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

struct TemplateRow {
    id: String,
    kind: String,
    name: String,
    subject: String,
    body: String,
    is_default: bool,
    updated_at: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            name: row.get(2)?,
            subject: row.get(3)?,
            body: row.get(4)?,
            is_default: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl TryFrom<TemplateRow> for DocumentTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let kind = TemplateKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Unknown template kind: {}", row.kind)))?;
        Ok(DocumentTemplate {
            id: row.id,
            kind,
            name: row.name,
            subject: row.subject,
            body: row.body,
            is_default: row.is_default,
            updated_at: row.updated_at,
        })
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let size: i64 = row.get(6)?;
    Ok(Document {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        file_name: row.get(3)?,
        storage_path: row.get(4)?,
        content_type: row.get(5)?,
        size_bytes: size.max(0) as u64,
        uploaded_at: row.get(7)?,
    })
}
