//! SQLite schema definition.

/// Complete database schema for the clinic inventory store.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Suppliers
-- ============================================================================

CREATE TABLE IF NOT EXISTS suppliers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    contact_person TEXT,
    email TEXT,
    phone TEXT,
    address TEXT,
    payment_terms TEXT,
    lead_time_days INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_suppliers_name ON suppliers(name);

-- ============================================================================
-- Medications
-- ============================================================================

CREATE TABLE IF NOT EXISTS medications (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    generic_name TEXT,
    category TEXT,
    dosage_form TEXT,
    strength TEXT,
    unit TEXT NOT NULL DEFAULT 'unit',
    reorder_level REAL NOT NULL DEFAULT 0 CHECK (reorder_level >= 0),
    average_cost REAL NOT NULL DEFAULT 0 CHECK (average_cost >= 0),
    selling_price REAL NOT NULL DEFAULT 0 CHECK (selling_price >= 0),
    default_supplier_id TEXT REFERENCES suppliers(id),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- FTS5 virtual table for medication search
CREATE VIRTUAL TABLE IF NOT EXISTS medications_fts USING fts5(
    name,
    generic_name,
    category,
    content='medications',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS medications_ai AFTER INSERT ON medications BEGIN
    INSERT INTO medications_fts(rowid, name, generic_name, category)
    VALUES (new.rowid, new.name, new.generic_name, new.category);
END;

CREATE TRIGGER IF NOT EXISTS medications_ad AFTER DELETE ON medications BEGIN
    INSERT INTO medications_fts(medications_fts, rowid, name, generic_name, category)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.category);
END;

CREATE TRIGGER IF NOT EXISTS medications_au AFTER UPDATE ON medications BEGIN
    INSERT INTO medications_fts(medications_fts, rowid, name, generic_name, category)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.category);
    INSERT INTO medications_fts(rowid, name, generic_name, category)
    VALUES (new.rowid, new.name, new.generic_name, new.category);
END;

CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name);

-- ============================================================================
-- Stock Movements (append-only ledger)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_movements (
    id TEXT PRIMARY KEY,
    medication_id TEXT NOT NULL REFERENCES medications(id),
    movement_type TEXT NOT NULL CHECK (movement_type IN (
        'receipt', 'dispensed', 'adjustment', 'expired', 'damaged',
        'returned_to_supplier', 'transfer_in', 'transfer_out'
    )),
    quantity REAL NOT NULL,
    batch_number TEXT,
    expiry_date TEXT,                            -- YYYY-MM-DD
    unit_cost REAL,
    reference_type TEXT,
    reference_id TEXT,
    notes TEXT,
    performed_by TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_movements_medication ON stock_movements(medication_id);
CREATE INDEX IF NOT EXISTS idx_movements_created ON stock_movements(created_at);
CREATE INDEX IF NOT EXISTS idx_movements_batch ON stock_movements(medication_id, batch_number, expiry_date);

-- ============================================================================
-- Purchase Orders
-- ============================================================================

CREATE TABLE IF NOT EXISTS purchase_orders (
    id TEXT PRIMARY KEY,
    po_number TEXT NOT NULL UNIQUE,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN (
        'draft', 'submitted', 'approved', 'partially_received', 'received', 'cancelled'
    )),
    order_date TEXT NOT NULL,
    expected_delivery_date TEXT,
    subtotal REAL NOT NULL DEFAULT 0,
    tax_amount REAL NOT NULL DEFAULT 0,
    total_amount REAL NOT NULL DEFAULT 0,
    quotation_id TEXT,
    notes TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_po_status ON purchase_orders(status);
CREATE INDEX IF NOT EXISTS idx_po_supplier ON purchase_orders(supplier_id);

CREATE TABLE IF NOT EXISTS purchase_order_items (
    id TEXT PRIMARY KEY,
    purchase_order_id TEXT NOT NULL REFERENCES purchase_orders(id) ON DELETE CASCADE,
    medication_id TEXT NOT NULL REFERENCES medications(id),
    quantity_ordered REAL NOT NULL CHECK (quantity_ordered > 0),
    quantity_received REAL NOT NULL DEFAULT 0 CHECK (quantity_received >= 0),
    unit_price REAL NOT NULL CHECK (unit_price >= 0),
    total_price REAL NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    CHECK (quantity_received <= quantity_ordered)
);

CREATE INDEX IF NOT EXISTS idx_po_items_po ON purchase_order_items(purchase_order_id);

-- Hash-chained audit trail per purchase order
CREATE TABLE IF NOT EXISTS purchase_order_audit (
    id TEXT PRIMARY KEY,
    purchase_order_id TEXT NOT NULL REFERENCES purchase_orders(id),
    seq INTEGER NOT NULL,
    action TEXT NOT NULL,
    from_status TEXT,
    to_status TEXT,
    details TEXT NOT NULL DEFAULT '{}',          -- JSON object
    performed_by TEXT,
    created_at TEXT NOT NULL,
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL,
    UNIQUE (purchase_order_id, seq)
);

-- ============================================================================
-- Quotations
-- ============================================================================

CREATE TABLE IF NOT EXISTS quotation_requests (
    id TEXT PRIMARY KEY,
    request_number TEXT NOT NULL UNIQUE,
    supplier_ids TEXT NOT NULL DEFAULT '[]',     -- JSON array of supplier ids
    items TEXT NOT NULL DEFAULT '[]',            -- JSON array of QuotationRequestItem
    status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'sent', 'closed')),
    due_date TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS quotations (
    id TEXT PRIMARY KEY,
    quotation_request_id TEXT REFERENCES quotation_requests(id),
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    quotation_number TEXT,
    items TEXT NOT NULL DEFAULT '[]',            -- JSON array of QuotationItem
    valid_until TEXT,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN (
        'pending', 'accepted', 'rejected', 'expired', 'converted'
    )),
    converted_po_id TEXT REFERENCES purchase_orders(id),
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_quotations_request ON quotations(quotation_request_id);

-- ============================================================================
-- Supplier Communication Log
-- ============================================================================

CREATE TABLE IF NOT EXISTS supplier_communications (
    id TEXT PRIMARY KEY,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    channel TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    reference_type TEXT,
    reference_id TEXT,
    sent_by TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_communications_supplier ON supplier_communications(supplier_id);

-- ============================================================================
-- Clinic Configuration
-- ============================================================================

-- Single row, JSON document
CREATE TABLE IF NOT EXISTS clinic_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    settings TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS price_tiers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    markup_percent REAL NOT NULL DEFAULT 0,
    payment_methods TEXT NOT NULL DEFAULT '[]',  -- JSON array of codes
    panels TEXT NOT NULL DEFAULT '[]',           -- JSON array of panel names
    is_default INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS medication_prices (
    medication_id TEXT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
    price_tier_id TEXT NOT NULL REFERENCES price_tiers(id) ON DELETE CASCADE,
    price REAL NOT NULL CHECK (price >= 0),
    PRIMARY KEY (medication_id, price_tier_id)
);

CREATE TABLE IF NOT EXISTS staff (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    role TEXT NOT NULL CHECK (role IN (
        'admin', 'doctor', 'nurse', 'pharmacist', 'receptionist', 'procurement'
    )),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS document_templates (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('purchase_order', 'quotation_request', 'receipt', 'invoice')),
    name TEXT NOT NULL,
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT,
    file_name TEXT NOT NULL,
    storage_path TEXT NOT NULL UNIQUE,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_documents_entity ON documents(entity_type, entity_id);

-- ============================================================================
-- Sequences (document numbering)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL DEFAULT 0
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO medications (id, name, generic_name) VALUES (?, ?, ?)",
            ["med-1", "Augmentin 625mg", "amoxicillin clavulanate"],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM medications_fts WHERE medications_fts MATCH 'augmentin'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM medications_fts WHERE medications_fts MATCH 'amoxicillin'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_movement_type_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO medications (id, name) VALUES ('med-1', 'Test')", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO stock_movements (id, medication_id, movement_type, quantity) VALUES ('m1', 'med-1', 'stolen', 1)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO stock_movements (id, medication_id, movement_type, quantity) VALUES ('m1', 'med-1', 'receipt', 1)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_received_cannot_exceed_ordered() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO suppliers (id, name) VALUES ('s1', 'Supplier')", [])
            .unwrap();
        conn.execute("INSERT INTO medications (id, name) VALUES ('med-1', 'Test')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO purchase_orders (id, po_number, supplier_id, order_date) VALUES ('po1', 'PO-1', 's1', '2025-01-01')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO purchase_order_items (id, purchase_order_id, medication_id, quantity_ordered, quantity_received, unit_price, total_price)
             VALUES ('i1', 'po1', 'med-1', 5, 6, 1, 5)",
            [],
        );
        assert!(result.is_err());
    }
}
