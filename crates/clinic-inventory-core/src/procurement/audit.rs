//! Hash-chained audit trail for purchase orders.
//!
//! Each entry commits to the previous entry's hash, so editing or removing
//! any stored entry breaks every hash after it.

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::db::{Database, DbResult};
use crate::models::{new_id, now_rfc3339, AuditAction, PoStatus, PurchaseOrderAudit};

/// SHA-256 of `data` as lowercase hex.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical JSON of the hashed fields (object keys sorted).
fn canonical_payload(entry: &PurchaseOrderAudit) -> String {
    json!({
        "purchase_order_id": entry.purchase_order_id,
        "action": entry.action.as_str(),
        "from_status": entry.from_status.map(|s| s.as_str()),
        "to_status": entry.to_status.map(|s| s.as_str()),
        "details": entry.details,
        "performed_by": entry.performed_by,
        "created_at": entry.created_at,
    })
    .to_string()
}

/// Hash of an entry chained onto `prev_hash`.
pub fn compute_entry_hash(prev_hash: &str, entry: &PurchaseOrderAudit) -> String {
    let mut data = prev_hash.as_bytes().to_vec();
    data.extend_from_slice(canonical_payload(entry).as_bytes());
    hash_data(&data)
}

/// Index of the first entry that does not chain correctly, if any.
pub fn verify_chain(entries: &[PurchaseOrderAudit]) -> Option<usize> {
    let mut expected_prev = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.prev_hash != expected_prev || entry.entry_hash != compute_entry_hash(&entry.prev_hash, entry) {
            return Some(i);
        }
        expected_prev = entry.entry_hash.clone();
    }
    None
}

/// Append an entry to a purchase order's chain.
pub(crate) fn append_audit(
    db: &Database,
    purchase_order_id: &str,
    action: AuditAction,
    from_status: Option<PoStatus>,
    to_status: Option<PoStatus>,
    details: serde_json::Value,
    performed_by: Option<String>,
) -> DbResult<PurchaseOrderAudit> {
    let mut entry = PurchaseOrderAudit {
        id: new_id(),
        purchase_order_id: purchase_order_id.to_string(),
        action,
        from_status,
        to_status,
        details,
        performed_by,
        created_at: now_rfc3339(),
        prev_hash: db.last_po_audit_hash(purchase_order_id)?,
        entry_hash: String::new(),
    };
    entry.entry_hash = compute_entry_hash(&entry.prev_hash, &entry);
    db.insert_po_audit(&entry)?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PurchaseOrder, Supplier};

    fn setup() -> (Database, PurchaseOrder) {
        let db = Database::open_in_memory().unwrap();
        let supplier = Supplier::new("MedSupply Co".into());
        db.upsert_supplier(&supplier).unwrap();
        let po = PurchaseOrder::new("PO-1".into(), supplier.id);
        db.insert_purchase_order(&po).unwrap();
        (db, po)
    }

    #[test]
    fn test_hash_data() {
        assert_eq!(
            hash_data(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_chain_links_entries() {
        let (db, po) = setup();

        let first = append_audit(&db, &po.id, AuditAction::Created, None, Some(PoStatus::Draft), json!({}), None)
            .unwrap();
        let second = append_audit(
            &db,
            &po.id,
            AuditAction::StatusChanged,
            Some(PoStatus::Draft),
            Some(PoStatus::Submitted),
            json!({"note": "ready"}),
            Some("buyer".into()),
        )
        .unwrap();

        assert_eq!(first.prev_hash, "");
        assert_eq!(second.prev_hash, first.entry_hash);

        let stored = db.list_po_audit(&po.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(verify_chain(&stored), None);
    }

    #[test]
    fn test_tampering_is_detected() {
        let (db, po) = setup();
        for to in [PoStatus::Draft, PoStatus::Submitted, PoStatus::Approved] {
            append_audit(&db, &po.id, AuditAction::StatusChanged, None, Some(to), json!({}), None).unwrap();
        }

        let mut entries = db.list_po_audit(&po.id).unwrap();
        assert_eq!(verify_chain(&entries), None);

        entries[1].performed_by = Some("mallory".into());
        assert_eq!(verify_chain(&entries), Some(1));

        let mut entries = db.list_po_audit(&po.id).unwrap();
        entries.remove(0);
        assert_eq!(verify_chain(&entries), Some(0));
    }
}
