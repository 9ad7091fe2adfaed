//! End-to-end procurement tests against a file-backed database.

use chrono::NaiveDate;
use clinic_inventory_core::db::Database;
use clinic_inventory_core::export::{PurchaseOrderExport, ReportExport};
use clinic_inventory_core::inventory::{BatchInventoryManager, InventoryValueCalculator};
use clinic_inventory_core::models::{
    AuditAction, Medication, PoStatus, Quotation, QuotationItem, QuotationRequestItem,
    QuotationStatus, Supplier,
};
use clinic_inventory_core::procurement::{
    ProcurementError, ProcurementOptions, PurchaseOrderService, QuotationService, ReceiptLine,
    SupplierMessenger,
};
use clinic_inventory_core::storage::DocumentStorage;
use tempfile::TempDir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn quoted(medication_id: &str, description: &str, quantity: f64, unit_price: f64) -> QuotationItem {
    QuotationItem {
        medication_id: Some(medication_id.to_string()),
        description: description.to_string(),
        quantity,
        unit_price,
    }
}

struct Fixture {
    _dir: TempDir,
    db: Database,
    alpha: Supplier,
    beta: Supplier,
    amox: Medication,
    para: Medication,
}

fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("clinic.db")).unwrap();

    let mut settings = db.get_clinic_settings().unwrap();
    settings.clinic_name = "Riverside Clinic".into();
    settings.tax_rate = 10.0;
    db.save_clinic_settings(&settings).unwrap();

    let mut alpha = Supplier::new("Alpha Pharma".into());
    alpha.contact_person = Some("Dana".into());
    alpha.email = Some("orders@alpha.example".into());
    db.upsert_supplier(&alpha).unwrap();
    let beta = Supplier::new("Beta Medical".into());
    db.upsert_supplier(&beta).unwrap();

    let mut amox = Medication::new("Amoxicillin 500mg capsules".into(), "capsule".into());
    amox.reorder_level = 50.0;
    db.insert_medication(&amox).unwrap();
    let para = Medication::new("Paracetamol 500mg tablets".into(), "tablet".into());
    db.insert_medication(&para).unwrap();

    Fixture {
        _dir: dir,
        db,
        alpha,
        beta,
        amox,
        para,
    }
}

#[test]
fn test_quotation_to_stock_flow() {
    let f = setup();
    let today = date(2025, 1, 14);
    let options = ProcurementOptions::default();
    let quotations = QuotationService::new(&f.db, options.clone()).as_of(today);
    let orders = PurchaseOrderService::new(&f.db, options).as_of(today);

    // Request prices from both suppliers
    let request = quotations
        .create_request(
            vec![f.alpha.id.clone(), f.beta.id.clone()],
            vec![
                QuotationRequestItem {
                    medication_id: f.amox.id.clone(),
                    quantity: 100.0,
                    notes: None,
                },
                QuotationRequestItem {
                    medication_id: f.para.id.clone(),
                    quantity: 200.0,
                    notes: None,
                },
            ],
            Some(date(2025, 1, 20)),
            None,
        )
        .unwrap();
    assert_eq!(request.request_number, "RFQ-20250114-0001");

    let message = SupplierMessenger::new(&f.db)
        .compose_quotation_request(&request.id, &f.alpha.id)
        .unwrap();
    assert_eq!(message.subject, "Request for quotation RFQ-20250114-0001");
    assert!(message.body.contains("Amoxicillin 500mg capsules"));
    quotations.mark_request_sent(&request.id).unwrap();

    // Alpha quotes everything, Beta only amoxicillin but cheaper
    let mut from_alpha = Quotation::new(
        f.alpha.id.clone(),
        vec![
            quoted(&f.amox.id, "Amoxicillin 500mg", 100.0, 1.0),
            quoted(&f.para.id, "Paracetamol 500mg", 200.0, 0.1),
        ],
    );
    from_alpha.quotation_request_id = Some(request.id.clone());
    from_alpha.valid_until = Some(date(2025, 2, 1));
    let from_alpha = quotations.record_quotation(from_alpha).unwrap();

    let mut from_beta = Quotation::new(
        f.beta.id.clone(),
        vec![quoted(&f.amox.id, "Amoxil 500", 100.0, 0.9)],
    );
    from_beta.quotation_request_id = Some(request.id.clone());
    let from_beta = quotations.record_quotation(from_beta).unwrap();

    let comparison = quotations.compare(&request.id).unwrap();
    assert_eq!(comparison.quotations[0].quotation_id, from_beta.id);
    assert_eq!(comparison.cheapest_complete.as_deref(), Some(from_alpha.id.as_str()));
    let amox_best = comparison
        .best_prices
        .iter()
        .find(|b| b.medication_id == f.amox.id)
        .unwrap();
    assert_eq!(amox_best.supplier_id, f.beta.id);

    // Converting the complete quotation closes out the other one
    let po = quotations
        .convert_to_purchase_order(&from_alpha.id, Some("pharmacist".into()))
        .unwrap();
    assert_eq!(po.po_number, "PO-20250114-0001");
    assert_eq!(po.status, PoStatus::Draft);
    assert_eq!(po.quotation_id.as_deref(), Some(from_alpha.id.as_str()));
    assert_eq!(po.subtotal, 120.0);
    assert_eq!(po.tax_amount, 12.0);
    assert_eq!(po.total_amount, 132.0);
    assert_eq!(
        f.db.require_quotation(&from_beta.id).unwrap().status,
        QuotationStatus::Rejected
    );
    assert!(matches!(
        quotations.convert_to_purchase_order(&from_alpha.id, None),
        Err(ProcurementError::InvalidState(_))
    ));

    orders.submit(&po.id, None).unwrap();
    let po = orders.approve(&po.id, None).unwrap();
    assert_eq!(po.status, PoStatus::Approved);

    let amox_item = po.items.iter().find(|i| i.medication_id == f.amox.id).unwrap().id.clone();
    let para_item = po.items.iter().find(|i| i.medication_id == f.para.id).unwrap().id.clone();

    // Two deliveries
    let first = orders
        .receive_items(
            &po.id,
            vec![ReceiptLine {
                item_id: amox_item.clone(),
                quantity: 60.0,
                batch_number: Some("A-1".into()),
                expiry_date: Some(date(2026, 6, 30)),
                unit_cost: None,
            }],
            Some("clerk".into()),
        )
        .unwrap();
    assert_eq!(first.status, PoStatus::PartiallyReceived);

    let second = orders
        .receive_items(
            &po.id,
            vec![
                ReceiptLine {
                    item_id: amox_item,
                    quantity: 40.0,
                    batch_number: Some("A-2".into()),
                    expiry_date: Some(date(2025, 12, 31)),
                    unit_cost: None,
                },
                ReceiptLine {
                    item_id: para_item,
                    quantity: 200.0,
                    batch_number: Some("P-1".into()),
                    expiry_date: Some(date(2027, 3, 1)),
                    unit_cost: Some(0.12),
                },
            ],
            Some("clerk".into()),
        )
        .unwrap();
    assert!(second.is_fully_received());
    assert_eq!(second.variances.len(), 1);
    assert!(second.variances[0].variance_percent > 10.0);

    // Stock and FIFO
    let inventory = BatchInventoryManager::new(&f.db).as_of(today);
    assert_eq!(inventory.current_stock(&f.amox.id).unwrap(), 100.0);
    let next = inventory.recommend(&f.amox.id).unwrap().unwrap();
    assert_eq!(next.key.batch_number.as_deref(), Some("A-2"));

    let dispensed = inventory.dispense_fifo(&f.amox.id, 50.0, None, Some("rx-1")).unwrap();
    assert_eq!(dispensed.len(), 2);
    assert_eq!(dispensed[0].batch_number.as_deref(), Some("A-2"));
    assert_eq!(dispensed[0].quantity, 40.0);
    assert_eq!(dispensed[1].batch_number.as_deref(), Some("A-1"));
    assert_eq!(dispensed[1].quantity, 10.0);

    // 50 x 1.00 + 200 x 0.12
    let valuation = InventoryValueCalculator::new(&f.db).total_value().unwrap();
    assert_eq!(valuation.total_value, 74.0);

    // Audit trail
    let trail = orders.audit_trail(&po.id).unwrap();
    assert_eq!(trail.first().unwrap().action, AuditAction::Created);
    assert_eq!(
        trail.iter().filter(|e| e.action == AuditAction::ItemsReceived).count(),
        2
    );
    assert_eq!(orders.verify_audit_chain(&po.id).unwrap(), None);

    // Exports and attachments
    let stored = orders.get(&po.id).unwrap();
    let csv = PurchaseOrderExport::from_purchase_order(&f.db, &stored).unwrap().to_csv();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("PO-20250114-0001,received,Alpha Pharma"));

    let storage = DocumentStorage::new(&f.db, f._dir.path().join("documents"));
    let doc = storage
        .store("purchase_order", Some(&po.id), "invoice.pdf", "application/pdf", b"%PDF")
        .unwrap();
    assert_eq!(f.db.list_documents("purchase_order", Some(&po.id)).unwrap(), vec![doc]);
}

#[test]
fn test_cancelled_order_cannot_be_received() {
    let f = setup();
    let orders = PurchaseOrderService::new(&f.db, ProcurementOptions::default());

    let po = orders
        .create_draft(
            &f.beta.id,
            vec![clinic_inventory_core::procurement::NewPoItem {
                medication_id: f.amox.id.clone(),
                quantity: 10.0,
                unit_price: 1.0,
            }],
            None,
            None,
        )
        .unwrap();
    orders.submit(&po.id, None).unwrap();
    orders.cancel(&po.id, Some("Supplier out of stock".into()), None).unwrap();

    let result = orders.receive_items(
        &po.id,
        vec![ReceiptLine {
            item_id: po.items[0].id.clone(),
            quantity: 10.0,
            batch_number: None,
            expiry_date: None,
            unit_cost: None,
        }],
        None,
    );
    assert!(matches!(result, Err(ProcurementError::InvalidState(_))));
    assert_eq!(BatchInventoryManager::new(&f.db).current_stock(&f.amox.id).unwrap(), 0.0);

    let trail = orders.audit_trail(&po.id).unwrap();
    assert_eq!(trail.last().unwrap().to_status, Some(PoStatus::Cancelled));
    assert_eq!(orders.verify_audit_chain(&po.id).unwrap(), None);
}

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clinic.db");

    let po_id = {
        let db = Database::open(&path).unwrap();
        let supplier = Supplier::new("Alpha Pharma".into());
        db.upsert_supplier(&supplier).unwrap();
        let med = Medication::new("Amoxicillin".into(), "capsule".into());
        db.insert_medication(&med).unwrap();

        let orders = PurchaseOrderService::new(&db, ProcurementOptions::default());
        let po = orders
            .create_draft(
                &supplier.id,
                vec![clinic_inventory_core::procurement::NewPoItem {
                    medication_id: med.id.clone(),
                    quantity: 5.0,
                    unit_price: 2.0,
                }],
                None,
                None,
            )
            .unwrap();
        orders.submit(&po.id, None).unwrap();
        po.id
    };

    let db = Database::open(&path).unwrap();
    let orders = PurchaseOrderService::new(&db, ProcurementOptions::default());
    let po = orders.get(&po_id).unwrap();
    assert_eq!(po.status, PoStatus::Submitted);
    assert_eq!(po.items.len(), 1);
    assert_eq!(orders.verify_audit_chain(&po_id).unwrap(), None);
}
