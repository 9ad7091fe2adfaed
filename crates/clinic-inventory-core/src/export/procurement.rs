use serde::{Deserialize, Serialize};

use super::{escape_csv, opt_csv, ReportExport};
use crate::db::{Database, DbResult};
use crate::models::{PoStatus, PurchaseOrder};

/// Purchase order with supplier and medication names resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderExport {
    pub po_number: String,
    pub status: PoStatus,
    pub supplier_name: String,
    pub order_date: String,
    pub expected_delivery_date: Option<String>,
    pub currency: String,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub lines: Vec<PurchaseOrderExportLine>,
    pub exported_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderExportLine {
    pub medication_name: String,
    pub unit: String,
    pub quantity_ordered: f64,
    pub quantity_received: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

impl PurchaseOrderExport {
    pub fn from_purchase_order(db: &Database, po: &PurchaseOrder) -> DbResult<Self> {
        let supplier_name = db.require_supplier(&po.supplier_id)?.name;
        let currency = db.get_clinic_settings()?.currency;

        let mut lines = Vec::with_capacity(po.items.len());
        for item in &po.items {
            let (medication_name, unit) = match db.get_medication(&item.medication_id)? {
                Some(med) => (med.name, med.unit),
                None => (item.medication_id.clone(), String::new()),
            };
            lines.push(PurchaseOrderExportLine {
                medication_name,
                unit,
                quantity_ordered: item.quantity_ordered,
                quantity_received: item.quantity_received,
                unit_price: item.unit_price,
                total_price: item.total_price,
            });
        }

        Ok(Self {
            po_number: po.po_number.clone(),
            status: po.status,
            supplier_name,
            order_date: po.order_date.clone(),
            expected_delivery_date: po.expected_delivery_date.clone(),
            currency,
            subtotal: po.subtotal,
            tax_amount: po.tax_amount,
            total_amount: po.total_amount,
            lines,
            exported_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl ReportExport for PurchaseOrderExport {
    /// Order header fields repeated on every line.
    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(
            "po_number,status,supplier,order_date,expected_delivery_date,medication,unit,\
             quantity_ordered,quantity_received,unit_price,line_total,currency\n",
        );

        for line in &self.lines {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&self.po_number),
                self.status.as_str(),
                escape_csv(&self.supplier_name),
                escape_csv(&self.order_date),
                opt_csv(self.expected_delivery_date.as_deref()),
                escape_csv(&line.medication_name),
                escape_csv(&line.unit),
                line.quantity_ordered,
                line.quantity_received,
                line.unit_price,
                line.total_price,
                escape_csv(&self.currency),
            ));
        }

        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medication, Supplier};

    #[test]
    fn test_purchase_order_export() {
        let db = Database::open_in_memory().unwrap();
        let supplier = Supplier::new("Vet Supplies, Ltd".into());
        db.upsert_supplier(&supplier).unwrap();
        let med = Medication::new("Amoxicillin".into(), "capsule".into());
        db.insert_medication(&med).unwrap();

        let mut po = PurchaseOrder::new("PO-20250114-0001".into(), supplier.id.clone());
        po.add_item(med.id.clone(), 100.0, 0.25);
        po.recalculate_totals(0.0);
        db.insert_purchase_order(&po).unwrap();

        let export = PurchaseOrderExport::from_purchase_order(&db, &po).unwrap();
        assert_eq!(export.lines.len(), 1);
        assert_eq!(export.total_amount, 25.0);

        let csv = export.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("po_number,status,supplier"));
        assert!(lines[1].starts_with("PO-20250114-0001,draft,\"Vet Supplies, Ltd\","));
        assert!(lines[1].contains(",Amoxicillin,capsule,100,0,0.25,25,"));

        let json = export.to_json().unwrap();
        assert!(json.contains("\"supplier_name\": \"Vet Supplies, Ltd\""));
    }
}
