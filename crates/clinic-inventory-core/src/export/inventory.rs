use super::{escape_csv, opt_csv, ReportExport};
use crate::inventory::{ExpiryReport, InventoryValuation, MovementSummary, StockLevelReport};

impl ReportExport for StockLevelReport {
    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("medication_id,medication_name,unit,quantity,reorder_level,status\n");

        for item in &self.items {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                escape_csv(&item.medication_id),
                escape_csv(&item.medication_name),
                escape_csv(&item.unit),
                item.quantity,
                item.reorder_level,
                item.status.as_str(),
            ));
        }

        csv
    }
}

impl ReportExport for MovementSummary {
    /// One row per movement type; the net change stays in the JSON form.
    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("from,to,movement_type,count,total_quantity\n");

        for line in &self.lines {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                escape_csv(&self.from),
                escape_csv(&self.to),
                line.movement_type.as_str(),
                line.count,
                line.total_quantity,
            ));
        }

        csv
    }
}

impl ReportExport for ExpiryReport {
    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("medication_id,medication_name,batch_number,expiry_date,days_to_expiry,quantity,status\n");

        for line in &self.lines {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                escape_csv(&line.medication_id),
                escape_csv(&line.medication_name),
                opt_csv(line.batch_number.as_deref()),
                line.expiry_date.map(|d| d.to_string()).unwrap_or_default(),
                line.days_to_expiry.map(|d| d.to_string()).unwrap_or_default(),
                line.quantity,
                line.status.as_str(),
            ));
        }

        csv
    }
}

impl ReportExport for InventoryValuation {
    fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("medication_id,medication_name,quantity,average_cost,value\n");

        for line in &self.lines {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                escape_csv(&line.medication_id),
                escape_csv(&line.medication_name),
                line.quantity,
                line.average_cost,
                line.value,
            ));
        }

        csv
    }
}
