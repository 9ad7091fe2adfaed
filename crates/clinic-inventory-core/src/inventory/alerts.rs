//! Low-stock and expiry alerts.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{aggregate_batches, BatchInventoryManager, ExpiryThresholds, InventoryResult, StockStatus};
use crate::db::Database;
use crate::models::NotificationSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    OutOfStock,
    ExpiringSoon,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Something on the shelf that needs attention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub medication_id: String,
    pub medication_name: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: f64,
    pub message: String,
}

/// Alerts enabled by the clinic's notification settings.
///
/// Critical alerts come first.
pub fn generate_alerts(
    db: &Database,
    notifications: &NotificationSettings,
    thresholds: &ExpiryThresholds,
    today: NaiveDate,
) -> InventoryResult<Vec<InventoryAlert>> {
    let mut alerts = Vec::new();

    if notifications.low_stock_alerts {
        for level in BatchInventoryManager::new(db).stock_levels()? {
            let (kind, severity, message) = match level.status {
                StockStatus::OutOfStock => (
                    AlertKind::OutOfStock,
                    AlertSeverity::Critical,
                    format!("{} is out of stock", level.medication_name),
                ),
                StockStatus::LowStock if level.reorder_level > 0.0 => (
                    AlertKind::LowStock,
                    AlertSeverity::Warning,
                    format!(
                        "{} is low: {} {} left (reorder at {})",
                        level.medication_name, level.quantity, level.unit, level.reorder_level
                    ),
                ),
                _ => continue,
            };
            alerts.push(InventoryAlert {
                kind,
                severity,
                medication_id: level.medication_id,
                medication_name: level.medication_name,
                batch_number: None,
                expiry_date: None,
                quantity: level.quantity,
                message,
            });
        }
    }

    if notifications.expiry_alerts {
        let names: HashMap<String, String> = db
            .list_medications(true)?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        for batch in aggregate_batches(&db.list_all_movements()?) {
            let Some(days) = batch.days_to_expiry(today) else {
                continue;
            };
            if !batch.has_stock() || days > notifications.expiry_alert_days {
                continue;
            }
            // Inactive medications are not alerted on
            let Some(name) = names.get(&batch.key.medication_id) else {
                continue;
            };

            let batch_label = batch.key.batch_number.as_deref().unwrap_or("(no batch)");
            let (kind, severity, message) = if days <= 0 {
                (
                    AlertKind::Expired,
                    AlertSeverity::Critical,
                    format!("{} batch {} has expired", name, batch_label),
                )
            } else {
                let severity = if days <= thresholds.critical_days {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                (
                    AlertKind::ExpiringSoon,
                    severity,
                    format!("{} batch {} expires in {} days", name, batch_label, days),
                )
            };

            alerts.push(InventoryAlert {
                kind,
                severity,
                medication_id: batch.key.medication_id.clone(),
                medication_name: name.clone(),
                batch_number: batch.key.batch_number.clone(),
                expiry_date: batch.key.expiry_date,
                quantity: batch.quantity,
                message,
            });
        }
    }

    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    debug!(count = alerts.len(), "Generated inventory alerts");
    Ok(alerts)
}
