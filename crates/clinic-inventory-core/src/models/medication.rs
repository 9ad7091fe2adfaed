//! Medication catalog models.

use serde::{Deserialize, Serialize};

use super::{new_id, now_rfc3339};

/// A medication (or consumable) stocked by the clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    /// Unique identifier
    pub id: String,
    /// Display name (e.g., "Amoxicillin 500mg capsules")
    pub name: String,
    /// Generic/active ingredient name
    pub generic_name: Option<String>,
    /// Therapeutic or stock category
    pub category: Option<String>,
    /// Dosage form (e.g., "capsule", "syrup")
    pub dosage_form: Option<String>,
    /// Strength (e.g., "500mg")
    pub strength: Option<String>,
    /// Dispensing unit (e.g., "capsule", "bottle")
    pub unit: String,
    /// Quantity at or below which the item is considered low stock
    pub reorder_level: f64,
    /// Moving-average unit cost
    pub average_cost: f64,
    /// Standard selling price per unit
    pub selling_price: f64,
    /// Preferred supplier for reordering
    pub default_supplier_id: Option<String>,
    /// Whether the medication is currently stocked
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Medication {
    /// Create a new medication with required fields.
    pub fn new(name: String, unit: String) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            name,
            generic_name: None,
            category: None,
            dosage_form: None,
            strength: None,
            unit,
            reorder_level: 0.0,
            average_cost: 0.0,
            selling_price: 0.0,
            default_supplier_id: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether a quantity on hand is at or under the reorder level.
    pub fn needs_reorder(&self, quantity_on_hand: f64) -> bool {
        quantity_on_hand <= self.reorder_level
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_medication() {
        let med = Medication::new("Amoxicillin 500mg".into(), "capsule".into());
        assert_eq!(med.name, "Amoxicillin 500mg");
        assert_eq!(med.unit, "capsule");
        assert!(med.active);
        assert_eq!(med.id.len(), 36);
        assert_eq!(med.average_cost, 0.0);
    }

    #[test]
    fn test_needs_reorder() {
        let mut med = Medication::new("Paracetamol".into(), "tablet".into());
        med.reorder_level = 50.0;

        assert!(med.needs_reorder(50.0));
        assert!(med.needs_reorder(10.0));
        assert!(!med.needs_reorder(51.0));
    }
}
