//! Price tiers and medication price resolution.
//!
//! Amounts are stored as f64 but every calculation goes through
//! `rust_decimal` and is rounded to 2 decimal places (half away from zero).

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbError, DbResult};
use crate::models::{Medication, PriceTier};

/// Rounding for monetary values
const DECIMAL_PLACES: u32 = 2;

/// Convert f64 to Decimal for calculation.
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places.
#[inline]
pub fn to_money(value: Decimal) -> f64 {
    round_to(value, DECIMAL_PLACES)
}

/// Round a Decimal to `dp` places and convert to f64.
#[inline]
pub fn round_to(value: Decimal, dp: u32) -> f64 {
    value
        .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Explicit per-tier price
    Override,
    /// Average cost plus tier markup
    Markup,
    /// Medication's standard selling price
    SellingPrice,
}

/// A medication price under a tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedPrice {
    pub medication_id: String,
    pub medication_name: String,
    pub price_tier_id: Option<String>,
    pub price: f64,
    pub source: PriceSource,
}

/// Price of a medication under an optional tier.
///
/// An explicit override wins. Otherwise the tier markup is applied to the
/// average cost. Without a tier or cost the standard selling price is used.
pub fn price_for(medication: &Medication, tier: Option<&PriceTier>, override_price: Option<f64>) -> (f64, PriceSource) {
    if let Some(price) = override_price {
        return (to_money(to_decimal(price)), PriceSource::Override);
    }

    match tier {
        Some(tier) if medication.average_cost > 0.0 => {
            let factor = Decimal::ONE + to_decimal(tier.markup_percent) / Decimal::ONE_HUNDRED;
            let price = (to_decimal(medication.average_cost) * factor).max(Decimal::ZERO);
            (to_money(price), PriceSource::Markup)
        }
        _ => (to_money(to_decimal(medication.selling_price)), PriceSource::SellingPrice),
    }
}

/// Resolves prices against the configured tiers.
pub struct PricingService<'a> {
    db: &'a Database,
}

impl<'a> PricingService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Tier for a payment method.
    ///
    /// The payment method's explicit tier wins, then any active tier listing
    /// the method, then the default tier.
    pub fn tier_for_payment_method(&self, code: &str) -> DbResult<Option<PriceTier>> {
        let settings = self.db.get_clinic_settings()?;
        if let Some(tier_id) = settings
            .payment_method(code)
            .and_then(|m| m.price_tier_id.as_deref())
        {
            if let Some(tier) = self.db.get_price_tier(tier_id)?.filter(|t| t.active) {
                return Ok(Some(tier));
            }
        }

        let tiers = self.db.list_price_tiers(true)?;
        if let Some(tier) = tiers.into_iter().find(|t| t.covers_payment_method(code)) {
            return Ok(Some(tier));
        }

        self.db.get_default_price_tier()
    }

    /// Tier mapped to an insurance or corporate panel, falling back to the default.
    pub fn tier_for_panel(&self, panel: &str) -> DbResult<Option<PriceTier>> {
        let tiers = self.db.list_price_tiers(true)?;
        if let Some(tier) = tiers.into_iter().find(|t| t.covers_panel(panel)) {
            return Ok(Some(tier));
        }
        self.db.get_default_price_tier()
    }

    /// Price a medication for a payment method.
    pub fn price_medication(&self, medication_id: &str, payment_method: &str) -> DbResult<ResolvedPrice> {
        let medication = self.db.require_medication(medication_id)?;
        let tier = self.tier_for_payment_method(payment_method)?;
        self.resolve(&medication, tier.as_ref())
    }

    /// Prices of all active medications under a tier.
    pub fn price_list(&self, tier_id: &str) -> DbResult<Vec<ResolvedPrice>> {
        let tier = self
            .db
            .get_price_tier(tier_id)?
            .ok_or_else(|| DbError::NotFound(format!("price tier {}", tier_id)))?;

        self.db
            .list_medications(true)?
            .iter()
            .map(|med| self.resolve(med, Some(&tier)))
            .collect()
    }

    fn resolve(&self, medication: &Medication, tier: Option<&PriceTier>) -> DbResult<ResolvedPrice> {
        let override_price = match tier {
            Some(tier) => self.db.get_medication_price(&medication.id, &tier.id)?,
            None => None,
        };
        let (price, source) = price_for(medication, tier, override_price);
        tracing::debug!(
            medication_id = %medication.id,
            tier = tier.map(|t| t.name.as_str()).unwrap_or("none"),
            price,
            "Resolved medication price"
        );

        Ok(ResolvedPrice {
            medication_id: medication.id.clone(),
            medication_name: medication.name.clone(),
            price_tier_id: tier.map(|t| t.id.clone()),
            price,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MedicationPrice, PaymentMethod};

    fn med(cost: f64, selling: f64) -> Medication {
        let mut med = Medication::new("Amoxicillin".into(), "capsule".into());
        med.average_cost = cost;
        med.selling_price = selling;
        med
    }

    #[test]
    fn test_money_rounding() {
        assert_eq!(to_money(to_decimal(2.125)), 2.13);
        assert_eq!(to_money(to_decimal(-2.125)), -2.13);
        assert_eq!(to_money(to_decimal(0.1) + to_decimal(0.2)), 0.3);
    }

    #[test]
    fn test_price_for() {
        let tier = PriceTier::new("Standard".into(), 25.0);

        assert_eq!(price_for(&med(0.8, 2.0), Some(&tier), None), (1.0, PriceSource::Markup));
        assert_eq!(
            price_for(&med(0.8, 2.0), Some(&tier), Some(1.75)),
            (1.75, PriceSource::Override)
        );
        assert_eq!(price_for(&med(0.0, 2.0), Some(&tier), None), (2.0, PriceSource::SellingPrice));
        assert_eq!(price_for(&med(0.8, 2.0), None, None), (2.0, PriceSource::SellingPrice));
    }

    #[test]
    fn test_tier_for_payment_method() {
        let db = Database::open_in_memory().unwrap();

        let mut standard = PriceTier::new("Standard".into(), 30.0);
        standard.is_default = true;
        db.upsert_price_tier(&standard).unwrap();

        let mut insurance = PriceTier::new("Insurance".into(), 50.0);
        insurance.payment_methods = vec!["insurance".into()];
        db.upsert_price_tier(&insurance).unwrap();

        let staff = PriceTier::new("Staff".into(), 5.0);
        db.upsert_price_tier(&staff).unwrap();

        let mut settings = db.get_clinic_settings().unwrap();
        settings.payment_methods.push(PaymentMethod {
            code: "staff_card".into(),
            name: "Staff card".into(),
            enabled: true,
            price_tier_id: Some(staff.id.clone()),
        });
        db.save_clinic_settings(&settings).unwrap();

        let service = PricingService::new(&db);
        assert_eq!(service.tier_for_payment_method("staff_card").unwrap().unwrap().id, staff.id);
        assert_eq!(service.tier_for_payment_method("insurance").unwrap().unwrap().id, insurance.id);
        assert_eq!(service.tier_for_payment_method("cash").unwrap().unwrap().id, standard.id);
    }

    #[test]
    fn test_price_medication_and_list() {
        let db = Database::open_in_memory().unwrap();

        let mut tier = PriceTier::new("Standard".into(), 50.0);
        tier.is_default = true;
        db.upsert_price_tier(&tier).unwrap();

        let a = med(2.0, 5.0);
        db.insert_medication(&a).unwrap();
        let mut b = med(1.0, 5.0);
        b.name = "Paracetamol".into();
        db.insert_medication(&b).unwrap();
        db.set_medication_price(&MedicationPrice {
            medication_id: b.id.clone(),
            price_tier_id: tier.id.clone(),
            price: 1.2,
        })
        .unwrap();

        let service = PricingService::new(&db);
        let price = service.price_medication(&a.id, "cash").unwrap();
        assert_eq!(price.price, 3.0);
        assert_eq!(price.source, PriceSource::Markup);

        let list = service.price_list(&tier.id).unwrap();
        assert_eq!(list.len(), 2);
        let para = list.iter().find(|p| p.medication_id == b.id).unwrap();
        assert_eq!(para.price, 1.2);
        assert_eq!(para.source, PriceSource::Override);

        assert!(service.price_list("missing").is_err());
    }

    #[test]
    fn test_tier_for_panel() {
        let db = Database::open_in_memory().unwrap();
        let mut panel_tier = PriceTier::new("Panel".into(), 15.0);
        panel_tier.panels = vec!["AIA".into()];
        db.upsert_price_tier(&panel_tier).unwrap();

        let service = PricingService::new(&db);
        assert_eq!(service.tier_for_panel("aia").unwrap().unwrap().id, panel_tier.id);
        assert!(service.tier_for_panel("other").unwrap().is_none());
    }
}
