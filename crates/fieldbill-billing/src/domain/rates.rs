use crate::domain::types::ensure_non_negative;
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tiered rates and fee schedule for one equipment or service class.
///
/// Owned by catalog management; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    #[serde(default)]
    pub daily_rate: Option<Decimal>,
    #[serde(default)]
    pub weekly_rate: Option<Decimal>,
    #[serde(default)]
    pub monthly_rate: Option<Decimal>,
    #[serde(default)]
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub pickup_fee: Decimal,
    #[serde(default)]
    pub cleaning_fee: Decimal,
    #[serde(default)]
    pub late_fee_daily: Decimal,
    #[serde(default = "default_min_rental_days")]
    pub min_rental_days: u32,
    #[serde(default)]
    pub max_rental_days: Option<u32>,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_min_rental_days() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

impl RateTable {
    /// An active table with only a daily rate and no fees.
    pub fn daily(rate: Decimal, effective_from: NaiveDate) -> Self {
        Self {
            daily_rate: Some(rate),
            weekly_rate: None,
            monthly_rate: None,
            delivery_fee: Decimal::ZERO,
            pickup_fee: Decimal::ZERO,
            cleaning_fee: Decimal::ZERO,
            late_fee_daily: Decimal::ZERO,
            min_rental_days: 1,
            max_rental_days: None,
            effective_from,
            effective_until: None,
            active: true,
        }
    }

    pub fn with_weekly_rate(mut self, rate: Decimal) -> Self {
        self.weekly_rate = Some(rate);
        self
    }

    pub fn with_monthly_rate(mut self, rate: Decimal) -> Self {
        self.monthly_rate = Some(rate);
        self
    }

    pub fn with_fees(mut self, delivery: Decimal, pickup: Decimal) -> Self {
        self.delivery_fee = delivery;
        self.pickup_fee = pickup;
        self
    }

    pub fn has_any_rate(&self) -> bool {
        self.daily_rate.is_some() || self.weekly_rate.is_some() || self.monthly_rate.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("daily_rate", self.daily_rate),
            ("weekly_rate", self.weekly_rate),
            ("monthly_rate", self.monthly_rate),
        ] {
            if let Some(rate) = value {
                ensure_non_negative(field, rate)?;
            }
        }
        ensure_non_negative("delivery_fee", self.delivery_fee)?;
        ensure_non_negative("pickup_fee", self.pickup_fee)?;
        ensure_non_negative("cleaning_fee", self.cleaning_fee)?;
        ensure_non_negative("late_fee_daily", self.late_fee_daily)?;

        if self.active && !self.has_any_rate() {
            return Err(BillingError::InvalidRateTable {
                reason: "active table needs a daily, weekly or monthly rate".to_string(),
            });
        }

        if self.min_rental_days == 0 {
            return Err(BillingError::InvalidRateTable {
                reason: "min_rental_days must be at least 1".to_string(),
            });
        }

        if let Some(max) = self.max_rental_days {
            if max < self.min_rental_days {
                return Err(BillingError::InvalidRateTable {
                    reason: format!(
                        "max_rental_days {} is below min_rental_days {}",
                        max, self.min_rental_days
                    ),
                });
            }
        }

        if let Some(until) = self.effective_until {
            if until < self.effective_from {
                return Err(BillingError::InvalidRateTable {
                    reason: format!(
                        "effective_until {} precedes effective_from {}",
                        until, self.effective_from
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.active
            && self.effective_from <= date
            && self.effective_until.map_or(true, |until| date <= until)
    }

    /// Minimum-rental policy for callers that bill short rentals as the minimum.
    pub fn billable_days(&self, duration_days: u32) -> u32 {
        duration_days.max(self.min_rental_days)
    }

    pub fn late_fee(&self, days_late: u32) -> Decimal {
        self.late_fee_daily * Decimal::from(days_late)
    }

    /// Copy of the table with the monthly tier removed, used to price the
    /// remainder after whole months have been taken.
    pub(crate) fn without_monthly(&self) -> Self {
        Self {
            monthly_rate: None,
            ..self.clone()
        }
    }
}

/// Named rate tables, one per equipment or service class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateCatalog {
    tables: HashMap<String, RateTable>,
}

impl RateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, table: RateTable) -> Result<()> {
        table.validate()?;
        self.tables.insert(name.into(), table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RateTable> {
        self.tables
            .get(name)
            .ok_or_else(|| BillingError::RateTableNotFound {
                name: name.to_string(),
            })
    }

    /// The table for `name` if it is in effect on `date`.
    pub fn effective(&self, name: &str, date: NaiveDate) -> Result<&RateTable> {
        let table = self.get(name)?;
        if !table.is_effective_on(date) {
            return Err(BillingError::RateTableNotEffective { date });
        }
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        self.tables.values().try_for_each(RateTable::validate)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
