use crate::domain::pricing;
use crate::domain::rates::RateTable;
use crate::domain::types::{ensure_non_negative, percent_of, round_money, LineKind};
use crate::error::{BillingError, Result};
use chrono::NaiveDate;
use fieldbill_common::logging::AUDIT_TARGET;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A completed rental or service event waiting to be billed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    #[serde(default)]
    pub equipment_ref: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub estimated_cost: Option<Decimal>,
    /// Flat-priced rentals bill a single unit instead of one unit per day.
    #[serde(default = "default_duration_based")]
    pub duration_based: bool,
}

fn default_duration_based() -> bool {
    true
}

impl WorkUnit {
    pub fn rental(equipment_ref: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            equipment_ref: Some(equipment_ref.into()),
            start_date,
            end_date,
            service_description: None,
            estimated_cost: None,
            duration_based: true,
        }
    }

    pub fn with_service(mut self, description: impl Into<String>, estimated_cost: Decimal) -> Self {
        self.service_description = Some(description.into());
        self.estimated_cost = Some(estimated_cost);
        self
    }

    /// Whole days between start and end, never less than one.
    pub fn duration_days(&self) -> u32 {
        let days = (self.end_date - self.start_date).num_days().max(1);
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_date < self.start_date {
            return Err(BillingError::validation(
                "end_date",
                format!(
                    "end date {} precedes start date {}",
                    self.end_date, self.start_date
                ),
            ));
        }
        if let Some(cost) = self.estimated_cost {
            ensure_non_negative("estimated_cost", cost)?;
        }
        Ok(())
    }
}

/// One priced line on an invoice or quote.
///
/// `total` is always `round(after_discount * (1 + tax_rate%))`, where
/// `after_discount = gross - discount_amount - discount_percent% * gross`
/// clamped at zero. `gross` is `quantity * unit_price` unless the line carries
/// an `amount_override` (tiered rental pricing), in which case quantity and
/// unit price are kept for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub kind: LineKind,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub amount_override: Option<Decimal>,
    #[serde(default)]
    pub discount_clamped: bool,
}

impl LineItem {
    pub fn new(
        kind: LineKind,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<Self> {
        ensure_non_negative("quantity", quantity)?;
        ensure_non_negative("unit_price", unit_price)?;

        Ok(Self {
            kind,
            description: description.into(),
            quantity,
            unit_price,
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            amount_override: None,
            discount_clamped: false,
        }
        .recompute())
    }

    pub fn with_amount_override(mut self, amount: Decimal) -> Result<Self> {
        ensure_non_negative("amount_override", amount)?;
        self.amount_override = Some(amount);
        Ok(self.recompute())
    }

    pub fn with_discount_percent(mut self, pct: Decimal) -> Result<Self> {
        ensure_non_negative("discount_percent", pct)?;
        self.discount_percent = pct;
        Ok(self.recompute())
    }

    pub fn with_discount_amount(mut self, amount: Decimal) -> Result<Self> {
        ensure_non_negative("discount_amount", amount)?;
        self.discount_amount = amount;
        Ok(self.recompute())
    }

    pub fn with_tax_rate(mut self, pct: Decimal) -> Result<Self> {
        ensure_non_negative("tax_rate", pct)?;
        self.tax_rate = pct;
        Ok(self.recompute())
    }

    /// Pre-discount, pre-tax amount of the line.
    pub fn gross_amount(&self) -> Decimal {
        self.amount_override
            .unwrap_or(self.quantity * self.unit_price)
    }

    /// Gross amount minus both discounts, before clamping.
    fn raw_after_discount(&self) -> Decimal {
        let gross = self.gross_amount();
        gross - self.discount_amount - percent_of(gross, self.discount_percent)
    }

    pub fn after_discount(&self) -> Decimal {
        self.raw_after_discount().max(Decimal::ZERO)
    }

    /// Strict check for callers that want to refuse over-discounted lines
    /// instead of relying on the clamp.
    pub fn validate_discount(&self) -> Result<()> {
        if self.raw_after_discount() < Decimal::ZERO {
            return Err(BillingError::InvalidDiscount {
                subtotal: self.gross_amount(),
                discount: self.discount_amount + percent_of(self.gross_amount(), self.discount_percent),
            });
        }
        Ok(())
    }

    fn recompute(mut self) -> Self {
        self.discount_clamped = false;
        if let Err(err) = self.validate_discount() {
            warn!(
                target: AUDIT_TARGET,
                kind = %self.kind,
                description = %self.description,
                error = %err,
                "Line discount exceeds subtotal; clamping line to zero"
            );
            self.discount_clamped = true;
        }

        let after_discount = self.after_discount();
        self.tax_amount = round_money(percent_of(after_discount, self.tax_rate));
        self.total = round_money(after_discount + percent_of(after_discount, self.tax_rate));
        self
    }
}

/// Options that shape how a work unit becomes line items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Bill short rentals as the table's `min_rental_days`.
    pub enforce_min_rental_days: bool,
    /// Add a cleaning line when the table carries a cleaning fee.
    pub include_cleaning_fee: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            enforce_min_rental_days: true,
            include_cleaning_fee: false,
        }
    }
}

/// Expands work units into priced line items
#[derive(Debug, Clone, Default)]
pub struct LineItemBuilder {
    options: BuildOptions,
}

impl LineItemBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    pub fn build_lines(&self, work_unit: &WorkUnit, table: &RateTable) -> Result<Vec<LineItem>> {
        work_unit.validate()?;

        let mut lines = Vec::new();

        if let Some(equipment) = work_unit.equipment_ref.as_deref() {
            if !table.is_effective_on(work_unit.start_date) {
                return Err(BillingError::RateTableNotEffective {
                    date: work_unit.start_date,
                });
            }

            lines.push(self.rental_line(equipment, work_unit, table)?);

            if !table.delivery_fee.is_zero() {
                lines.push(LineItem::new(
                    LineKind::Delivery,
                    format!("Delivery of {}", equipment),
                    Decimal::ONE,
                    table.delivery_fee,
                )?);
            }

            if !table.pickup_fee.is_zero() {
                lines.push(LineItem::new(
                    LineKind::Pickup,
                    format!("Pickup of {}", equipment),
                    Decimal::ONE,
                    table.pickup_fee,
                )?);
            }

            if self.options.include_cleaning_fee && !table.cleaning_fee.is_zero() {
                lines.push(LineItem::new(
                    LineKind::Cleaning,
                    format!("Cleaning of {}", equipment),
                    Decimal::ONE,
                    table.cleaning_fee,
                )?);
            }
        }

        if work_unit.service_description.is_some() || work_unit.estimated_cost.is_some() {
            let description = work_unit
                .service_description
                .clone()
                .unwrap_or_else(|| "Service".to_string());
            lines.push(LineItem::new(
                LineKind::Service,
                description,
                Decimal::ONE,
                work_unit.estimated_cost.unwrap_or(Decimal::ZERO),
            )?);
        }

        debug!(
            equipment = ?work_unit.equipment_ref,
            duration_days = work_unit.duration_days(),
            line_count = lines.len(),
            "Built line items for work unit"
        );

        Ok(lines)
    }

    fn rental_line(
        &self,
        equipment: &str,
        work_unit: &WorkUnit,
        table: &RateTable,
    ) -> Result<LineItem> {
        let duration = work_unit.duration_days();
        let days = if self.options.enforce_min_rental_days {
            table.billable_days(duration)
        } else {
            duration
        };
        let amount = pricing::price(days, table)?;
        let description = format!("Rental of {} ({} days)", equipment, days);

        if !work_unit.duration_based {
            return LineItem::new(LineKind::Rental, description, Decimal::ONE, amount);
        }

        let quantity = Decimal::from(days);
        let probe = pricing::price(1, table)?;
        let unit_price = if probe.is_zero() {
            round_money(amount / quantity)
        } else {
            probe
        };

        let line = LineItem::new(LineKind::Rental, description, quantity, unit_price)?;
        if line.gross_amount() == amount {
            Ok(line)
        } else {
            line.with_amount_override(amount)
        }
    }

    /// A late-fee line for equipment returned `days_late` days past the
    /// agreed end date. `None` when nothing is owed.
    pub fn late_fee_line(&self, table: &RateTable, days_late: u32) -> Result<Option<LineItem>> {
        if days_late == 0 || table.late_fee_daily.is_zero() {
            return Ok(None);
        }
        LineItem::new(
            LineKind::LateFee,
            format!("Late return ({} days)", days_late),
            Decimal::from(days_late),
            table.late_fee_daily,
        )
        .map(Some)
    }
}

/// Build lines with default options.
pub fn build_lines(work_unit: &WorkUnit, table: &RateTable) -> Result<Vec<LineItem>> {
    LineItemBuilder::default().build_lines(work_unit, table)
}
