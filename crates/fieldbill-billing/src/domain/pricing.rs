//! Period pricing: turns a rental length into money using a [`RateTable`].
//!
//! Tiers are taken greedily, largest first. Whole 30-day months go to the
//! monthly rate; the remainder is priced as if the table had no monthly tier,
//! so it falls through to weeks and then days. A missing tier is skipped, not
//! an error: without a weekly rate every leftover day bills at the daily rate,
//! and a missing daily rate bills leftover days at zero.

use crate::domain::rates::RateTable;
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DAYS_PER_MONTH: u32 = 30;
pub const DAYS_PER_WEEK: u32 = 7;

/// How a duration was split across tiers, and what it costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBreakdown {
    pub duration_days: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub amount: Decimal,
}

/// Price `duration_days` against `table`.
///
/// `min_rental_days` is not applied here; see [`RateTable::billable_days`].
pub fn price(duration_days: u32, table: &RateTable) -> Result<Decimal> {
    price_breakdown(duration_days, table).map(|b| b.amount)
}

pub fn price_breakdown(duration_days: u32, table: &RateTable) -> Result<PeriodBreakdown> {
    if duration_days == 0 {
        return Err(BillingError::validation(
            "duration_days",
            "must be greater than zero",
        ));
    }
    table.validate()?;

    if let Some(max_days) = table.max_rental_days {
        if duration_days > max_days {
            return Err(BillingError::RateExceeded {
                requested_days: duration_days,
                max_days,
            });
        }
    }

    Ok(decompose(duration_days, table))
}

fn decompose(duration_days: u32, table: &RateTable) -> PeriodBreakdown {
    let daily = table.daily_rate.unwrap_or(Decimal::ZERO);

    if let Some(monthly) = table.monthly_rate {
        if duration_days >= DAYS_PER_MONTH {
            let months = duration_days / DAYS_PER_MONTH;
            let remainder = duration_days % DAYS_PER_MONTH;
            let months_cost = Decimal::from(months) * monthly;

            if remainder == 0 {
                return PeriodBreakdown {
                    duration_days,
                    months,
                    weeks: 0,
                    days: 0,
                    amount: months_cost,
                };
            }

            let rest = decompose(remainder, &table.without_monthly());
            return PeriodBreakdown {
                duration_days,
                months,
                weeks: rest.weeks,
                days: rest.days,
                amount: months_cost + rest.amount,
            };
        }
    }

    if let Some(weekly) = table.weekly_rate {
        if duration_days >= DAYS_PER_WEEK {
            let weeks = duration_days / DAYS_PER_WEEK;
            let days = duration_days % DAYS_PER_WEEK;
            return PeriodBreakdown {
                duration_days,
                months: 0,
                weeks,
                days,
                amount: Decimal::from(weeks) * weekly + Decimal::from(days) * daily,
            };
        }
    }

    PeriodBreakdown {
        duration_days,
        months: 0,
        weeks: 0,
        days: duration_days,
        amount: Decimal::from(duration_days) * daily,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn full_table() -> RateTable {
        RateTable::daily(dec!(50), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_weekly_rate(dec!(300))
            .with_monthly_rate(dec!(1000))
    }

    #[test]
    fn test_month_week_day_split() {
        let breakdown = price_breakdown(45, &full_table()).unwrap();
        assert_eq!(breakdown.months, 1);
        assert_eq!(breakdown.weeks, 2);
        assert_eq!(breakdown.days, 1);
        assert_eq!(breakdown.amount, dec!(1650));
    }

    #[test]
    fn test_tier_boundaries() {
        let table = full_table();
        assert_eq!(price(6, &table).unwrap(), dec!(300));
        assert_eq!(price(7, &table).unwrap(), dec!(300));
        assert_eq!(price(29, &table).unwrap(), dec!(1250));
        assert_eq!(price(30, &table).unwrap(), dec!(1000));
        assert_eq!(price(37, &table).unwrap(), dec!(1300));
        assert_eq!(price(60, &table).unwrap(), dec!(2000));
    }

    #[test]
    fn test_missing_weekly_tier_falls_through_to_daily() {
        let table = RateTable::daily(dec!(50), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_monthly_rate(dec!(1000));

        let breakdown = price_breakdown(45, &table).unwrap();
        assert_eq!(breakdown.months, 1);
        assert_eq!(breakdown.weeks, 0);
        assert_eq!(breakdown.days, 15);
        assert_eq!(breakdown.amount, dec!(1750));
    }

    #[test]
    fn test_missing_daily_rate_bills_leftover_days_at_zero() {
        let mut table = full_table();
        table.daily_rate = None;
        assert_eq!(price(10, &table).unwrap(), dec!(300));
        assert_eq!(price(3, &table).unwrap(), dec!(0));
    }

    #[test]
    fn test_minimum_is_not_inflated() {
        let mut table = full_table();
        table.min_rental_days = 3;
        assert_eq!(price(1, &table).unwrap(), dec!(50));
    }

    #[test]
    fn test_max_rental_days_exceeded() {
        let mut table = full_table();
        table.max_rental_days = Some(30);
        assert!(price(30, &table).is_ok());
        assert!(matches!(
            price(31, &table),
            Err(BillingError::RateExceeded {
                requested_days: 31,
                max_days: 30
            })
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(matches!(
            price(0, &full_table()),
            Err(BillingError::ValidationError { .. })
        ));
    }
}
