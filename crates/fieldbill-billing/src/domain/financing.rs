//! Fixed-payment financing for vehicles and equipment.

use crate::domain::types::{ensure_non_negative, round_money};
use crate::error::{BillingError, Result};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

const MONTHS_PER_YEAR: u32 = 12;

/// Tolerance for [`FinanceAgreement::is_consistent`]: one cent.
pub const PAYMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

fn validate_loan(principal: Decimal, annual_rate_pct: Decimal, term_months: u32) -> Result<()> {
    ensure_non_negative("principal", principal)?;
    ensure_non_negative("annual_rate_pct", annual_rate_pct)?;
    if term_months == 0 {
        return Err(BillingError::validation(
            "term_months",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn monthly_rate(annual_rate_pct: Decimal) -> Decimal {
    annual_rate_pct / Decimal::ONE_HUNDRED / Decimal::from(MONTHS_PER_YEAR)
}

/// Level monthly payment for a loan, rounded to cents.
///
/// A zero rate splits the principal evenly; otherwise the standard annuity
/// formula `P * r * (1+r)^n / ((1+r)^n - 1)` with `r` the monthly rate,
/// evaluated as `P * r * g / (g - 1)` so the growth term never multiplies the
/// principal directly. Inputs that still overflow are rejected.
pub fn compute_monthly_payment(
    principal: Decimal,
    annual_rate_pct: Decimal,
    term_months: u32,
) -> Result<Decimal> {
    validate_loan(principal, annual_rate_pct, term_months)?;

    let n = Decimal::from(term_months);
    if annual_rate_pct.is_zero() {
        return Ok(round_money(principal / n));
    }

    let overflow =
        || BillingError::validation("term_months", "rate and term overflow the payment formula");

    let rate = monthly_rate(annual_rate_pct);
    let growth = (Decimal::ONE + rate)
        .checked_powu(u64::from(term_months))
        .ok_or_else(overflow)?;
    let factor = growth
        .checked_sub(Decimal::ONE)
        .and_then(|denominator| growth.checked_div(denominator))
        .ok_or_else(overflow)?;
    let payment = principal
        .checked_mul(rate)
        .and_then(|interest| interest.checked_mul(factor))
        .ok_or_else(overflow)?;

    Ok(round_money(payment))
}

/// Whole calendar months from `start` to `as_of`; 0 when `as_of` precedes
/// `start`. A month counts once its anniversary day is reached (clamped to the
/// month end, so Jan 31 + 1 month is the last day of February).
pub fn whole_months_between(start: NaiveDate, as_of: NaiveDate) -> u32 {
    if as_of <= start {
        return 0;
    }

    let span = (as_of.year() - start.year()) * 12 + as_of.month() as i32 - start.month() as i32;
    let mut months = span.max(0) as u32;
    while months > 0 {
        match start.checked_add_months(Months::new(months)) {
            Some(anniversary) if anniversary <= as_of => break,
            _ => months -= 1,
        }
    }
    months
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceAgreement {
    pub total_amount: Decimal,
    pub down_payment: Decimal,
    pub interest_rate_pct: Decimal,
    pub term_months: u32,
    pub monthly_payment: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

impl FinanceAgreement {
    pub fn new(
        total_amount: Decimal,
        down_payment: Decimal,
        interest_rate_pct: Decimal,
        term_months: u32,
        start_date: NaiveDate,
    ) -> Result<Self> {
        ensure_non_negative("down_payment", down_payment)?;
        if down_payment > total_amount {
            return Err(BillingError::validation(
                "down_payment",
                format!("{} exceeds total amount {}", down_payment, total_amount),
            ));
        }

        let monthly_payment =
            compute_monthly_payment(total_amount - down_payment, interest_rate_pct, term_months)?;
        let end_date = start_date
            .checked_add_months(Months::new(term_months))
            .ok_or_else(|| BillingError::validation("term_months", "end date out of range"))?;

        Ok(Self {
            total_amount,
            down_payment,
            interest_rate_pct,
            term_months,
            monthly_payment,
            start_date,
            end_date,
            is_active: true,
        })
    }

    pub fn principal(&self) -> Decimal {
        self.total_amount - self.down_payment
    }

    /// Whether the stored payment matches the formula to within one cent.
    pub fn is_consistent(&self) -> bool {
        compute_monthly_payment(self.principal(), self.interest_rate_pct, self.term_months)
            .map(|expected| (expected - self.monthly_payment).abs() <= PAYMENT_TOLERANCE)
            .unwrap_or(false)
    }
}

/// Straight-line estimate of what is still owed on `as_of`.
///
/// Every elapsed month is assumed to have retired one full payment against
/// `total_amount`. Interest is not separated from principal, so this is an
/// approximation for display, not an accounting balance; use
/// [`amortization_schedule`] for the exact split.
pub fn remaining_balance(agreement: &FinanceAgreement, as_of: NaiveDate) -> Decimal {
    let elapsed = whole_months_between(agreement.start_date, as_of);
    let paid = Decimal::from(elapsed)
        .saturating_mul(agreement.monthly_payment)
        .min(agreement.total_amount);
    (agreement.total_amount - paid).max(Decimal::ZERO)
}

/// Interest paid over the full term, never negative.
pub fn total_interest(agreement: &FinanceAgreement) -> Decimal {
    let repaid = agreement
        .monthly_payment
        .saturating_mul(Decimal::from(agreement.term_months));
    (repaid - agreement.principal()).max(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub period: u32,
    pub due_date: NaiveDate,
    pub payment: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
    pub balance: Decimal,
}

/// Period-by-period split of each payment into interest and principal.
///
/// Interest is charged on the opening balance and rounded per period; the
/// final payment is adjusted so the balance lands exactly on zero.
pub fn amortization_schedule(agreement: &FinanceAgreement) -> Result<Vec<ScheduleEntry>> {
    validate_loan(
        agreement.principal(),
        agreement.interest_rate_pct,
        agreement.term_months,
    )?;

    let rate = monthly_rate(agreement.interest_rate_pct);
    let mut balance = agreement.principal();
    let mut entries = Vec::with_capacity(agreement.term_months as usize);

    for period in 1..=agreement.term_months {
        let due_date = agreement
            .start_date
            .checked_add_months(Months::new(period))
            .ok_or_else(|| BillingError::validation("term_months", "due date out of range"))?;
        let interest = round_money(balance * rate);

        let (payment, principal) = if period == agreement.term_months {
            (balance + interest, balance)
        } else {
            let principal = (agreement.monthly_payment - interest).min(balance);
            (principal + interest, principal)
        };
        balance -= principal;

        entries.push(ScheduleEntry {
            period,
            due_date,
            payment,
            interest,
            principal,
            balance,
        });
    }

    Ok(entries)
}
