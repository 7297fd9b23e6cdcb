use crate::domain::line_items::LineItem;
use crate::domain::types::{
    ensure_non_negative, percent_of, round_money, InvoiceId, InvoiceStatus, PaymentId,
};
use crate::error::{BillingError, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use fieldbill_common::logging::AUDIT_TARGET;
use fieldbill_common::CompanyId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Invoice-level sums produced by [`aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Sum of line gross amounts less line discount amounts, before tax and
    /// before the invoice discount. Each line contributes at least zero.
    pub subtotal: Decimal,
    /// Invoice discount actually applied (capped at the subtotal).
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Sum line items into invoice totals.
///
/// Pure: the same lines, discount and rate always give the same totals.
pub fn aggregate(
    lines: &[LineItem],
    invoice_discount: Decimal,
    tax_rate: Decimal,
) -> Result<InvoiceTotals> {
    ensure_non_negative("invoice_discount", invoice_discount)?;
    ensure_non_negative("tax_rate", tax_rate)?;

    let subtotal: Decimal = lines
        .iter()
        .map(|line| round_money(line.gross_amount() - line.discount_amount).max(Decimal::ZERO))
        .sum();

    let discount_amount = if invoice_discount > subtotal {
        let err = BillingError::InvalidDiscount {
            subtotal,
            discount: invoice_discount,
        };
        warn!(
            target: AUDIT_TARGET,
            error = %err,
            "Invoice discount exceeds subtotal; capping at subtotal"
        );
        subtotal
    } else {
        invoice_discount
    };

    let taxable = subtotal - discount_amount;
    let tax_amount = round_money(percent_of(taxable, tax_rate));

    Ok(InvoiceTotals {
        subtotal,
        discount_amount,
        tax_rate,
        tax_amount,
        total_amount: taxable + tax_amount,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub company_id: CompanyId,
    pub invoice_number: String,
    pub line_items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub status: InvoiceStatus,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    /// Set when payments exceed the total; left for manual reconciliation.
    pub overpaid: bool,
    /// Optimistic concurrency token, bumped on every mutation.
    pub version: u64,
    pub applied_payments: Vec<PaymentId>,
    pub refunded_payments: Vec<PaymentId>,
}

impl Invoice {
    pub fn draft(
        company_id: CompanyId,
        invoice_number: impl Into<String>,
        line_items: Vec<LineItem>,
        invoice_discount: Decimal,
        tax_rate: Decimal,
        invoice_date: NaiveDate,
        payment_terms_days: u32,
    ) -> Result<Self> {
        let totals = aggregate(&line_items, invoice_discount, tax_rate)?;
        let due_date = invoice_date
            .checked_add_days(Days::new(u64::from(payment_terms_days)))
            .ok_or_else(|| {
                BillingError::validation("payment_terms_days", "due date out of range")
            })?;

        Ok(Self {
            id: InvoiceId::new(),
            company_id,
            invoice_number: invoice_number.into(),
            line_items,
            subtotal: totals.subtotal,
            tax_rate: totals.tax_rate,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            total_amount: totals.total_amount,
            amount_paid: Decimal::ZERO,
            balance_due: totals.total_amount,
            status: InvoiceStatus::Draft,
            invoice_date,
            due_date,
            paid_date: None,
            overpaid: false,
            version: 0,
            applied_payments: Vec::new(),
            refunded_payments: Vec::new(),
        })
    }

    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            tax_rate: self.tax_rate,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
        }
    }

    fn transition_to(&mut self, next: InvoiceStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BillingError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.version += 1;
        Ok(())
    }

    /// Draft to sent. Triggered by the caller, never by a payment.
    pub fn send(&mut self) -> Result<()> {
        self.transition_to(InvoiceStatus::Sent)
    }

    /// Cancel an invoice that has no money applied to it.
    pub fn cancel(&mut self) -> Result<()> {
        if !self.amount_paid.is_zero() {
            return Err(BillingError::InvalidStateTransition {
                from: self.status.to_string(),
                to: InvoiceStatus::Cancelled.to_string(),
            });
        }
        self.transition_to(InvoiceStatus::Cancelled)
    }

    /// Replace the lines of a draft and re-aggregate from scratch.
    pub fn reissue_lines(
        &mut self,
        line_items: Vec<LineItem>,
        invoice_discount: Decimal,
        tax_rate: Decimal,
    ) -> Result<()> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::InvalidStateTransition {
                from: self.status.to_string(),
                to: InvoiceStatus::Draft.to_string(),
            });
        }

        let totals = aggregate(&line_items, invoice_discount, tax_rate)?;
        self.line_items = line_items;
        self.subtotal = totals.subtotal;
        self.tax_rate = totals.tax_rate;
        self.tax_amount = totals.tax_amount;
        self.discount_amount = totals.discount_amount;
        self.total_amount = totals.total_amount;
        self.balance_due = totals.total_amount;
        self.version += 1;
        Ok(())
    }

    /// Overdue is a read-time flag: open, past due, and still owing.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && today > self.due_date && self.balance_due > Decimal::ZERO
    }

    /// Stored status with the overdue flag folded in.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        if self.is_overdue(today) {
            InvoiceStatus::Overdue
        } else {
            self.status
        }
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.is_overdue(today) {
            (today - self.due_date).num_days()
        } else {
            0
        }
    }

    /// Amount received beyond the total; zero unless `overpaid`.
    pub fn overpaid_amount(&self) -> Decimal {
        (self.amount_paid - self.total_amount).max(Decimal::ZERO)
    }
}

/// Status implied by what has been paid against `total`.
///
/// Only meaningful for invoices that accept money (sent or later); draft and
/// cancelled invoices keep their status.
pub fn derive_status(current: InvoiceStatus, total: Decimal, amount_paid: Decimal) -> InvoiceStatus {
    if matches!(current, InvoiceStatus::Draft | InvoiceStatus::Cancelled) {
        return current;
    }

    let balance = (total - amount_paid).max(Decimal::ZERO);
    if balance.is_zero() {
        InvoiceStatus::Paid
    } else if amount_paid <= Decimal::ZERO {
        InvoiceStatus::Sent
    } else {
        InvoiceStatus::PartiallyPaid
    }
}
