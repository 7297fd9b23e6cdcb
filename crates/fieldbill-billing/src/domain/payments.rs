use crate::domain::invoices::{derive_status, Invoice};
use crate::domain::types::{
    ensure_non_negative, InvoiceId, InvoiceStatus, PaymentId, PaymentMethod, PaymentStatus,
};
use crate::error::{BillingError, Result};
use crate::storage::InvoiceRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldbill_common::logging::AUDIT_TARGET;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A payment as reported by the payment collaborator.
///
/// Completed events are immutable. A refund is the same payment (same id)
/// reported again with status `Refunded`; it is applied as a compensating
/// reduction, never as an edit of the earlier application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: PaymentId,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn new(
        amount: Decimal,
        method: PaymentMethod,
        status: PaymentStatus,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        ensure_non_negative("amount", amount)?;
        Ok(Self {
            id: PaymentId::new(),
            amount,
            fee_amount: Decimal::ZERO,
            net_amount: amount,
            method,
            status,
            occurred_at,
        })
    }

    pub fn completed(
        amount: Decimal,
        method: PaymentMethod,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(amount, method, PaymentStatus::Completed, occurred_at)
    }

    /// Processor fee withheld from the payment. The invoice is still credited
    /// with the gross `amount`.
    pub fn with_fee(mut self, fee_amount: Decimal) -> Result<Self> {
        ensure_non_negative("fee_amount", fee_amount)?;
        if fee_amount > self.amount {
            return Err(BillingError::validation(
                "fee_amount",
                format!("fee {} exceeds payment {}", fee_amount, self.amount),
            ));
        }
        self.fee_amount = fee_amount;
        self.net_amount = self.amount - fee_amount;
        Ok(self)
    }

    /// The refund of this payment, reported at `occurred_at`.
    pub fn refund(&self, occurred_at: DateTime<Utc>) -> Self {
        Self {
            status: PaymentStatus::Refunded,
            occurred_at,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative("amount", self.amount)?;
        ensure_non_negative("fee_amount", self.fee_amount)
    }
}

/// Apply one payment event to an invoice, returning the updated copy.
///
/// Pending and failed events, and events already applied, leave the invoice
/// untouched (same version). Any change bumps the version.
pub fn apply_payment(invoice: &Invoice, event: &PaymentEvent) -> Result<Invoice> {
    event.validate()?;

    let mut updated = invoice.clone();
    match event.status {
        PaymentStatus::Pending | PaymentStatus::Failed => {
            debug!(
                invoice_id = %invoice.id,
                payment_id = %event.id,
                status = %event.status,
                "Ignoring payment event that has not settled"
            );
            return Ok(updated);
        }
        PaymentStatus::Completed => {
            if invoice.applied_payments.contains(&event.id) {
                debug!(invoice_id = %invoice.id, payment_id = %event.id, "Payment already applied");
                return Ok(updated);
            }
            if !matches!(
                invoice.status,
                InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid
            ) {
                return Err(BillingError::InvalidStateTransition {
                    from: invoice.status.to_string(),
                    to: InvoiceStatus::Paid.to_string(),
                });
            }

            updated.amount_paid += event.amount;
            updated.applied_payments.push(event.id);
        }
        PaymentStatus::Refunded => {
            if invoice.refunded_payments.contains(&event.id) {
                debug!(invoice_id = %invoice.id, payment_id = %event.id, "Refund already applied");
                return Ok(updated);
            }
            if !invoice.applied_payments.contains(&event.id) {
                return Err(BillingError::validation(
                    "payment_id",
                    format!("refund for payment {} that was never applied", event.id),
                ));
            }

            updated.amount_paid = (updated.amount_paid - event.amount).max(Decimal::ZERO);
            updated.refunded_payments.push(event.id);
            info!(
                target: AUDIT_TARGET,
                invoice_id = %invoice.id,
                payment_id = %event.id,
                amount = %event.amount,
                "Refund applied"
            );
        }
    }

    updated.balance_due = (updated.total_amount - updated.amount_paid).max(Decimal::ZERO);
    updated.overpaid = updated.amount_paid > updated.total_amount;
    updated.status = derive_status(invoice.status, updated.total_amount, updated.amount_paid);
    updated.paid_date = match updated.status {
        InvoiceStatus::Paid if invoice.status != InvoiceStatus::Paid => Some(event.occurred_at),
        InvoiceStatus::Paid => invoice.paid_date,
        _ => None,
    };
    updated.version += 1;

    if updated.overpaid {
        warn!(
            target: AUDIT_TARGET,
            invoice_id = %invoice.id,
            overpaid_by = %updated.overpaid_amount(),
            "Invoice overpaid; flagged for reconciliation"
        );
    }

    Ok(updated)
}

/// Invoice ledger operations
#[async_trait]
pub trait LedgerOperations: Send + Sync {
    async fn create_invoice(&self, invoice: Invoice) -> Result<InvoiceId>;

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice>;

    async fn send_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice>;

    async fn cancel_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice>;

    /// Apply against the invoice as it was at `expected_version`; stale reads
    /// fail with [`BillingError::StaleInvoiceState`].
    async fn apply_payment(
        &self,
        invoice_id: &InvoiceId,
        event: &PaymentEvent,
        expected_version: u64,
    ) -> Result<Invoice>;

    /// Re-read and retry on stale state, up to the configured attempt limit.
    async fn apply_payment_with_retry(
        &self,
        invoice_id: &InvoiceId,
        event: &PaymentEvent,
    ) -> Result<Invoice>;
}

pub struct PaymentLedger {
    repository: Arc<dyn InvoiceRepository + Send + Sync>,
    max_retries: u32,
}

impl PaymentLedger {
    pub fn new(repository: Arc<dyn InvoiceRepository + Send + Sync>, max_retries: u32) -> Self {
        Self {
            repository,
            max_retries: max_retries.max(1),
        }
    }

    async fn load(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.repository
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::InvoiceNotFound {
                id: invoice_id.to_string(),
            })
    }

    /// Compare-and-swap one change computed from a fresh read.
    async fn commit<F>(&self, invoice_id: &InvoiceId, expected_version: Option<u64>, change: F) -> Result<Invoice>
    where
        F: Fn(&Invoice) -> Result<Invoice> + Send + Sync,
    {
        let current = self.load(invoice_id).await?;
        let expected = expected_version.unwrap_or(current.version);
        if current.version != expected {
            return Err(BillingError::StaleInvoiceState {
                invoice_id: invoice_id.to_string(),
                expected_version: expected,
                actual_version: current.version,
            });
        }

        let updated = change(&current)?;
        if updated.version != current.version {
            self.repository
                .update_if_version(&updated, current.version)
                .await?;
        }
        Ok(updated)
    }

    async fn commit_with_retry<F>(&self, invoice_id: &InvoiceId, change: F) -> Result<Invoice>
    where
        F: Fn(&Invoice) -> Result<Invoice> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            match self.commit(invoice_id, None, &change).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    debug!(invoice_id = %invoice_id, attempt, error = %err, "Retrying invoice update");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl LedgerOperations for PaymentLedger {
    async fn create_invoice(&self, invoice: Invoice) -> Result<InvoiceId> {
        let invoice_id = invoice.id;
        self.repository.create_invoice(&invoice).await?;
        info!(
            invoice_id = %invoice_id,
            invoice_number = %invoice.invoice_number,
            company_id = %invoice.company_id,
            total = %invoice.total_amount,
            "Invoice created"
        );
        Ok(invoice_id)
    }

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.load(invoice_id).await
    }

    async fn send_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.commit_with_retry(invoice_id, |current| {
            let mut next = current.clone();
            next.send()?;
            Ok(next)
        })
        .await
    }

    async fn cancel_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.commit_with_retry(invoice_id, |current| {
            let mut next = current.clone();
            next.cancel()?;
            Ok(next)
        })
        .await
    }

    async fn apply_payment(
        &self,
        invoice_id: &InvoiceId,
        event: &PaymentEvent,
        expected_version: u64,
    ) -> Result<Invoice> {
        let updated = self
            .commit(invoice_id, Some(expected_version), |current| {
                apply_payment(current, event)
            })
            .await?;
        info!(
            invoice_id = %invoice_id,
            payment_id = %event.id,
            amount_paid = %updated.amount_paid,
            balance_due = %updated.balance_due,
            status = %updated.status,
            "Payment event applied"
        );
        Ok(updated)
    }

    async fn apply_payment_with_retry(
        &self,
        invoice_id: &InvoiceId,
        event: &PaymentEvent,
    ) -> Result<Invoice> {
        let updated = self
            .commit_with_retry(invoice_id, |current| apply_payment(current, event))
            .await?;
        info!(
            invoice_id = %invoice_id,
            payment_id = %event.id,
            amount_paid = %updated.amount_paid,
            balance_due = %updated.balance_due,
            status = %updated.status,
            "Payment event applied"
        );
        Ok(updated)
    }
}
