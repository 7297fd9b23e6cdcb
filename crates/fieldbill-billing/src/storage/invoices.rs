use crate::domain::invoices::Invoice;
use crate::domain::types::InvoiceId;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>>;
    async fn create_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// Store `invoice` only if the stored copy is still at `expected_version`.
    ///
    /// Fails with [`BillingError::StaleInvoiceState`] when another writer got
    /// there first.
    async fn update_if_version(&self, invoice: &Invoice, expected_version: u64) -> Result<()>;
}

/// Invoice store for development and tests.
///
/// The version check and the write share one exclusive lock, so concurrent
/// writers to the same invoice serialize and exactly one of them wins.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.invoices.read().await.len()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(id).cloned())
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&invoice.id) {
            return Err(BillingError::validation(
                "invoice_id",
                format!("invoice {} already exists", invoice.id),
            ));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn update_if_version(&self, invoice: &Invoice, expected_version: u64) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or_else(|| BillingError::InvoiceNotFound {
                id: invoice.id.to_string(),
            })?;

        if stored.version != expected_version {
            return Err(BillingError::StaleInvoiceState {
                invoice_id: invoice.id.to_string(),
                expected_version,
                actual_version: stored.version,
            });
        }

        *stored = invoice.clone();
        Ok(())
    }
}
