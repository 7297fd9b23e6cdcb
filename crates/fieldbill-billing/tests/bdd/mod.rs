use chrono::NaiveDate;
use fieldbill_billing::config::BillingConfig;
use fieldbill_billing::domain::{
    DocumentKind, Invoice, LedgerOperations, LineItem, LineItemBuilder, PaymentLedger,
    RateCatalog, RateTable, SequenceAllocator, WorkUnit,
};
use fieldbill_billing::storage::{InMemoryInvoiceRepository, InMemorySequenceStore};
use fieldbill_common::CompanyId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct TestContext {
    pub config: BillingConfig,
    pub company_id: CompanyId,
    pub repository: Arc<InMemoryInvoiceRepository>,
    pub ledger: Arc<PaymentLedger>,
    pub allocator: SequenceAllocator,
    pub builder: LineItemBuilder,
}

impl TestContext {
    pub fn new() -> Self {
        let mut config = BillingConfig::default();
        config.rate_tables = Self::seed_catalog();
        config.invoicing.max_payment_retries = 64;

        let repository = Arc::new(InMemoryInvoiceRepository::new());
        let ledger = Arc::new(PaymentLedger::new(
            repository.clone(),
            config.invoicing.max_payment_retries,
        ));
        let allocator = SequenceAllocator::new(
            Arc::new(InMemorySequenceStore::new()),
            config.numbering.clone(),
        );
        let builder = LineItemBuilder::new(config.build_options());

        TestContext {
            config,
            company_id: CompanyId::new("acme-rentals").expect("valid company id"),
            repository,
            ledger,
            allocator,
            builder,
        }
    }

    fn seed_catalog() -> RateCatalog {
        let mut catalog = RateCatalog::new();

        let excavator = RateTable::daily(dec!(50), date(2024, 1, 1))
            .with_weekly_rate(dec!(300))
            .with_monthly_rate(dec!(1000))
            .with_fees(dec!(75), dec!(60));
        catalog
            .insert("excavator", excavator)
            .expect("valid excavator table");

        let mut lift = RateTable::daily(dec!(120), date(2024, 1, 1));
        lift.min_rental_days = 3;
        lift.max_rental_days = Some(14);
        lift.cleaning_fee = dec!(40);
        lift.late_fee_daily = dec!(25);
        catalog.insert("scissor_lift", lift).expect("valid lift table");

        let mut retired = RateTable::daily(dec!(80), date(2023, 1, 1));
        retired.effective_until = Some(date(2023, 12, 31));
        catalog.insert("old_trailer", retired).expect("valid trailer table");

        catalog
    }

    pub fn table(&self, name: &str) -> &RateTable {
        self.config.rate_tables.get(name).expect("seeded table")
    }

    pub fn lines_for(&self, table: &str, start: NaiveDate, end: NaiveDate) -> Vec<LineItem> {
        let work_unit = WorkUnit::rental(table, start, end);
        self.builder
            .build_lines(&work_unit, self.table(table))
            .expect("lines build")
    }

    /// Number, draft, store and send an invoice for `lines`.
    pub async fn issue_invoice(
        &self,
        lines: Vec<LineItem>,
        discount: Decimal,
        tax_rate: Decimal,
        invoice_date: NaiveDate,
    ) -> Invoice {
        let number = self
            .allocator
            .next_document_number(&self.company_id, DocumentKind::Invoice, invoice_date)
            .await
            .expect("number allocated");

        let draft = Invoice::draft(
            self.company_id.clone(),
            number.to_string(),
            lines,
            discount,
            tax_rate,
            invoice_date,
            self.config.invoicing.payment_terms_days,
        )
        .expect("draft invoice");

        let invoice_id = self
            .ledger
            .create_invoice(draft)
            .await
            .expect("invoice stored");
        self.ledger
            .send_invoice(&invoice_id)
            .await
            .expect("invoice sent")
    }

    pub async fn invoice(&self, invoice: &Invoice) -> Invoice {
        self.ledger
            .get_invoice(&invoice.id)
            .await
            .expect("invoice exists")
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub mod scenarios;
