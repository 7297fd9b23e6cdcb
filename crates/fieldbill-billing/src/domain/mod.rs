pub mod financing;
pub mod invoices;
pub mod line_items;
pub mod payments;
pub mod pricing;
pub mod rates;
pub mod sequences;
pub mod types;

pub use financing::{
    amortization_schedule, compute_monthly_payment, remaining_balance, total_interest,
    whole_months_between, FinanceAgreement, ScheduleEntry,
};
pub use invoices::{aggregate, derive_status, Invoice, InvoiceTotals};
pub use line_items::{build_lines, BuildOptions, LineItem, LineItemBuilder, WorkUnit};
pub use payments::{apply_payment, LedgerOperations, PaymentEvent, PaymentLedger};
pub use pricing::{price, price_breakdown, PeriodBreakdown};
pub use rates::{RateCatalog, RateTable};
pub use sequences::{DocumentNumber, SequenceAllocator};
pub use types::{
    round_money, DocumentKind, InvoiceId, InvoiceStatus, LineKind, PaymentId, PaymentMethod,
    PaymentStatus,
};
