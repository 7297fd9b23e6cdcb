pub mod invoices;
pub mod sequences;

pub use invoices::{InMemoryInvoiceRepository, InvoiceRepository};

pub use sequences::{InMemorySequenceStore, SequenceStore};

#[cfg(feature = "postgres")]
pub use sequences::PgSequenceStore;
