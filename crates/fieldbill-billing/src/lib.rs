//! Billing and financial calculation engine for rental and service companies.
//!
//! Turns rate tables and completed work into priced line items and invoices,
//! applies payment events to invoice balances, computes financing payments,
//! and issues sequential document numbers.

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use config::BillingConfig;
pub use error::{BillingError, Result};
