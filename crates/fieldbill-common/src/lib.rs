//! Shared building blocks for fieldbill binaries and libraries

pub mod logging;
pub mod types;

pub use types::{CompanyId, CompanyIdError};
