use crate::config::{BillingConfig, NumberingConfig};
use crate::domain::types::DocumentKind;
use crate::error::{BillingError, Result};
use crate::storage::SequenceStore;
use chrono::NaiveDate;
use fieldbill_common::CompanyId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const DATE_FORMAT: &str = "%y%m%d";
const DATE_LEN: usize = 6;

/// A rendered document identifier: `prefix + YYMMDD + zero-padded sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub prefix: String,
    pub date: NaiveDate,
    pub sequence: u64,
    pub width: usize,
}

impl DocumentNumber {
    /// Split a rendered number back into its parts. The prefix is the leading
    /// run of non-digits.
    pub fn parse(s: &str) -> Result<Self> {
        let digits_at = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| BillingError::validation("document_number", "missing date and sequence"))?;
        let (prefix, rest) = s.split_at(digits_at);

        if prefix.is_empty() {
            return Err(BillingError::validation("document_number", "missing prefix"));
        }
        if rest.len() <= DATE_LEN || !rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(BillingError::validation(
                "document_number",
                format!("expected {} date digits followed by a sequence in {}", DATE_LEN, s),
            ));
        }

        let (date_part, sequence_part) = rest.split_at(DATE_LEN);
        let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|e| {
            BillingError::validation("document_number", format!("bad date {}: {}", date_part, e))
        })?;
        let sequence = sequence_part.parse::<u64>().map_err(|e| {
            BillingError::validation("document_number", format!("bad sequence: {}", e))
        })?;

        Ok(Self {
            prefix: prefix.to_string(),
            date,
            sequence,
            width: sequence_part.len(),
        })
    }

    /// Per-day counter key for a prefix, without the tenant part.
    pub fn day_key(prefix: &str, date: NaiveDate) -> String {
        format!("{}{}", prefix, date.format(DATE_FORMAT))
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            Self::day_key(&self.prefix, self.date),
            self.sequence,
            width = self.width
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Issues per-scope sequence values and document numbers.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn SequenceStore>,
    numbering: NumberingConfig,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn SequenceStore>, numbering: NumberingConfig) -> Self {
        Self { store, numbering }
    }

    /// Allocator over the configured durable store.
    ///
    /// With the `postgres` feature the counters live in `database.url`, so
    /// numbers keep increasing across processes. Without it they are held in
    /// memory and restart at 1 with every new allocator.
    pub async fn from_config(config: &BillingConfig) -> Result<Self> {
        #[cfg(feature = "postgres")]
        let store: Arc<dyn SequenceStore> = {
            let store = crate::storage::PgSequenceStore::connect(
                &config.database.url,
                config.database.max_connections,
            )
            .await?;
            store.ensure_schema().await?;
            Arc::new(store)
        };

        #[cfg(not(feature = "postgres"))]
        let store: Arc<dyn SequenceStore> = {
            debug!("Using in-memory document sequences");
            Arc::new(crate::storage::InMemorySequenceStore::new())
        };

        Ok(Self::new(store, config.numbering.clone()))
    }

    /// Whether issued numbers survive the process.
    pub fn is_durable() -> bool {
        cfg!(feature = "postgres")
    }

    pub fn numbering(&self) -> &NumberingConfig {
        &self.numbering
    }

    /// Next value in `scope`; strictly increasing from 1, never reused.
    pub async fn next(&self, scope: &str) -> Result<u64> {
        if scope.is_empty() {
            return Err(BillingError::validation("scope", "must not be empty"));
        }
        self.store.increment(scope).await
    }

    /// Next number for `kind` issued by `company_id` on `date`.
    ///
    /// The counter is scoped per company and day, so two tenants may both
    /// hold `INV2403010001`.
    pub async fn next_document_number(
        &self,
        company_id: &CompanyId,
        kind: DocumentKind,
        date: NaiveDate,
    ) -> Result<DocumentNumber> {
        let prefix = self.numbering.prefix_for(kind).to_string();
        let scope = format!("{}/{}", company_id, DocumentNumber::day_key(&prefix, date));
        let sequence = self.next(&scope).await?;

        let number = DocumentNumber {
            prefix,
            date,
            sequence,
            width: self.numbering.sequence_width,
        };
        debug!(company_id = %company_id, kind = %kind, number = %number, "Allocated document number");
        Ok(number)
    }
}
