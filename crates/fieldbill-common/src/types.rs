//! Common types used across fieldbill components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for company identifier validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompanyIdError {
    #[error("Company id cannot be empty")]
    Empty,
    #[error("Company id too long (max 64 characters)")]
    TooLong,
    #[error("Company id contains invalid characters. Only alphanumeric characters, hyphens, and underscores are allowed")]
    InvalidCharacters,
}

/// Tenant identifier supplied by the caller's company resolution.
///
/// Used for scoping only (document sequences, invoice ownership), never in
/// monetary math. Company ids must:
/// - Be between 1 and 64 characters long
/// - Only contain alphanumeric characters, hyphens (-), and underscores (_)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyId(String);

impl CompanyId {
    pub fn new(id: impl Into<String>) -> Result<Self, CompanyIdError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<(), CompanyIdError> {
        if id.is_empty() {
            return Err(CompanyIdError::Empty);
        }

        if id.len() > 64 {
            return Err(CompanyIdError::TooLong);
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CompanyIdError::InvalidCharacters);
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompanyId {
    type Err = CompanyIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CompanyId {
    type Error = CompanyIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompanyId> for String {
    fn from(id: CompanyId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_id_valid() {
        assert!(CompanyId::new("acme-waste_01").is_ok());
        assert!(CompanyId::new("a").is_ok());
        assert!(CompanyId::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn test_company_id_invalid() {
        assert_eq!(CompanyId::new(""), Err(CompanyIdError::Empty));
        assert_eq!(CompanyId::new("a".repeat(65)), Err(CompanyIdError::TooLong));
        assert_eq!(
            CompanyId::new("acme/west"),
            Err(CompanyIdError::InvalidCharacters)
        );
        assert_eq!(
            CompanyId::new("acme west"),
            Err(CompanyIdError::InvalidCharacters)
        );
    }

    #[test]
    fn test_company_id_serde() {
        let id = CompanyId::new("acme").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"acme\"");

        let parsed: CompanyId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);

        let bad: Result<CompanyId, _> = serde_json::from_str("\"no/slashes\"");
        assert!(bad.is_err());
    }
}
