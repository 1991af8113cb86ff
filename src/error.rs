use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid house cut ratio {0}: must be between 0.0 and 1.0")]
    InvalidHouseCutRatio(f64),

    #[error("Invalid reconciliation tolerance {0}: must be a finite, non-negative amount")]
    InvalidTolerance(f64),

    #[error("Validation error for {entity} '{id}': {details}")]
    ValidationError {
        entity: String,
        id: String,
        details: String,
    },

    #[error("Section {section} produced a non-finite total ({amount})")]
    NonFiniteTotal { section: String, amount: f64 },

    #[error("Unknown deal: {0}")]
    UnknownDeal(String),

    #[error("Unknown payment: {0}")]
    UnknownPayment(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Non-fatal problems found while building a report. The affected record is
/// skipped or a documented fallback is applied; the rest of the report is
/// still produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// A transaction references an account or item that cannot be resolved.
    MissingReference {
        transaction_id: String,
        reference: String,
        details: String,
    },

    /// An account path contains an empty segment.
    MalformedPath {
        account_id: String,
        qualified_name: String,
    },

    /// Two accounts share the same full path; only the first one is kept.
    AmbiguousPath {
        account_id: String,
        qualified_name: String,
        kept_account_id: String,
    },

    DivisionByZero {
        deal_id: String,
        details: String,
    },

    /// Stored derived payment fields disagree with a fresh waterfall.
    StaleOverride {
        payment_id: String,
        field: String,
        stored: f64,
        expected: f64,
    },

    SectionFailed {
        section: String,
        details: String,
    },

    UnknownCategory {
        category: String,
    },

    RejectedTransaction {
        transaction_id: String,
        details: String,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference {
                transaction_id,
                reference,
                details,
            } => write!(
                f,
                "Transaction {} references unknown '{}': {}",
                transaction_id, reference, details
            ),
            Self::MalformedPath {
                account_id,
                qualified_name,
            } => write!(
                f,
                "Account {} has a malformed path '{}' (empty segment)",
                account_id, qualified_name
            ),
            Self::AmbiguousPath {
                account_id,
                qualified_name,
                kept_account_id,
            } => write!(
                f,
                "Account {} collides with account {} on path '{}'",
                account_id, kept_account_id, qualified_name
            ),
            Self::DivisionByZero { deal_id, details } => {
                write!(f, "Deal {}: {}", deal_id, details)
            }
            Self::StaleOverride {
                payment_id,
                field,
                stored,
                expected,
            } => write!(
                f,
                "Payment {} has stale {}: stored {:.2}, expected {:.2}",
                payment_id, field, stored, expected
            ),
            Self::SectionFailed { section, details } => {
                write!(f, "Section {} failed: {}", section, details)
            }
            Self::UnknownCategory { category } => {
                write!(f, "External category '{}' matches no report section", category)
            }
            Self::RejectedTransaction {
                transaction_id,
                details,
            } => write!(f, "Transaction {} rejected: {}", transaction_id, details),
        }
    }
}
