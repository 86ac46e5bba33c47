use crate::domain::finance::{FinanceAction, FinanceStatus};
use std::fmt;
use thiserror::Error;

/// A single field-level or precondition violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("Cannot {action} transaction {id} in status {from}")]
    InvalidStateTransition {
        id: u32,
        from: FinanceStatus,
        action: FinanceAction,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },
    #[error("Actor {actor} lacks permission {permission}")]
    PermissionDenied { actor: u32, permission: String },
    #[error("Salary record for employee {employee_id} in {month:02}/{year} already exists")]
    DuplicateSalary {
        employee_id: u32,
        month: u32,
        year: i32,
    },
    #[error("Transaction code {0} already exists")]
    DuplicateCode(String),
    #[error("Code sequence unavailable: {0}")]
    SequenceUnavailable(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl LedgerError {
    /// Shorthand for a validation failure on one field.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// True for failures raised by the persistence gateway rather than by
    /// validation or the state machine.
    pub fn is_persistence_failure(&self) -> bool {
        match self {
            Self::DuplicateSalary { .. }
            | Self::DuplicateCode(_)
            | Self::SequenceUnavailable(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Csv(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => true,
            _ => false,
        }
    }

    /// The field errors carried by a validation failure, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
