//! Error kinds surfaced by the transport request workflow
use crate::types::{GroupId, UserId};

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("Not allowed: {0}")]
    Precondition(String),
    #[error("User {user} is not a member of approver group {group}")]
    Authorization { user: UserId, group: GroupId },
    #[error("Missing configuration: {0}")]
    Configuration(String),
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: u64 },
    #[error("Transport request {id} was modified concurrently, reload and retry")]
    Conflict { id: u64 },
    #[error("Unit {from} cannot be converted to unit {to}")]
    IncompatibleUnits { from: u64, to: u64 },
    #[error("Transfer service failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

/// Failures reported by the physical transfer subsystem.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer {0} is unknown to the transfer service")]
    UnknownTransfer(u64),
    #[error("Transfer could not be confirmed: {0}")]
    Confirm(String),
    #[error("Stock could not be reserved: {0}")]
    Reserve(String),
    #[error("Transfer could not be created: {0}")]
    Create(String),
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for WorkflowError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        WorkflowError::Encode(value.to_string())
    }
}

impl WorkflowError {
    pub fn not_found(kind: &'static str, id: impl Into<u64>) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.into(),
        }
    }
    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkflowError::Precondition(_))
    }
}
