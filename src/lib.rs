//! Approval workflow for stock transport requests between warehouses.
//!
//! A [`TransportRequest`] is drafted, submitted against the active
//! [`ApprovalRule`]s of its providing warehouse, approved (by hand or by the
//! rule itself) and confirmed once every internal transfer it spawned is done.

pub mod config;
pub mod error;
pub mod memory;
pub mod ports;
pub mod request;
pub mod rule;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod totals;
pub mod transfer;
pub mod types;
pub mod utils;

pub use error::{Result, TransferError, WorkflowError};
pub use request::{LineChange, NewRequest, RequestLine, RequestState, TransportRequest};
pub use rule::ApprovalRule;
pub use service::{Actor, ApprovalOutcome, Collaborators, SubmitOutcome, TransportService};
pub use store::Store;
