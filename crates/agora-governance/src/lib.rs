//! Agora Governance - Quadratic voting governance engine.
//!
//! This crate provides:
//! - Proposal lifecycle management
//! - Quadratic voting with one vote per account per proposal
//! - One-hop power delegation
//! - Treasury accounting, scheduled executions and budgets
//! - Role-based access control and an append-only audit log
//!
//! Time is never read from a clock: every mutating operation takes the
//! caller's `now`, and voting windows are evaluated against it lazily.

pub mod access;
pub mod audit;
pub mod config;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod external;
pub mod mechanics;
pub mod proposal;
pub mod treasury;
pub mod voting;

pub use access::{AccessControl, Role};
pub use audit::{AuditEntry, AuditLog, GovernanceEvent};
pub use config::{ConfigBinding, VotingConfig};
pub use delegation::{Delegation, DelegationLedger};
pub use engine::{Collaborators, Governance, GovernanceState, Observer};
pub use error::{ErrorKind, GovernanceError, LedgerError, TransferError};
pub use external::{ContentStore, InMemoryContentStore, InMemoryLedger, RecordingTransfer, TransferMechanism, ValueLedger};
pub use mechanics::{quadratic_cost, max_votes, DistributionStats};
pub use proposal::{Proposal, ProposalRegistry, ProposalStatus, VoteRecord};
pub use treasury::{BudgetAllocation, ProposalExecution, TokenBalance, Treasury};
pub use voting::{VoteReceipt, VotingEngine};
