use agora_types::{Address, Amount};
use thiserror::Error;

/// Errors that can occur in governance operations.
///
/// Every error is recoverable: a failed operation leaves the engine
/// exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Self-delegation not allowed")]
    SelfDelegation,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Proposal threshold not met: power {power} < {required}")]
    BelowProposalThreshold { power: Amount, required: Amount },

    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(u64),

    #[error("Budget not found: {0}")]
    BudgetNotFound(String),

    #[error("No delegation from {0:?}")]
    DelegationNotFound(Address),

    #[error("Voting is not open for proposal {0}")]
    VotingNotOpen(u64),

    #[error("Voting period still open for proposal {0}")]
    VotingStillOpen(u64),

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Proposal already executed")]
    AlreadyExecuted,

    #[error("Proposal already cancelled")]
    AlreadyCancelled,

    #[error("Proposal {0} can no longer be cancelled")]
    NotCancellable(u64),

    #[error("Proposal cooldown active: {remaining} remaining")]
    CooldownActive { remaining: u64 },

    #[error("Budget category already exists: {0}")]
    BudgetExists(String),

    #[error("Budget inactive: {0}")]
    BudgetInactive(String),

    #[error("Insufficient voting power: {available} < {required}")]
    InsufficientPower { available: Amount, required: Amount },

    #[error("Insufficient funds: {available} < {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("Insufficient budget: {remaining} < {requested}")]
    InsufficientBudget { remaining: Amount, requested: Amount },

    #[error("Quorum not reached: {actual} < {required}")]
    QuorumNotReached { actual: Amount, required: Amount },

    #[error("Proposal {0} has not been approved")]
    NotApproved(u64),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Error taxonomy shared by every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Caller lacks the required role or power
    Authorization,
    /// Operation invalid for the current lifecycle state
    State,
    /// Treasury, budget or ledger balance below requirement
    InsufficientFunds,
    /// Voting power below requirement
    InsufficientPower,
    /// Unknown proposal, execution, budget or delegation
    NotFound,
    QuorumNotMet,
    /// Execution attempted before governance acceptance
    NotApproved,
    /// A collaborator failed for a reason other than a balance shortfall
    External,
    Config,
}

impl GovernanceError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use GovernanceError::*;
        match self {
            InvalidArgument(_) | ArithmeticOverflow(_) | SelfDelegation => ErrorKind::Validation,
            Unauthorized(_) | BelowProposalThreshold { .. } => ErrorKind::Authorization,
            ProposalNotFound(_) | ExecutionNotFound(_) | BudgetNotFound(_)
            | DelegationNotFound(_) => ErrorKind::NotFound,
            VotingNotOpen(_) | VotingStillOpen(_) | AlreadyVoted | AlreadyExecuted
            | AlreadyCancelled | NotCancellable(_) | CooldownActive { .. }
            | BudgetExists(_) | BudgetInactive(_) => ErrorKind::State,
            InsufficientPower { .. } => ErrorKind::InsufficientPower,
            InsufficientFunds { .. } | InsufficientBudget { .. } => ErrorKind::InsufficientFunds,
            QuorumNotReached { .. } => ErrorKind::QuorumNotMet,
            NotApproved(_) => ErrorKind::NotApproved,
            TransferFailed(_) | Ledger(_) => ErrorKind::External,
            Config(_) => ErrorKind::Config,
        }
    }
}

/// Failure reported by the value ledger.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance: {available} < {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<LedgerError> for GovernanceError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance { available, required } => {
                GovernanceError::InsufficientFunds { available, required }
            }
            other => GovernanceError::Ledger(other.to_string()),
        }
    }
}

/// Failure reported by the transfer mechanism.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransferError {
    #[error("Recipient rejected transfer: {0}")]
    Rejected(String),

    #[error("Transfer mechanism unavailable: {0}")]
    Unavailable(String),
}

impl From<TransferError> for GovernanceError {
    fn from(e: TransferError) -> Self {
        GovernanceError::TransferFailed(e.to_string())
    }
}
