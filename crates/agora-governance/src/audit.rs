//! Append-only audit log of committed mutations.

use agora_types::{Address, Amount, AssetId, ContentRef};
use serde::{Deserialize, Serialize};
use crate::access::Role;
use crate::config::VotingConfig;

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceEvent {
    ProposalCreated {
        proposal_id: u64,
        proposer: Address,
        title: String,
        content: ContentRef,
        start_time: u64,
        end_time: u64,
    },
    ProposalCancelled {
        proposal_id: u64,
        caller: Address,
    },
    ProposalFinalized {
        proposal_id: u64,
        total_votes: Amount,
    },
    VoteCast {
        proposal_id: u64,
        voter: Address,
        votes: Amount,
        cost: Amount,
    },
    DelegationSet {
        delegator: Address,
        delegatee: Address,
        amount: Amount,
        /// Delegatee of the replaced delegation, if any
        replaced: Option<Address>,
    },
    DelegationRevoked {
        delegator: Address,
        delegatee: Address,
        amount: Amount,
    },
    Deposit {
        asset: AssetId,
        amount: Amount,
        source: Address,
    },
    ExecutionScheduled {
        execution_id: u64,
        proposal_id: u64,
        recipient: Address,
        asset: AssetId,
        amount: Amount,
    },
    ExecutionCompleted {
        execution_id: u64,
        proposal_id: u64,
        recipient: Address,
        asset: AssetId,
        amount: Amount,
    },
    /// Transfer failed and the payout was reversed
    ExecutionTransferFailed {
        execution_id: u64,
        reason: String,
    },
    BudgetCreated {
        category: String,
        asset: AssetId,
        amount: Amount,
    },
    BudgetSpent {
        category: String,
        recipient: Address,
        amount: Amount,
        remaining: Amount,
    },
    /// Transfer failed and the spend was reversed
    BudgetTransferFailed {
        category: String,
        recipient: Address,
        amount: Amount,
        reason: String,
    },
    BudgetClosed {
        category: String,
        released: Amount,
    },
    ConfigUpdated {
        config: VotingConfig,
    },
    RoleGranted {
        role: Role,
        account: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
    },
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
    },
}

/// One audit log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Strictly increasing, starting at 1
    pub seq: u64,
    /// Caller-supplied time of the commit
    pub at: u64,
    pub event: GovernanceEvent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` and return the stored entry.
    pub fn append(&mut self, at: u64, event: GovernanceEvent) -> &AuditEntry {
        let seq = self.entries.last().map_or(1, |e| e.seq + 1);
        self.entries.push(AuditEntry { seq, at, event });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries with a sequence number greater than `seq`.
    pub fn since(&self, seq: u64) -> &[AuditEntry] {
        let start = self.entries.partition_point(|e| e.seq <= seq);
        &self.entries[start..]
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
