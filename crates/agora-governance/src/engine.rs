//! The governance engine facade.
//!
//! [`Governance`] serializes every mutation through one write lock over
//! [`GovernanceState`]. Each operation validates, commits, then appends
//! to the audit log and notifies observers before the lock is released,
//! so observers see commits in order. Readers take the read lock and
//! return owned copies.

use std::fmt;
use std::sync::Arc;
use agora_types::{Address, Amount, AssetId, ContentRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::access::{AccessControl, Role};
use crate::audit::{AuditEntry, AuditLog, GovernanceEvent};
use crate::config::VotingConfig;
use crate::delegation::{Delegation, DelegationLedger};
use crate::error::GovernanceError;
use crate::external::{ContentStore, TransferMechanism, ValueLedger};
use crate::mechanics::DistributionStats;
use crate::proposal::{Proposal, ProposalRegistry, ProposalStatus, VoteRecord};
use crate::treasury::{BudgetAllocation, ProposalExecution, TokenBalance, Treasury, TreasuryTransaction};
use crate::voting::{self, VoteReceipt, VotingEngine};

/// Callback invoked with every committed audit entry.
///
/// Runs while the engine's write lock is held; it must not call back
/// into the engine.
pub type Observer = Box<dyn Fn(&AuditEntry) + Send + Sync>;

/// Everything the engine owns. Serializable as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceState {
    pub config: VotingConfig,
    pub access: AccessControl,
    pub proposals: ProposalRegistry,
    pub delegations: DelegationLedger,
    pub treasury: Treasury,
    pub audit: AuditLog,
}

impl GovernanceState {
    pub fn new(owner: Address, config: VotingConfig) -> Self {
        Self {
            config,
            access: AccessControl::new(owner),
            proposals: ProposalRegistry::new(),
            delegations: DelegationLedger::new(),
            treasury: Treasury::new(),
            audit: AuditLog::new(),
        }
    }
}

/// External services the engine calls through.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn ValueLedger>,
    pub transfers: Arc<dyn TransferMechanism>,
    pub content: Arc<dyn ContentStore>,
}

/// Governance engine.
pub struct Governance {
    state: RwLock<GovernanceState>,
    collaborators: Collaborators,
    observers: RwLock<Vec<Observer>>,
}

impl fmt::Debug for Governance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governance")
            .field("state", &*self.state.read())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl Governance {
    /// Create an engine with a fresh state.
    pub fn new(owner: Address, config: VotingConfig, collaborators: Collaborators) -> Result<Self, GovernanceError> {
        config.validate()?;
        if owner.is_zero() {
            return Err(GovernanceError::InvalidArgument("Owner cannot be the zero address".to_string()));
        }
        info!(owner = ?owner, "governance engine created");
        Ok(Self::from_state(GovernanceState::new(owner, config), collaborators))
    }

    /// Resume from an existing state.
    pub fn from_state(state: GovernanceState, collaborators: Collaborators) -> Self {
        Self {
            state: RwLock::new(state),
            collaborators,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Restore from a JSON snapshot produced by [`export_json`](Self::export_json).
    pub fn from_snapshot_json(json: &str, collaborators: Collaborators) -> Result<Self, GovernanceError> {
        let state: GovernanceState = serde_json::from_str(json)
            .map_err(|e| GovernanceError::InvalidArgument(format!("Invalid snapshot: {}", e)))?;
        state.config.validate()?;
        Ok(Self::from_state(state, collaborators))
    }

    /// Register an observer for future commits.
    pub fn subscribe(&self, observer: impl Fn(&AuditEntry) + Send + Sync + 'static) {
        self.observers.write().push(Box::new(observer));
    }

    fn ledger(&self) -> &dyn ValueLedger {
        self.collaborators.ledger.as_ref()
    }

    fn commit(&self, state: &mut GovernanceState, now: u64, event: GovernanceEvent) {
        let entry = state.audit.append(now, event);
        debug!(seq = entry.seq, "audit entry appended");
        for observer in self.observers.read().iter() {
            observer(entry);
        }
    }

    // Proposals

    /// Create a proposal referencing content already held by the content store.
    pub fn propose(
        &self,
        proposer: Address,
        title: impl Into<String>,
        content: ContentRef,
        now: u64,
    ) -> Result<u64, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let power = state.delegations.effective_power(&proposer, self.ledger());
        let id = state
            .proposals
            .propose(proposer, power, title.into(), content, &state.config, now)?;

        if let Some(proposal) = state.proposals.get(id) {
            let event = GovernanceEvent::ProposalCreated {
                proposal_id: id,
                proposer,
                title: proposal.title.clone(),
                content,
                start_time: proposal.start_time,
                end_time: proposal.end_time,
            };
            self.commit(state, now, event);
        }
        Ok(id)
    }

    /// Store `body` in the content store, then propose with its reference.
    pub fn propose_with_content(
        &self,
        proposer: Address,
        title: impl Into<String>,
        body: &[u8],
        now: u64,
    ) -> Result<u64, GovernanceError> {
        let content = self.collaborators.content.put(body);
        self.propose(proposer, title, content, now)
    }

    pub fn cancel_proposal(&self, caller: Address, proposal_id: u64, now: u64) -> Result<(), GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let is_owner = state.access.is_owner(&caller);
        state.proposals.cancel(proposal_id, caller, is_owner, now)?;
        self.commit(state, now, GovernanceEvent::ProposalCancelled { proposal_id, caller });
        Ok(())
    }

    /// Close voting and accept the proposal. Owner only.
    pub fn finalize_proposal(&self, caller: Address, proposal_id: u64, now: u64) -> Result<(), GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::Owner)?;
        let total_votes = state.proposals.finalize(proposal_id, &state.config, now)?.total_votes;
        self.commit(state, now, GovernanceEvent::ProposalFinalized { proposal_id, total_votes });
        Ok(())
    }

    // Voting and delegation

    pub fn vote(&self, voter: Address, proposal_id: u64, votes: Amount, now: u64) -> Result<VoteReceipt, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let receipt = VotingEngine::new(&mut state.proposals, &state.delegations, self.ledger(), &state.config)
            .cast(proposal_id, voter, votes, now)?;
        let event = GovernanceEvent::VoteCast {
            proposal_id,
            voter,
            votes: receipt.votes,
            cost: receipt.cost,
        };
        self.commit(state, now, event);
        Ok(receipt)
    }

    /// Delegate all of `from`'s power to `to`, replacing any earlier delegation.
    pub fn delegate(&self, from: Address, to: Address, now: u64) -> Result<Delegation, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let replaced = state.delegations.delegate(from, to, self.ledger(), now)?;
        let edge = state
            .delegations
            .delegation_of(&from)
            .cloned()
            .ok_or(GovernanceError::DelegationNotFound(from))?;

        let event = GovernanceEvent::DelegationSet {
            delegator: from,
            delegatee: to,
            amount: edge.amount,
            replaced: replaced.map(|d| d.delegatee),
        };
        self.commit(state, now, event);
        Ok(edge)
    }

    pub fn revoke_delegation(&self, from: Address, now: u64) -> Result<Delegation, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let revoked = state.delegations.revoke(from)?;
        let event = GovernanceEvent::DelegationRevoked {
            delegator: from,
            delegatee: revoked.delegatee,
            amount: revoked.amount,
        };
        self.commit(state, now, event);
        Ok(revoked)
    }

    // Treasury

    pub fn deposit(&self, source: Address, asset: AssetId, amount: Amount, now: u64) -> Result<TokenBalance, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let balance = state.treasury.deposit(asset, amount, source, now)?;
        self.commit(state, now, GovernanceEvent::Deposit { asset, amount, source });
        Ok(balance)
    }

    /// Reserve treasury funds for a proposal. Governance role only.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_execution(
        &self,
        caller: Address,
        proposal_id: u64,
        recipient: Address,
        asset: AssetId,
        amount: Amount,
        payload: Vec<u8>,
        now: u64,
    ) -> Result<u64, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::Governance)?;
        let execution_id = state
            .treasury
            .schedule_execution(&state.proposals, proposal_id, recipient, asset, amount, payload, now)?;

        let event = GovernanceEvent::ExecutionScheduled {
            execution_id,
            proposal_id,
            recipient,
            asset,
            amount,
        };
        self.commit(state, now, event);
        Ok(execution_id)
    }

    /// Pay out a scheduled execution. A failed transfer is rolled back,
    /// recorded in the audit log and reported.
    pub fn execute_execution(&self, execution_id: u64, now: u64) -> Result<ProposalExecution, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let result = state.treasury.execute_execution(
            &state.proposals,
            execution_id,
            self.collaborators.transfers.as_ref(),
            now,
        );
        match result {
            Ok(execution) => {
                let event = GovernanceEvent::ExecutionCompleted {
                    execution_id,
                    proposal_id: execution.proposal_id,
                    recipient: execution.recipient,
                    asset: execution.asset,
                    amount: execution.amount,
                };
                self.commit(state, now, event);
                Ok(execution)
            }
            Err(GovernanceError::TransferFailed(reason)) => {
                let event = GovernanceEvent::ExecutionTransferFailed {
                    execution_id,
                    reason: reason.clone(),
                };
                self.commit(state, now, event);
                Err(GovernanceError::TransferFailed(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Create a budget category. Treasury manager only.
    pub fn create_budget(
        &self,
        caller: Address,
        category: &str,
        asset: AssetId,
        amount: Amount,
        now: u64,
    ) -> Result<BudgetAllocation, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::TreasuryManager)?;
        let budget = state.treasury.create_budget(category, asset, amount, now)?;
        let event = GovernanceEvent::BudgetCreated {
            category: budget.category.clone(),
            asset,
            amount,
        };
        self.commit(state, now, event);
        Ok(budget)
    }

    /// Spend from a budget. Treasury manager only.
    pub fn spend_from_budget(
        &self,
        caller: Address,
        category: &str,
        recipient: Address,
        amount: Amount,
        now: u64,
    ) -> Result<BudgetAllocation, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::TreasuryManager)?;
        let result = state.treasury.spend_from_budget(
            category,
            recipient,
            amount,
            self.collaborators.transfers.as_ref(),
            now,
        );
        match result {
            Ok(budget) => {
                let event = GovernanceEvent::BudgetSpent {
                    category: budget.category.clone(),
                    recipient,
                    amount,
                    remaining: budget.remaining_amount,
                };
                self.commit(state, now, event);
                Ok(budget)
            }
            Err(GovernanceError::TransferFailed(reason)) => {
                warn!(category, recipient = ?recipient, "budget spend not completed");
                let event = GovernanceEvent::BudgetTransferFailed {
                    category: category.to_string(),
                    recipient,
                    amount,
                    reason: reason.clone(),
                };
                self.commit(state, now, event);
                Err(GovernanceError::TransferFailed(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Close a budget, releasing what is left. Treasury manager only.
    pub fn close_budget(&self, caller: Address, category: &str, now: u64) -> Result<Amount, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::TreasuryManager)?;
        let released = state.treasury.close_budget(category, now)?;
        let event = GovernanceEvent::BudgetClosed {
            category: category.to_string(),
            released,
        };
        self.commit(state, now, event);
        Ok(released)
    }

    // Administration

    /// Replace the voting configuration. Owner only.
    pub fn set_config(&self, caller: Address, config: VotingConfig, now: u64) -> Result<(), GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.access.require_role(&caller, Role::Owner)?;
        config.validate()?;
        state.config = config.clone();
        info!(binding = ?config.binding, quorum = config.quorum_threshold, "voting config updated");
        self.commit(state, now, GovernanceEvent::ConfigUpdated { config });
        Ok(())
    }

    pub fn grant_role(&self, caller: Address, role: Role, account: Address, now: u64) -> Result<bool, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let added = state.access.grant_role(&caller, role, account)?;
        if added {
            self.commit(state, now, GovernanceEvent::RoleGranted { role, account });
        }
        Ok(added)
    }

    pub fn revoke_role(&self, caller: Address, role: Role, account: Address, now: u64) -> Result<bool, GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let removed = state.access.revoke_role(&caller, role, &account)?;
        if removed {
            self.commit(state, now, GovernanceEvent::RoleRevoked { role, account });
        }
        Ok(removed)
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address, now: u64) -> Result<(), GovernanceError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let previous = state.access.transfer_ownership(&caller, new_owner)?;
        self.commit(state, now, GovernanceEvent::OwnershipTransferred { previous, new_owner });
        Ok(())
    }

    // Reads

    pub fn config(&self) -> VotingConfig {
        self.state.read().config.clone()
    }

    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.state.read().access.has_role(account, role)
    }

    pub fn proposal(&self, proposal_id: u64) -> Option<Proposal> {
        self.state.read().proposals.get(proposal_id).cloned()
    }

    pub fn proposal_count(&self) -> usize {
        self.state.read().proposals.count()
    }

    pub fn proposal_status(&self, proposal_id: u64, now: u64) -> Result<ProposalStatus, GovernanceError> {
        let state = self.state.read();
        state.proposals.status(proposal_id, &state.config, now)
    }

    /// Body of the proposal from the content store, if the store has it.
    pub fn proposal_content(&self, proposal_id: u64) -> Result<Option<Vec<u8>>, GovernanceError> {
        let content = self
            .state
            .read()
            .proposals
            .get(proposal_id)
            .map(|p| p.content)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;
        Ok(self.collaborators.content.get(&content))
    }

    pub fn vote_of(&self, proposal_id: u64, voter: &Address) -> Option<VoteRecord> {
        self.state
            .read()
            .proposals
            .get(proposal_id)
            .and_then(|p| p.vote_of(voter).copied())
    }

    pub fn has_voted(&self, proposal_id: u64, voter: &Address) -> bool {
        self.vote_of(proposal_id, voter).is_some()
    }

    pub fn delegated_power(&self, account: &Address) -> Amount {
        self.state.read().delegations.delegated_power_to(account)
    }

    pub fn effective_power(&self, account: &Address) -> Amount {
        self.state.read().delegations.effective_power(account, self.ledger())
    }

    pub fn delegation_of(&self, delegator: &Address) -> Option<Delegation> {
        self.state.read().delegations.delegation_of(delegator).cloned()
    }

    pub fn token_balance(&self, asset: &AssetId) -> TokenBalance {
        self.state.read().treasury.balance(asset)
    }

    pub fn budget(&self, category: &str) -> Option<BudgetAllocation> {
        self.state.read().treasury.budget(category).cloned()
    }

    pub fn execution(&self, execution_id: u64) -> Option<ProposalExecution> {
        self.state.read().treasury.execution(execution_id).cloned()
    }

    pub fn treasury_transactions(&self) -> Vec<TreasuryTransaction> {
        self.state.read().treasury.transactions().to_vec()
    }

    pub fn analyze_votes(&self, proposal_id: u64) -> Result<DistributionStats, GovernanceError> {
        self.with_proposal(proposal_id, voting::analyze)
    }

    pub fn sybil_score(&self, proposal_id: u64) -> Result<u8, GovernanceError> {
        self.with_proposal(proposal_id, voting::sybil_score)
    }

    pub fn participation_rate(&self, proposal_id: u64, eligible_voters: u64) -> Result<u64, GovernanceError> {
        self.with_proposal(proposal_id, |p| voting::participation(p, eligible_voters))
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().audit.entries().to_vec()
    }

    /// Audit entries committed after sequence number `seq`.
    pub fn audit_since(&self, seq: u64) -> Vec<AuditEntry> {
        self.state.read().audit.since(seq).to_vec()
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> GovernanceState {
        self.state.read().clone()
    }

    /// Serialize a snapshot. Serialization runs after the lock is released.
    pub fn export_json(&self) -> Result<String, GovernanceError> {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| GovernanceError::InvalidArgument(format!("Snapshot serialization failed: {}", e)))
    }

    /// Run `f` on a copy of the proposal, outside the lock.
    fn with_proposal<T>(&self, proposal_id: u64, f: impl FnOnce(&Proposal) -> T) -> Result<T, GovernanceError> {
        let proposal = self
            .proposal(proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;
        Ok(f(&proposal))
    }
}
