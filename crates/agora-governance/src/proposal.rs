//! Proposal lifecycle management.
//!
//! Proposals go through states: Pending -> Active -> Succeeded/Defeated -> Executed,
//! with Cancelled reachable from Pending or Active. Status is derived from
//! the stored flags and the caller's clock, so an expired voting window is
//! noticed the next time anyone looks.

use std::collections::{BTreeMap, HashMap};
use agora_types::{Address, Amount, ContentRef};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::config::{ConfigBinding, VotingConfig};
use crate::error::GovernanceError;

/// Proposal status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Proposal created, waiting for voting to start
    Pending,
    /// Voting is active
    Active,
    /// Voting ended with quorum reached
    Succeeded,
    /// Voting ended without quorum
    Defeated,
    /// Proposal was finalized and accepted
    Executed,
    /// Proposal was cancelled
    Cancelled,
}

impl ProposalStatus {
    /// Check if voting is still possible.
    pub fn can_vote(&self) -> bool {
        matches!(self, ProposalStatus::Active)
    }

    /// Check if the proposal may still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, ProposalStatus::Pending | ProposalStatus::Active)
    }

    /// Executed and Cancelled are permanent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Executed | ProposalStatus::Cancelled)
    }
}

/// Quorum and per-wallet cap a proposal is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRules {
    pub quorum_threshold: Amount,
    pub max_votes_per_wallet: Amount,
}

impl ProposalRules {
    pub fn from_config(config: &VotingConfig) -> Self {
        Self {
            quorum_threshold: config.quorum(),
            max_votes_per_wallet: config.max_votes(),
        }
    }
}

/// A single account's vote on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub votes: Amount,
    /// Power burned for these votes
    pub cost: Amount,
    pub cast_at: u64,
}

/// Governance proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Sequential id, starting at 1
    pub id: u64,
    pub proposer: Address,
    pub title: String,
    /// Reference to the body held by the content store
    pub content: ContentRef,
    pub created_at: u64,
    /// First instant votes are accepted
    pub start_time: u64,
    /// Last instant votes are accepted
    pub end_time: u64,
    pub total_votes: Amount,
    pub total_voters: u64,
    pub executed: bool,
    pub cancelled: bool,
    pub executed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
    /// Rules captured at creation, used under [`ConfigBinding::FrozenAtCreation`]
    pub frozen_rules: ProposalRules,
    /// voter -> vote
    votes: HashMap<Address, VoteRecord>,
}

/// Tally changes computed ahead of a vote commit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingVote {
    voter: Address,
    record: VoteRecord,
    total_votes: Amount,
    total_voters: u64,
}

impl Proposal {
    /// Rules in force for this proposal under `config`.
    pub fn rules(&self, config: &VotingConfig) -> ProposalRules {
        match config.binding {
            ConfigBinding::Live => ProposalRules::from_config(config),
            ConfigBinding::FrozenAtCreation => self.frozen_rules,
        }
    }

    /// Status at time `now` against `quorum`.
    pub fn status_with_quorum(&self, now: u64, quorum: Amount) -> ProposalStatus {
        if self.cancelled {
            ProposalStatus::Cancelled
        } else if self.executed {
            ProposalStatus::Executed
        } else if now < self.start_time {
            ProposalStatus::Pending
        } else if now <= self.end_time {
            ProposalStatus::Active
        } else if self.total_votes >= quorum {
            ProposalStatus::Succeeded
        } else {
            ProposalStatus::Defeated
        }
    }

    pub fn status(&self, now: u64, config: &VotingConfig) -> ProposalStatus {
        self.status_with_quorum(now, self.rules(config).quorum_threshold)
    }

    /// Voting window is `[start_time, end_time]`, closed on both ends.
    pub fn is_voting_open(&self, now: u64) -> bool {
        !self.executed && !self.cancelled && now >= self.start_time && now <= self.end_time
    }

    pub fn has_voted(&self, voter: &Address) -> bool {
        self.votes.contains_key(voter)
    }

    pub fn vote_of(&self, voter: &Address) -> Option<&VoteRecord> {
        self.votes.get(voter)
    }

    pub fn voters(&self) -> impl Iterator<Item = (&Address, &VoteRecord)> {
        self.votes.iter()
    }

    /// `(votes, cost)` per voter, for distribution analysis.
    pub fn vote_entries(&self) -> Vec<(Amount, Amount)> {
        self.votes.values().map(|r| (r.votes, r.cost)).collect()
    }

    pub fn total_cost(&self) -> Amount {
        self.votes.values().fold(0, |acc, r| acc.saturating_add(r.cost))
    }

    pub fn max_cost(&self) -> Amount {
        self.votes.values().map(|r| r.cost).max().unwrap_or(0)
    }

    /// Check a vote can be recorded and compute the new totals.
    pub(crate) fn prepare_vote(
        &self,
        voter: Address,
        votes: Amount,
        cost: Amount,
        now: u64,
    ) -> Result<PendingVote, GovernanceError> {
        if self.has_voted(&voter) {
            return Err(GovernanceError::AlreadyVoted);
        }
        let total_votes = self
            .total_votes
            .checked_add(votes)
            .ok_or(GovernanceError::ArithmeticOverflow("total votes"))?;
        let total_voters = self
            .total_voters
            .checked_add(1)
            .ok_or(GovernanceError::ArithmeticOverflow("total voters"))?;

        Ok(PendingVote {
            voter,
            record: VoteRecord { votes, cost, cast_at: now },
            total_votes,
            total_voters,
        })
    }

    pub(crate) fn commit_vote(&mut self, pending: PendingVote) {
        self.votes.insert(pending.voter, pending.record);
        self.total_votes = pending.total_votes;
        self.total_voters = pending.total_voters;
    }
}

/// Proposal registry managing all proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRegistry {
    proposals: BTreeMap<u64, Proposal>,
    next_id: u64,
    /// proposer -> time of their latest proposal
    last_proposal_at: HashMap<Address, u64>,
}

impl ProposalRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self {
            proposals: BTreeMap::new(),
            next_id: 1,
            last_proposal_at: HashMap::new(),
        }
    }

    /// Create a new proposal.
    ///
    /// `proposer_power` is the proposer's effective power; it must reach
    /// the configured threshold. A proposer must also wait out the
    /// cooldown since their previous proposal.
    pub fn propose(
        &mut self,
        proposer: Address,
        proposer_power: Amount,
        title: String,
        content: ContentRef,
        config: &VotingConfig,
        now: u64,
    ) -> Result<u64, GovernanceError> {
        if title.trim().is_empty() {
            return Err(GovernanceError::InvalidArgument("Title cannot be empty".to_string()));
        }

        let required = config.proposal_threshold();
        if proposer_power < required {
            return Err(GovernanceError::BelowProposalThreshold {
                power: proposer_power,
                required,
            });
        }

        if let Some(last) = self.last_proposal_at.get(&proposer) {
            let ready_at = last.saturating_add(config.proposal_cooldown);
            if now < ready_at {
                return Err(GovernanceError::CooldownActive { remaining: ready_at - now });
            }
        }

        let start_time = now
            .checked_add(config.voting_delay)
            .ok_or(GovernanceError::ArithmeticOverflow("voting start"))?;
        let end_time = start_time
            .checked_add(config.voting_period)
            .ok_or(GovernanceError::ArithmeticOverflow("voting end"))?;
        let id = self.next_id;
        let next_id = id
            .checked_add(1)
            .ok_or(GovernanceError::ArithmeticOverflow("proposal id"))?;

        let proposal = Proposal {
            id,
            proposer,
            title,
            content,
            created_at: now,
            start_time,
            end_time,
            total_votes: 0,
            total_voters: 0,
            executed: false,
            cancelled: false,
            executed_at: None,
            cancelled_at: None,
            frozen_rules: ProposalRules::from_config(config),
            votes: HashMap::new(),
        };

        self.next_id = next_id;
        self.proposals.insert(id, proposal);
        self.last_proposal_at.insert(proposer, now);

        info!(proposal_id = id, proposer = ?proposer, start_time, end_time, "proposal created");
        Ok(id)
    }

    /// Cancel a pending or active proposal.
    ///
    /// Only the proposer or the owner may cancel.
    pub fn cancel(
        &mut self,
        id: u64,
        caller: Address,
        caller_is_owner: bool,
        now: u64,
    ) -> Result<(), GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;

        if caller != proposal.proposer && !caller_is_owner {
            return Err(GovernanceError::Unauthorized(
                "Only the proposer or owner can cancel".to_string(),
            ));
        }
        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if proposal.cancelled {
            return Err(GovernanceError::AlreadyCancelled);
        }
        if now > proposal.end_time {
            return Err(GovernanceError::NotCancellable(id));
        }

        proposal.cancelled = true;
        proposal.cancelled_at = Some(now);

        info!(proposal_id = id, caller = ?caller, "proposal cancelled");
        Ok(())
    }

    /// Close voting and accept the proposal if quorum was reached.
    ///
    /// Acceptance is recorded by setting `executed`; the treasury reads
    /// that flag before releasing scheduled funds.
    pub fn finalize(
        &mut self,
        id: u64,
        config: &VotingConfig,
        now: u64,
    ) -> Result<&Proposal, GovernanceError> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;

        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if proposal.cancelled {
            return Err(GovernanceError::AlreadyCancelled);
        }
        if now <= proposal.end_time {
            return Err(GovernanceError::VotingStillOpen(id));
        }

        let required = proposal.rules(config).quorum_threshold;
        if proposal.total_votes < required {
            return Err(GovernanceError::QuorumNotReached {
                actual: proposal.total_votes,
                required,
            });
        }

        proposal.executed = true;
        proposal.executed_at = Some(now);

        info!(proposal_id = id, total_votes = %proposal.total_votes, "proposal finalized");
        Ok(&*proposal)
    }

    /// Get a proposal.
    pub fn get(&self, id: u64) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Proposal> {
        self.proposals.get_mut(&id)
    }

    pub fn status(&self, id: u64, config: &VotingConfig, now: u64) -> Result<ProposalStatus, GovernanceError> {
        self.get(id)
            .map(|p| p.status(now, config))
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    /// All proposals in id order.
    pub fn all(&self) -> Vec<&Proposal> {
        self.proposals.values().collect()
    }

    /// Get proposals by status.
    pub fn by_status(&self, status: ProposalStatus, config: &VotingConfig, now: u64) -> Vec<&Proposal> {
        self.proposals
            .values()
            .filter(|p| p.status(now, config) == status)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.proposals.len()
    }

    pub fn last_proposal_at(&self, proposer: &Address) -> Option<u64> {
        self.last_proposal_at.get(proposer).copied()
    }
}

impl Default for ProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VotingConfig {
        VotingConfig {
            proposal_threshold: 1_000,
            voting_delay: 10,
            voting_period: 100,
            quorum_threshold: 50,
            max_votes_per_wallet: 100,
            proposal_cooldown: 30,
            binding: ConfigBinding::Live,
        }
    }

    fn proposer() -> Address {
        Address::from_low_u8(1)
    }

    fn create(registry: &mut ProposalRegistry, now: u64) -> u64 {
        registry
            .propose(proposer(), 5_000, "Plant trees".to_string(), ContentRef::of(b"trees"), &config(), now)
            .unwrap()
    }

    fn cast(registry: &mut ProposalRegistry, id: u64, voter: u8, votes: Amount, now: u64) {
        let proposal = registry.get_mut(id).unwrap();
        let pending = proposal
            .prepare_vote(Address::from_low_u8(voter), votes, votes * votes, now)
            .unwrap();
        proposal.commit_vote(pending);
    }

    #[test]
    fn test_proposal_creation() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 100);

        let proposal = registry.get(id).unwrap();
        assert_eq!(id, 1);
        assert_eq!(proposal.start_time, 110);
        assert_eq!(proposal.end_time, 210);
        assert!(proposal.start_time < proposal.end_time);
        assert_eq!(proposal.status(100, &config()), ProposalStatus::Pending);
        assert_eq!(registry.last_proposal_at(&proposer()), Some(100));
    }

    #[test]
    fn test_sequential_ids() {
        let mut registry = ProposalRegistry::new();
        assert_eq!(create(&mut registry, 0), 1);
        assert_eq!(create(&mut registry, 30), 2);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_threshold_enforced() {
        let mut registry = ProposalRegistry::new();
        let result = registry.propose(proposer(), 999, "Too weak".into(), ContentRef::ZERO, &config(), 0);
        assert_eq!(
            result,
            Err(GovernanceError::BelowProposalThreshold { power: 999, required: 1_000 })
        );
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut registry = ProposalRegistry::new();
        let result = registry.propose(proposer(), 5_000, "   ".into(), ContentRef::ZERO, &config(), 0);
        assert!(matches!(result, Err(GovernanceError::InvalidArgument(_))));
    }

    #[test]
    fn test_cooldown() {
        let mut registry = ProposalRegistry::new();
        create(&mut registry, 100);

        let result = registry.propose(proposer(), 5_000, "Again".into(), ContentRef::ZERO, &config(), 120);
        assert_eq!(result, Err(GovernanceError::CooldownActive { remaining: 10 }));

        // Other proposers are unaffected
        assert!(registry
            .propose(Address::from_low_u8(2), 5_000, "Mine".into(), ContentRef::ZERO, &config(), 120)
            .is_ok());

        assert!(registry
            .propose(proposer(), 5_000, "Again".into(), ContentRef::ZERO, &config(), 130)
            .is_ok());
    }

    #[test]
    fn test_status_transitions() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 0);
        let cfg = config();

        assert_eq!(registry.status(id, &cfg, 9).unwrap(), ProposalStatus::Pending);
        assert_eq!(registry.status(id, &cfg, 10).unwrap(), ProposalStatus::Active);
        assert_eq!(registry.status(id, &cfg, 110).unwrap(), ProposalStatus::Active);
        assert_eq!(registry.status(id, &cfg, 111).unwrap(), ProposalStatus::Defeated);

        cast(&mut registry, id, 2, 50, 50);
        assert_eq!(registry.status(id, &cfg, 111).unwrap(), ProposalStatus::Succeeded);

        registry.finalize(id, &cfg, 111).unwrap();
        assert_eq!(registry.status(id, &cfg, 111).unwrap(), ProposalStatus::Executed);
        assert_eq!(registry.by_status(ProposalStatus::Executed, &cfg, 500).len(), 1);
    }

    #[test]
    fn test_prepare_vote_rejects_double_vote() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 0);
        cast(&mut registry, id, 2, 3, 20);

        let proposal = registry.get(id).unwrap();
        assert_eq!(proposal.total_votes, 3);
        assert_eq!(proposal.total_voters, 1);
        assert_eq!(proposal.vote_of(&Address::from_low_u8(2)).unwrap().cost, 9);
        assert!(matches!(
            proposal.prepare_vote(Address::from_low_u8(2), 1, 1, 21),
            Err(GovernanceError::AlreadyVoted)
        ));
    }

    #[test]
    fn test_finalize_requires_closed_window() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 0);
        cast(&mut registry, id, 2, 60, 20);

        assert_eq!(registry.finalize(id, &config(), 110).unwrap_err(), GovernanceError::VotingStillOpen(id));
        assert!(registry.finalize(id, &config(), 111).is_ok());
        assert_eq!(registry.finalize(id, &config(), 112).unwrap_err(), GovernanceError::AlreadyExecuted);
    }

    #[test]
    fn test_finalize_quorum_not_met() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 0);
        cast(&mut registry, id, 2, 4, 20);

        let err = registry.finalize(id, &config(), 200).unwrap_err();
        assert_eq!(err, GovernanceError::QuorumNotReached { actual: 4, required: 50 });
        assert!(!registry.get(id).unwrap().executed);
    }

    #[test]
    fn test_cancel_proposal() {
        let mut registry = ProposalRegistry::new();
        let id = create(&mut registry, 0);

        // Only proposer or owner can cancel
        assert!(matches!(
            registry.cancel(id, Address::from_low_u8(9), false, 5),
            Err(GovernanceError::Unauthorized(_))
        ));

        registry.cancel(id, proposer(), false, 5).unwrap();
        let proposal = registry.get(id).unwrap();
        assert!(proposal.cancelled);
        assert_eq!(proposal.status(5, &config()), ProposalStatus::Cancelled);

        assert_eq!(registry.cancel(id, proposer(), false, 6), Err(GovernanceError::AlreadyCancelled));
        assert_eq!(registry.finalize(id, &config(), 500).unwrap_err(), GovernanceError::AlreadyCancelled);
    }

    #[test]
    fn test_owner_cancels_active_but_not_closed() {
        let mut registry = ProposalRegistry::new();
        let first = create(&mut registry, 0);
        let second = create(&mut registry, 30);

        registry.cancel(first, Address::from_low_u8(9), true, 50).unwrap();
        assert_eq!(
            registry.cancel(second, Address::from_low_u8(9), true, 141),
            Err(GovernanceError::NotCancellable(second))
        );
    }

    #[test]
    fn test_frozen_rules_ignore_later_config() {
        let mut registry = ProposalRegistry::new();
        let mut cfg = config();
        cfg.binding = ConfigBinding::FrozenAtCreation;
        let id = registry
            .propose(proposer(), 5_000, "Frozen".into(), ContentRef::ZERO, &cfg, 0)
            .unwrap();
        cast(&mut registry, id, 2, 50, 20);

        cfg.quorum_threshold = 1_000;
        assert_eq!(registry.status(id, &cfg, 200).unwrap(), ProposalStatus::Succeeded);

        cfg.binding = ConfigBinding::Live;
        assert_eq!(registry.status(id, &cfg, 200).unwrap(), ProposalStatus::Defeated);
    }
}
