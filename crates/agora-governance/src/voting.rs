//! Quadratic vote casting.
//!
//! A vote of `v` costs `v^2` power, checked against the voter's effective
//! power (own plus delegated) and burned from the value ledger before the
//! tally changes.

use agora_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::config::VotingConfig;
use crate::delegation::DelegationLedger;
use crate::error::GovernanceError;
use crate::external::ValueLedger;
use crate::mechanics::{self, DistributionStats};
use crate::proposal::{Proposal, ProposalRegistry};

/// Result of a successful vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub proposal_id: u64,
    pub voter: Address,
    pub votes: Amount,
    /// Power burned
    pub cost: Amount,
    /// Effective power the voter had before paying
    pub power_before: Amount,
}

/// Casts votes against one registry, delegation graph and ledger.
pub struct VotingEngine<'a> {
    registry: &'a mut ProposalRegistry,
    delegations: &'a DelegationLedger,
    ledger: &'a dyn ValueLedger,
    config: &'a VotingConfig,
}

impl<'a> VotingEngine<'a> {
    pub fn new(
        registry: &'a mut ProposalRegistry,
        delegations: &'a DelegationLedger,
        ledger: &'a dyn ValueLedger,
        config: &'a VotingConfig,
    ) -> Self {
        Self { registry, delegations, ledger, config }
    }

    /// Cast `votes` on proposal `proposal_id`.
    ///
    /// Every check runs before the ledger debit; nothing is written to the
    /// proposal unless the debit succeeds.
    pub fn cast(
        &mut self,
        proposal_id: u64,
        voter: Address,
        votes: Amount,
        now: u64,
    ) -> Result<VoteReceipt, GovernanceError> {
        let proposal = self
            .registry
            .get(proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;

        if proposal.cancelled {
            return Err(GovernanceError::AlreadyCancelled);
        }
        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if !proposal.is_voting_open(now) {
            return Err(GovernanceError::VotingNotOpen(proposal_id));
        }
        if proposal.has_voted(&voter) {
            return Err(GovernanceError::AlreadyVoted);
        }

        let cap = proposal.rules(self.config).max_votes_per_wallet;
        if votes == 0 {
            return Err(GovernanceError::InvalidArgument("Votes must be positive".to_string()));
        }
        if votes > cap {
            return Err(GovernanceError::InvalidArgument(format!(
                "Votes {} exceed per-wallet cap {}",
                votes, cap
            )));
        }

        let cost = mechanics::quadratic_cost(votes)?;
        let available = self.delegations.effective_power(&voter, self.ledger);
        if available < cost {
            return Err(GovernanceError::InsufficientPower { available, required: cost });
        }

        let pending = proposal.prepare_vote(voter, votes, cost, now)?;

        self.ledger.debit(&voter, cost)?;

        self.registry
            .get_mut(proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?
            .commit_vote(pending);

        debug!(proposal_id, voter = ?voter, available = %available, "vote cost debited");
        info!(proposal_id, voter = ?voter, votes = %votes, cost = %cost, "vote cast");

        Ok(VoteReceipt {
            proposal_id,
            voter,
            votes,
            cost,
            power_before: available,
        })
    }
}

/// Distribution statistics for a proposal's votes.
pub fn analyze(proposal: &Proposal) -> DistributionStats {
    mechanics::analyze_distribution(&proposal.vote_entries())
}

/// Sybil resistance score of a proposal's spend distribution.
pub fn sybil_score(proposal: &Proposal) -> u8 {
    mechanics::sybil_resistance_score(proposal.total_voters, proposal.total_cost(), proposal.max_cost())
}

/// Share of `eligible_voters` that voted on the proposal, in percent.
pub fn participation(proposal: &Proposal, eligible_voters: u64) -> u64 {
    mechanics::participation_rate(proposal.total_voters, eligible_voters)
}
