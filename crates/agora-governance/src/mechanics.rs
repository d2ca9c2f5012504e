//! Quadratic voting math and vote distribution analytics.
//!
//! Casting `v` votes costs `v^2` units of power. Every function here is
//! pure; the voting engine feeds them proposal tallies.

use agora_types::Amount;
use serde::{Deserialize, Serialize};
use crate::error::GovernanceError;

/// Largest vote count accepted by [`quadratic_cost`]; its square still fits in an `Amount`.
pub const MAX_VOTES: Amount = u64::MAX as Amount;

/// Integer square root using Newton's method.
/// Returns floor(sqrt(n)).
pub fn integer_sqrt(n: Amount) -> Amount {
    if n <= 1 {
        return n;
    }

    let mut x = n;
    let mut y = x / 2 + (x & 1);

    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }

    x
}

/// Cost of casting `votes` votes: `votes^2`.
pub fn quadratic_cost(votes: Amount) -> Result<Amount, GovernanceError> {
    if votes == 0 {
        return Err(GovernanceError::InvalidArgument("Votes must be positive".to_string()));
    }
    if votes > MAX_VOTES {
        return Err(GovernanceError::InvalidArgument(format!(
            "Votes {} exceed maximum {}",
            votes, MAX_VOTES
        )));
    }

    votes
        .checked_mul(votes)
        .ok_or(GovernanceError::ArithmeticOverflow("quadratic cost"))
}

/// Maximum votes affordable with `balance`: the largest `n` with `n^2 <= balance`.
pub fn max_votes(balance: Amount) -> Amount {
    integer_sqrt(balance)
}

/// Weight of a spend, for analytics only.
pub fn vote_weight(tokens_spent: Amount) -> Amount {
    integer_sqrt(tokens_spent)
}

/// Score how evenly spend is spread across voters.
///
/// 100 when the largest spend equals the average, falling linearly to 0
/// once the largest spend reaches twice the average.
pub fn sybil_resistance_score(total_voters: u64, total_tokens_spent: Amount, max_tokens_by_any_voter: Amount) -> u8 {
    if total_voters == 0 || total_tokens_spent == 0 {
        return 0;
    }

    let average = total_tokens_spent / Amount::from(total_voters);
    if average == 0 {
        return 0;
    }

    let ratio_pct = max_tokens_by_any_voter.saturating_mul(100) / average;
    if ratio_pct <= 100 {
        100
    } else if ratio_pct >= 200 {
        0
    } else {
        (200 - ratio_pct) as u8
    }
}

/// Percentage of eligible voters that voted. 0 when nobody is eligible.
pub fn participation_rate(voters: u64, eligible_voters: u64) -> u64 {
    if eligible_voters == 0 {
        return 0;
    }
    ((u128::from(voters) * 100) / u128::from(eligible_voters)) as u64
}

/// Summary of how votes are spread across a proposal's voters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub total_votes: Amount,
    pub voter_count: u64,
    pub total_cost: Amount,
    pub mean_votes: Amount,
    pub median_votes: Amount,
    /// Simplified Gini coefficient scaled to 0..=100
    pub gini: Amount,
}

/// Analyze a set of `(votes, cost)` entries.
///
/// The Gini term is quadratic in the number of voters; callers with
/// large electorates should pre-aggregate.
pub fn analyze_distribution(entries: &[(Amount, Amount)]) -> DistributionStats {
    let n = entries.len();
    if n == 0 {
        return DistributionStats::default();
    }

    let total_votes = entries.iter().fold(0 as Amount, |acc, (v, _)| acc.saturating_add(*v));
    let total_cost = entries.iter().fold(0 as Amount, |acc, (_, c)| acc.saturating_add(*c));

    let mut sorted: Vec<Amount> = entries.iter().map(|(v, _)| *v).collect();
    sorted.sort_unstable();
    let median_votes = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        let (lo, hi) = (sorted[n / 2 - 1], sorted[n / 2]);
        lo / 2 + hi / 2 + (lo % 2 + hi % 2) / 2
    };

    let gini = if n <= 1 || total_votes == 0 {
        0
    } else {
        let mut diff_sum: Amount = 0;
        for a in &sorted {
            for b in &sorted {
                diff_sum = diff_sum.saturating_add(a.saturating_sub(*b));
            }
        }
        diff_sum.saturating_mul(100) / (n as Amount).saturating_mul(total_votes)
    };

    DistributionStats {
        total_votes,
        voter_count: n as u64,
        total_cost,
        mean_votes: total_votes / n as Amount,
        median_votes,
        gini,
    }
}

/// Outcome of [`validate_vote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteValidation {
    pub valid: bool,
    /// Quadratic cost of the requested votes, 0 if it cannot be computed
    pub cost: Amount,
}

/// Check a vote against the per-wallet cap and the voter's balance.
pub fn validate_vote(votes: Amount, max_per_wallet: Amount, balance: Amount) -> VoteValidation {
    if votes == 0 || votes > max_per_wallet {
        return VoteValidation { valid: false, cost: 0 };
    }
    match quadratic_cost(votes) {
        Ok(cost) => VoteValidation { valid: cost <= balance, cost },
        Err(_) => VoteValidation { valid: false, cost: 0 },
    }
}

/// Split a quadratic budget over several choices in proportion to `weights`.
///
/// `v_i = isqrt(budget * w_i^2 / sum(w_j^2))`, so `sum(v_i^2) <= budget`.
pub fn optimal_allocation(budget: Amount, weights: &[Amount]) -> Result<Vec<Amount>, GovernanceError> {
    let mut squares = Vec::with_capacity(weights.len());
    let mut sum_sq: Amount = 0;
    for w in weights {
        let sq = w
            .checked_mul(*w)
            .ok_or(GovernanceError::ArithmeticOverflow("allocation weight"))?;
        sum_sq = sum_sq
            .checked_add(sq)
            .ok_or(GovernanceError::ArithmeticOverflow("allocation weight sum"))?;
        squares.push(sq);
    }

    if sum_sq == 0 {
        return Ok(vec![0; weights.len()]);
    }

    squares
        .into_iter()
        .map(|sq| {
            let share = budget
                .checked_mul(sq)
                .ok_or(GovernanceError::ArithmeticOverflow("allocation share"))?
                / sum_sq;
            Ok(integer_sqrt(share))
        })
        .collect()
}
