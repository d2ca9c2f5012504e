//! Voting power delegation.
//!
//! Each account has at most one outgoing delegation. Delegation is one
//! hop only: a delegatee that delegates onward passes on its own power,
//! never the power it received. The amount recorded on an edge is the
//! delegator's ledger power at the time of delegation, and exactly that
//! amount is removed again on revocation, so delegation never creates or
//! destroys power.

use std::collections::{BTreeSet, HashMap};
use agora_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::GovernanceError;
use crate::external::ValueLedger;

/// Delegation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Who is delegating
    pub delegator: Address,
    /// Who receives the power
    pub delegatee: Address,
    /// Power carried by this edge
    pub amount: Amount,
    /// When the delegation was made
    pub created_at: u64,
}

/// Delegation graph and the delegated power it produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationLedger {
    /// delegator -> active delegation
    delegations: HashMap<Address, Delegation>,
    /// delegatee -> total power delegated to it
    delegated_power: HashMap<Address, Amount>,
    /// delegatee -> direct delegators (reverse lookup)
    delegators: HashMap<Address, BTreeSet<Address>>,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate all of `from`'s ledger power to `to`.
    ///
    /// An existing delegation from `from` is replaced; its power is first
    /// taken back from the old delegatee. Returns the replaced delegation.
    pub fn delegate(
        &mut self,
        from: Address,
        to: Address,
        ledger: &dyn ValueLedger,
        now: u64,
    ) -> Result<Option<Delegation>, GovernanceError> {
        if from == to {
            return Err(GovernanceError::SelfDelegation);
        }
        if to.is_zero() {
            return Err(GovernanceError::InvalidArgument(
                "Cannot delegate to the zero address".to_string(),
            ));
        }

        let power = ledger.power_of(&from);

        // Work out every new total before touching state.
        let previous = self.delegations.get(&from).cloned();
        let old_delegatee_after = match &previous {
            Some(old) => Some(self.withdrawn(old)?),
            None => None,
        };
        let to_before = match (&previous, old_delegatee_after) {
            (Some(old), Some(after)) if old.delegatee == to => after,
            _ => self.delegated_power_to(&to),
        };
        let to_after = to_before
            .checked_add(power)
            .ok_or(GovernanceError::ArithmeticOverflow("delegated power"))?;

        if let (Some(old), Some(after)) = (&previous, old_delegatee_after) {
            self.set_delegated(old.delegatee, after);
            self.unlink(&old.delegatee, &from);
        }
        self.set_delegated(to, to_after);
        self.delegators.entry(to).or_default().insert(from);
        self.delegations.insert(
            from,
            Delegation {
                delegator: from,
                delegatee: to,
                amount: power,
                created_at: now,
            },
        );

        debug!(delegator = ?from, delegatee = ?to, amount = %power, "delegation recorded");
        Ok(previous)
    }

    /// Remove `from`'s delegation and take its power back from the delegatee.
    pub fn revoke(&mut self, from: Address) -> Result<Delegation, GovernanceError> {
        let existing = self
            .delegations
            .get(&from)
            .ok_or(GovernanceError::DelegationNotFound(from))?;
        let after = self.withdrawn(existing)?;

        let existing = self
            .delegations
            .remove(&from)
            .ok_or(GovernanceError::DelegationNotFound(from))?;
        self.set_delegated(existing.delegatee, after);
        self.unlink(&existing.delegatee, &from);

        debug!(delegator = ?from, delegatee = ?existing.delegatee, amount = %existing.amount, "delegation revoked");
        Ok(existing)
    }

    /// Own power (0 while delegating away) plus power delegated in.
    pub fn effective_power(&self, account: &Address, ledger: &dyn ValueLedger) -> Amount {
        let own = if self.is_delegating(account) {
            0
        } else {
            ledger.power_of(account)
        };
        own.saturating_add(self.delegated_power_to(account))
    }

    /// Total power currently delegated to `account`.
    pub fn delegated_power_to(&self, account: &Address) -> Amount {
        self.delegated_power.get(account).copied().unwrap_or(0)
    }

    pub fn is_delegating(&self, account: &Address) -> bool {
        self.delegations.contains_key(account)
    }

    pub fn delegation_of(&self, delegator: &Address) -> Option<&Delegation> {
        self.delegations.get(delegator)
    }

    /// Direct delegators of `delegatee`, in address order.
    pub fn delegators_of(&self, delegatee: &Address) -> Vec<Address> {
        self.delegators
            .get(delegatee)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn delegation_count(&self) -> usize {
        self.delegations.len()
    }

    /// Delegatee total after removing `edge`'s contribution.
    fn withdrawn(&self, edge: &Delegation) -> Result<Amount, GovernanceError> {
        self.delegated_power_to(&edge.delegatee)
            .checked_sub(edge.amount)
            .ok_or(GovernanceError::ArithmeticOverflow("delegated power underflow"))
    }

    fn set_delegated(&mut self, account: Address, amount: Amount) {
        if amount == 0 {
            self.delegated_power.remove(&account);
        } else {
            self.delegated_power.insert(account, amount);
        }
    }

    fn unlink(&mut self, delegatee: &Address, delegator: &Address) {
        if let Some(set) = self.delegators.get_mut(delegatee) {
            set.remove(delegator);
            if set.is_empty() {
                self.delegators.remove(delegatee);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryLedger;
    use proptest::prelude::*;

    fn addr(n: u8) -> Address {
        Address::from_low_u8(n)
    }

    fn total_effective(graph: &DelegationLedger, ledger: &InMemoryLedger, accounts: &[Address]) -> Amount {
        accounts.iter().map(|a| graph.effective_power(a, ledger)).sum()
    }

    #[test]
    fn test_delegation_moves_power() {
        let (alice, bob) = (addr(1), addr(2));
        let ledger = InMemoryLedger::with_balances([(alice, 100), (bob, 400)]);
        let mut graph = DelegationLedger::new();

        assert!(graph.delegate(alice, bob, &ledger, 10).unwrap().is_none());

        assert!(graph.is_delegating(&alice));
        assert_eq!(graph.effective_power(&alice, &ledger), 0);
        assert_eq!(graph.effective_power(&bob, &ledger), 500);
        assert_eq!(graph.delegated_power_to(&bob), 100);
        assert_eq!(graph.delegators_of(&bob), vec![alice]);
    }

    #[test]
    fn test_self_delegation_fails() {
        let ledger = InMemoryLedger::new();
        let mut graph = DelegationLedger::new();

        let result = graph.delegate(addr(1), addr(1), &ledger, 0);
        assert!(matches!(result, Err(GovernanceError::SelfDelegation)));
    }

    #[test]
    fn test_zero_delegatee_fails() {
        let ledger = InMemoryLedger::new();
        let mut graph = DelegationLedger::new();

        let result = graph.delegate(addr(1), Address::ZERO, &ledger, 0);
        assert!(matches!(result, Err(GovernanceError::InvalidArgument(_))));
        assert_eq!(graph.delegation_count(), 0);
    }

    #[test]
    fn test_redelegation_moves_contribution() {
        let (alice, bob, carol) = (addr(1), addr(2), addr(3));
        let ledger = InMemoryLedger::with_balances([(alice, 100), (bob, 10), (carol, 20)]);
        let mut graph = DelegationLedger::new();

        graph.delegate(alice, bob, &ledger, 0).unwrap();
        let previous = graph.delegate(alice, carol, &ledger, 5).unwrap().unwrap();

        assert_eq!(previous.delegatee, bob);
        assert_eq!(graph.delegated_power_to(&bob), 0);
        assert_eq!(graph.delegated_power_to(&carol), 100);
        assert!(graph.delegators_of(&bob).is_empty());
        assert_eq!(graph.effective_power(&bob, &ledger), 10);
        assert_eq!(graph.effective_power(&carol, &ledger), 120);
    }

    #[test]
    fn test_redelegation_to_same_delegatee() {
        let (alice, bob) = (addr(1), addr(2));
        let ledger = InMemoryLedger::with_balances([(alice, 100)]);
        let mut graph = DelegationLedger::new();

        graph.delegate(alice, bob, &ledger, 0).unwrap();
        ledger.set_balance(alice, 70);
        graph.delegate(alice, bob, &ledger, 1).unwrap();

        assert_eq!(graph.delegated_power_to(&bob), 70);
        assert_eq!(graph.delegation_of(&alice).unwrap().amount, 70);
    }

    #[test]
    fn test_revoke_delegation() {
        let (alice, bob) = (addr(1), addr(2));
        let ledger = InMemoryLedger::with_balances([(alice, 100), (bob, 50)]);
        let mut graph = DelegationLedger::new();

        graph.delegate(alice, bob, &ledger, 0).unwrap();
        let revoked = graph.revoke(alice).unwrap();
        assert_eq!(revoked.amount, 100);

        assert!(!graph.is_delegating(&alice));
        assert_eq!(graph.effective_power(&alice, &ledger), 100);
        assert_eq!(graph.effective_power(&bob, &ledger), 50);

        // Can't revoke twice
        assert!(matches!(graph.revoke(alice), Err(GovernanceError::DelegationNotFound(_))));
    }

    #[test]
    fn test_delegation_is_one_hop() {
        let (alice, bob, carol) = (addr(1), addr(2), addr(3));
        let ledger = InMemoryLedger::with_balances([(alice, 100), (bob, 400), (carol, 900)]);
        let mut graph = DelegationLedger::new();

        // Alice -> Bob -> Carol: Carol only receives Bob's own power
        graph.delegate(alice, bob, &ledger, 0).unwrap();
        graph.delegate(bob, carol, &ledger, 0).unwrap();

        assert_eq!(graph.effective_power(&alice, &ledger), 0);
        assert_eq!(graph.effective_power(&bob, &ledger), 100);
        assert_eq!(graph.effective_power(&carol, &ledger), 1_300);
        assert_eq!(total_effective(&graph, &ledger, &[alice, bob, carol]), 1_400);
    }

    #[test]
    fn test_mutual_delegation_conserves_power() {
        let (alice, bob) = (addr(1), addr(2));
        let ledger = InMemoryLedger::with_balances([(alice, 30), (bob, 70)]);
        let mut graph = DelegationLedger::new();

        graph.delegate(alice, bob, &ledger, 0).unwrap();
        graph.delegate(bob, alice, &ledger, 0).unwrap();

        assert_eq!(graph.effective_power(&alice, &ledger), 70);
        assert_eq!(graph.effective_power(&bob, &ledger), 30);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Delegate(u8, u8),
        Revoke(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u8..=6, 1u8..=6).prop_map(|(a, b)| Op::Delegate(a, b)),
            (1u8..=6).prop_map(Op::Revoke),
        ]
    }

    proptest! {
        #[test]
        fn prop_delegation_conserves_power(
            balances in proptest::collection::vec(0u64..1_000_000, 6),
            ops in proptest::collection::vec(op_strategy(), 0..40),
        ) {
            let accounts: Vec<Address> = (1..=6).map(addr).collect();
            let ledger = InMemoryLedger::with_balances(
                accounts.iter().copied().zip(balances.iter().map(|b| Amount::from(*b))),
            );
            let expected: Amount = balances.iter().map(|b| Amount::from(*b)).sum();
            let mut graph = DelegationLedger::new();

            for op in ops {
                let _ = match op {
                    Op::Delegate(a, b) => graph.delegate(addr(a), addr(b), &ledger, 0).map(|_| ()),
                    Op::Revoke(a) => graph.revoke(addr(a)).map(|_| ()),
                };
                prop_assert_eq!(total_effective(&graph, &ledger, &accounts), expected);
            }
        }

        #[test]
        fn prop_revoke_restores_power(a_balance in 0u64..1_000_000, b_balance in 0u64..1_000_000) {
            let (alice, bob) = (addr(1), addr(2));
            let ledger = InMemoryLedger::with_balances([
                (alice, Amount::from(a_balance)),
                (bob, Amount::from(b_balance)),
            ]);
            let mut graph = DelegationLedger::new();
            let before = (graph.effective_power(&alice, &ledger), graph.effective_power(&bob, &ledger));

            graph.delegate(alice, bob, &ledger, 0).unwrap();
            graph.revoke(alice).unwrap();

            prop_assert_eq!((graph.effective_power(&alice, &ledger), graph.effective_power(&bob, &ledger)), before);
        }
    }
}
