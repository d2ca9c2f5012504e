//! Treasury management for governance funds.
//!
//! Handles per-asset accounting, scheduled proposal executions and
//! budget categories. Funds move out only through the transfer
//! mechanism; a failed transfer is compensated so that
//! `balance == allocated + available` holds for every asset at all times.

use std::collections::{BTreeMap, HashMap};
use agora_types::{Address, Amount, AssetId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::GovernanceError;
use crate::external::TransferMechanism;
use crate::proposal::ProposalRegistry;

/// Balance of one asset held by the treasury.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Total held
    pub balance: Amount,
    /// Committed to executions and budgets
    pub allocated: Amount,
    /// Free to allocate
    pub available: Amount,
}

impl TokenBalance {
    pub fn is_consistent(&self) -> bool {
        self.allocated.checked_add(self.available) == Some(self.balance)
    }

    fn credited(self, amount: Amount) -> Result<Self, GovernanceError> {
        Ok(Self {
            balance: self
                .balance
                .checked_add(amount)
                .ok_or(GovernanceError::ArithmeticOverflow("treasury balance"))?,
            available: self
                .available
                .checked_add(amount)
                .ok_or(GovernanceError::ArithmeticOverflow("treasury available"))?,
            ..self
        })
    }

    /// Move `amount` from available to allocated.
    fn allocate(self, amount: Amount) -> Result<Self, GovernanceError> {
        if self.available < amount {
            return Err(GovernanceError::InsufficientFunds {
                available: self.available,
                required: amount,
            });
        }
        Ok(Self {
            allocated: self
                .allocated
                .checked_add(amount)
                .ok_or(GovernanceError::ArithmeticOverflow("treasury allocated"))?,
            available: self.available - amount,
            ..self
        })
    }

    /// Move `amount` from allocated back to available.
    fn release(self, amount: Amount) -> Result<Self, GovernanceError> {
        let allocated = self
            .allocated
            .checked_sub(amount)
            .ok_or(GovernanceError::ArithmeticOverflow("treasury allocated"))?;
        Ok(Self {
            allocated,
            available: self.available + amount,
            ..self
        })
    }

    /// Pay `amount` out of allocated funds.
    fn settle(self, amount: Amount) -> Result<Self, GovernanceError> {
        if self.allocated < amount {
            return Err(GovernanceError::InsufficientFunds {
                available: self.allocated,
                required: amount,
            });
        }
        Ok(Self {
            balance: self.balance - amount,
            allocated: self.allocated - amount,
            ..self
        })
    }
}

/// A transfer scheduled on behalf of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExecution {
    pub id: u64,
    pub proposal_id: u64,
    pub recipient: Address,
    pub asset: AssetId,
    pub amount: Amount,
    /// Opaque data handed to the transfer mechanism
    pub payload: Vec<u8>,
    pub scheduled_at: u64,
    pub executed: bool,
    pub executed_at: Option<u64>,
}

/// A named spending category carved out of allocated funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub category: String,
    pub asset: AssetId,
    pub total_amount: Amount,
    pub spent_amount: Amount,
    pub remaining_amount: Amount,
    pub active: bool,
    pub created_at: u64,
}

/// Type of treasury transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Funds deposited
    Deposit,
    /// Funds moved to allocated
    Allocate,
    /// Allocation returned to available
    Release,
    /// Budget spend
    Spend,
    /// Proposal execution paid out
    Execution,
}

/// Treasury transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryTransaction {
    pub tx_type: TransactionType,
    pub asset: AssetId,
    pub amount: Amount,
    pub recipient: Option<Address>,
    pub source: Option<Address>,
    /// Budget category, if any
    pub category: Option<String>,
    pub at: u64,
    pub description: String,
}

/// Treasury state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treasury {
    balances: HashMap<AssetId, TokenBalance>,
    executions: BTreeMap<u64, ProposalExecution>,
    next_execution_id: u64,
    budgets: BTreeMap<String, BudgetAllocation>,
    transactions: Vec<TreasuryTransaction>,
}

impl Treasury {
    /// Create a new, empty treasury.
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            executions: BTreeMap::new(),
            next_execution_id: 1,
            budgets: BTreeMap::new(),
            transactions: Vec::new(),
        }
    }

    /// Deposit funds into treasury.
    pub fn deposit(
        &mut self,
        asset: AssetId,
        amount: Amount,
        source: Address,
        now: u64,
    ) -> Result<TokenBalance, GovernanceError> {
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("Deposit amount must be positive".to_string()));
        }
        ensure_asset(&asset)?;

        let updated = self.balance(&asset).credited(amount)?;
        self.balances.insert(asset, updated);
        self.record(TransactionType::Deposit, asset, amount, None, Some(source), None, now, "Deposit");

        info!(asset = %asset, amount = %amount, source = ?source, "treasury deposit");
        Ok(updated)
    }

    /// Reserve funds for a transfer tied to `proposal_id`.
    ///
    /// The proposal must exist and must have been accepted. Nothing is
    /// reserved for a proposal that is cancelled, defeated or still open.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_execution(
        &mut self,
        proposals: &ProposalRegistry,
        proposal_id: u64,
        recipient: Address,
        asset: AssetId,
        amount: Amount,
        payload: Vec<u8>,
        now: u64,
    ) -> Result<u64, GovernanceError> {
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("Amount must be positive".to_string()));
        }
        if recipient.is_zero() {
            return Err(GovernanceError::InvalidArgument("Recipient cannot be the zero address".to_string()));
        }
        ensure_asset(&asset)?;
        let proposal = proposals
            .get(proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))?;
        if proposal.cancelled {
            return Err(GovernanceError::AlreadyCancelled);
        }
        if !proposal.executed {
            return Err(GovernanceError::NotApproved(proposal_id));
        }

        let updated = self.balance(&asset).allocate(amount)?;
        let id = self.next_execution_id;
        let next_id = id
            .checked_add(1)
            .ok_or(GovernanceError::ArithmeticOverflow("execution id"))?;

        self.balances.insert(asset, updated);
        self.next_execution_id = next_id;
        self.executions.insert(
            id,
            ProposalExecution {
                id,
                proposal_id,
                recipient,
                asset,
                amount,
                payload,
                scheduled_at: now,
                executed: false,
                executed_at: None,
            },
        );
        self.record(
            TransactionType::Allocate,
            asset,
            amount,
            Some(recipient),
            None,
            None,
            now,
            &format!("Scheduled execution {} for proposal {}", id, proposal_id),
        );

        info!(execution_id = id, proposal_id, recipient = ?recipient, amount = %amount, "execution scheduled");
        Ok(id)
    }

    /// Pay out a scheduled execution once its proposal is accepted.
    ///
    /// If the transfer fails the payout is reversed and the execution
    /// stays pending, so it can be retried.
    pub fn execute_execution(
        &mut self,
        proposals: &ProposalRegistry,
        execution_id: u64,
        transfers: &dyn TransferMechanism,
        now: u64,
    ) -> Result<ProposalExecution, GovernanceError> {
        let execution = self
            .executions
            .get(&execution_id)
            .ok_or(GovernanceError::ExecutionNotFound(execution_id))?;
        if execution.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        let proposal = proposals
            .get(execution.proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(execution.proposal_id))?;
        if !proposal.executed {
            return Err(GovernanceError::NotApproved(execution.proposal_id));
        }

        let (recipient, asset, amount) = (execution.recipient, execution.asset, execution.amount);
        let before = self.balance(&asset);
        let settled = before.settle(amount)?;
        self.balances.insert(asset, settled);

        if let Err(e) = transfers.transfer(&recipient, &asset, amount, &execution.payload) {
            // Compensate
            self.balances.insert(asset, before);
            warn!(execution_id, recipient = ?recipient, amount = %amount, error = %e, "execution transfer failed, rolled back");
            return Err(e.into());
        }

        let execution = self
            .executions
            .get_mut(&execution_id)
            .ok_or(GovernanceError::ExecutionNotFound(execution_id))?;
        execution.executed = true;
        execution.executed_at = Some(now);
        let executed = execution.clone();

        self.record(
            TransactionType::Execution,
            asset,
            amount,
            Some(recipient),
            None,
            None,
            now,
            &format!("Execution {} for proposal {}", execution_id, executed.proposal_id),
        );

        info!(execution_id, proposal_id = executed.proposal_id, recipient = ?recipient, amount = %amount, "execution completed");
        Ok(executed)
    }

    /// Carve a budget out of available funds.
    ///
    /// Each category can be created once. Its record is kept after it is
    /// spent down or closed.
    pub fn create_budget(
        &mut self,
        category: &str,
        asset: AssetId,
        amount: Amount,
        now: u64,
    ) -> Result<BudgetAllocation, GovernanceError> {
        if category.trim().is_empty() {
            return Err(GovernanceError::InvalidArgument("Budget category cannot be empty".to_string()));
        }
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("Budget amount must be positive".to_string()));
        }
        ensure_asset(&asset)?;
        // Categories are never reused, closed or exhausted ones included
        if self.budgets.contains_key(category) {
            return Err(GovernanceError::BudgetExists(category.to_string()));
        }

        let updated = self.balance(&asset).allocate(amount)?;
        let budget = BudgetAllocation {
            category: category.to_string(),
            asset,
            total_amount: amount,
            spent_amount: 0,
            remaining_amount: amount,
            active: true,
            created_at: now,
        };

        self.balances.insert(asset, updated);
        self.budgets.insert(category.to_string(), budget.clone());
        self.record(
            TransactionType::Allocate,
            asset,
            amount,
            None,
            None,
            Some(category),
            now,
            "Budget created",
        );

        info!(category, asset = %asset, amount = %amount, "budget created");
        Ok(budget)
    }

    /// Spend from an active budget.
    ///
    /// A failed transfer rolls back both the budget and the treasury
    /// balance. A budget spent down to zero is deactivated.
    pub fn spend_from_budget(
        &mut self,
        category: &str,
        recipient: Address,
        amount: Amount,
        transfers: &dyn TransferMechanism,
        now: u64,
    ) -> Result<BudgetAllocation, GovernanceError> {
        if amount == 0 {
            return Err(GovernanceError::InvalidArgument("Amount must be positive".to_string()));
        }
        if recipient.is_zero() {
            return Err(GovernanceError::InvalidArgument("Recipient cannot be the zero address".to_string()));
        }
        let budget = self
            .budgets
            .get(category)
            .ok_or_else(|| GovernanceError::BudgetNotFound(category.to_string()))?;
        if !budget.active {
            return Err(GovernanceError::BudgetInactive(category.to_string()));
        }
        if budget.remaining_amount < amount {
            return Err(GovernanceError::InsufficientBudget {
                remaining: budget.remaining_amount,
                requested: amount,
            });
        }

        let asset = budget.asset;
        let mut spent = budget.clone();
        spent.remaining_amount -= amount;
        spent.spent_amount = spent
            .spent_amount
            .checked_add(amount)
            .ok_or(GovernanceError::ArithmeticOverflow("budget spent"))?;
        spent.active = spent.remaining_amount > 0;

        let before_budget = budget.clone();
        let before_balance = self.balance(&asset);
        let settled = before_balance.settle(amount)?;

        self.budgets.insert(category.to_string(), spent.clone());
        self.balances.insert(asset, settled);

        if let Err(e) = transfers.transfer(&recipient, &asset, amount, &[]) {
            // Compensate
            self.budgets.insert(category.to_string(), before_budget);
            self.balances.insert(asset, before_balance);
            warn!(category, recipient = ?recipient, amount = %amount, error = %e, "budget transfer failed, rolled back");
            return Err(e.into());
        }

        self.record(
            TransactionType::Spend,
            asset,
            amount,
            Some(recipient),
            None,
            Some(category),
            now,
            "Budget spend",
        );

        info!(category, recipient = ?recipient, amount = %amount, remaining = %spent.remaining_amount, "budget spend");
        Ok(spent)
    }

    /// Deactivate a budget and return what is left of it to available funds.
    pub fn close_budget(&mut self, category: &str, now: u64) -> Result<Amount, GovernanceError> {
        let budget = self
            .budgets
            .get(category)
            .ok_or_else(|| GovernanceError::BudgetNotFound(category.to_string()))?;
        if !budget.active {
            return Err(GovernanceError::BudgetInactive(category.to_string()));
        }

        let (asset, released) = (budget.asset, budget.remaining_amount);
        let updated = self.balance(&asset).release(released)?;

        self.balances.insert(asset, updated);
        if let Some(budget) = self.budgets.get_mut(category) {
            budget.remaining_amount = 0;
            budget.active = false;
        }
        if released > 0 {
            self.record(
                TransactionType::Release,
                asset,
                released,
                None,
                None,
                Some(category),
                now,
                "Budget closed",
            );
        }

        info!(category, released = %released, "budget closed");
        Ok(released)
    }

    /// Balance of `asset`; zero if never deposited.
    pub fn balance(&self, asset: &AssetId) -> TokenBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// Assets with a recorded balance.
    pub fn assets(&self) -> Vec<AssetId> {
        self.balances.keys().copied().collect()
    }

    pub fn execution(&self, id: u64) -> Option<&ProposalExecution> {
        self.executions.get(&id)
    }

    pub fn executions(&self) -> impl Iterator<Item = &ProposalExecution> {
        self.executions.values()
    }

    /// Executions scheduled but not yet paid out.
    pub fn pending_executions(&self) -> Vec<&ProposalExecution> {
        self.executions.values().filter(|e| !e.executed).collect()
    }

    pub fn budget(&self, category: &str) -> Option<&BudgetAllocation> {
        self.budgets.get(category)
    }

    pub fn budgets(&self) -> impl Iterator<Item = &BudgetAllocation> {
        self.budgets.values()
    }

    /// Transaction history in commit order.
    pub fn transactions(&self) -> &[TreasuryTransaction] {
        &self.transactions
    }

    /// Total paid out in `asset` through executions and budget spends.
    pub fn total_spent(&self, asset: &AssetId) -> Amount {
        self.transactions
            .iter()
            .filter(|t| &t.asset == asset)
            .filter(|t| matches!(t.tx_type, TransactionType::Spend | TransactionType::Execution))
            .fold(0, |acc, t| acc.saturating_add(t.amount))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        tx_type: TransactionType,
        asset: AssetId,
        amount: Amount,
        recipient: Option<Address>,
        source: Option<Address>,
        category: Option<&str>,
        at: u64,
        description: &str,
    ) {
        self.transactions.push(TreasuryTransaction {
            tx_type,
            asset,
            amount,
            recipient,
            source,
            category: category.map(str::to_string),
            at,
            description: description.to_string(),
        });
    }
}

impl Default for Treasury {
    fn default() -> Self {
        Self::new()
    }
}

/// A token must be identified by a non-zero contract address.
fn ensure_asset(asset: &AssetId) -> Result<(), GovernanceError> {
    match asset {
        AssetId::Token(address) if address.is_zero() => Err(GovernanceError::InvalidArgument(
            "Token asset cannot use the zero address".to_string(),
        )),
        _ => Ok(()),
    }
}
