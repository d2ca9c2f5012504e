//! Collaborators the engine calls through but never implements itself.
//!
//! The value ledger reports voting power and burns vote costs, the
//! transfer mechanism moves treasury funds out, and the content store
//! holds proposal bodies. In-memory versions are provided for hosts and
//! tests.

use std::collections::{HashMap, HashSet};
use agora_types::{Address, Amount, AssetId, ContentRef};
use parking_lot::RwLock;
use crate::error::{LedgerError, TransferError};

/// Fungible value ledger.
pub trait ValueLedger: Send + Sync {
    /// Own voting power of `account`.
    fn power_of(&self, account: &Address) -> Amount;

    /// Burn `amount` from `account`. Either fully applied or not at all.
    fn debit(&self, account: &Address, amount: Amount) -> Result<(), LedgerError>;
}

/// Moves treasury funds to a recipient.
pub trait TransferMechanism: Send + Sync {
    fn transfer(
        &self,
        recipient: &Address,
        asset: &AssetId,
        amount: Amount,
        payload: &[u8],
    ) -> Result<(), TransferError>;
}

/// Content-addressed store for proposal descriptions and attachments.
pub trait ContentStore: Send + Sync {
    fn put(&self, data: &[u8]) -> ContentRef;

    fn get(&self, reference: &ContentRef) -> Option<Vec<u8>>;
}

/// Balance-backed ledger where power equals balance.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: RwLock<HashMap<Address, Amount>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from `(account, balance)` pairs.
    pub fn with_balances(balances: impl IntoIterator<Item = (Address, Amount)>) -> Self {
        Self {
            balances: RwLock::new(balances.into_iter().collect()),
        }
    }

    pub fn set_balance(&self, account: Address, balance: Amount) {
        self.balances.write().insert(account, balance);
    }

    pub fn credit(&self, account: Address, amount: Amount) {
        let mut balances = self.balances.write();
        let entry = balances.entry(account).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.read().get(account).copied().unwrap_or(0)
    }

    /// All accounts with a recorded balance.
    pub fn accounts(&self) -> Vec<Address> {
        self.balances.read().keys().copied().collect()
    }
}

impl ValueLedger for InMemoryLedger {
    fn power_of(&self, account: &Address) -> Amount {
        self.balance_of(account)
    }

    fn debit(&self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let mut balances = self.balances.write();
        let available = balances.get(account).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientBalance { available, required: amount });
        }
        balances.insert(*account, available - amount);
        Ok(())
    }
}

/// Content store keyed by the blake3 digest of the stored bytes.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<ContentRef, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(&self, data: &[u8]) -> ContentRef {
        let reference = ContentRef::of(data);
        self.blobs.write().entry(reference).or_insert_with(|| data.to_vec());
        reference
    }

    fn get(&self, reference: &ContentRef) -> Option<Vec<u8>> {
        self.blobs.read().get(reference).cloned()
    }
}

/// A transfer accepted by [`RecordingTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub recipient: Address,
    pub asset: AssetId,
    pub amount: Amount,
    pub payload: Vec<u8>,
}

/// Transfer mechanism that records transfers and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    sent: RwLock<Vec<TransferRecord>>,
    fail_all: RwLock<bool>,
    rejected: RwLock<HashSet<Address>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent transfer fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.fail_all.write() = failing;
    }

    /// Reject transfers to `recipient` until [`accept`](Self::accept) is called.
    pub fn reject(&self, recipient: Address) {
        self.rejected.write().insert(recipient);
    }

    pub fn accept(&self, recipient: &Address) {
        self.rejected.write().remove(recipient);
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.sent.read().clone()
    }

    /// Sum of successful transfers to `recipient` in `asset`.
    pub fn received(&self, recipient: &Address, asset: &AssetId) -> Amount {
        self.sent
            .read()
            .iter()
            .filter(|t| &t.recipient == recipient && &t.asset == asset)
            .map(|t| t.amount)
            .sum()
    }
}

impl TransferMechanism for RecordingTransfer {
    fn transfer(
        &self,
        recipient: &Address,
        asset: &AssetId,
        amount: Amount,
        payload: &[u8],
    ) -> Result<(), TransferError> {
        if *self.fail_all.read() {
            return Err(TransferError::Unavailable("transfers disabled".to_string()));
        }
        if self.rejected.read().contains(recipient) {
            return Err(TransferError::Rejected(format!("{:?}", recipient)));
        }

        self.sent.write().push(TransferRecord {
            recipient: *recipient,
            asset: *asset,
            amount,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_debit() {
        let alice = Address::from_low_u8(1);
        let ledger = InMemoryLedger::with_balances([(alice, 100)]);

        assert_eq!(ledger.power_of(&alice), 100);
        ledger.debit(&alice, 40).unwrap();
        assert_eq!(ledger.power_of(&alice), 60);

        let err = ledger.debit(&alice, 61).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance { available: 60, required: 61 });
        assert_eq!(ledger.power_of(&alice), 60);
    }

    #[test]
    fn test_unknown_account_has_no_power() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.power_of(&Address::from_low_u8(9)), 0);
        assert!(ledger.debit(&Address::from_low_u8(9), 1).is_err());
    }

    #[test]
    fn test_content_store() {
        let store = InMemoryContentStore::new();
        let r = store.put(b"Build a bridge");
        assert_eq!(r, ContentRef::of(b"Build a bridge"));
        assert_eq!(store.get(&r).unwrap(), b"Build a bridge".to_vec());
        assert_eq!(store.put(b"Build a bridge"), r);
        assert_eq!(store.len(), 1);
        assert!(store.get(&ContentRef::ZERO).is_none());
    }

    #[test]
    fn test_recording_transfer() {
        let transfers = RecordingTransfer::new();
        let bob = Address::from_low_u8(2);

        transfers.transfer(&bob, &AssetId::Native, 10, b"memo").unwrap();
        assert_eq!(transfers.received(&bob, &AssetId::Native), 10);

        transfers.reject(bob);
        assert!(matches!(
            transfers.transfer(&bob, &AssetId::Native, 5, &[]),
            Err(TransferError::Rejected(_))
        ));
        transfers.accept(&bob);

        transfers.set_failing(true);
        assert!(transfers.transfer(&bob, &AssetId::Native, 5, &[]).is_err());
        transfers.set_failing(false);

        transfers.transfer(&bob, &AssetId::Native, 5, &[]).unwrap();
        assert_eq!(transfers.transfers().len(), 2);
        assert_eq!(transfers.received(&bob, &AssetId::Native), 15);
    }
}
