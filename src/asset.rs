// 9.1 asset.rs: the external fungible asset custody draws from and pays into.
// the core only needs pull and push; each either fully happens or fails.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use crate::error::ErrorKind;
use crate::types::{AccountId, Quote};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("Account {account:?} holds {available}, needs {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: Quote,
        requested: Quote,
    },

    #[error("Custody holds {available}, cannot push {requested}")]
    CustodyShortfall { available: Quote, requested: Quote },

    #[error("Transfer to {0:?} rejected")]
    TransferRejected(AccountId),

    #[error("Transfer amount must be non-negative")]
    InvalidAmount,
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssetError::InvalidAmount | AssetError::TransferRejected(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::InsufficientFunds,
        }
    }
}

// Implement this for the real token/bank rail. Both calls are all-or-nothing.
pub trait ExternalAsset {
    /// Moves `amount` from `from`'s external account into custody.
    fn pull(&mut self, from: AccountId, amount: Quote) -> Result<(), AssetError>;

    /// Moves `amount` out of custody to `to`'s external account.
    fn push(&mut self, to: AccountId, amount: Quote) -> Result<(), AssetError>;
}

/// In-memory rail for tests and the simulator.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAsset {
    balances: HashMap<AccountId, Quote>,
    custody: Quote,
    frozen: HashSet<AccountId>,
    total_pulled: Quote,
    total_pushed: Quote,
}

impl InMemoryAsset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Decimal)>) -> Self {
        let mut asset = Self::new();
        for (account, amount) in balances {
            asset.mint(account, Quote::new(amount));
        }
        asset
    }

    pub fn mint(&mut self, account: AccountId, amount: Quote) {
        let balance = self.balances.entry(account).or_insert_with(Quote::zero);
        *balance = balance.add(amount);
    }

    pub fn balance_of(&self, account: AccountId) -> Quote {
        self.balances.get(&account).copied().unwrap_or_else(Quote::zero)
    }

    pub fn custody_balance(&self) -> Quote {
        self.custody
    }

    pub fn total_pulled(&self) -> Quote {
        self.total_pulled
    }

    pub fn total_pushed(&self) -> Quote {
        self.total_pushed
    }

    // pushes to a frozen account fail, e.g. a blacklisted receiver
    pub fn freeze(&mut self, account: AccountId) {
        self.frozen.insert(account);
    }

    pub fn unfreeze(&mut self, account: AccountId) {
        self.frozen.remove(&account);
    }
}

impl ExternalAsset for InMemoryAsset {
    fn pull(&mut self, from: AccountId, amount: Quote) -> Result<(), AssetError> {
        if amount.is_negative() {
            return Err(AssetError::InvalidAmount);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                account: from,
                available,
                requested: amount,
            });
        }
        self.balances.insert(from, available.sub(amount));
        self.custody = self.custody.add(amount);
        self.total_pulled = self.total_pulled.add(amount);
        Ok(())
    }

    fn push(&mut self, to: AccountId, amount: Quote) -> Result<(), AssetError> {
        if amount.is_negative() {
            return Err(AssetError::InvalidAmount);
        }
        if self.frozen.contains(&to) {
            return Err(AssetError::TransferRejected(to));
        }
        if self.custody < amount {
            return Err(AssetError::CustodyShortfall {
                available: self.custody,
                requested: amount,
            });
        }
        self.custody = self.custody.sub(amount);
        self.mint(to, amount);
        self.total_pushed = self.total_pushed.add(amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pull_then_push() {
        let mut asset = InMemoryAsset::with_balances([(AccountId(1), dec!(100))]);

        asset.pull(AccountId(1), Quote::new(dec!(60))).unwrap();
        assert_eq!(asset.balance_of(AccountId(1)).value(), dec!(40));
        assert_eq!(asset.custody_balance().value(), dec!(60));

        asset.push(AccountId(2), Quote::new(dec!(25))).unwrap();
        assert_eq!(asset.balance_of(AccountId(2)).value(), dec!(25));
        assert_eq!(asset.custody_balance().value(), dec!(35));
        assert_eq!(asset.total_pulled().value(), dec!(60));
        assert_eq!(asset.total_pushed().value(), dec!(25));
    }

    #[test]
    fn default_rail_is_empty() {
        let asset = InMemoryAsset::default();
        assert_eq!(asset.custody_balance(), Quote::default());
        assert!(asset.total_pulled().is_zero());
        assert!(asset.total_pushed().is_zero());
        assert!(asset.balance_of(AccountId(1)).is_zero());
    }

    #[test]
    fn pull_is_all_or_nothing() {
        let mut asset = InMemoryAsset::with_balances([(AccountId(1), dec!(104))]);
        let err = asset.pull(AccountId(1), Quote::new(dec!(105))).unwrap_err();

        assert!(matches!(err, AssetError::InsufficientBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(asset.balance_of(AccountId(1)).value(), dec!(104));
        assert!(asset.custody_balance().is_zero());
    }

    #[test]
    fn frozen_receiver_rejects_push() {
        let mut asset = InMemoryAsset::with_balances([(AccountId(1), dec!(10))]);
        asset.pull(AccountId(1), Quote::new(dec!(10))).unwrap();
        asset.freeze(AccountId(1));

        assert_eq!(
            asset.push(AccountId(1), Quote::new(dec!(10))),
            Err(AssetError::TransferRejected(AccountId(1)))
        );
        assert_eq!(asset.custody_balance().value(), dec!(10));

        asset.unfreeze(AccountId(1));
        asset.push(AccountId(1), Quote::new(dec!(10))).unwrap();
    }

    #[test]
    fn negative_amounts_rejected() {
        let mut asset = InMemoryAsset::new();
        assert_eq!(
            asset.pull(AccountId(1), Quote::new(dec!(-1))),
            Err(AssetError::InvalidAmount)
        );
    }
}
