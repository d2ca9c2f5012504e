//! Role-based access control.
//!
//! Capability checks run at the start of each privileged operation
//! through [`AccessControl::require_role`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use agora_types::Address;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::error::GovernanceError;

/// Privileged roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Single governing owner
    Owner,
    /// May schedule proposal executions
    Governance,
    /// May create, spend from and close budgets
    TreasuryManager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Owner => "owner",
            Role::Governance => "governance",
            Role::TreasuryManager => "treasury_manager",
        };
        f.write_str(name)
    }
}

/// Owner and role memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    members: HashMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            members: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, account: &Address) -> bool {
        &self.owner == account
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        match role {
            Role::Owner => self.is_owner(account),
            _ => self.members.get(&role).map_or(false, |m| m.contains(account)),
        }
    }

    /// Fail with `Unauthorized` unless `caller` holds `role`.
    pub fn require_role(&self, caller: &Address, role: Role) -> Result<(), GovernanceError> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            Err(GovernanceError::Unauthorized(format!("{:?} lacks role {}", caller, role)))
        }
    }

    /// Grant `role` to `account`. Returns false if it was already held.
    pub fn grant_role(&mut self, caller: &Address, role: Role, account: Address) -> Result<bool, GovernanceError> {
        self.require_role(caller, Role::Owner)?;
        Self::ensure_delegable(role)?;
        if account.is_zero() {
            return Err(GovernanceError::InvalidArgument("Cannot grant a role to the zero address".to_string()));
        }

        let added = self.members.entry(role).or_default().insert(account);
        if added {
            info!(role = %role, account = ?account, "role granted");
        }
        Ok(added)
    }

    /// Revoke `role` from `account`. Returns false if it was not held.
    pub fn revoke_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<bool, GovernanceError> {
        self.require_role(caller, Role::Owner)?;
        Self::ensure_delegable(role)?;

        let removed = self.members.get_mut(&role).map_or(false, |m| m.remove(account));
        if removed {
            info!(role = %role, account = ?account, "role revoked");
        }
        Ok(removed)
    }

    /// Hand ownership to `new_owner`. Returns the previous owner.
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<Address, GovernanceError> {
        self.require_role(caller, Role::Owner)?;
        if new_owner.is_zero() {
            return Err(GovernanceError::InvalidArgument("New owner cannot be the zero address".to_string()));
        }

        let previous = std::mem::replace(&mut self.owner, new_owner);
        info!(previous = ?previous, new_owner = ?new_owner, "ownership transferred");
        Ok(previous)
    }

    /// Accounts holding `role`.
    pub fn members(&self, role: Role) -> Vec<Address> {
        match role {
            Role::Owner => vec![self.owner],
            _ => self.members.get(&role).map(|m| m.iter().copied().collect()).unwrap_or_default(),
        }
    }

    fn ensure_delegable(role: Role) -> Result<(), GovernanceError> {
        if role == Role::Owner {
            return Err(GovernanceError::InvalidArgument(
                "Owner role moves only through ownership transfer".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn addr(n: u8) -> Address {
        Address::from_low_u8(n)
    }

    #[test]
    fn test_owner_holds_owner_role_only() {
        let access = AccessControl::new(addr(1));
        assert!(access.has_role(&addr(1), Role::Owner));
        assert!(!access.has_role(&addr(1), Role::Governance));
        assert!(access.require_role(&addr(1), Role::Owner).is_ok());

        let err = access.require_role(&addr(2), Role::Owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut access = AccessControl::new(addr(1));

        assert!(access.grant_role(&addr(1), Role::TreasuryManager, addr(3)).unwrap());
        assert!(!access.grant_role(&addr(1), Role::TreasuryManager, addr(3)).unwrap());
        assert!(access.has_role(&addr(3), Role::TreasuryManager));
        assert_eq!(access.members(Role::TreasuryManager), vec![addr(3)]);

        assert!(access.revoke_role(&addr(1), Role::TreasuryManager, &addr(3)).unwrap());
        assert!(!access.revoke_role(&addr(1), Role::TreasuryManager, &addr(3)).unwrap());
        assert!(!access.has_role(&addr(3), Role::TreasuryManager));
    }

    #[test]
    fn test_only_owner_manages_roles() {
        let mut access = AccessControl::new(addr(1));
        access.grant_role(&addr(1), Role::Governance, addr(2)).unwrap();

        assert!(matches!(
            access.grant_role(&addr(2), Role::Governance, addr(4)),
            Err(GovernanceError::Unauthorized(_))
        ));
        assert!(matches!(
            access.grant_role(&addr(1), Role::Owner, addr(4)),
            Err(GovernanceError::InvalidArgument(_))
        ));
        assert!(access.grant_role(&addr(1), Role::Governance, Address::ZERO).is_err());
    }

    #[test]
    fn test_transfer_ownership() {
        let mut access = AccessControl::new(addr(1));

        assert!(access.transfer_ownership(&addr(2), addr(2)).is_err());
        assert!(access.transfer_ownership(&addr(1), Address::ZERO).is_err());

        assert_eq!(access.transfer_ownership(&addr(1), addr(2)).unwrap(), addr(1));
        assert_eq!(access.owner(), addr(2));
        assert!(!access.has_role(&addr(1), Role::Owner));
        assert_eq!(access.members(Role::Owner), vec![addr(2)]);
    }
}
