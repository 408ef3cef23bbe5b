//! stCELO Token Ledger
//!
//! Balances and total supply of the receipt token. Minting and burning are
//! driven by the Manager; the exchange rate lives in [`crate::math`].

use crate::errors::{StCeloError, StCeloResult};
use crate::types::Address;
use crate::BTreeMap;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// stCELO balances and supply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StakedCeloToken {
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
}

impl StakedCeloToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Mint `amount` to `to`
    pub fn mint(&mut self, to: Address, amount: u128) -> StCeloResult<()> {
        if to == crate::ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "to" });
        }
        let supply = self.total_supply.checked_add(amount).ok_or(StCeloError::Overflow)?;
        let balance = self.balance_of(&to).checked_add(amount).ok_or(StCeloError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        Ok(())
    }

    /// Burn `amount` from `from`
    pub fn burn(&mut self, from: Address, amount: u128) -> StCeloResult<()> {
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(StCeloError::InsufficientBalance { available: balance, requested: amount });
        }
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> StCeloResult<()> {
        if amount == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        if to == crate::ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "to" });
        }
        if from == to {
            return Err(StCeloError::InvalidInput { param: "to", reason: "self transfer" });
        }
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(StCeloError::InsufficientBalance { available: from_balance, requested: amount });
        }
        let to_balance = self.balance_of(&to).checked_add(amount).ok_or(StCeloError::Overflow)?;
        self.set_balance(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    fn set_balance(&mut self, owner: Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(&owner);
        } else {
            self.balances.insert(owner, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 20];
    const BOB: Address = [2u8; 20];

    #[test]
    fn test_mint_burn_supply() {
        let mut token = StakedCeloToken::new();
        token.mint(ALICE, 100).unwrap();
        token.mint(BOB, 50).unwrap();
        assert_eq!(token.total_supply(), 150);

        token.burn(ALICE, 40).unwrap();
        assert_eq!(token.balance_of(&ALICE), 60);
        assert_eq!(token.total_supply(), 110);

        assert!(matches!(token.burn(BOB, 51), Err(StCeloError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_transfer_checks() {
        let mut token = StakedCeloToken::new();
        token.mint(ALICE, 100).unwrap();

        assert_eq!(token.transfer(ALICE, BOB, 0), Err(StCeloError::ZeroAmount));
        assert!(matches!(token.transfer(ALICE, ALICE, 1), Err(StCeloError::InvalidInput { .. })));
        assert!(matches!(token.transfer(ALICE, BOB, 101), Err(StCeloError::InsufficientBalance { .. })));

        token.transfer(ALICE, BOB, 30).unwrap();
        assert_eq!(token.balance_of(&ALICE), 70);
        assert_eq!(token.balance_of(&BOB), 30);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_mint_to_zero_address_rejected() {
        let mut token = StakedCeloToken::new();
        assert!(matches!(token.mint([0u8; 20], 1), Err(StCeloError::ZeroAddress { .. })));
    }
}
