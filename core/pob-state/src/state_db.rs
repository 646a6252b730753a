//! Account balance state touched by block finalization

use crate::primitives::{keccak256, Address, Amount, Hash};
use std::collections::BTreeMap;
use tracing::debug;

/// Mutable world state as seen by the consensus engine.
///
/// Execution and trie storage live elsewhere; consensus only credits rewards
/// and asks for the resulting root.
pub trait StateDatabase {
    /// Credit `amount` to `address`
    fn add_balance(&mut self, address: &Address, amount: Amount);

    /// Current balance of `address`
    fn balance(&self, address: &Address) -> Amount;

    /// Root commitment over the current state
    fn intermediate_root(&self) -> Hash;
}

/// In-memory balance state
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    balances: BTreeMap<Address, Amount>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&self) -> usize {
        self.balances.len()
    }
}

impl StateDatabase for MemoryState {
    fn add_balance(&mut self, address: &Address, amount: Amount) {
        let balance = self.balances.entry(*address).or_insert(0);
        *balance = balance.saturating_add(amount);
        debug!("Credited {} to {} (balance {})", amount, address, balance);
    }

    fn balance(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    fn intermediate_root(&self) -> Hash {
        if self.balances.is_empty() {
            return Hash::ZERO;
        }
        let mut bytes = Vec::with_capacity(self.balances.len() * 28);
        for (address, balance) in &self.balances {
            bytes.extend_from_slice(address.as_ref());
            bytes.extend_from_slice(&balance.to_be_bytes());
        }
        keccak256(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balances_and_root() {
        let mut state = MemoryState::new();
        assert_eq!(state.intermediate_root(), Hash::ZERO);

        let alice = Address([1; 20]);
        state.add_balance(&alice, 10);
        state.add_balance(&alice, 5);
        assert_eq!(state.balance(&alice), 15);
        assert_eq!(state.balance(&Address([2; 20])), 0);

        let root = state.intermediate_root();
        assert_ne!(root, Hash::ZERO);
        state.add_balance(&alice, 1);
        assert_ne!(state.intermediate_root(), root);
    }

    #[test]
    fn test_root_independent_of_insert_order() {
        let (a, b) = (Address([1; 20]), Address([2; 20]));
        let mut first = MemoryState::new();
        first.add_balance(&a, 1);
        first.add_balance(&b, 2);
        let mut second = MemoryState::new();
        second.add_balance(&b, 2);
        second.add_balance(&a, 1);
        assert_eq!(first.intermediate_root(), second.intermediate_root());
    }
}
