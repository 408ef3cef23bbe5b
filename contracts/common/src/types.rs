//! Core Types for the stCELO Protocol
//!
//! Fundamental data structures shared by the Account ledger, both
//! allocation strategies and the Manager.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for addresses (20-byte account / group identifiers)
pub type Address = [u8; 20];

// ============ Strategy Types ============

/// Allocation policy chosen by a depositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Strategy {
    /// Pooled across all active groups
    #[default]
    Default,
    /// Pinned to a single validator group
    Specific(Address),
}

impl Strategy {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// The pinned group, if any
    pub fn group(&self) -> Option<Address> {
        match self {
            Self::Default => None,
            Self::Specific(group) => Some(*group),
        }
    }
}

/// Status of a validator group as seen by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum GroupStatus {
    /// In the default strategy's active list
    Active,
    /// Removed from the active list but still holding stake
    Deprecated,
    /// Only reachable through the specific strategy
    SpecificOnly,
    /// Not tracked by any strategy
    Ineligible,
}

// ============ Distribution Types ============

/// A per-group split of an amount.
///
/// `votes` holds CELO amounts; `st_celo` holds the matching stCELO amounts
/// for strategies that track their stake in stCELO units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Distribution {
    pub groups: Vec<Address>,
    pub votes: Vec<u128>,
    pub st_celo: Vec<u128>,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, merging into an existing entry for the same group.
    /// Zero entries are dropped.
    pub fn push(&mut self, group: Address, votes: u128, st_celo: u128) {
        if votes == 0 && st_celo == 0 {
            return;
        }
        if let Some(i) = self.groups.iter().position(|g| *g == group) {
            self.votes[i] = self.votes[i].saturating_add(votes);
            self.st_celo[i] = self.st_celo[i].saturating_add(st_celo);
        } else {
            self.groups.push(group);
            self.votes.push(votes);
            self.st_celo.push(st_celo);
        }
    }

    /// Merge another distribution into this one
    pub fn extend(&mut self, other: Distribution) {
        for ((group, votes), st_celo) in other.groups.into_iter().zip(other.votes).zip(other.st_celo) {
            self.push(group, votes, st_celo);
        }
    }

    /// Total CELO in the split
    pub fn total(&self) -> u128 {
        self.votes.iter().fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    /// Total stCELO in the split
    pub fn total_st_celo(&self) -> u128 {
        self.st_celo.iter().fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    /// CELO assigned to a group
    pub fn votes_for(&self, group: &Address) -> u128 {
        self.groups
            .iter()
            .position(|g| g == group)
            .map(|i| self.votes[i])
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }
}

/// Source and destination of a scheduled stake transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StrategyTransfer {
    pub from: Distribution,
    pub to: Distribution,
}

impl StrategyTransfer {
    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.to.is_empty()
    }
}

// ============ Hint Types ============

/// Neighbour hints for a sorted-list insert or update.
///
/// `lesser` is the neighbour with the smaller key, `greater` the one with the
/// larger key. `None` means "no neighbour on that side".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SortHints {
    pub lesser: Option<Address>,
    pub greater: Option<Address>,
}

impl SortHints {
    pub fn new(lesser: Option<Address>, greater: Option<Address>) -> Self {
        Self { lesser, greater }
    }
}

/// Hints for revoking votes: one pair for the pending revoke, one for the active revoke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RevokeHints {
    pub after_pending: SortHints,
    pub after_active: SortHints,
}

// ============ Chain Types ============

/// Votes an account holds for a group on the underlying chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GroupVotes {
    pub pending: u128,
    pub active: u128,
}

impl GroupVotes {
    pub fn total(&self) -> u128 {
        self.pending.saturating_add(self.active)
    }
}

/// An unlocking entry in the locked-gold queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UnlockingCelo {
    pub value: u128,
    pub timestamp: u64,
}

/// All groups known to the allocator, partitioned by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GroupPartitions {
    /// Active default-strategy groups, greatest stake first
    pub active: Vec<Address>,
    /// Deprecated groups still holding stake
    pub deprecated: Vec<Address>,
    /// Groups pinned by at least one depositor
    pub specific: Vec<Address>,
}
