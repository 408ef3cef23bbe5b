//! Default (Pooled) Strategy for stCELO
//!
//! Spreads pooled stake over every active validator group. Stake is tracked
//! per group in stCELO so rewards raise every group's CELO value at once.
//!
//! ## Core Operations
//!
//! - **activate_group**: owner-gated; add an eligible group to the active set
//! - **deprecate_group**: remove a group from the active set, keeping it
//!   withdrawable while it still holds stake
//! - **generate_deposit_vote_distribution**: fill the least-staked groups
//!   first, evenly, up to each group's receivable votes
//! - **calculate_and_update_for_withdrawal**: drain deprecated groups first,
//!   then the most-staked active groups, evenly
//!
//! ## Ordering
//!
//! Active groups live in a [`SortedGroupList`] keyed by pooled stCELO,
//! greatest first. Equal stakes are filled and drained in activation order.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stcelo_common::{
    chain::Election,
    digest::state_digest,
    errors::{StCeloError, StCeloResult},
    health::GroupHealth,
    math::{distribute_evenly, drain_evenly, safe_add, safe_sub, safe_sum, split_proportionally, ExchangeRate},
    types::{Address, Distribution, SortHints},
    BTreeMap, BTreeSet, Vec, ZERO_ADDRESS,
};

pub mod sorted_list;

pub use sorted_list::{GroupEntry, SortedGroupList};

// ============ Result Types ============

/// What happened to a group leaving the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeprecationOutcome {
    /// Still holds stake; drained first on withdrawals
    Deprecated,
    /// Held nothing; forgotten entirely
    Removed,
}

/// Result of taking stake out of the strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyWithdrawal {
    /// Per-group CELO and stCELO taken
    pub distribution: Distribution,
    /// Deprecated groups purged because they reached zero
    pub purged: Vec<Address>,
}

// ============ Default Strategy ============

/// Pooled stake over active and deprecated groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DefaultStrategy {
    active: SortedGroupList,
    /// Deprecated groups in deprecation order
    deprecated: Vec<Address>,
    st_celo_in_group: BTreeMap<Address, u128>,
    activation_seq: BTreeMap<Address, u64>,
    next_seq: u64,
    total_st_celo: u128,
}

impl DefaultStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Group Lifecycle ============

    /// Add `group` to the active set at the position given by `hints`.
    ///
    /// A deprecated group is moved back into the active set with its stake.
    /// `other_slots` lists groups outside this strategy that also hold a
    /// vote slot of `account`.
    ///
    /// # Errors
    /// - `GroupAlreadyAdded` if the group is already active
    /// - `GroupNotEligible` if the chain or the health oracle reject it
    /// - `MaxGroupsVotedForReached` if no vote slot is left
    /// - `InvalidSortHints` if the hints do not match the group's stake
    pub fn activate_group<H: GroupHealth, C: Election>(
        &mut self,
        health: &H,
        chain: &C,
        account: &Address,
        group: Address,
        hints: SortHints,
        other_slots: &[Address],
    ) -> StCeloResult<()> {
        if group == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "group" });
        }
        if self.active.contains(&group) {
            return Err(StCeloError::GroupAlreadyAdded { group });
        }
        if !chain.is_registered_group(&group) || !health.is_valid_group(&group) {
            return Err(StCeloError::GroupNotEligible { group });
        }

        let mut slots: BTreeSet<Address> = chain.groups_voted_for_by_account(account).into_iter().collect();
        slots.extend(self.active.keys());
        slots.extend(self.deprecated.iter().copied());
        slots.extend(other_slots.iter().copied());
        let max = chain.max_num_groups_voted_for();
        if !slots.contains(&group) && slots.len() >= max {
            return Err(StCeloError::MaxGroupsVotedForReached { max });
        }

        let stake = self.st_celo_in_group(&group);
        self.active.insert(group, stake, hints)?;
        self.deprecated.retain(|g| *g != group);
        self.activation_seq.insert(group, self.next_seq);
        self.next_seq += 1;

        info!("Activated group {}", hex::encode(group));
        Ok(())
    }

    /// Remove `group` from the active set.
    ///
    /// # Errors
    /// Returns `GroupNotActive` if the group is not active.
    pub fn deprecate_group(&mut self, group: Address) -> StCeloResult<DeprecationOutcome> {
        self.active.remove(&group)?;

        if self.st_celo_in_group(&group) > 0 {
            self.deprecated.push(group);
            info!("Deprecated group {}", hex::encode(group));
            Ok(DeprecationOutcome::Deprecated)
        } else {
            self.activation_seq.remove(&group);
            info!("Removed group {}", hex::encode(group));
            Ok(DeprecationOutcome::Removed)
        }
    }

    // ============ Distribution ============

    /// Split a deposit of `celo` (minting `st_celo`) over active groups and
    /// record the stake.
    ///
    /// Groups with the least pooled CELO are filled first, evenly; the
    /// integer remainder goes one unit each to the earliest groups in fill
    /// order. No group receives more than `receivable(group)`. `ignore` is
    /// left out of the distribution.
    ///
    /// # Errors
    /// - `NoVotableGroups` if no candidate group can receive anything
    /// - `NotAbleToDistributeVotes` if the candidates cannot absorb `celo`
    pub fn generate_deposit_vote_distribution<F>(
        &mut self,
        rate: &ExchangeRate,
        celo: u128,
        st_celo: u128,
        ignore: Option<&Address>,
        receivable: F,
    ) -> StCeloResult<Distribution>
    where
        F: Fn(&Address) -> u128,
    {
        if celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }

        // 1. Candidates in activation order
        let candidates: Vec<Address> = self
            .groups_by_activation()
            .into_iter()
            .filter(|g| Some(g) != ignore)
            .collect();
        let caps: Vec<u128> = candidates.iter().map(|g| receivable(g)).collect();
        if caps.iter().all(|c| *c == 0) {
            return Err(StCeloError::NoVotableGroups);
        }

        // 2. Water-fill CELO over current pooled CELO
        let levels = candidates
            .iter()
            .map(|g| rate.to_celo(self.st_celo_in_group(g)))
            .collect::<StCeloResult<Vec<u128>>>()?;
        let votes = distribute_evenly(celo, &levels, &caps)
            .map_err(|undistributed| StCeloError::NotAbleToDistributeVotes { undistributed })?;
        let st_split = split_proportionally(st_celo, &votes)?;

        let mut distribution = Distribution::new();
        for ((group, v), s) in candidates.iter().zip(&votes).zip(&st_split) {
            distribution.push(*group, *v, *s);
        }

        // 3. Record
        self.add_stake(&distribution)?;
        debug!(
            "default deposit of {} CELO over {} groups",
            celo,
            distribution.len()
        );
        Ok(distribution)
    }

    /// Take `st_celo` (worth `celo`) out of the strategy and record it.
    ///
    /// Deprecated groups are drained before active ones. Within each tier
    /// the most-staked groups are drained first, evenly. Deprecated groups
    /// reaching zero are purged.
    ///
    /// # Errors
    /// Returns `CantWithdrawAccordingToStrategy` if the strategy holds less than `st_celo`.
    pub fn calculate_and_update_for_withdrawal(&mut self, st_celo: u128, celo: u128) -> StCeloResult<StrategyWithdrawal> {
        if st_celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }

        let deprecated = self.deprecated.clone();
        let active = self.groups_by_activation();
        let dep_levels: Vec<u128> = deprecated.iter().map(|g| self.st_celo_in_group(g)).collect();
        let act_levels: Vec<u128> = active.iter().map(|g| self.st_celo_in_group(g)).collect();
        let dep_total = safe_sum(&dep_levels)?;
        let available = safe_add(dep_total, safe_sum(&act_levels)?)?;
        if st_celo > available {
            return Err(StCeloError::CantWithdrawAccordingToStrategy { requested: st_celo, available });
        }

        // 1. Deprecated tier, then active tier
        let from_deprecated = st_celo.min(dep_total);
        let shortfall = |missing: u128| StCeloError::CantWithdrawAccordingToStrategy {
            requested: st_celo,
            available: available.saturating_sub(missing),
        };
        let mut taken = drain_evenly(from_deprecated, &dep_levels, &dep_levels).map_err(shortfall)?;
        taken.extend(drain_evenly(st_celo - from_deprecated, &act_levels, &act_levels).map_err(shortfall)?);

        // 2. CELO in proportion to stCELO taken
        let celo_split = split_proportionally(celo, &taken)?;
        let mut distribution = Distribution::new();
        for ((group, s), c) in deprecated.iter().chain(active.iter()).zip(&taken).zip(&celo_split) {
            distribution.push(*group, *c, *s);
        }

        // 3. Record
        let purged = self.remove_stake(&distribution)?;
        debug!(
            "default withdrawal of {} stCELO over {} groups, {} purged",
            st_celo,
            distribution.len(),
            purged.len()
        );
        Ok(StrategyWithdrawal { distribution, purged })
    }

    /// Take `st_celo` out of one specific group.
    /// Returns true if a deprecated group was purged as a result.
    ///
    /// # Errors
    /// Returns `CantWithdrawAccordingToStrategy` if the group holds less than `st_celo`.
    pub fn take_from_group(&mut self, group: Address, st_celo: u128) -> StCeloResult<bool> {
        let available = self.st_celo_in_group(&group);
        if st_celo > available {
            return Err(StCeloError::CantWithdrawAccordingToStrategy { requested: st_celo, available });
        }
        let mut distribution = Distribution::new();
        distribution.push(group, 0, st_celo);
        let purged = self.remove_stake(&distribution)?;
        Ok(!purged.is_empty())
    }

    fn add_stake(&mut self, distribution: &Distribution) -> StCeloResult<()> {
        let added = distribution.total_st_celo();
        let total = safe_add(self.total_st_celo, added)?;
        for (group, st) in distribution.groups.iter().zip(&distribution.st_celo) {
            let stake = safe_add(self.st_celo_in_group(group), *st)?;
            self.set_stake(*group, stake)?;
        }
        self.total_st_celo = total;
        Ok(())
    }

    fn remove_stake(&mut self, distribution: &Distribution) -> StCeloResult<Vec<Address>> {
        let removed = distribution.total_st_celo();
        let total = safe_sub(self.total_st_celo, removed)?;
        let mut purged = Vec::new();
        for (group, st) in distribution.groups.iter().zip(&distribution.st_celo) {
            let stake = safe_sub(self.st_celo_in_group(group), *st)?;
            self.set_stake(*group, stake)?;
            if stake == 0 && self.is_deprecated(group) {
                self.deprecated.retain(|g| g != group);
                self.activation_seq.remove(group);
                info!("Purged drained group {}", hex::encode(group));
                purged.push(*group);
            }
        }
        self.total_st_celo = total;
        Ok(purged)
    }

    fn set_stake(&mut self, group: Address, stake: u128) -> StCeloResult<()> {
        if stake == 0 {
            self.st_celo_in_group.remove(&group);
        } else {
            self.st_celo_in_group.insert(group, stake);
        }
        if self.active.contains(&group) {
            self.active.reposition(group, stake)?;
        }
        Ok(())
    }

    // ============ Views ============

    /// Active groups, most pooled stake first
    pub fn get_groups(&self) -> Vec<Address> {
        self.active.keys()
    }

    /// Active groups in activation order
    pub fn groups_by_activation(&self) -> Vec<Address> {
        let mut groups = self.active.keys();
        groups.sort_by_key(|g| self.activation_seq.get(g).copied().unwrap_or(u64::MAX));
        groups
    }

    pub fn deprecated_groups(&self) -> &[Address] {
        &self.deprecated
    }

    pub fn is_active(&self, group: &Address) -> bool {
        self.active.contains(group)
    }

    pub fn is_deprecated(&self, group: &Address) -> bool {
        self.deprecated.contains(group)
    }

    /// Sorted list of active groups
    pub fn active_list(&self) -> &SortedGroupList {
        &self.active
    }

    pub fn st_celo_in_group(&self, group: &Address) -> u128 {
        self.st_celo_in_group.get(group).copied().unwrap_or(0)
    }

    pub fn total_st_celo(&self) -> u128 {
        self.total_st_celo
    }

    /// CELO the pooled stake in `group` is worth
    pub fn expected_celo_for_group(&self, rate: &ExchangeRate, group: &Address) -> StCeloResult<u128> {
        rate.to_celo(self.st_celo_in_group(group))
    }

    /// Neighbours `group` needs when activated with its current stake
    pub fn activation_hints(&self, group: &Address) -> SortHints {
        self.active.find_lesser_and_greater(self.st_celo_in_group(group), None)
    }

    /// SHA-256 commitment of the strategy state
    pub fn digest(&self) -> StCeloResult<[u8; 32]> {
        state_digest(self)
    }
}

#[cfg(test)]
mod tests;
