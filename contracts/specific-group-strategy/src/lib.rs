//! Specific-Group Strategy for stCELO
//!
//! Depositors may pin their stake to a single allowed validator group. Stake
//! the group cannot receive (its voting limit is reached, or it turned
//! unhealthy) is placed in the default strategy instead and tracked here as
//! overflow, so it can move back once the group recovers.
//!
//! ## Core Operations
//!
//! - **allow_strategy / block_strategy**: owner-gated allow-list of pinnable groups
//! - **generate_deposit_vote_distribution**: direct stake up to capacity,
//!   the rest overflows into the pooled distribution
//! - **calculate_and_update_for_withdrawal**: overflow first, then direct stake
//! - **rebalance_when_health_changed**: move direct stake into overflow when a
//!   group turns unhealthy, and back out when it recovers
//! - **rebalance_overflow**: pull overflow back from one pooled group
//!
//! All stake is tracked in stCELO; CELO amounts are derived from the
//! exchange rate at call time.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stcelo_common::{
    chain::Election,
    digest::state_digest,
    errors::{StCeloError, StCeloResult},
    health::GroupHealth,
    math::{safe_add, safe_sub, split_proportionally, ExchangeRate},
    types::{Address, Distribution, StrategyTransfer},
    BTreeMap, BTreeSet, Vec, ZERO_ADDRESS,
};
use stcelo_default_strategy::{DefaultStrategy, StrategyWithdrawal};

// ============ Types ============

/// Stake pinned to one group, in stCELO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SpecificGroupStake {
    /// All stCELO pinned to the group
    pub total: u128,
    /// Part of `total` currently held by the default strategy
    pub overflow: u128,
}

impl SpecificGroupStake {
    /// stCELO attributed to the group itself
    pub fn direct(&self) -> u128 {
        self.total.saturating_sub(self.overflow)
    }
}

/// Which way stake moved relative to the overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowDirection {
    IntoOverflow,
    OutOfOverflow,
}

/// Stake moved between a pinned group and the pooled groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowMove {
    /// CELO to reschedule on the account
    pub transfer: StrategyTransfer,
    /// stCELO moved
    pub st_celo: u128,
    pub direction: OverflowDirection,
    /// Deprecated pooled groups purged while draining overflow
    pub purged: Vec<Address>,
}

// ============ Specific Group Strategy ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SpecificGroupStrategy {
    allowed: BTreeSet<Address>,
    stakes: BTreeMap<Address, SpecificGroupStake>,
    total_st_celo: u128,
    total_overflow: u128,
}

impl SpecificGroupStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Allow List ============

    /// Allow depositors to pin `group`.
    ///
    /// `other_slots` lists groups outside this strategy that also hold a
    /// vote slot of `account`.
    ///
    /// # Errors
    /// - `StrategyAlreadyAllowed` if the group is already allowed
    /// - `GroupNotEligible` if the chain or the health oracle reject it
    /// - `MaxGroupsVotedForReached` if no vote slot is left
    pub fn allow_strategy<H: GroupHealth, C: Election>(
        &mut self,
        health: &H,
        chain: &C,
        account: &Address,
        group: Address,
        other_slots: &[Address],
    ) -> StCeloResult<()> {
        if group == ZERO_ADDRESS {
            return Err(StCeloError::ZeroAddress { param: "group" });
        }
        if self.allowed.contains(&group) {
            return Err(StCeloError::StrategyAlreadyAllowed { group });
        }
        if !chain.is_registered_group(&group) || !health.is_valid_group(&group) {
            return Err(StCeloError::GroupNotEligible { group });
        }

        let mut slots: BTreeSet<Address> = chain.groups_voted_for_by_account(account).into_iter().collect();
        slots.extend(self.allowed.iter().copied());
        slots.extend(self.stakes.keys().copied());
        slots.extend(other_slots.iter().copied());
        let max = chain.max_num_groups_voted_for();
        if !slots.contains(&group) && slots.len() >= max {
            return Err(StCeloError::MaxGroupsVotedForReached { max });
        }

        self.allowed.insert(group);
        info!("Allowed specific strategy {}", hex::encode(group));
        Ok(())
    }

    /// Stop allowing `group` and move its direct stake into overflow.
    ///
    /// Returns the move to schedule, or `None` if the group held no direct stake.
    ///
    /// # Errors
    /// Returns `StrategyNotAllowed` if the group is not allowed, or any error
    /// of the pooled distribution of the displaced stake.
    pub fn block_strategy<F>(
        &mut self,
        default: &mut DefaultStrategy,
        rate: &ExchangeRate,
        group: Address,
        receivable: F,
    ) -> StCeloResult<Option<OverflowMove>>
    where
        F: Fn(&Address) -> u128,
    {
        if !self.allowed.contains(&group) {
            return Err(StCeloError::StrategyNotAllowed { group });
        }

        let moved = if self.stake(&group).direct() > 0 {
            Some(self.move_into_overflow(default, rate, group, receivable)?)
        } else {
            None
        };
        self.allowed.remove(&group);
        info!("Blocked specific strategy {}", hex::encode(group));
        Ok(moved)
    }

    // ============ Distribution ============

    /// Split a deposit of `celo` (minting `st_celo`) pinned to `group`.
    ///
    /// The group receives up to its receivable votes while healthy; the rest
    /// is distributed by the default strategy over the other active groups
    /// and recorded as overflow.
    ///
    /// # Errors
    /// - `StrategyNotAllowed` if the group is not allowed
    /// - any error of the pooled distribution of the overflow
    pub fn generate_deposit_vote_distribution<H, F>(
        &mut self,
        default: &mut DefaultStrategy,
        health: &H,
        rate: &ExchangeRate,
        group: Address,
        celo: u128,
        st_celo: u128,
        receivable: F,
    ) -> StCeloResult<Distribution>
    where
        H: GroupHealth,
        F: Fn(&Address) -> u128,
    {
        if celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        if !self.allowed.contains(&group) {
            return Err(StCeloError::StrategyNotAllowed { group });
        }

        // 1. Direct part up to capacity
        let direct_celo = if health.is_valid_group(&group) {
            celo.min(receivable(&group))
        } else {
            0
        };
        let overflow_celo = celo - direct_celo;
        let split = split_proportionally(st_celo, &[direct_celo, overflow_celo])?;
        let (direct_st, overflow_st) = (split[0], split[1]);

        // 2. Overflow through the pooled strategy
        let mut distribution = Distribution::new();
        distribution.push(group, direct_celo, direct_st);
        if overflow_celo > 0 {
            let pooled =
                default.generate_deposit_vote_distribution(rate, overflow_celo, overflow_st, Some(&group), receivable)?;
            distribution.extend(pooled);
            warn!(
                "specific group {} over capacity, {} CELO overflowed",
                hex::encode(group),
                overflow_celo
            );
        }

        // 3. Record
        let mut stake = self.stake(&group);
        stake.total = safe_add(stake.total, st_celo)?;
        stake.overflow = safe_add(stake.overflow, overflow_st)?;
        self.total_st_celo = safe_add(self.total_st_celo, st_celo)?;
        self.total_overflow = safe_add(self.total_overflow, overflow_st)?;
        self.stakes.insert(group, stake);

        debug!("specific deposit of {} CELO to {}", celo, hex::encode(group));
        Ok(distribution)
    }

    /// Take `st_celo` (worth `celo`) pinned to `group` out of the strategy.
    ///
    /// Overflow is returned first, through the default strategy's withdrawal
    /// order; the rest comes from the group itself.
    ///
    /// # Errors
    /// Returns `CantWithdrawAccordingToStrategy` if less than `st_celo` is pinned to the group.
    pub fn calculate_and_update_for_withdrawal(
        &mut self,
        default: &mut DefaultStrategy,
        group: Address,
        st_celo: u128,
        celo: u128,
    ) -> StCeloResult<StrategyWithdrawal> {
        if st_celo == 0 {
            return Err(StCeloError::ZeroAmount);
        }
        let mut stake = self.stake(&group);
        if st_celo > stake.total {
            return Err(StCeloError::CantWithdrawAccordingToStrategy { requested: st_celo, available: stake.total });
        }

        let overflow_st = st_celo.min(stake.overflow);
        let direct_st = st_celo - overflow_st;
        let split = split_proportionally(celo, &[overflow_st, direct_st])?;
        let (overflow_celo, direct_celo) = (split[0], split[1]);

        let mut withdrawal = if overflow_st > 0 {
            default.calculate_and_update_for_withdrawal(overflow_st, overflow_celo)?
        } else {
            StrategyWithdrawal::default()
        };
        withdrawal.distribution.push(group, direct_celo, direct_st);

        stake.total -= st_celo;
        stake.overflow -= overflow_st;
        self.total_st_celo = safe_sub(self.total_st_celo, st_celo)?;
        self.total_overflow = safe_sub(self.total_overflow, overflow_st)?;
        self.set_stake(group, stake);

        debug!("specific withdrawal of {} stCELO from {}", st_celo, hex::encode(group));
        Ok(withdrawal)
    }

    // ============ Rebalancing ============

    /// Follow a health change of `group`.
    ///
    /// An unhealthy or blocked group has all its direct stake moved into
    /// overflow. A healthy, allowed group takes back as much overflow as it
    /// can receive.
    ///
    /// # Errors
    /// Returns `NothingToRebalance` if no stake needs to move.
    pub fn rebalance_when_health_changed<H, F>(
        &mut self,
        default: &mut DefaultStrategy,
        health: &H,
        rate: &ExchangeRate,
        group: Address,
        receivable: F,
    ) -> StCeloResult<OverflowMove>
    where
        H: GroupHealth,
        F: Fn(&Address) -> u128,
    {
        let stake = self.stake(&group);
        let healthy = health.is_valid_group(&group) && self.allowed.contains(&group);

        if !healthy && stake.direct() > 0 {
            return self.move_into_overflow(default, rate, group, receivable);
        }
        if healthy && stake.overflow > 0 {
            let capacity = receivable(&group);
            let overflow_celo = rate.to_celo(stake.overflow)?;
            let celo = overflow_celo.min(capacity);
            if celo > 0 {
                let st_celo = if celo == overflow_celo {
                    stake.overflow
                } else {
                    rate.to_staked_celo(celo)?.min(stake.overflow)
                };
                if st_celo > 0 {
                    return self.move_out_of_overflow(default, group, st_celo, celo);
                }
            }
        }
        Err(StCeloError::NothingToRebalance { group })
    }

    /// Move overflow of `group` held by the pooled group `from_group` back
    /// to `group`, up to what `group` can receive.
    ///
    /// # Errors
    /// - `GroupNotEligible` if `group` is unhealthy or not allowed
    /// - `NothingToRebalance` if there is no overflow, `from_group` holds no
    ///   pooled stake or `group` has no capacity
    pub fn rebalance_overflow<H, F>(
        &mut self,
        default: &mut DefaultStrategy,
        health: &H,
        rate: &ExchangeRate,
        group: Address,
        from_group: Address,
        receivable: F,
    ) -> StCeloResult<OverflowMove>
    where
        H: GroupHealth,
        F: Fn(&Address) -> u128,
    {
        if !health.is_valid_group(&group) || !self.allowed.contains(&group) {
            return Err(StCeloError::GroupNotEligible { group });
        }
        let mut stake = self.stake(&group);
        let mut st_celo = stake.overflow.min(default.st_celo_in_group(&from_group));
        let mut celo = rate.to_celo(st_celo)?;
        let capacity = receivable(&group);
        if celo > capacity {
            celo = capacity;
            st_celo = rate.to_staked_celo(celo)?.min(st_celo);
        }
        if st_celo == 0 || celo == 0 {
            return Err(StCeloError::NothingToRebalance { group });
        }

        let purged = default.take_from_group(from_group, st_celo)?;
        stake.overflow -= st_celo;
        self.total_overflow = safe_sub(self.total_overflow, st_celo)?;
        self.set_stake(group, stake);

        let mut transfer = StrategyTransfer::default();
        transfer.from.push(from_group, celo, st_celo);
        transfer.to.push(group, celo, st_celo);
        info!(
            "Rebalanced {} stCELO of overflow from {} back to {}",
            st_celo,
            hex::encode(from_group),
            hex::encode(group)
        );
        Ok(OverflowMove {
            transfer,
            st_celo,
            direction: OverflowDirection::OutOfOverflow,
            purged: if purged { vec![from_group] } else { Vec::new() },
        })
    }

    fn move_into_overflow<F>(
        &mut self,
        default: &mut DefaultStrategy,
        rate: &ExchangeRate,
        group: Address,
        receivable: F,
    ) -> StCeloResult<OverflowMove>
    where
        F: Fn(&Address) -> u128,
    {
        let mut stake = self.stake(&group);
        let st_celo = stake.direct();
        let celo = rate.to_celo(st_celo)?;
        if celo == 0 {
            return Err(StCeloError::NothingToRebalance { group });
        }

        let to = default.generate_deposit_vote_distribution(rate, celo, st_celo, Some(&group), receivable)?;
        stake.overflow = stake.total;
        self.total_overflow = safe_add(self.total_overflow, st_celo)?;
        self.set_stake(group, stake);

        let mut transfer = StrategyTransfer { from: Distribution::new(), to };
        transfer.from.push(group, celo, st_celo);
        info!("Moved {} stCELO of {} into overflow", st_celo, hex::encode(group));
        Ok(OverflowMove { transfer, st_celo, direction: OverflowDirection::IntoOverflow, purged: Vec::new() })
    }

    fn move_out_of_overflow(
        &mut self,
        default: &mut DefaultStrategy,
        group: Address,
        st_celo: u128,
        celo: u128,
    ) -> StCeloResult<OverflowMove> {
        let StrategyWithdrawal { distribution: from, purged } =
            default.calculate_and_update_for_withdrawal(st_celo, celo)?;
        let mut stake = self.stake(&group);
        stake.overflow -= st_celo;
        self.total_overflow = safe_sub(self.total_overflow, st_celo)?;
        self.set_stake(group, stake);

        let mut transfer = StrategyTransfer { from, to: Distribution::new() };
        transfer.to.push(group, celo, st_celo);
        info!("Moved {} stCELO of overflow back to {}", st_celo, hex::encode(group));
        Ok(OverflowMove { transfer, st_celo, direction: OverflowDirection::OutOfOverflow, purged })
    }

    fn set_stake(&mut self, group: Address, stake: SpecificGroupStake) {
        if stake.total == 0 {
            self.stakes.remove(&group);
        } else {
            self.stakes.insert(group, stake);
        }
    }

    // ============ Views ============

    pub fn is_allowed(&self, group: &Address) -> bool {
        self.allowed.contains(group)
    }

    pub fn allowed_groups(&self) -> Vec<Address> {
        self.allowed.iter().copied().collect()
    }

    pub fn stake(&self, group: &Address) -> SpecificGroupStake {
        self.stakes.get(group).copied().unwrap_or_default()
    }

    pub fn has_stake(&self, group: &Address) -> bool {
        self.stakes.contains_key(group)
    }

    /// Groups holding pinned stake
    pub fn specific_groups(&self) -> Vec<Address> {
        self.stakes.keys().copied().collect()
    }

    pub fn total_st_celo(&self) -> u128 {
        self.total_st_celo
    }

    pub fn total_overflow(&self) -> u128 {
        self.total_overflow
    }

    /// CELO the direct stake pinned to `group` is worth
    pub fn expected_celo_for_group(&self, rate: &ExchangeRate, group: &Address) -> StCeloResult<u128> {
        rate.to_celo(self.stake(group).direct())
    }

    /// SHA-256 commitment of the strategy state
    pub fn digest(&self) -> StCeloResult<[u8; 32]> {
        state_digest(self)
    }
}

#[cfg(test)]
mod tests;
