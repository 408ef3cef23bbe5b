//! Persisted Manager State
//!
//! Everything the protocol owns, apart from the chain itself: the account
//! ledger, both strategies, the stCELO token and the depositors' strategy
//! choices. Read-only queries shared by the Manager and its operations live
//! here.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use stcelo_account::Account;
use stcelo_common::{
    access_control::Ownable,
    chain::{CeloChain, Election, LockedGold, VoteDelta},
    digest::state_digest,
    errors::StCeloResult,
    math::{safe_add, ExchangeRate},
    token::StakedCeloToken,
    types::{Address, GroupPartitions, GroupStatus, RevokeHints, SortHints, Strategy},
    BTreeMap, BTreeSet,
};
use stcelo_default_strategy::DefaultStrategy;
use stcelo_specific_group_strategy::SpecificGroupStrategy;

use crate::config::ManagerConfig;

/// Ledgers owned by the Manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ManagerState {
    pub config: ManagerConfig,
    pub ownable: Ownable,
    pub account: Account,
    pub default: DefaultStrategy,
    pub specific: SpecificGroupStrategy,
    pub token: StakedCeloToken,
    /// Depositors pinned to a group; everyone else uses the default strategy
    pub strategies: BTreeMap<Address, Strategy>,
}

impl ManagerState {
    /// # Errors
    /// Returns the first configuration problem found by [`ManagerConfig::validate`].
    pub fn new(config: ManagerConfig) -> StCeloResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ownable: Ownable::new(config.owner)?,
            account: Account::new(config.account)?,
            default: DefaultStrategy::new(),
            specific: SpecificGroupStrategy::new(),
            token: StakedCeloToken::new(),
            strategies: BTreeMap::new(),
        })
    }

    /// Rate from the current totals; never cache the result
    pub fn exchange_rate<C: LockedGold>(&self, chain: &C) -> ExchangeRate {
        ExchangeRate::new(self.account.get_total_celo(chain), self.token.total_supply())
    }

    pub fn strategy_of(&self, depositor: &Address) -> Strategy {
        self.strategies.get(depositor).copied().unwrap_or_default()
    }

    pub fn set_strategy(&mut self, depositor: Address, strategy: Strategy) {
        match strategy {
            Strategy::Default => {
                self.strategies.remove(&depositor);
            }
            Strategy::Specific(_) => {
                self.strategies.insert(depositor, strategy);
            }
        }
    }

    /// Votes `group` can still receive once the votes already scheduled for it are cast
    pub fn receivable_votes<C: Election>(&self, chain: &C, group: &Address) -> u128 {
        receivable_votes(chain, &self.account, group)
    }

    /// CELO both strategies expect in `group`, and the CELO actually attributed to it
    pub fn expected_and_real_celo_for_group<C: CeloChain>(&self, chain: &C, group: &Address) -> StCeloResult<(u128, u128)> {
        let rate = self.exchange_rate(chain);
        let expected = safe_add(
            self.default.expected_celo_for_group(&rate, group)?,
            self.specific.expected_celo_for_group(&rate, group)?,
        )?;
        Ok((expected, self.account.get_celo_for_group(chain, group)))
    }

    pub fn all_groups(&self) -> GroupPartitions {
        GroupPartitions {
            active: self.default.get_groups(),
            deprecated: self.default.deprecated_groups().to_vec(),
            specific: self.specific.specific_groups(),
        }
    }

    /// Deprecation wins over a specific-strategy listing while stake drains
    pub fn group_status(&self, group: &Address) -> GroupStatus {
        if self.default.is_active(group) {
            GroupStatus::Active
        } else if self.default.is_deprecated(group) {
            GroupStatus::Deprecated
        } else if self.specific.is_allowed(group) || self.specific.has_stake(group) {
            GroupStatus::SpecificOnly
        } else {
            GroupStatus::Ineligible
        }
    }

    /// Every group holding, or reserved to hold, a vote slot of the account
    pub fn vote_slots<C: Election>(&self, chain: &C) -> BTreeSet<Address> {
        let mut slots: BTreeSet<Address> = chain.groups_voted_for_by_account(&self.account.address()).into_iter().collect();
        slots.extend(self.default.get_groups());
        slots.extend(self.default.deprecated_groups().iter().copied());
        slots.extend(self.specific.allowed_groups());
        slots.extend(self.specific.specific_groups());
        slots
    }

    /// Sort hints for realising the schedule of `group`
    pub fn activation_hints<C: Election>(&self, chain: &C, group: &Address) -> (SortHints, RevokeHints) {
        let to_vote = self.account.scheduled_votes_for_group(group);
        let to_revoke = self.account.scheduled_revoke_for_group(group);
        let after_revoke = chain.find_lesser_and_greater_after_vote(group, VoteDelta::Decrease(to_revoke));
        let vote_hints = chain.find_lesser_and_greater_after_vote(group, VoteDelta::Increase(to_vote));
        (vote_hints, RevokeHints { after_pending: after_revoke, after_active: after_revoke })
    }

    /// SHA-256 commitment of all ledgers
    pub fn digest(&self) -> StCeloResult<[u8; 32]> {
        state_digest(self)
    }
}

/// Chain receivable votes of `group` minus what `account` already scheduled for it
pub fn receivable_votes<C: Election>(chain: &C, account: &Account, group: &Address) -> u128 {
    chain
        .num_votes_receivable(group)
        .saturating_sub(account.scheduled_votes_for_group(group))
}
