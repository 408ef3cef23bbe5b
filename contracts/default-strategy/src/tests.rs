//! Default strategy tests

use super::*;
use stcelo_common::health::GroupHealthRegistry;
use stcelo_common::testing::SimulatedChain;

const ACCOUNT: Address = [0xAA; 20];
const G1: Address = [1u8; 20];
const G2: Address = [2u8; 20];
const G3: Address = [3u8; 20];
const G4: Address = [4u8; 20];

fn setup() -> (SimulatedChain, GroupHealthRegistry, DefaultStrategy) {
    let mut chain = SimulatedChain::new();
    let mut health = GroupHealthRegistry::new();
    for g in [G1, G2, G3, G4] {
        chain.register_group(g, 1_000_000);
        health.update_group_health(g, true, 1).unwrap();
    }
    (chain, health, DefaultStrategy::new())
}

fn activate(strategy: &mut DefaultStrategy, chain: &SimulatedChain, health: &GroupHealthRegistry, group: Address) {
    let hints = strategy.activation_hints(&group);
    strategy.activate_group(health, chain, &ACCOUNT, group, hints, &[]).unwrap();
}

fn with_three_groups() -> (SimulatedChain, GroupHealthRegistry, DefaultStrategy) {
    let (chain, health, mut strategy) = setup();
    for g in [G1, G2, G3] {
        activate(&mut strategy, &chain, &health, g);
    }
    (chain, health, strategy)
}

fn unlimited(_: &Address) -> u128 {
    u128::MAX
}

// ============ Activation ============

#[test]
fn test_activate_group_eligibility() {
    let (mut chain, mut health, mut strategy) = setup();
    let unknown = [0x55; 20];

    assert_eq!(
        strategy.activate_group(&health, &chain, &ACCOUNT, unknown, SortHints::default(), &[]),
        Err(StCeloError::GroupNotEligible { group: unknown })
    );

    chain.advance_epoch();
    health.update_group_health(G1, false, 2).unwrap();
    assert_eq!(
        strategy.activate_group(&health, &chain, &ACCOUNT, G1, SortHints::default(), &[]),
        Err(StCeloError::GroupNotEligible { group: G1 })
    );

    activate(&mut strategy, &chain, &health, G2);
    assert_eq!(
        strategy.activate_group(&health, &chain, &ACCOUNT, G2, SortHints::default(), &[]),
        Err(StCeloError::GroupAlreadyAdded { group: G2 })
    );

    // List is not empty, so empty hints are wrong
    assert_eq!(
        strategy.activate_group(&health, &chain, &ACCOUNT, G3, SortHints::default(), &[]),
        Err(StCeloError::InvalidSortHints { key: G3 })
    );
    assert_eq!(strategy.get_groups(), vec![G2]);
}

#[test]
fn test_activate_group_respects_vote_slots() {
    let (mut chain, health, mut strategy) = setup();
    chain.set_max_groups_voted_for(3);

    activate(&mut strategy, &chain, &health, G1);
    activate(&mut strategy, &chain, &health, G2);

    // G4 holds a slot through another strategy
    let hints = strategy.activation_hints(&G3);
    assert_eq!(
        strategy.activate_group(&health, &chain, &ACCOUNT, G3, hints, &[G4]),
        Err(StCeloError::MaxGroupsVotedForReached { max: 3 })
    );

    // A group already holding a slot does not need a new one
    let hints = strategy.activation_hints(&G4);
    strategy.activate_group(&health, &chain, &ACCOUNT, G4, hints, &[G4]).unwrap();
    assert!(strategy.is_active(&G4));
}

// ============ Deposits ============

#[test]
fn test_deposit_fills_evenly_in_activation_order() {
    let (_chain, _health, mut strategy) = with_three_groups();

    let first = strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 100, 100, None, unlimited)
        .unwrap();
    assert_eq!(first.groups, vec![G1, G2, G3]);
    assert_eq!(first.votes, vec![34, 33, 33]);
    assert_eq!(first.st_celo, vec![34, 33, 33]);
    assert_eq!(strategy.get_groups(), vec![G1, G2, G3]);

    // Lowest groups are topped up first
    let second = strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(100, 100), 101, 101, None, unlimited)
        .unwrap();
    assert_eq!(second.votes, vec![33, 34, 34]);
    for g in [G1, G2, G3] {
        assert_eq!(strategy.st_celo_in_group(&g), 67);
    }
    assert_eq!(strategy.total_st_celo(), 201);
}

#[test]
fn test_deposit_skips_groups_without_capacity() {
    let (_chain, _health, mut strategy) = with_three_groups();

    let distribution = strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 100, 100, None, |g: &Address| {
            if *g == G2 {
                0
            } else {
                u128::MAX
            }
        })
        .unwrap();
    assert_eq!(distribution.groups, vec![G1, G3]);
    assert_eq!(distribution.votes, vec![50, 50]);
    assert_eq!(strategy.st_celo_in_group(&G2), 0);
}

#[test]
fn test_deposit_capacity_errors_leave_state_untouched() {
    let (_chain, _health, mut strategy) = with_three_groups();
    let before = strategy.clone();

    assert_eq!(
        strategy.generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 50, 50, None, |_: &Address| 10),
        Err(StCeloError::NotAbleToDistributeVotes { undistributed: 20 })
    );
    assert_eq!(
        strategy.generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 50, 50, None, |_: &Address| 0),
        Err(StCeloError::NoVotableGroups)
    );
    assert_eq!(strategy, before);

    let mut empty = DefaultStrategy::new();
    assert_eq!(
        empty.generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 50, 50, None, unlimited),
        Err(StCeloError::NoVotableGroups)
    );
}

#[test]
fn test_deposit_ignores_group() {
    let (_chain, _health, mut strategy) = with_three_groups();

    let distribution = strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 10, 10, Some(&G1), unlimited)
        .unwrap();
    assert_eq!(distribution.groups, vec![G2, G3]);
    assert_eq!(distribution.votes, vec![5, 5]);
    assert_eq!(strategy.st_celo_in_group(&G1), 0);
}

// ============ Withdrawals ============

#[test]
fn test_withdrawal_drains_deprecated_first() {
    let (_chain, _health, mut strategy) = with_three_groups();
    strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 201, 201, None, unlimited)
        .unwrap();

    assert_eq!(strategy.deprecate_group(G1).unwrap(), DeprecationOutcome::Deprecated);
    assert_eq!(strategy.deprecated_groups(), &[G1]);

    let withdrawal = strategy.calculate_and_update_for_withdrawal(80, 80).unwrap();
    assert_eq!(withdrawal.distribution.groups, vec![G1, G2, G3]);
    assert_eq!(withdrawal.distribution.st_celo, vec![67, 7, 6]);
    assert_eq!(withdrawal.distribution.votes, vec![67, 7, 6]);
    assert_eq!(withdrawal.purged, vec![G1]);

    assert!(!strategy.is_deprecated(&G1));
    assert_eq!(strategy.total_st_celo(), 121);
    assert_eq!(strategy.get_groups(), vec![G3, G2]);
}

#[test]
fn test_withdrawal_takes_largest_active_first() {
    let (_chain, _health, mut strategy) = with_three_groups();
    strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 60, 60, None, unlimited)
        .unwrap();
    strategy.take_from_group(G1, 5).unwrap();
    strategy.take_from_group(G3, 15).unwrap();
    // G1 = 15, G2 = 20, G3 = 5

    let withdrawal = strategy.calculate_and_update_for_withdrawal(10, 20).unwrap();
    assert_eq!(withdrawal.distribution.groups, vec![G1, G2]);
    assert_eq!(withdrawal.distribution.st_celo, vec![2, 8]);
    assert_eq!(withdrawal.distribution.votes, vec![4, 16]);
    assert!(withdrawal.purged.is_empty());
}

#[test]
fn test_withdrawal_too_large() {
    let (_chain, _health, mut strategy) = with_three_groups();
    strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 30, 30, None, unlimited)
        .unwrap();

    assert_eq!(
        strategy.calculate_and_update_for_withdrawal(31, 31),
        Err(StCeloError::CantWithdrawAccordingToStrategy { requested: 31, available: 30 })
    );
    assert_eq!(strategy.total_st_celo(), 30);
}

// ============ Lifecycle ============

#[test]
fn test_deprecate_and_reactivate() {
    let (chain, health, mut strategy) = with_three_groups();
    strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 10, 10, Some(&G3), unlimited)
        .unwrap();

    assert_eq!(strategy.deprecate_group(G3).unwrap(), DeprecationOutcome::Removed);
    assert!(!strategy.is_deprecated(&G3));
    assert_eq!(strategy.deprecate_group(G3), Err(StCeloError::GroupNotActive { group: G3 }));

    assert_eq!(strategy.deprecate_group(G1).unwrap(), DeprecationOutcome::Deprecated);
    activate(&mut strategy, &chain, &health, G1);
    assert!(strategy.is_active(&G1));
    assert!(!strategy.is_deprecated(&G1));
    assert_eq!(strategy.st_celo_in_group(&G1), 5);
    // Reactivated groups go to the back of the activation order
    assert_eq!(strategy.groups_by_activation(), vec![G2, G1]);
}

#[test]
fn test_take_from_group_and_digest() {
    let (_chain, _health, mut strategy) = with_three_groups();
    let empty_digest = strategy.digest().unwrap();
    strategy
        .generate_deposit_vote_distribution(&ExchangeRate::new(0, 0), 30, 30, None, unlimited)
        .unwrap();
    assert_ne!(strategy.digest().unwrap(), empty_digest);

    strategy.deprecate_group(G2).unwrap();
    assert!(!strategy.take_from_group(G1, 4).unwrap());
    assert!(strategy.take_from_group(G2, 10).unwrap());
    assert_eq!(
        strategy.take_from_group(G3, 11),
        Err(StCeloError::CantWithdrawAccordingToStrategy { requested: 11, available: 10 })
    );
    assert_eq!(strategy.total_st_celo(), 16);
    assert_eq!(strategy.get_groups(), vec![G3, G1]);
}
