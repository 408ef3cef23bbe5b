//! Specific-group strategy tests

use super::*;
use stcelo_common::health::GroupHealthRegistry;
use stcelo_common::testing::SimulatedChain;

const ACCOUNT: Address = [0xAA; 20];
const G1: Address = [1u8; 20];
const G2: Address = [2u8; 20];
const G3: Address = [3u8; 20];
const G4: Address = [4u8; 20];

struct Fixture {
    chain: SimulatedChain,
    health: GroupHealthRegistry,
    default: DefaultStrategy,
    specific: SpecificGroupStrategy,
}

/// G1 and G2 pooled, G3 pinnable
fn setup() -> Fixture {
    let mut chain = SimulatedChain::new();
    let mut health = GroupHealthRegistry::new();
    for g in [G1, G2, G3, G4] {
        chain.register_group(g, 1_000_000);
        health.update_group_health(g, true, 1).unwrap();
    }
    let mut default = DefaultStrategy::new();
    for g in [G1, G2] {
        let hints = default.activation_hints(&g);
        default.activate_group(&health, &chain, &ACCOUNT, g, hints, &[]).unwrap();
    }
    let mut specific = SpecificGroupStrategy::new();
    specific.allow_strategy(&health, &chain, &ACCOUNT, G3, &[G1, G2]).unwrap();
    Fixture { chain, health, default, specific }
}

fn unlimited(_: &Address) -> u128 {
    u128::MAX
}

fn capped(group: Address, cap: u128) -> impl Fn(&Address) -> u128 {
    move |g: &Address| if *g == group { cap } else { u128::MAX }
}

/// Deposit 100 into G3 with room for only 40
fn overflowed() -> Fixture {
    let mut f = setup();
    f.specific
        .generate_deposit_vote_distribution(
            &mut f.default,
            &f.health,
            &ExchangeRate::new(0, 0),
            G3,
            100,
            100,
            capped(G3, 40),
        )
        .unwrap();
    f
}

// ============ Allow List ============

#[test]
fn test_allow_strategy_checks() {
    let mut f = setup();

    assert_eq!(
        f.specific.allow_strategy(&f.health, &f.chain, &ACCOUNT, G3, &[]),
        Err(StCeloError::StrategyAlreadyAllowed { group: G3 })
    );
    assert_eq!(
        f.specific.allow_strategy(&f.health, &f.chain, &ACCOUNT, ZERO_ADDRESS, &[]),
        Err(StCeloError::ZeroAddress { param: "group" })
    );

    f.chain.advance_epoch();
    f.health.update_group_health(G4, false, 2).unwrap();
    assert_eq!(
        f.specific.allow_strategy(&f.health, &f.chain, &ACCOUNT, G4, &[]),
        Err(StCeloError::GroupNotEligible { group: G4 })
    );

    f.health.update_group_health(G4, true, 3).unwrap();
    f.chain.set_max_groups_voted_for(3);
    assert_eq!(
        f.specific.allow_strategy(&f.health, &f.chain, &ACCOUNT, G4, &[G1, G2]),
        Err(StCeloError::MaxGroupsVotedForReached { max: 3 })
    );
    assert!(!f.specific.is_allowed(&G4));
    assert_eq!(f.specific.allowed_groups(), vec![G3]);
}

// ============ Deposits ============

#[test]
fn test_deposit_within_capacity_is_direct() {
    let mut f = setup();

    let distribution = f
        .specific
        .generate_deposit_vote_distribution(&mut f.default, &f.health, &ExchangeRate::new(0, 0), G3, 100, 100, unlimited)
        .unwrap();
    assert_eq!(distribution.groups, vec![G3]);
    assert_eq!(distribution.votes, vec![100]);
    assert_eq!(f.specific.stake(&G3), SpecificGroupStake { total: 100, overflow: 0 });
    assert_eq!(f.specific.specific_groups(), vec![G3]);
    assert_eq!(f.default.total_st_celo(), 0);
}

#[test]
fn test_deposit_over_capacity_overflows_to_pool() {
    let f = overflowed();

    assert_eq!(f.specific.stake(&G3), SpecificGroupStake { total: 100, overflow: 60 });
    assert_eq!(f.specific.total_overflow(), 60);
    assert_eq!(f.default.st_celo_in_group(&G1), 30);
    assert_eq!(f.default.st_celo_in_group(&G2), 30);
    assert_eq!(f.specific.expected_celo_for_group(&ExchangeRate::new(100, 100), &G3).unwrap(), 40);
}

#[test]
fn test_deposit_overflow_split() {
    let mut f = setup();

    let distribution = f
        .specific
        .generate_deposit_vote_distribution(&mut f.default, &f.health, &ExchangeRate::new(0, 0), G3, 100, 100, capped(G3, 40))
        .unwrap();
    assert_eq!(distribution.groups, vec![G3, G1, G2]);
    assert_eq!(distribution.votes, vec![40, 30, 30]);
    assert_eq!(distribution.total(), 100);
}

#[test]
fn test_deposit_requires_allowed_group() {
    let mut f = setup();

    assert_eq!(
        f.specific
            .generate_deposit_vote_distribution(&mut f.default, &f.health, &ExchangeRate::new(0, 0), G4, 10, 10, unlimited),
        Err(StCeloError::StrategyNotAllowed { group: G4 })
    );
    assert_eq!(f.specific.total_st_celo(), 0);
}

// ============ Withdrawals ============

#[test]
fn test_withdrawal_takes_overflow_first() {
    let mut f = overflowed();

    assert_eq!(
        f.specific.calculate_and_update_for_withdrawal(&mut f.default, G3, 101, 101),
        Err(StCeloError::CantWithdrawAccordingToStrategy { requested: 101, available: 100 })
    );

    let withdrawal = f.specific.calculate_and_update_for_withdrawal(&mut f.default, G3, 70, 70).unwrap();
    assert_eq!(withdrawal.distribution.groups, vec![G1, G2, G3]);
    assert_eq!(withdrawal.distribution.votes, vec![30, 30, 10]);
    assert_eq!(f.specific.stake(&G3), SpecificGroupStake { total: 30, overflow: 0 });
    assert_eq!(f.default.total_st_celo(), 0);

    f.specific.calculate_and_update_for_withdrawal(&mut f.default, G3, 30, 30).unwrap();
    assert!(f.specific.specific_groups().is_empty());
    assert_eq!(f.specific.total_st_celo(), 0);
}

// ============ Rebalancing ============

#[test]
fn test_health_change_moves_stake_both_ways() {
    let mut f = setup();
    let rate = ExchangeRate::new(100, 100);
    f.specific
        .generate_deposit_vote_distribution(&mut f.default, &f.health, &ExchangeRate::new(0, 0), G3, 100, 100, unlimited)
        .unwrap();

    f.chain.advance_epoch();
    f.health.update_group_health(G3, false, 2).unwrap();
    let moved = f
        .specific
        .rebalance_when_health_changed(&mut f.default, &f.health, &rate, G3, unlimited)
        .unwrap();
    assert_eq!(moved.direction, OverflowDirection::IntoOverflow);
    assert_eq!(moved.st_celo, 100);
    assert_eq!(moved.transfer.from.groups, vec![G3]);
    assert_eq!(moved.transfer.to.groups, vec![G1, G2]);
    assert_eq!(moved.transfer.to.votes, vec![50, 50]);
    assert_eq!(f.specific.stake(&G3).overflow, 100);
    assert_eq!(f.specific.expected_celo_for_group(&rate, &G3).unwrap(), 0);

    assert_eq!(
        f.specific.rebalance_when_health_changed(&mut f.default, &f.health, &rate, G3, unlimited),
        Err(StCeloError::NothingToRebalance { group: G3 })
    );

    f.chain.advance_epoch();
    f.health.update_group_health(G3, true, 3).unwrap();
    let back = f
        .specific
        .rebalance_when_health_changed(&mut f.default, &f.health, &rate, G3, capped(G3, 60))
        .unwrap();
    assert_eq!(back.direction, OverflowDirection::OutOfOverflow);
    assert_eq!(back.st_celo, 60);
    assert_eq!(back.transfer.from.votes, vec![30, 30]);
    assert_eq!(back.transfer.to.groups, vec![G3]);
    assert_eq!(back.transfer.to.votes, vec![60]);
    assert_eq!(f.specific.stake(&G3), SpecificGroupStake { total: 100, overflow: 40 });
    assert_eq!(f.default.total_st_celo(), 40);
}

#[test]
fn test_block_strategy_moves_direct_stake() {
    let mut f = setup();
    let rate = ExchangeRate::new(50, 50);
    f.specific
        .generate_deposit_vote_distribution(&mut f.default, &f.health, &ExchangeRate::new(0, 0), G3, 50, 50, unlimited)
        .unwrap();

    let moved = f.specific.block_strategy(&mut f.default, &rate, G3, unlimited).unwrap().unwrap();
    assert_eq!(moved.direction, OverflowDirection::IntoOverflow);
    assert_eq!(moved.transfer.from.total(), 50);
    assert_eq!(moved.transfer.to.total(), 50);
    assert!(!f.specific.is_allowed(&G3));
    assert_eq!(f.specific.stake(&G3), SpecificGroupStake { total: 50, overflow: 50 });

    assert_eq!(
        f.specific.block_strategy(&mut f.default, &rate, G3, unlimited),
        Err(StCeloError::StrategyNotAllowed { group: G3 })
    );
    assert_eq!(
        f.specific
            .generate_deposit_vote_distribution(&mut f.default, &f.health, &rate, G3, 10, 10, unlimited),
        Err(StCeloError::StrategyNotAllowed { group: G3 })
    );

    // Pinned stake stays withdrawable after blocking
    f.specific.calculate_and_update_for_withdrawal(&mut f.default, G3, 50, 50).unwrap();
    assert_eq!(f.default.total_st_celo(), 0);
}

#[test]
fn test_block_strategy_without_stake() {
    let mut f = setup();
    assert_eq!(f.specific.block_strategy(&mut f.default, &ExchangeRate::new(0, 0), G3, unlimited), Ok(None));
    assert!(!f.specific.is_allowed(&G3));
}

#[test]
fn test_rebalance_overflow_from_one_pooled_group() {
    let mut f = overflowed();
    let rate = ExchangeRate::new(100, 100);

    let moved = f
        .specific
        .rebalance_overflow(&mut f.default, &f.health, &rate, G3, G1, capped(G3, 20))
        .unwrap();
    assert_eq!(moved.st_celo, 20);
    assert_eq!(moved.transfer.from.groups, vec![G1]);
    assert_eq!(moved.transfer.to.votes, vec![20]);
    assert_eq!(f.default.st_celo_in_group(&G1), 10);
    assert_eq!(f.specific.stake(&G3).overflow, 40);
    assert_eq!(f.specific.total_overflow(), 40);

    assert_eq!(
        f.specific.rebalance_overflow(&mut f.default, &f.health, &rate, G3, G4, unlimited),
        Err(StCeloError::NothingToRebalance { group: G3 })
    );
    assert_eq!(
        f.specific.rebalance_overflow(&mut f.default, &f.health, &rate, G4, G1, unlimited),
        Err(StCeloError::GroupNotEligible { group: G4 })
    );
}
