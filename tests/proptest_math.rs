//! Property-based tests (proptest) for yield and reward-index math.
//!
//! Production-scale u64 inputs; complements the bounded Kani proofs.

use proptest::prelude::*;
use voucher_stake_agent::math::{
    calc_claimable, calc_index_delta, calc_yield, calc_yield_for_year, SECONDS_PER_CALENDAR_YEAR,
    SECONDS_PER_YEAR,
};
use voucher_stake_agent::rewards;
use voucher_stake_agent::state::{PoolConfig, PoolState, UserStakeRecord};

fn open_pool() -> PoolState {
    PoolState {
        config: PoolConfig {
            min_stake_amount: 1,
            max_stake_per_user: u64::MAX,
            deposits_enabled: true,
            withdrawals_enabled: true,
            apy_basis_points: 1200,
        },
        ..PoolState::default()
    }
}

proptest! {
    // ── Yield calculator ──

    #[test]
    fn prop_yield_zero_inputs(
        staked in any::<u64>(),
        apy in any::<u16>(),
        secs in any::<u64>(),
    ) {
        prop_assert_eq!(calc_yield(0, apy, secs), Some(0));
        prop_assert_eq!(calc_yield(staked, 0, secs), Some(0));
        prop_assert_eq!(calc_yield(staked, apy, 0), Some(0));
    }

    #[test]
    fn prop_yield_never_exceeds_principal_within_a_year(
        staked in 0u64..=u64::MAX / 2,
        apy in 0u16..=10_000,
        secs in 0u64..=SECONDS_PER_YEAR,
    ) {
        let y = calc_yield(staked, apy, secs).unwrap();
        prop_assert!(y <= staked);
    }

    #[test]
    fn prop_yield_monotone_in_time(
        staked in 0u64..1_000_000_000_000_000,
        apy in 0u16..=10_000,
        a in 0u64..SECONDS_PER_YEAR,
        b in 0u64..SECONDS_PER_YEAR,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(calc_yield(staked, apy, lo).unwrap() <= calc_yield(staked, apy, hi).unwrap());
    }

    #[test]
    fn prop_yield_split_never_beats_whole(
        staked in 0u64..1_000_000_000_000_000,
        apy in 0u16..=10_000,
        a in 0u64..SECONDS_PER_YEAR,
        b in 0u64..SECONDS_PER_YEAR,
    ) {
        // Accruing in two ticks can lose rounding dust, never gain
        let split = calc_yield(staked, apy, a).unwrap() + calc_yield(staked, apy, b).unwrap();
        prop_assert!(split <= calc_yield(staked, apy, a + b).unwrap());
    }

    #[test]
    fn prop_calendar_year_yields_at_least_julian(
        staked in 0u64..1_000_000_000_000_000,
        apy in 0u16..=10_000,
        secs in 0u64..SECONDS_PER_YEAR,
    ) {
        let julian = calc_yield_for_year(staked, apy, secs, SECONDS_PER_YEAR).unwrap();
        let calendar = calc_yield_for_year(staked, apy, secs, SECONDS_PER_CALENDAR_YEAR).unwrap();
        prop_assert!(calendar >= julian);
    }

    // ── Reward index ──

    #[test]
    fn prop_index_non_decreasing(
        total in 1u64..1_000_000_000_000_000,
        yields in proptest::collection::vec(1u64..1_000_000_000_000, 1..20),
    ) {
        let mut pool = open_pool();
        pool.total_staked = total;
        let mut last = pool.reward_index;
        for (t, y) in yields.into_iter().enumerate() {
            rewards::accrue(&mut pool, y, t as i64).unwrap();
            prop_assert!(pool.reward_index >= last);
            last = pool.reward_index;
        }
    }

    #[test]
    fn prop_sole_staker_never_over_credited(
        staked in 1u64..1_000_000_000_000_000,
        y in 1u64..1_000_000_000_000,
    ) {
        let delta = calc_index_delta(y, staked).unwrap();
        let owed = calc_claimable(staked, delta, 0).unwrap();
        prop_assert!(owed <= y);
    }

    #[test]
    fn prop_settle_zeroes_claimable(
        staked in 1u64..1_000_000_000_000,
        index in 0u128..1_000_000_000_000_000_000,
        user_index_frac in 0u32..=100,
    ) {
        let mut pool = open_pool();
        pool.reward_index = index;
        let mut user = UserStakeRecord {
            staked_amount: staked,
            user_reward_index: index * user_index_frac as u128 / 100,
            ..UserStakeRecord::default()
        };
        rewards::settle(&pool, &mut user).unwrap();
        prop_assert_eq!(rewards::claimable(&pool, &user), Ok(0));
        prop_assert_eq!(user.user_reward_index, pool.reward_index);
    }

    #[test]
    fn prop_users_share_never_exceeds_recorded_yield(
        a in 1u64..1_000_000_000_000,
        b in 1u64..1_000_000_000_000,
        y in 1u64..1_000_000_000_000,
    ) {
        let mut pool = open_pool();
        let mut ua = UserStakeRecord::default();
        let mut ub = UserStakeRecord::default();
        rewards::apply_deposit(&mut pool, &mut ua, a, 1).unwrap();
        rewards::apply_deposit(&mut pool, &mut ub, b, 1).unwrap();
        rewards::accrue(&mut pool, y, 2).unwrap();
        let owed = rewards::claimable(&pool, &ua).unwrap() + rewards::claimable(&pool, &ub).unwrap();
        prop_assert!(owed <= y);
    }

    #[test]
    fn prop_redeposit_gets_no_retroactive_yield(
        first in 1u64..1_000_000_000_000,
        second in 1u64..1_000_000_000_000,
        y1 in 1u64..1_000_000_000_000,
        y2 in 1u64..1_000_000_000_000,
    ) {
        let mut pool = open_pool();
        let mut other = UserStakeRecord::default();
        let mut user = UserStakeRecord::default();
        rewards::apply_deposit(&mut pool, &mut other, 1_000, 0).unwrap();
        rewards::apply_deposit(&mut pool, &mut user, first, 1).unwrap();
        rewards::accrue(&mut pool, y1, 2).unwrap();
        rewards::apply_redeem(&mut pool, &mut user, first, 3).unwrap();
        let claimed = user.total_yield_claimed;
        rewards::accrue(&mut pool, y2, 4).unwrap();
        rewards::apply_deposit(&mut pool, &mut user, second, 5).unwrap();
        prop_assert_eq!(user.user_reward_index, pool.reward_index);
        prop_assert_eq!(user.total_yield_claimed, claimed);
    }
}
