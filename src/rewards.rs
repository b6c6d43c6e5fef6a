//! Reward index engine.
//!
//! Mirrors what the ledger program does to `PoolState` / `UserStakeRecord` on
//! each instruction, so previews and the in-memory ledger price every change
//! against the index in effect immediately before it.
//!
//! Invariants:
//! - `pool.reward_index` never decreases.
//! - A user is settled before their `staked_amount` changes; after settling,
//!   `claimable == 0` and `user_reward_index == pool.reward_index`.

use crate::error::PoolError;
use crate::math;
use crate::state::{PoolState, UserStakeRecord};

/// Record `yield_amount` of pool-wide yield.
///
/// # Returns
/// The reward index increment applied.
///
/// # Errors
/// * `InvalidAmount` when `yield_amount == 0`
/// * `DivisionByZero` when nothing is staked
pub fn accrue(pool: &mut PoolState, yield_amount: u64, now: i64) -> Result<u128, PoolError> {
    if yield_amount == 0 {
        return Err(PoolError::InvalidAmount);
    }
    if pool.total_staked == 0 {
        return Err(PoolError::DivisionByZero);
    }
    let delta = math::calc_index_delta(yield_amount, pool.total_staked).ok_or(PoolError::Overflow)?;

    let reward_index = pool.reward_index.checked_add(delta).ok_or(PoolError::Overflow)?;
    let total_yield_earned = pool
        .total_yield_earned
        .checked_add(yield_amount)
        .ok_or(PoolError::Overflow)?;
    let total_sol_staked = pool
        .total_sol_staked
        .checked_add(yield_amount)
        .ok_or(PoolError::Overflow)?;

    pool.reward_index = reward_index;
    pool.total_yield_earned = total_yield_earned;
    pool.total_sol_staked = total_sol_staked;
    pool.last_yield_update = now;
    Ok(delta)
}

/// Yield owed to `user` that has not been settled yet.
pub fn claimable(pool: &PoolState, user: &UserStakeRecord) -> Result<u64, PoolError> {
    math::calc_claimable(user.staked_amount, pool.reward_index, user.user_reward_index)
        .ok_or(PoolError::Overflow)
}

/// Settle `user` against the current index: credit what is owed and move the
/// snapshot forward.
pub fn settle(pool: &PoolState, user: &mut UserStakeRecord) -> Result<u64, PoolError> {
    let owed = claimable(pool, user)?;
    user.total_yield_claimed = user
        .total_yield_claimed
        .checked_add(owed)
        .ok_or(PoolError::Overflow)?;
    user.user_reward_index = pool.reward_index;
    Ok(owed)
}

/// Apply a deposit of `amount` to `user` (settling first).
///
/// A record at zero principal (new, or fully redeemed earlier) re-enters at
/// the current index: no retroactive yield.
///
/// # Returns
/// Yield settled by this deposit.
pub fn apply_deposit(
    pool: &mut PoolState,
    user: &mut UserStakeRecord,
    amount: u64,
    now: i64,
) -> Result<u64, PoolError> {
    if !pool.config.deposits_enabled {
        return Err(PoolError::DepositsDisabled);
    }
    if amount == 0 || amount < pool.config.min_stake_amount {
        return Err(PoolError::InvalidAmount);
    }
    let new_user_total = user.staked_amount.checked_add(amount).ok_or(PoolError::Overflow)?;
    if new_user_total > pool.config.max_stake_per_user {
        return Err(PoolError::ExceedsMaxStake);
    }
    let new_pool_total = pool.total_staked.checked_add(amount).ok_or(PoolError::Overflow)?;

    let entering = !user.is_active();
    let settled = settle(pool, user)?;

    if entering {
        pool.total_stakers = pool.total_stakers.checked_add(1).ok_or(PoolError::Overflow)?;
        if user.staked_at == 0 {
            user.staked_at = now;
        }
    }
    user.staked_amount = new_user_total;
    user.last_action_at = now;
    pool.total_staked = new_pool_total;
    Ok(settled)
}

/// Apply a redemption of `amount` principal (settling first).
///
/// The record is kept at zero principal after a full redemption.
///
/// # Returns
/// Yield settled by this redemption.
pub fn apply_redeem(
    pool: &mut PoolState,
    user: &mut UserStakeRecord,
    amount: u64,
    now: i64,
) -> Result<u64, PoolError> {
    if !pool.config.withdrawals_enabled {
        return Err(PoolError::WithdrawalsDisabled);
    }
    if amount == 0 {
        return Err(PoolError::InvalidAmount);
    }
    if amount > user.staked_amount {
        return Err(PoolError::InsufficientBalance);
    }
    let new_pool_total = pool.total_staked.checked_sub(amount).ok_or(PoolError::Overflow)?;

    let settled = settle(pool, user)?;
    user.staked_amount -= amount;
    user.last_action_at = now;
    pool.total_staked = new_pool_total;

    if !user.is_active() {
        pool.total_stakers = pool.total_stakers.checked_sub(1).ok_or(PoolError::Overflow)?;
    }
    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::REWARD_INDEX_SCALE;
    use crate::state::PoolConfig;

    const TOKEN: u64 = 1_000_000_000;

    fn pool() -> PoolState {
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

    #[test]
    fn test_accrue_rejects_zero_yield() {
        let mut p = pool();
        p.total_staked = 100;
        assert_eq!(accrue(&mut p, 0, 1), Err(PoolError::InvalidAmount));
    }

    #[test]
    fn test_accrue_rejects_empty_pool() {
        let mut p = pool();
        assert_eq!(accrue(&mut p, 10, 1), Err(PoolError::DivisionByZero));
        assert_eq!(p.reward_index, 0);
        assert_eq!(p.total_yield_earned, 0);
        assert_eq!(p.last_yield_update, 0);
    }

    #[test]
    fn test_accrue_updates_totals() {
        let mut p = pool();
        p.total_staked = 50 * TOKEN;
        let delta = accrue(&mut p, 100 * TOKEN, 1_000).unwrap();
        assert_eq!(delta, 2 * REWARD_INDEX_SCALE);
        assert_eq!(p.reward_index, 2 * REWARD_INDEX_SCALE);
        assert_eq!(p.total_yield_earned, 100 * TOKEN);
        assert_eq!(p.last_yield_update, 1_000);
    }

    #[test]
    fn test_settle_zeroes_claimable() {
        let mut p = pool();
        p.reward_index = 2 * REWARD_INDEX_SCALE;
        let mut u = UserStakeRecord { staked_amount: 50 * TOKEN, ..UserStakeRecord::default() };
        assert_eq!(claimable(&p, &u), Ok(100 * TOKEN));
        assert_eq!(settle(&p, &mut u), Ok(100 * TOKEN));
        assert_eq!(claimable(&p, &u), Ok(0));
        assert_eq!(u.total_yield_claimed, 100 * TOKEN);
    }

    #[test]
    fn test_top_up_settles_before_growing() {
        let mut p = pool();
        let mut u = UserStakeRecord::default();
        apply_deposit(&mut p, &mut u, 10, 1).unwrap();
        accrue(&mut p, 10, 2).unwrap();
        // Second deposit is priced at the new index, old principal gets its 10
        let settled = apply_deposit(&mut p, &mut u, 90, 3).unwrap();
        assert_eq!(settled, 10);
        assert_eq!(u.user_reward_index, p.reward_index);
        assert_eq!(claimable(&p, &u), Ok(0));
        assert_eq!(p.total_stakers, 1);
        assert_eq!(u.staked_at, 1);
        assert_eq!(u.last_action_at, 3);
    }

    #[test]
    fn test_deposit_guards() {
        let mut p = pool();
        let mut u = UserStakeRecord::default();
        p.config.min_stake_amount = 10;
        assert_eq!(apply_deposit(&mut p, &mut u, 9, 1), Err(PoolError::InvalidAmount));
        p.config.max_stake_per_user = 20;
        assert_eq!(apply_deposit(&mut p, &mut u, 21, 1), Err(PoolError::ExceedsMaxStake));
        p.config.deposits_enabled = false;
        assert_eq!(apply_deposit(&mut p, &mut u, 15, 1), Err(PoolError::DepositsDisabled));
        assert_eq!(u, UserStakeRecord::default());
    }

    #[test]
    fn test_redeem_guards() {
        let mut p = pool();
        let mut u = UserStakeRecord::default();
        apply_deposit(&mut p, &mut u, 10, 1).unwrap();
        assert_eq!(apply_redeem(&mut p, &mut u, 0, 2), Err(PoolError::InvalidAmount));
        assert_eq!(apply_redeem(&mut p, &mut u, 11, 2), Err(PoolError::InsufficientBalance));
        p.config.withdrawals_enabled = false;
        assert_eq!(apply_redeem(&mut p, &mut u, 5, 2), Err(PoolError::WithdrawalsDisabled));
        assert_eq!(u.staked_amount, 10);
    }

    #[test]
    fn test_full_redeem_keeps_record_and_decrements_stakers() {
        let mut p = pool();
        let mut u = UserStakeRecord::default();
        apply_deposit(&mut p, &mut u, 100, 1).unwrap();
        accrue(&mut p, 50, 2).unwrap();
        let settled = apply_redeem(&mut p, &mut u, 100, 3).unwrap();
        assert_eq!(settled, 50);
        assert_eq!(u.staked_amount, 0);
        assert_eq!(u.total_yield_claimed, 50);
        assert_eq!(p.total_stakers, 0);
        assert_eq!(p.total_staked, 0);
    }
}
