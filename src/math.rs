//! Pure yield and reward-index math, extracted for Kani formal verification.
//!
//! No Solana/Pubkey dependencies. Just integer arithmetic, so the off-chain
//! preview matches the on-chain computation bit-for-bit.

/// 365.25 days.
pub const SECONDS_PER_YEAR: u64 = 31_557_600;

/// 365 days.
pub const SECONDS_PER_CALENDAR_YEAR: u64 = 31_536_000;

/// 10_000 bps = 100%.
pub const BASIS_POINTS_DENOMINATOR: u64 = 10_000;

/// Fixed-point scale of the pool reward index (the deployed program's precision).
pub const REWARD_INDEX_SCALE: u128 = 1_000_000_000_000;

/// Year length used to annualize the configured rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearBasis {
    /// 365.25 days
    #[default]
    Julian,
    /// 365 days
    Calendar,
}

impl YearBasis {
    pub fn seconds(self) -> u64 {
        match self {
            YearBasis::Julian => SECONDS_PER_YEAR,
            YearBasis::Calendar => SECONDS_PER_CALENDAR_YEAR,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "julian" | "365.25" => Some(YearBasis::Julian),
            "calendar" | "365" => Some(YearBasis::Calendar),
            _ => None,
        }
    }
}

/// Yield accrued on `staked_amount` at `apy_basis_points` over `seconds_elapsed`.
///
/// `floor(staked * apy_bps * seconds / (SECONDS_PER_YEAR * 10_000))`
///
/// # Returns
/// * `Some(0)` if any input is zero: nothing to submit, not an error
/// * `Some(yield)` rounded down
/// * `None` on overflow
pub fn calc_yield(staked_amount: u64, apy_basis_points: u16, seconds_elapsed: u64) -> Option<u64> {
    calc_yield_for_year(staked_amount, apy_basis_points, seconds_elapsed, SECONDS_PER_YEAR)
}

/// Same as [`calc_yield`] with an explicit year length.
pub fn calc_yield_for_year(
    staked_amount: u64,
    apy_basis_points: u16,
    seconds_elapsed: u64,
    seconds_per_year: u64,
) -> Option<u64> {
    if staked_amount == 0 || apy_basis_points == 0 || seconds_elapsed == 0 {
        return Some(0);
    }
    if seconds_per_year == 0 {
        return None;
    }
    let numerator = (staked_amount as u128)
        .checked_mul(apy_basis_points as u128)?
        .checked_mul(seconds_elapsed as u128)?;
    let denominator = (seconds_per_year as u128).checked_mul(BASIS_POINTS_DENOMINATOR as u128)?;
    u64::try_from(numerator / denominator).ok()
}

/// Seconds since `last`, clamped at zero when the ledger clock is ahead of ours.
pub fn elapsed_seconds(now: i64, last: i64) -> u64 {
    let elapsed = now.saturating_sub(last);
    if elapsed <= 0 {
        0
    } else {
        elapsed as u64
    }
}

/// Seconds left until `interval` has fully elapsed.
pub fn remaining_wait(elapsed: u64, interval: u64) -> u64 {
    interval.saturating_sub(elapsed)
}

/// Reward index increment for distributing `yield_amount` over `total_staked`.
///
/// # Returns
/// * `Some(delta)` = `yield * SCALE / total_staked` (rounds DOWN, pool-favoring)
/// * `None` if `total_staked == 0` or on overflow
pub fn calc_index_delta(yield_amount: u64, total_staked: u64) -> Option<u128> {
    if total_staked == 0 {
        return None;
    }
    (yield_amount as u128)
        .checked_mul(REWARD_INDEX_SCALE)?
        .checked_div(total_staked as u128)
}

/// Yield owed to a position since its last snapshot.
///
/// `staked * (global_index - user_index) / SCALE`
///
/// # Returns
/// * `None` if `user_index > global_index` (corrupted snapshot) or on overflow
pub fn calc_claimable(staked_amount: u64, global_index: u128, user_index: u128) -> Option<u64> {
    calc_claimable_scaled(staked_amount, global_index, user_index, REWARD_INDEX_SCALE)
}

/// [`calc_claimable`] against an arbitrary fixed-point scale.
pub fn calc_claimable_scaled(
    staked_amount: u64,
    global_index: u128,
    user_index: u128,
    scale: u128,
) -> Option<u64> {
    let diff = global_index.checked_sub(user_index)?;
    let owed = (staked_amount as u128).checked_mul(diff)?.checked_div(scale)?;
    u64::try_from(owed).ok()
}


// ═══════════════════════════════════════════════════════════════
// Kani Formal Verification
// ═══════════════════════════════════════════════════════════════
//
// Production-type (u64/u128) proofs live in tests/kani.rs; CBMC-friendly
// u32/u64 mirrors live in kani-proofs/src/lib.rs.
