//! Kani formal verification for the voucher stake yield math.
//!
//! ZERO dependencies. Pure Rust. CBMC-friendly.
//!
//! KEY DESIGN DECISION: Functions use u32 inputs / u64 intermediates.
//! The agent uses u64/u128, but the arithmetic properties (bounds,
//! monotonicity, no over-crediting) are scale-invariant.
//! u32 keeps SAT formulas tractable for CBMC.
//!
//! Run all:   cargo kani --lib
//! Run one:   cargo kani --harness proof_index_never_over_credits

// ═══════════════════════════════════════════════════════════════
// Yield / Index Math (u32/u64 mirror of src/math.rs)
// ═══════════════════════════════════════════════════════════════

/// Basis-point denominator.
pub const BPS: u64 = 10_000;

/// Reduced fixed-point scale for the reward index.
pub const SCALE: u64 = 1_000;

/// floor(staked * apy * secs / (year * BPS)). Zero input → zero.
pub fn calc_yield(staked: u32, apy_bps: u16, secs: u32, year: u32) -> Option<u32> {
    if staked == 0 || apy_bps == 0 || secs == 0 {
        return Some(0);
    }
    if year == 0 {
        return None;
    }
    let num = (staked as u64)
        .checked_mul(apy_bps as u64)?
        .checked_mul(secs as u64)?;
    let den = (year as u64).checked_mul(BPS)?;
    u32::try_from(num / den).ok()
}

/// yield * SCALE / total, rounded down. None without stake.
pub fn calc_index_delta(yield_amount: u32, total: u32) -> Option<u64> {
    if total == 0 {
        return None;
    }
    (yield_amount as u64).checked_mul(SCALE)?.checked_div(total as u64)
}

/// staked * (global - user) / SCALE. None when the snapshot is ahead.
pub fn calc_claimable(staked: u32, global: u64, user: u64) -> Option<u32> {
    let diff = global.checked_sub(user)?;
    let owed = (staked as u64).checked_mul(diff)? / SCALE;
    u32::try_from(owed).ok()
}

/// Remaining wait before the accrual interval has elapsed.
pub fn remaining_wait(elapsed: u32, interval: u32) -> u32 {
    interval.saturating_sub(elapsed)
}

// ═══════════════════════════════════════════════════════════════
// KANI PROOFS
// ═══════════════════════════════════════════════════════════════

#[cfg(kani)]
mod proofs {
    use super::*;

    // ── 1. Yield bounds ──

    /// Within one year at ≤100% APY, yield ≤ principal.
    #[kani::proof]
    fn proof_yield_bounded() {
        let staked: u32 = kani::any();
        let apy: u16 = kani::any();
        let secs: u32 = kani::any();
        let year: u32 = kani::any();
        kani::assume(year > 0 && year <= 400);
        kani::assume(secs <= year);
        kani::assume(apy <= 10_000);

        let y = calc_yield(staked, apy, secs, year).unwrap();
        assert!(y <= staked);
    }

    /// Zero inputs never produce yield.
    #[kani::proof]
    fn proof_zero_yield() {
        let staked: u32 = kani::any();
        let apy: u16 = kani::any();
        let year: u32 = kani::any();
        kani::assume(year > 0);
        assert_eq!(calc_yield(staked, apy, 0, year), Some(0));
        assert_eq!(calc_yield(0, apy, 1, year), Some(0));
        assert_eq!(calc_yield(staked, 0, 1, year), Some(0));
    }

    // ── 2. Monotonicity ──

    /// More elapsed time never yields less.
    #[kani::proof]
    fn proof_yield_monotone_time() {
        let staked: u32 = kani::any();
        let apy: u16 = kani::any();
        let t1: u32 = kani::any();
        let t2: u32 = kani::any();
        kani::assume(t1 <= t2 && t2 <= 400);
        kani::assume(staked < 1_000);

        let a = calc_yield(staked, apy, t1, 365).unwrap();
        let b = calc_yield(staked, apy, t2, 365).unwrap();
        assert!(a <= b);
    }

    /// More stake never yields less.
    #[kani::proof]
    fn proof_yield_monotone_stake() {
        let s1: u32 = kani::any();
        let s2: u32 = kani::any();
        let apy: u16 = kani::any();
        let secs: u32 = kani::any();
        kani::assume(s1 <= s2 && s2 < 1_000);
        kani::assume(secs <= 365);

        let a = calc_yield(s1, apy, secs, 365).unwrap();
        let b = calc_yield(s2, apy, secs, 365).unwrap();
        assert!(a <= b);
    }

    /// Two accruals over split intervals never beat one over the whole.
    #[kani::proof]
    fn proof_split_no_gain() {
        let staked: u32 = kani::any();
        let apy: u16 = kani::any();
        let a: u32 = kani::any();
        let b: u32 = kani::any();
        kani::assume(staked < 1_000);
        kani::assume(a <= 200 && b <= 200);

        let whole = calc_yield(staked, apy, a + b, 365).unwrap();
        let parts = calc_yield(staked, apy, a, 365).unwrap() + calc_yield(staked, apy, b, 365).unwrap();
        assert!(parts <= whole);
    }

    // ── 3. Reward index ──

    /// One staker's share of an accrual never exceeds the accrual.
    #[kani::proof]
    fn proof_index_never_over_credits() {
        let y: u32 = kani::any();
        let total: u32 = kani::any();
        let stake: u32 = kani::any();
        kani::assume(total > 0 && total < 100);
        kani::assume(stake <= total);
        kani::assume(y < 100);

        let delta = calc_index_delta(y, total).unwrap();
        let owed = calc_claimable(stake, delta, 0).unwrap();
        assert!(owed <= y);
    }

    /// Two stakers together never receive more than was distributed.
    #[kani::proof]
    fn proof_two_stakers_conserve() {
        let y: u32 = kani::any();
        let s1: u32 = kani::any();
        let s2: u32 = kani::any();
        kani::assume(s1 > 0 && s1 < 50);
        kani::assume(s2 > 0 && s2 < 50);
        kani::assume(y < 100);

        let delta = calc_index_delta(y, s1 + s2).unwrap();
        let a = calc_claimable(s1, delta, 0).unwrap();
        let b = calc_claimable(s2, delta, 0).unwrap();
        assert!(a + b <= y);
    }

    /// A settled position (snapshot == global) owes nothing.
    #[kani::proof]
    fn proof_settled_owes_zero() {
        let stake: u32 = kani::any();
        let idx: u64 = kani::any();
        kani::assume(idx < 1_000_000);
        assert_eq!(calc_claimable(stake, idx, idx), Some(0));
    }

    /// Snapshot ahead of the global index is an error, never a wraparound.
    #[kani::proof]
    fn proof_future_snapshot_rejected() {
        let stake: u32 = kani::any();
        let g: u64 = kani::any();
        let u: u64 = kani::any();
        kani::assume(u > g);
        assert!(calc_claimable(stake, g, u).is_none());
    }

    // ── 4. Scheduler wait ──

    /// elapsed + remaining == interval until the interval is reached.
    #[kani::proof]
    fn proof_remaining_wait() {
        let e: u32 = kani::any();
        let i: u32 = kani::any();
        let r = remaining_wait(e, i);
        if e < i {
            assert_eq!(e + r, i);
        } else {
            assert_eq!(r, 0);
        }
    }
}
