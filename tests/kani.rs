//! Kani formal verification proofs for the yield and reward-index math.
//!
//! Proves safety properties on the PURE MATH layer the agent relies on
//! before it submits anything:
//! 1. Yield bounds: never more than principal inside one year
//! 2. Monotonicity: more time or more stake never yields less
//! 3. Index safety: distributing yield never over-credits stakers
//! 4. Arithmetic safety: no panic at any valid input
//!
//! Run all:  cargo kani --tests
//! Run one:  cargo kani --harness <name>

#[cfg(kani)]
mod kani_proofs {
    use voucher_stake_agent::math::{
        calc_claimable, calc_index_delta, calc_yield, calc_yield_for_year, elapsed_seconds,
        remaining_wait, SECONDS_PER_CALENDAR_YEAR, SECONDS_PER_YEAR,
    };

    // ═══════════════════════════════════════════════════════════
    // 1. Yield Bounds
    // ═══════════════════════════════════════════════════════════

    /// PROOF: Within one year at ≤100% APY, yield never exceeds principal.
    #[kani::proof]
    fn proof_yield_bounded_by_principal() {
        let staked: u64 = kani::any();
        let apy: u16 = kani::any();
        let secs: u64 = kani::any();
        kani::assume(staked <= 1_000_000_000_000);
        kani::assume(apy <= 10_000);
        kani::assume(secs <= SECONDS_PER_YEAR);

        if let Some(y) = calc_yield(staked, apy, secs) {
            assert!(y <= staked);
        }
    }

    /// PROOF: Any zero input yields exactly zero.
    #[kani::proof]
    fn proof_zero_input_zero_yield() {
        let staked: u64 = kani::any();
        let apy: u16 = kani::any();
        let secs: u64 = kani::any();
        kani::assume(staked == 0 || apy == 0 || secs == 0);

        assert_eq!(calc_yield(staked, apy, secs), Some(0));
    }

    // ═══════════════════════════════════════════════════════════
    // 2. Monotonicity
    // ═══════════════════════════════════════════════════════════

    /// PROOF: Waiting longer never yields less.
    #[kani::proof]
    fn proof_yield_monotone_in_time() {
        let staked: u64 = kani::any();
        let apy: u16 = kani::any();
        let t1: u64 = kani::any();
        let t2: u64 = kani::any();
        kani::assume(staked <= 1_000_000_000);
        kani::assume(t1 <= t2 && t2 <= SECONDS_PER_YEAR);

        let y1 = calc_yield(staked, apy, t1).unwrap();
        let y2 = calc_yield(staked, apy, t2).unwrap();
        assert!(y1 <= y2);
    }

    /// PROOF: Splitting an interval never earns more than the whole.
    #[kani::proof]
    fn proof_split_interval_no_gain() {
        let staked: u64 = kani::any();
        let apy: u16 = kani::any();
        let a: u64 = kani::any();
        let b: u64 = kani::any();
        kani::assume(staked <= 1_000_000_000);
        kani::assume(a <= SECONDS_PER_YEAR && b <= SECONDS_PER_YEAR);

        let whole = calc_yield(staked, apy, a + b).unwrap();
        let parts = calc_yield(staked, apy, a).unwrap() + calc_yield(staked, apy, b).unwrap();
        assert!(parts <= whole);
    }

    /// PROOF: The shorter calendar year never yields less than the Julian year.
    #[kani::proof]
    fn proof_calendar_at_least_julian() {
        let staked: u64 = kani::any();
        let apy: u16 = kani::any();
        let secs: u64 = kani::any();
        kani::assume(staked <= 1_000_000_000);
        kani::assume(secs <= SECONDS_PER_YEAR);

        let julian = calc_yield_for_year(staked, apy, secs, SECONDS_PER_YEAR).unwrap();
        let calendar = calc_yield_for_year(staked, apy, secs, SECONDS_PER_CALENDAR_YEAR).unwrap();
        assert!(julian <= calendar);
    }

    // ═══════════════════════════════════════════════════════════
    // 3. Index Safety
    // ═══════════════════════════════════════════════════════════

    /// PROOF: A staker's share of an accrual never exceeds the accrual.
    #[kani::proof]
    fn proof_claimable_bounded_by_yield() {
        let yield_amount: u64 = kani::any();
        let total: u64 = kani::any();
        let stake: u64 = kani::any();
        let base: u128 = kani::any();
        kani::assume(total > 0 && total <= 1_000_000_000);
        kani::assume(stake <= total);
        kani::assume(yield_amount <= 1_000_000_000);
        kani::assume(base <= 1_000_000_000_000_000);

        let delta = calc_index_delta(yield_amount, total).unwrap();
        let owed = calc_claimable(stake, base + delta, base).unwrap();
        assert!(owed <= yield_amount);
    }

    /// PROOF: No stake means no index movement.
    #[kani::proof]
    fn proof_index_delta_requires_stake() {
        let yield_amount: u64 = kani::any();
        assert!(calc_index_delta(yield_amount, 0).is_none());
    }

    /// PROOF: A stale snapshot ahead of the global index is rejected, not wrapped.
    #[kani::proof]
    fn proof_claimable_rejects_future_snapshot() {
        let stake: u64 = kani::any();
        let global: u128 = kani::any();
        let user: u128 = kani::any();
        kani::assume(user > global);

        assert!(calc_claimable(stake, global, user).is_none());
    }

    // ═══════════════════════════════════════════════════════════
    // 4. Clock Arithmetic
    // ═══════════════════════════════════════════════════════════

    /// PROOF: Elapsed time never panics and clamps when the ledger runs ahead.
    #[kani::proof]
    fn proof_elapsed_no_panic() {
        let now: i64 = kani::any();
        let last: i64 = kani::any();
        let e = elapsed_seconds(now, last);
        if now <= last {
            assert_eq!(e, 0);
        }
    }

    /// PROOF: Elapsed plus remaining covers the interval until it is reached.
    #[kani::proof]
    fn proof_remaining_wait_complements_elapsed() {
        let elapsed: u64 = kani::any();
        let interval: u64 = kani::any();
        let rem = remaining_wait(elapsed, interval);
        if elapsed < interval {
            assert_eq!(elapsed + rem, interval);
        } else {
            assert_eq!(rem, 0);
        }
    }
}
