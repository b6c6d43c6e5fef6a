//! Accrual Scheduler.
//!
//! Two states: `Idle` between checks, `Submitting` while a `recordYield`
//! transaction is in flight. The skip-vs-submit decision is a pure function of
//! the pool snapshot and the current time (`AccrualPolicy::decide`), so it is
//! testable without a timer or a ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use solana_sdk::signature::Signature;

use crate::clock::Clock;
use crate::error::AgentError;
use crate::ledger::{self, Ledger};
use crate::math::{self, YearBasis};
use crate::program::PoolProgram;
use crate::state::PoolState;

pub const SECONDS_PER_HOUR: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Submitting,
}

/// Shared view of a scheduler's state, readable from other threads.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStateHandle(Arc<AtomicBool>);

impl SchedulerStateHandle {
    pub fn get(&self) -> SchedulerState {
        if self.0.load(Ordering::SeqCst) {
            SchedulerState::Submitting
        } else {
            SchedulerState::Idle
        }
    }

    fn set(&self, state: SchedulerState) {
        self.0.store(state == SchedulerState::Submitting, Ordering::SeqCst);
    }
}

/// Why a check did not submit. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NotEnoughTime { elapsed_secs: u64, remaining_secs: u64 },
    NoStake,
    ZeroYield,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotEnoughTime { .. } => "not_enough_time",
            SkipReason::NoStake => "no_stake",
            SkipReason::ZeroYield => "zero_yield",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualDecision {
    Skip(SkipReason),
    Submit { amount: u64, elapsed_secs: u64 },
}

/// What an accrual check would do right now, for the preview endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualPreview {
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub apy_basis_points: u16,
    /// Yield for the elapsed time, regardless of the interval
    pub projected_yield: u64,
    pub needs_update: bool,
}

/// Parameters of the accrual decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualPolicy {
    /// Minimum seconds between accruals
    pub interval_secs: u64,
    /// Rate to accrue at instead of the pool's configured one
    pub apy_override: Option<u16>,
    pub year_basis: YearBasis,
}

impl Default for AccrualPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 6 * SECONDS_PER_HOUR,
            apy_override: None,
            year_basis: YearBasis::default(),
        }
    }
}

impl AccrualPolicy {
    pub fn projected_yield(&self, pool: &PoolState, elapsed_secs: u64) -> Result<u64, AgentError> {
        math::calc_yield_for_year(
            pool.total_staked,
            pool.effective_apy(self.apy_override),
            elapsed_secs,
            self.year_basis.seconds(),
        )
        .ok_or(AgentError::Overflow)
    }

    /// Interval first (unless `force`), then stake, then yield.
    pub fn decide(&self, pool: &PoolState, now: i64, force: bool) -> Result<AccrualDecision, AgentError> {
        let elapsed_secs = pool.seconds_since_last_accrual(now);
        if !force && elapsed_secs < self.interval_secs {
            return Ok(AccrualDecision::Skip(SkipReason::NotEnoughTime {
                elapsed_secs,
                remaining_secs: math::remaining_wait(elapsed_secs, self.interval_secs),
            }));
        }
        if pool.total_staked == 0 {
            return Ok(AccrualDecision::Skip(SkipReason::NoStake));
        }
        let amount = self.projected_yield(pool, elapsed_secs)?;
        if amount == 0 {
            return Ok(AccrualDecision::Skip(SkipReason::ZeroYield));
        }
        Ok(AccrualDecision::Submit { amount, elapsed_secs })
    }

    pub fn preview(&self, pool: &PoolState, now: i64) -> Result<AccrualPreview, AgentError> {
        let elapsed_secs = pool.seconds_since_last_accrual(now);
        let projected_yield = self.projected_yield(pool, elapsed_secs)?;
        Ok(AccrualPreview {
            elapsed_secs,
            remaining_secs: math::remaining_wait(elapsed_secs, self.interval_secs),
            apy_basis_points: pool.effective_apy(self.apy_override),
            projected_yield,
            needs_update: matches!(self.decide(pool, now, false)?, AccrualDecision::Submit { .. }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccrualOutcome {
    Submitted {
        amount: u64,
        #[serde(serialize_with = "as_display")]
        signature: Signature,
    },
    Skipped(SkipReason),
}

fn as_display<S: Serializer>(signature: &Signature, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(signature)
}

/// Read the pool and decide, without submitting.
pub fn plan_accrual<L: Ledger + ?Sized, C: Clock + ?Sized>(
    ledger: &L,
    clock: &C,
    program: &PoolProgram,
    policy: &AccrualPolicy,
    force: bool,
) -> Result<AccrualDecision, AgentError> {
    let pool = ledger::fetch_pool_state(ledger, &program.pool_state)?;
    let now = clock.unix_timestamp();
    let decision = policy.decide(&pool, now, force)?;
    match decision {
        AccrualDecision::Skip(SkipReason::NotEnoughTime { elapsed_secs, remaining_secs }) => info!(
            "Accrual skipped: not enough time elapsed_secs={} remaining_secs={}",
            elapsed_secs, remaining_secs
        ),
        AccrualDecision::Skip(SkipReason::NoStake) => info!("Accrual skipped: no stake in pool"),
        AccrualDecision::Skip(SkipReason::ZeroYield) => info!("Accrual skipped: computed yield is zero"),
        AccrualDecision::Submit { amount, elapsed_secs } => debug!(
            "Submitting accrual: amount={} elapsed_secs={} total_staked={}",
            amount, elapsed_secs, pool.total_staked
        ),
    }
    Ok(decision)
}

/// Submit `recordYield(amount)` signed by the operator.
pub fn submit_accrual<L: Ledger + ?Sized>(
    ledger: &L,
    program: &PoolProgram,
    amount: u64,
) -> Result<AccrualOutcome, AgentError> {
    let ix = program.record_yield(&ledger.operator(), amount);
    let signature = ledger.submit(&[ix])?;
    info!("Yield recorded: amount={} signature={}", amount, signature);
    Ok(AccrualOutcome::Submitted { amount, signature })
}

/// One check-and-maybe-submit cycle against fresh ledger state.
pub fn attempt_accrual<L: Ledger + ?Sized, C: Clock + ?Sized>(
    ledger: &L,
    clock: &C,
    program: &PoolProgram,
    policy: &AccrualPolicy,
    force: bool,
) -> Result<AccrualOutcome, AgentError> {
    match plan_accrual(ledger, clock, program, policy, force)? {
        AccrualDecision::Skip(reason) => Ok(AccrualOutcome::Skipped(reason)),
        AccrualDecision::Submit { amount, .. } => submit_accrual(ledger, program, amount),
    }
}

/// Recurring accrual process.
///
/// Failures are logged and retried on the next tick, never immediately.
pub struct AccrualScheduler<L: Ledger, C: Clock> {
    ledger: L,
    clock: C,
    program: PoolProgram,
    policy: AccrualPolicy,
    poll_interval: Duration,
    state: SchedulerStateHandle,
}

impl<L: Ledger, C: Clock> AccrualScheduler<L, C> {
    pub fn new(ledger: L, clock: C, program: PoolProgram, policy: AccrualPolicy, poll_interval: Duration) -> Self {
        Self {
            ledger,
            clock,
            program,
            policy,
            poll_interval,
            state: SchedulerStateHandle::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.get()
    }

    pub fn state_handle(&self) -> SchedulerStateHandle {
        self.state.clone()
    }

    pub fn policy(&self) -> &AccrualPolicy {
        &self.policy
    }

    /// Exactly one cycle. `Submitting` only while `recordYield` is in flight,
    /// back to `Idle` whatever the result.
    pub fn run_once(&mut self, force: bool) -> Result<AccrualOutcome, AgentError> {
        match plan_accrual(&self.ledger, &self.clock, &self.program, &self.policy, force)? {
            AccrualDecision::Skip(reason) => Ok(AccrualOutcome::Skipped(reason)),
            AccrualDecision::Submit { amount, .. } => {
                self.state.set(SchedulerState::Submitting);
                let result = submit_accrual(&self.ledger, &self.program, amount);
                self.state.set(SchedulerState::Idle);
                result
            }
        }
    }

    /// One cycle with log-and-continue error handling.
    pub fn tick(&mut self) -> Option<AccrualOutcome> {
        match self.run_once(false) {
            Ok(outcome) => Some(outcome),
            Err(e) if e.is_outcome_unknown() => {
                warn!("Accrual outcome unknown, state re-read next tick: {}", e);
                None
            }
            Err(e) if e.is_transient() => {
                warn!("Accrual attempt failed, retrying next tick: {}", e);
                None
            }
            Err(e) => {
                warn!("Accrual attempt rejected: {}", e);
                None
            }
        }
    }

    /// Tick every `poll_interval` until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            "Accrual scheduler started: pool={} interval_secs={} poll_secs={}",
            self.program.pool_state,
            self.policy.interval_secs,
            self.poll_interval.as_secs()
        );
        while !stop.load(Ordering::Relaxed) {
            self.tick();
            sleep_until_stopped(self.poll_interval, stop);
        }
        info!("Accrual scheduler stopped");
    }
}

/// Sleep for `total`, waking early if `stop` is set.
pub(crate) fn sleep_until_stopped(total: Duration, stop: &AtomicBool) {
    let step = Duration::from_millis(200);
    let mut slept = Duration::ZERO;
    while slept < total && !stop.load(Ordering::Relaxed) {
        let chunk = step.min(total - slept);
        thread::sleep(chunk);
        slept += chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PoolConfig;

    const TOKEN: u64 = 1_000_000_000;

    fn pool(total_staked: u64, last: i64) -> PoolState {
        PoolState {
            config: PoolConfig { apy_basis_points: 1200, ..PoolConfig::default() },
            total_staked,
            last_yield_update: last,
            ..PoolState::default()
        }
    }

    fn calendar() -> AccrualPolicy {
        AccrualPolicy { year_basis: YearBasis::Calendar, ..AccrualPolicy::default() }
    }

    #[test]
    fn test_decide_submits_six_hour_yield() {
        let d = calendar().decide(&pool(10_000 * TOKEN, 0), 21_600, false).unwrap();
        assert_eq!(d, AccrualDecision::Submit { amount: 821_917_808, elapsed_secs: 21_600 });
    }

    #[test]
    fn test_decide_interval_checked_before_stake() {
        let d = calendar().decide(&pool(0, 1_000), 1_100, false).unwrap();
        assert_eq!(
            d,
            AccrualDecision::Skip(SkipReason::NotEnoughTime { elapsed_secs: 100, remaining_secs: 21_500 })
        );
    }

    #[test]
    fn test_decide_force_bypasses_interval_only() {
        let p = calendar();
        assert_eq!(p.decide(&pool(0, 1_000), 1_100, true).unwrap(), AccrualDecision::Skip(SkipReason::NoStake));
        // 1 unit staked for 100s yields nothing
        assert_eq!(p.decide(&pool(1, 1_000), 1_100, true).unwrap(), AccrualDecision::Skip(SkipReason::ZeroYield));
    }

    #[test]
    fn test_apy_override() {
        let p = AccrualPolicy { apy_override: Some(0), ..calendar() };
        assert_eq!(
            p.decide(&pool(10_000 * TOKEN, 0), 21_600, false).unwrap(),
            AccrualDecision::Skip(SkipReason::ZeroYield)
        );
    }

    #[test]
    fn test_clock_behind_ledger_waits_full_interval() {
        let d = calendar().decide(&pool(10 * TOKEN, 5_000), 4_000, false).unwrap();
        assert_eq!(
            d,
            AccrualDecision::Skip(SkipReason::NotEnoughTime { elapsed_secs: 0, remaining_secs: 21_600 })
        );
    }

    #[test]
    fn test_outcome_json() {
        let submitted = AccrualOutcome::Submitted { amount: 7, signature: Signature::default() };
        let v = serde_json::to_value(submitted).unwrap();
        assert_eq!(v["status"], "submitted");
        assert_eq!(v["amount"], 7);
        assert_eq!(v["signature"], Signature::default().to_string());

        let skipped = serde_json::to_value(AccrualOutcome::Skipped(SkipReason::NoStake)).unwrap();
        assert_eq!(skipped["status"], "skipped");
        assert_eq!(skipped["reason"], "no_stake");
    }

    #[test]
    fn test_preview() {
        let preview = calendar().preview(&pool(10_000 * TOKEN, 0), 21_600).unwrap();
        assert!(preview.needs_update);
        assert_eq!(preview.projected_yield, 821_917_808);
        assert_eq!(preview.remaining_secs, 0);
        assert_eq!(preview.apy_basis_points, 1200);

        let preview = calendar().preview(&pool(10_000 * TOKEN, 0), 3_600).unwrap();
        assert!(!preview.needs_update);
        assert_eq!(preview.remaining_secs, 18_000);
    }
}
