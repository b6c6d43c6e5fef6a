//! Delegation Scanner / Deposit Agent.
//!
//! Users approve the pool delegate on their voucher token account. A scan
//! enumerates every token account of the voucher mint, keeps those delegated
//! to the operator, and submits one `depositVoucher` per user. The delegate
//! signs; users never do.
//!
//! The processed set covers one pass only: a user is deposited at most once
//! per scan, and a fresh approval is picked up by the next pass. The ledger
//! is the durable guard: a consumed delegation clears the delegate, and a
//! deposit larger than the remaining delegation is rejected by the token
//! program, so a replay cannot double stake.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use solana_program::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::error::AgentError;
use crate::layout::{self, TokenAccountView};
use crate::ledger::{self, Ledger};
use crate::program::PoolProgram;
use crate::scheduler::sleep_until_stopped;
use crate::state::PoolState;

/// Delegation state of one token account relative to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    /// Delegate is the operator with a nonzero allowance.
    Delegated { amount: u64 },
    NotDelegated,
}

impl DelegationStatus {
    pub fn has_delegation(&self) -> bool {
        matches!(self, DelegationStatus::Delegated { .. })
    }

    pub fn delegated_amount(&self) -> u64 {
        match self {
            DelegationStatus::Delegated { amount } => *amount,
            DelegationStatus::NotDelegated => 0,
        }
    }
}

pub fn check_delegation(view: &TokenAccountView, operator: &Pubkey) -> DelegationStatus {
    match view.delegate {
        Some(delegate) if delegate == *operator && view.delegated_amount > 0 => {
            DelegationStatus::Delegated { amount: view.delegated_amount }
        }
        _ => DelegationStatus::NotDelegated,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositSkip {
    /// User already deposited from another token account this pass
    AlreadyProcessed,
    /// Frozen token account, transfer would fail
    Frozen,
    DepositsDisabled,
    /// Transferable amount is below the pool minimum
    BelowMinimum { amount: u64, min_stake_amount: u64 },
    AtUserCap { staked_amount: u64 },
}

#[derive(Debug)]
pub enum DepositResult {
    Deposited { amount: u64, signature: Signature },
    Skipped(DepositSkip),
    Failed(AgentError),
}

#[derive(Debug)]
pub struct UserOutcome {
    pub user: Pubkey,
    pub token_account: Pubkey,
    pub delegated_amount: u64,
    pub result: DepositResult,
}

/// Per-user outcomes of one full scan, in enumeration order.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub outcomes: Vec<UserOutcome>,
    /// Token accounts of the mint that could not be decoded
    pub undecodable: Vec<Pubkey>,
}

impl ScanReport {
    pub fn deposited(&self) -> usize {
        self.count(|r| matches!(r, DepositResult::Deposited { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, DepositResult::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, DepositResult::Failed(_)))
    }

    pub fn total_deposited(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| match o.result {
                DepositResult::Deposited { amount, .. } => Some(amount),
                _ => None,
            })
            .fold(0u64, |acc, a| acc.saturating_add(a))
    }

    pub fn outcome_for(&self, user: &Pubkey) -> Option<&UserOutcome> {
        self.outcomes.iter().find(|o| o.user == *user)
    }

    fn count(&self, pred: impl Fn(&DepositResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }
}

/// Amount to deposit for a delegation, or why not.
///
/// Bounded by the allowance, the balance, and the user's remaining cap.
pub fn plan_deposit(
    pool: &PoolState,
    view: &TokenAccountView,
    delegated_amount: u64,
    staked_amount: u64,
) -> Result<u64, DepositSkip> {
    if view.frozen {
        return Err(DepositSkip::Frozen);
    }
    if !pool.config.deposits_enabled {
        return Err(DepositSkip::DepositsDisabled);
    }
    let headroom = pool.config.max_stake_per_user.saturating_sub(staked_amount);
    if headroom == 0 {
        return Err(DepositSkip::AtUserCap { staked_amount });
    }
    let amount = delegated_amount.min(view.amount).min(headroom);
    if amount == 0 || amount < pool.config.min_stake_amount {
        return Err(DepositSkip::BelowMinimum {
            amount,
            min_stake_amount: pool.config.min_stake_amount,
        });
    }
    Ok(amount)
}

pub struct DepositAgent<L: Ledger> {
    ledger: L,
    program: PoolProgram,
    /// Expected voucher mint; the pool's own mint when unset
    mint: Option<Pubkey>,
    /// Users deposited during the current pass
    processed: HashSet<Pubkey>,
}

impl<L: Ledger> DepositAgent<L> {
    pub fn new(ledger: L, program: PoolProgram, mint: Option<Pubkey>) -> Self {
        Self { ledger, program, mint, processed: HashSet::new() }
    }

    /// Whether `user` was deposited during the most recent pass.
    pub fn is_processed(&self, user: &Pubkey) -> bool {
        self.processed.contains(user)
    }

    /// One full pass. Fails only when the pool itself or the account listing
    /// cannot be read; per-user failures are recorded and the pass continues.
    pub fn scan(&mut self) -> Result<ScanReport, AgentError> {
        self.processed.clear();
        let pool = ledger::fetch_pool_state(&self.ledger, &self.program.pool_state)?;
        let mint = match self.mint {
            Some(m) if m != pool.voucher_mint => {
                return Err(AgentError::Config(format!(
                    "configured voucher mint {} does not match pool mint {}",
                    m, pool.voucher_mint
                )));
            }
            _ => pool.voucher_mint,
        };
        let operator = self.ledger.operator();
        let accounts = self.ledger.token_accounts_for_mint(&mint)?;
        debug!("Scanning token accounts: mint={} count={}", mint, accounts.len());

        let mut report = ScanReport::default();
        for (address, data) in accounts {
            let view = match layout::decode_token_account(&data) {
                Ok(v) => v,
                Err(e) => {
                    error!("Failed to decode token account: account={} len={} error={}", address, data.len(), e);
                    report.undecodable.push(address);
                    continue;
                }
            };
            let status = check_delegation(&view, &operator);
            if !status.has_delegation() {
                continue;
            }
            let result = self.process(&pool, &operator, address, &view, status.delegated_amount());
            report.outcomes.push(UserOutcome {
                user: view.owner,
                token_account: address,
                delegated_amount: status.delegated_amount(),
                result,
            });
        }

        info!(
            "Scan complete: delegated={} deposited={} skipped={} failed={} amount={}",
            report.outcomes.len(),
            report.deposited(),
            report.skipped(),
            report.failed(),
            report.total_deposited()
        );
        Ok(report)
    }

    fn process(
        &mut self,
        pool: &PoolState,
        operator: &Pubkey,
        token_account: Pubkey,
        view: &TokenAccountView,
        delegated_amount: u64,
    ) -> DepositResult {
        let user = view.owner;
        if self.processed.contains(&user) {
            return DepositResult::Skipped(DepositSkip::AlreadyProcessed);
        }
        let record = match ledger::fetch_user_stake(&self.ledger, &self.program.user_stake(&user)) {
            Ok(r) => r,
            Err(e) => {
                warn!("Deposit failed: user={} error={}", user, e);
                return DepositResult::Failed(e);
            }
        };
        let staked_amount = record.map(|r| r.staked_amount).unwrap_or(0);
        let amount = match plan_deposit(pool, view, delegated_amount, staked_amount) {
            Ok(a) => a,
            Err(skip) => {
                debug!("Deposit skipped: user={} reason={:?}", user, skip);
                return DepositResult::Skipped(skip);
            }
        };

        let ix = self
            .program
            .deposit_voucher(&user, operator, &token_account, &pool.vault_ata, amount);
        match self.ledger.submit(&[ix]) {
            Ok(signature) => {
                self.processed.insert(user);
                info!("Voucher deposited: user={} amount={} signature={}", user, amount, signature);
                DepositResult::Deposited { amount, signature }
            }
            Err(e) => {
                warn!("Deposit failed: user={} amount={} error={}", user, amount, e);
                DepositResult::Failed(e)
            }
        }
    }

    /// Scan every `interval` until `stop` is set.
    pub fn run(&mut self, interval: Duration, stop: &AtomicBool) {
        info!(
            "Deposit agent started: pool={} interval_secs={}",
            self.program.pool_state,
            interval.as_secs()
        );
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.scan() {
                warn!("Scan failed, retrying next interval: {}", e);
            }
            sleep_until_stopped(interval, stop);
        }
        info!("Deposit agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PoolConfig;

    fn view(delegate: Option<Pubkey>, delegated_amount: u64, amount: u64) -> TokenAccountView {
        TokenAccountView {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount,
            delegate,
            delegated_amount,
            frozen: false,
        }
    }

    fn pool() -> PoolState {
        PoolState {
            config: PoolConfig {
                min_stake_amount: 10,
                max_stake_per_user: 1_000,
                deposits_enabled: true,
                withdrawals_enabled: true,
                apy_basis_points: 1200,
            },
            ..PoolState::default()
        }
    }

    #[test]
    fn test_check_delegation() {
        let op = Pubkey::new_unique();
        assert_eq!(check_delegation(&view(Some(op), 50, 100), &op), DelegationStatus::Delegated { amount: 50 });
        assert_eq!(check_delegation(&view(Some(op), 0, 100), &op), DelegationStatus::NotDelegated);
        assert_eq!(
            check_delegation(&view(Some(Pubkey::new_unique()), 50, 100), &op),
            DelegationStatus::NotDelegated
        );
        assert_eq!(check_delegation(&view(None, 0, 100), &op), DelegationStatus::NotDelegated);
    }

    #[test]
    fn test_plan_clamps_to_headroom() {
        let v = view(None, 500, 500);
        assert_eq!(plan_deposit(&pool(), &v, 500, 800), Ok(200));
        assert_eq!(plan_deposit(&pool(), &v, 500, 1_000), Err(DepositSkip::AtUserCap { staked_amount: 1_000 }));
    }

    #[test]
    fn test_plan_bounded_by_balance() {
        let v = view(None, 500, 40);
        assert_eq!(plan_deposit(&pool(), &v, 500, 0), Ok(40));
    }

    #[test]
    fn test_plan_below_minimum() {
        let v = view(None, 5, 500);
        assert_eq!(
            plan_deposit(&pool(), &v, 5, 0),
            Err(DepositSkip::BelowMinimum { amount: 5, min_stake_amount: 10 })
        );
    }

    #[test]
    fn test_plan_disabled_and_frozen() {
        let mut p = pool();
        p.config.deposits_enabled = false;
        assert_eq!(plan_deposit(&p, &view(None, 50, 50), 50, 0), Err(DepositSkip::DepositsDisabled));
        let mut v = view(None, 50, 50);
        v.frozen = true;
        assert_eq!(plan_deposit(&pool(), &v, 50, 0), Err(DepositSkip::Frozen));
    }
}
