use solana_program::pubkey::Pubkey;

use crate::error::PoolError;
use crate::math;

/// PDA seed of the singleton pool state.
pub const POOL_STATE_SEED: &[u8] = b"pool_state";

/// PDA seed of the authority owning the vault token account.
pub const POOL_VAULT_AUTHORITY_SEED: &[u8] = b"pool_vault_authority";

/// PDA seed prefix of per-user stake records.
pub const USER_STAKE_SEED: &[u8] = b"user_stake";

/// Pool configuration, as stored on the ledger and passed to
/// `initializePool` / `updatePoolConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolConfig {
    /// Minimum amount accepted by a single deposit
    pub min_stake_amount: u64,
    /// Cap on a single user's staked principal
    pub max_stake_per_user: u64,
    pub deposits_enabled: bool,
    pub withdrawals_enabled: bool,
    /// Annual rate in basis points (1200 = 12%)
    pub apy_basis_points: u16,
}

impl PoolConfig {
    /// Same checks the program applies in `updatePoolConfig`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_stake_amount == 0 {
            return Err(PoolError::InvalidAmount);
        }
        if self.max_stake_per_user < self.min_stake_amount {
            return Err(PoolError::InvalidAmount);
        }
        if self.apy_basis_points as u64 > math::BASIS_POINTS_DENOMINATOR {
            return Err(PoolError::InvalidAmount);
        }
        Ok(())
    }
}

/// Pool state, singleton owned by the ledger program.
/// PDA seeds: [b"pool_state"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolState {
    /// Admin (can update config)
    pub pool_authority: Pubkey,
    /// Operating key allowed to consume delegations and record yield
    pub pool_delegate: Pubkey,
    /// Token account holding staked vouchers
    pub vault_ata: Pubkey,
    /// Voucher token mint
    pub voucher_mint: Pubkey,
    pub config: PoolConfig,
    /// Sum of all users' staked principal
    pub total_staked: u64,
    /// Yield-side balance (grows with every accrual)
    pub total_sol_staked: u64,
    /// Cumulative yield ever recorded
    pub total_yield_earned: u64,
    /// Users with nonzero stake
    pub total_stakers: u64,
    /// Cumulative yield per staked unit, scaled by REWARD_INDEX_SCALE. Never decreases.
    pub reward_index: u128,
    pub created_at: i64,
    /// Unix timestamp of the last accrual
    pub last_yield_update: i64,
    pub bump: u8,
}

/// Per-user stake record.
/// PDA seeds: [b"user_stake", pool_state, user]
///
/// Kept after full redemption: principal goes to zero, history stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserStakeRecord {
    pub user: Pubkey,
    pub pool: Pubkey,
    pub staked_amount: u64,
    /// Pool reward index observed at the last stake-affecting action
    pub user_reward_index: u128,
    pub total_yield_claimed: u64,
    /// First deposit
    pub staked_at: i64,
    pub last_action_at: i64,
    pub bump: u8,
}

impl PoolState {
    /// Rate to accrue at: explicit override, else the pool's own config.
    pub fn effective_apy(&self, apy_override: Option<u16>) -> u16 {
        apy_override.unwrap_or(self.config.apy_basis_points)
    }

    pub fn seconds_since_last_accrual(&self, now: i64) -> u64 {
        math::elapsed_seconds(now, self.last_yield_update)
    }
}

impl UserStakeRecord {
    /// Fresh record for a first deposit.
    pub fn new(user: Pubkey, pool: Pubkey, bump: u8) -> Self {
        Self {
            user,
            pool,
            bump,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.staked_amount > 0
    }
}

/// Derive the pool state PDA.
pub fn derive_pool_state(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POOL_STATE_SEED], program_id)
}

/// Derive the vault authority PDA (owner of the vault token account).
pub fn derive_vault_authority(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POOL_VAULT_AUTHORITY_SEED], program_id)
}

/// Derive the per-user stake record PDA.
pub fn derive_user_stake(program_id: &Pubkey, pool: &Pubkey, user: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[USER_STAKE_SEED, pool.as_ref(), user.as_ref()], program_id)
}
