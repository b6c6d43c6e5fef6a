use solana_program::program_error::ProgramError;

use crate::state::PoolConfig;

/// Size of a packed `PoolConfig` argument.
pub const POOL_CONFIG_LEN: usize = 20;

// ═══════════════════════════════════════════════════════════════
// Instruction discriminators: sha256("global:<name>")[..8]
// ═══════════════════════════════════════════════════════════════

pub const IX_INITIALIZE_POOL: [u8; 8] = [95, 180, 10, 172, 84, 174, 232, 40];
pub const IX_DEPOSIT_VOUCHER: [u8; 8] = [82, 178, 83, 142, 200, 70, 4, 73];
pub const IX_RECORD_YIELD: [u8; 8] = [80, 136, 238, 204, 216, 161, 41, 88];
pub const IX_REDEEM_VOUCHER: [u8; 8] = [50, 219, 8, 127, 45, 96, 161, 92];
pub const IX_UPDATE_POOL_CONFIG: [u8; 8] = [68, 236, 203, 122, 179, 62, 234, 252];

/// Voucher pool program instructions consumed by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolInstruction {
    /// Create the pool state.
    ///
    /// Accounts:
    ///   0. `[signer, writable]` Pool authority (pays rent, becomes admin)
    ///   1. `[]` Pool delegate (operating key)
    ///   2. `[writable]` Pool state PDA
    ///   3. `[writable]` Vault token account
    ///   4. `[]` Vault authority PDA
    ///   5. `[]` Voucher mint
    ///   6. `[]` System program
    ///   7. `[]` Token program
    InitializePool { config: PoolConfig },

    /// Move delegated vouchers from the user into the vault. The delegate
    /// signs; the user does not.
    ///
    /// Accounts:
    ///   0. `[]` User
    ///   1. `[signer, writable]` Pool delegate (pays for a new stake record)
    ///   2. `[writable]` Pool state PDA
    ///   3. `[writable]` User stake record PDA (created if needed)
    ///   4. `[writable]` User voucher token account (source)
    ///   5. `[writable]` Pool vault token account (destination)
    ///   6. `[]` System program
    ///   7. `[]` Token program
    DepositVoucher { amount: u64 },

    /// Distribute `amount` of yield across all stakers via the reward index.
    ///
    /// Accounts:
    ///   0. `[signer]` Pool delegate
    ///   1. `[writable]` Pool state PDA
    RecordYield { amount: u64 },

    /// Return principal to the user and settle their yield.
    ///
    /// Accounts:
    ///   0. `[signer, writable]` User
    ///   1. `[writable]` Pool state PDA
    ///   2. `[writable]` User stake record PDA
    ///   3. `[writable]` User voucher token account (destination)
    ///   4. `[writable]` Pool vault token account (source)
    ///   5. `[]` Vault authority PDA
    ///   6. `[]` Token program
    RedeemVoucher { amount: u64 },

    /// Admin replaces the pool configuration.
    ///
    /// Accounts:
    ///   0. `[signer]` Pool authority
    ///   1. `[writable]` Pool state PDA
    UpdatePoolConfig { config: PoolConfig },
}

impl PoolInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitializePool { .. } => "initialize_pool",
            Self::DepositVoucher { .. } => "deposit_voucher",
            Self::RecordYield { .. } => "record_yield",
            Self::RedeemVoucher { .. } => "redeem_voucher",
            Self::UpdatePoolConfig { .. } => "update_pool_config",
        }
    }

    pub fn discriminator(&self) -> [u8; 8] {
        match self {
            Self::InitializePool { .. } => IX_INITIALIZE_POOL,
            Self::DepositVoucher { .. } => IX_DEPOSIT_VOUCHER,
            Self::RecordYield { .. } => IX_RECORD_YIELD,
            Self::RedeemVoucher { .. } => IX_REDEEM_VOUCHER,
            Self::UpdatePoolConfig { .. } => IX_UPDATE_POOL_CONFIG,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + POOL_CONFIG_LEN);
        data.extend_from_slice(&self.discriminator());
        match self {
            Self::InitializePool { config } | Self::UpdatePoolConfig { config } => {
                pack_config(config, &mut data);
            }
            Self::DepositVoucher { amount }
            | Self::RecordYield { amount }
            | Self::RedeemVoucher { amount } => {
                data.extend_from_slice(&amount.to_le_bytes());
            }
        }
        data
    }

    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        if data.len() < 8 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (tag, rest) = data.split_at(8);

        match tag {
            t if t == IX_INITIALIZE_POOL => {
                Ok(Self::InitializePool { config: unpack_config(rest)? })
            }
            t if t == IX_DEPOSIT_VOUCHER => Ok(Self::DepositVoucher { amount: unpack_u64(rest)? }),
            t if t == IX_RECORD_YIELD => Ok(Self::RecordYield { amount: unpack_u64(rest)? }),
            t if t == IX_REDEEM_VOUCHER => Ok(Self::RedeemVoucher { amount: unpack_u64(rest)? }),
            t if t == IX_UPDATE_POOL_CONFIG => {
                Ok(Self::UpdatePoolConfig { config: unpack_config(rest)? })
            }
            _ => Err(ProgramError::InvalidInstructionData),
        }
    }
}

fn pack_config(config: &PoolConfig, data: &mut Vec<u8>) {
    data.extend_from_slice(&config.min_stake_amount.to_le_bytes());
    data.extend_from_slice(&config.max_stake_per_user.to_le_bytes());
    data.push(config.deposits_enabled as u8);
    data.push(config.withdrawals_enabled as u8);
    data.extend_from_slice(&config.apy_basis_points.to_le_bytes());
}

fn unpack_u64(rest: &[u8]) -> Result<u64, ProgramError> {
    let bytes: [u8; 8] = rest
        .get(0..8)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProgramError::InvalidInstructionData)?;
    Ok(u64::from_le_bytes(bytes))
}

fn unpack_bool(byte: u8) -> Result<bool, ProgramError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProgramError::InvalidInstructionData),
    }
}

fn unpack_config(rest: &[u8]) -> Result<PoolConfig, ProgramError> {
    if rest.len() < POOL_CONFIG_LEN {
        return Err(ProgramError::InvalidInstructionData);
    }
    Ok(PoolConfig {
        min_stake_amount: unpack_u64(&rest[0..8])?,
        max_stake_per_user: unpack_u64(&rest[8..16])?,
        deposits_enabled: unpack_bool(rest[16])?,
        withdrawals_enabled: unpack_bool(rest[17])?,
        apy_basis_points: u16::from_le_bytes([rest[18], rest[19]]),
    })
}
