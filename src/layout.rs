//! Fixed-layout decoding of ledger accounts.
//!
//! Every account is described by an explicit offset table keyed by field name.
//! Offsets are absolute (they include the 8-byte discriminator). Any change to the
//! program's account structs must be mirrored here, and the layout tests in
//! `tests/struct_layout.rs` will catch drift.

use std::fmt;

use solana_program::{program_option::COption, program_pack::Pack, pubkey::Pubkey};
use spl_token::state::{Account as TokenAccount, AccountState};

use crate::state::{PoolConfig, PoolState, UserStakeRecord};

pub const DISCRIMINATOR_LEN: usize = 8;

/// One field of a fixed account layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
}

const fn field(name: &'static str, offset: usize, width: usize) -> Field {
    Field { name, offset, width }
}

/// Offset table for one account type.
#[derive(Debug, Clone, Copy)]
pub struct AccountLayout {
    pub name: &'static str,
    /// `sha256("account:<name>")[..8]`
    pub discriminator: [u8; 8],
    pub fields: &'static [Field],
    /// Full on-ledger size including discriminator and reserved tail
    pub len: usize,
}

impl AccountLayout {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub const POOL_STATE_LAYOUT: AccountLayout = AccountLayout {
    name: "PoolState",
    discriminator: [247, 237, 227, 245, 215, 195, 222, 70],
    fields: &[
        field("pool_authority", 8, 32),
        field("pool_delegate", 40, 32),
        field("vault_ata", 72, 32),
        field("voucher_mint", 104, 32),
        field("config.min_stake_amount", 136, 8),
        field("config.max_stake_per_user", 144, 8),
        field("config.deposits_enabled", 152, 1),
        field("config.withdrawals_enabled", 153, 1),
        field("config.apy_basis_points", 154, 2),
        field("total_voucher_staked", 156, 8),
        field("total_sol_staked", 164, 8),
        field("total_yield_earned", 172, 8),
        field("total_stakers", 180, 8),
        field("reward_index", 188, 16),
        field("created_at", 204, 8),
        field("last_yield_update", 212, 8),
        field("bump", 220, 1),
        field("reserved", 221, 64),
    ],
    len: 285,
};

pub const USER_STAKE_RECORD_LAYOUT: AccountLayout = AccountLayout {
    name: "UserStakeRecord",
    discriminator: [2, 228, 217, 21, 212, 139, 4, 208],
    fields: &[
        field("user", 8, 32),
        field("pool", 40, 32),
        field("staked_amount", 72, 8),
        field("user_reward_index", 80, 16),
        field("total_yield_claimed", 96, 8),
        field("staked_at", 104, 8),
        field("last_action_at", 112, 8),
        field("bump", 120, 1),
        field("reserved", 121, 32),
    ],
    len: 153,
};

/// Why account bytes could not be decoded. Never coerced into a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    TooShort { layout: &'static str, expected: usize, actual: usize },
    DiscriminatorMismatch { layout: &'static str, found: [u8; 8] },
    UnknownField { layout: &'static str, field: String },
    WidthMismatch { layout: &'static str, field: &'static str, expected: usize, actual: usize },
    InvalidBool { layout: &'static str, field: &'static str, value: u8 },
    InvalidTokenAccount(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort { layout, expected, actual } => {
                write!(f, "{}: expected at least {} bytes, got {}", layout, expected, actual)
            }
            DecodeError::DiscriminatorMismatch { layout, found } => {
                write!(f, "{}: discriminator mismatch, found {:?}", layout, found)
            }
            DecodeError::UnknownField { layout, field } => {
                write!(f, "{}: no field named {}", layout, field)
            }
            DecodeError::WidthMismatch { layout, field, expected, actual } => write!(
                f,
                "{}.{}: width {} does not match requested {}",
                layout, field, actual, expected
            ),
            DecodeError::InvalidBool { layout, field, value } => {
                write!(f, "{}.{}: invalid bool byte {}", layout, field, value)
            }
            DecodeError::InvalidTokenAccount(msg) => write!(f, "token account: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Reads named fields out of account bytes validated against a layout.
pub struct AccountReader<'a> {
    layout: &'a AccountLayout,
    data: &'a [u8],
}

impl<'a> AccountReader<'a> {
    /// Validates length and discriminator. Trailing bytes beyond `layout.len`
    /// are tolerated (accounts may be over-allocated).
    pub fn new(layout: &'a AccountLayout, data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < layout.len {
            return Err(DecodeError::TooShort {
                layout: layout.name,
                expected: layout.len,
                actual: data.len(),
            });
        }
        let mut found = [0u8; DISCRIMINATOR_LEN];
        found.copy_from_slice(&data[..DISCRIMINATOR_LEN]);
        if found != layout.discriminator {
            return Err(DecodeError::DiscriminatorMismatch { layout: layout.name, found });
        }
        Ok(Self { layout, data })
    }

    fn bytes<const N: usize>(&self, name: &str) -> Result<[u8; N], DecodeError> {
        let f = self.layout.field(name).ok_or_else(|| DecodeError::UnknownField {
            layout: self.layout.name,
            field: name.to_string(),
        })?;
        if f.width != N {
            return Err(DecodeError::WidthMismatch {
                layout: self.layout.name,
                field: f.name,
                expected: N,
                actual: f.width,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[f.offset..f.offset + N]);
        Ok(out)
    }

    pub fn pubkey(&self, name: &str) -> Result<Pubkey, DecodeError> {
        Ok(Pubkey::new_from_array(self.bytes::<32>(name)?))
    }

    pub fn u8(&self, name: &str) -> Result<u8, DecodeError> {
        Ok(self.bytes::<1>(name)?[0])
    }

    pub fn bool(&self, name: &str) -> Result<bool, DecodeError> {
        match self.u8(name)? {
            0 => Ok(false),
            1 => Ok(true),
            value => {
                let f = self.layout.field(name).map(|f| f.name).unwrap_or("?");
                Err(DecodeError::InvalidBool { layout: self.layout.name, field: f, value })
            }
        }
    }

    pub fn u16(&self, name: &str) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.bytes::<2>(name)?))
    }

    pub fn u64(&self, name: &str) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.bytes::<8>(name)?))
    }

    pub fn i64(&self, name: &str) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.bytes::<8>(name)?))
    }

    pub fn u128(&self, name: &str) -> Result<u128, DecodeError> {
        Ok(u128::from_le_bytes(self.bytes::<16>(name)?))
    }
}

/// Writes named fields into a zeroed, discriminator-stamped buffer.
pub struct AccountWriter<'a> {
    layout: &'a AccountLayout,
    data: Vec<u8>,
}

impl<'a> AccountWriter<'a> {
    pub fn new(layout: &'a AccountLayout) -> Self {
        let mut data = vec![0u8; layout.len];
        data[..DISCRIMINATOR_LEN].copy_from_slice(&layout.discriminator);
        Self { layout, data }
    }

    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<&mut Self, DecodeError> {
        let f = *self.layout.field(name).ok_or_else(|| DecodeError::UnknownField {
            layout: self.layout.name,
            field: name.to_string(),
        })?;
        if f.width != bytes.len() {
            return Err(DecodeError::WidthMismatch {
                layout: self.layout.name,
                field: f.name,
                expected: bytes.len(),
                actual: f.width,
            });
        }
        self.data[f.offset..f.offset + f.width].copy_from_slice(bytes);
        Ok(self)
    }

    pub fn pubkey(&mut self, name: &str, v: &Pubkey) -> Result<&mut Self, DecodeError> {
        self.put(name, v.as_ref())
    }

    pub fn u8(&mut self, name: &str, v: u8) -> Result<&mut Self, DecodeError> {
        self.put(name, &[v])
    }

    pub fn bool(&mut self, name: &str, v: bool) -> Result<&mut Self, DecodeError> {
        self.put(name, &[v as u8])
    }

    pub fn u16(&mut self, name: &str, v: u16) -> Result<&mut Self, DecodeError> {
        self.put(name, &v.to_le_bytes())
    }

    pub fn u64(&mut self, name: &str, v: u64) -> Result<&mut Self, DecodeError> {
        self.put(name, &v.to_le_bytes())
    }

    pub fn i64(&mut self, name: &str, v: i64) -> Result<&mut Self, DecodeError> {
        self.put(name, &v.to_le_bytes())
    }

    pub fn u128(&mut self, name: &str, v: u128) -> Result<&mut Self, DecodeError> {
        self.put(name, &v.to_le_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

pub fn decode_pool_state(data: &[u8]) -> Result<PoolState, DecodeError> {
    let r = AccountReader::new(&POOL_STATE_LAYOUT, data)?;
    Ok(PoolState {
        pool_authority: r.pubkey("pool_authority")?,
        pool_delegate: r.pubkey("pool_delegate")?,
        vault_ata: r.pubkey("vault_ata")?,
        voucher_mint: r.pubkey("voucher_mint")?,
        config: PoolConfig {
            min_stake_amount: r.u64("config.min_stake_amount")?,
            max_stake_per_user: r.u64("config.max_stake_per_user")?,
            deposits_enabled: r.bool("config.deposits_enabled")?,
            withdrawals_enabled: r.bool("config.withdrawals_enabled")?,
            apy_basis_points: r.u16("config.apy_basis_points")?,
        },
        total_staked: r.u64("total_voucher_staked")?,
        total_sol_staked: r.u64("total_sol_staked")?,
        total_yield_earned: r.u64("total_yield_earned")?,
        total_stakers: r.u64("total_stakers")?,
        reward_index: r.u128("reward_index")?,
        created_at: r.i64("created_at")?,
        last_yield_update: r.i64("last_yield_update")?,
        bump: r.u8("bump")?,
    })
}

pub fn encode_pool_state(pool: &PoolState) -> Result<Vec<u8>, DecodeError> {
    let mut w = AccountWriter::new(&POOL_STATE_LAYOUT);
    w.pubkey("pool_authority", &pool.pool_authority)?
        .pubkey("pool_delegate", &pool.pool_delegate)?
        .pubkey("vault_ata", &pool.vault_ata)?
        .pubkey("voucher_mint", &pool.voucher_mint)?
        .u64("config.min_stake_amount", pool.config.min_stake_amount)?
        .u64("config.max_stake_per_user", pool.config.max_stake_per_user)?
        .bool("config.deposits_enabled", pool.config.deposits_enabled)?
        .bool("config.withdrawals_enabled", pool.config.withdrawals_enabled)?
        .u16("config.apy_basis_points", pool.config.apy_basis_points)?
        .u64("total_voucher_staked", pool.total_staked)?
        .u64("total_sol_staked", pool.total_sol_staked)?
        .u64("total_yield_earned", pool.total_yield_earned)?
        .u64("total_stakers", pool.total_stakers)?
        .u128("reward_index", pool.reward_index)?
        .i64("created_at", pool.created_at)?
        .i64("last_yield_update", pool.last_yield_update)?
        .u8("bump", pool.bump)?;
    Ok(w.finish())
}

pub fn decode_user_stake(data: &[u8]) -> Result<UserStakeRecord, DecodeError> {
    let r = AccountReader::new(&USER_STAKE_RECORD_LAYOUT, data)?;
    Ok(UserStakeRecord {
        user: r.pubkey("user")?,
        pool: r.pubkey("pool")?,
        staked_amount: r.u64("staked_amount")?,
        user_reward_index: r.u128("user_reward_index")?,
        total_yield_claimed: r.u64("total_yield_claimed")?,
        staked_at: r.i64("staked_at")?,
        last_action_at: r.i64("last_action_at")?,
        bump: r.u8("bump")?,
    })
}

pub fn encode_user_stake(record: &UserStakeRecord) -> Result<Vec<u8>, DecodeError> {
    let mut w = AccountWriter::new(&USER_STAKE_RECORD_LAYOUT);
    w.pubkey("user", &record.user)?
        .pubkey("pool", &record.pool)?
        .u64("staked_amount", record.staked_amount)?
        .u128("user_reward_index", record.user_reward_index)?
        .u64("total_yield_claimed", record.total_yield_claimed)?
        .i64("staked_at", record.staked_at)?
        .i64("last_action_at", record.last_action_at)?
        .u8("bump", record.bump)?;
    Ok(w.finish())
}

/// The parts of an SPL token account the deposit agent cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountView {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    pub delegated_amount: u64,
    pub frozen: bool,
}

pub fn decode_token_account(data: &[u8]) -> Result<TokenAccountView, DecodeError> {
    if data.len() < TokenAccount::LEN {
        return Err(DecodeError::TooShort {
            layout: "TokenAccount",
            expected: TokenAccount::LEN,
            actual: data.len(),
        });
    }
    let account = TokenAccount::unpack(&data[..TokenAccount::LEN])
        .map_err(|e| DecodeError::InvalidTokenAccount(e.to_string()))?;
    Ok(TokenAccountView {
        mint: account.mint,
        owner: account.owner,
        amount: account.amount,
        delegate: account.delegate.into(),
        delegated_amount: account.delegated_amount,
        frozen: account.state == AccountState::Frozen,
    })
}

pub fn encode_token_account(view: &TokenAccountView) -> Vec<u8> {
    let account = TokenAccount {
        mint: view.mint,
        owner: view.owner,
        amount: view.amount,
        delegate: match view.delegate {
            Some(d) => COption::Some(d),
            None => COption::None,
        },
        state: if view.frozen { AccountState::Frozen } else { AccountState::Initialized },
        is_native: COption::None,
        delegated_amount: view.delegated_amount,
        close_authority: COption::None,
    };
    let mut data = vec![0u8; TokenAccount::LEN];
    account.pack_into_slice(&mut data);
    data
}
