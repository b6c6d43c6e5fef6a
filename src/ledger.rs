//! Ledger access.
//!
//! Reads are unauthenticated, eventually-consistent snapshots. Writes are the
//! only blocking calls, bounded by a confirmation timeout; a timed-out write has
//! an unknown outcome and callers must re-read state before retrying.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
};
use solana_program::{instruction::Instruction, program_pack::Pack, pubkey::Pubkey};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};

use crate::clock::Clock;
use crate::error::{AgentError, LedgerRejection, PoolError};
use crate::instruction::PoolInstruction;
use crate::layout::{self, TokenAccountView};
use crate::program::PoolProgram;
use crate::rewards;
use crate::state::{self, PoolState, UserStakeRecord};

/// Everything the agent needs from the ledger.
pub trait Ledger {
    /// Key that signs and pays for submitted transactions.
    fn operator(&self) -> Pubkey;

    /// Raw account bytes, `None` if the account does not exist.
    fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError>;

    /// Every token account of `mint`, as `(address, raw bytes)`.
    fn token_accounts_for_mint(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, Vec<u8>)>, AgentError>;

    /// Sign, send and wait for confirmation. All-or-nothing.
    fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError>;
}

impl<T: Ledger + ?Sized> Ledger for &T {
    fn operator(&self) -> Pubkey {
        (**self).operator()
    }
    fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
        (**self).account_data(address)
    }
    fn token_accounts_for_mint(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, Vec<u8>)>, AgentError> {
        (**self).token_accounts_for_mint(mint)
    }
    fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError> {
        (**self).submit(instructions)
    }
}

impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    fn operator(&self) -> Pubkey {
        (**self).operator()
    }
    fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
        (**self).account_data(address)
    }
    fn token_accounts_for_mint(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, Vec<u8>)>, AgentError> {
        (**self).token_accounts_for_mint(mint)
    }
    fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError> {
        (**self).submit(instructions)
    }
}

/// Fetch and decode the pool state. Decode failures are fatal for the caller's
/// current operation.
pub fn fetch_pool_state<L: Ledger + ?Sized>(
    ledger: &L,
    address: &Pubkey,
) -> Result<PoolState, AgentError> {
    let data = ledger
        .account_data(address)?
        .ok_or(AgentError::AccountNotFound(*address))?;
    layout::decode_pool_state(&data).map_err(|e| {
        error!("Failed to decode pool state: account={} len={} error={}", address, data.len(), e);
        AgentError::decode(*address, e)
    })
}

/// Fetch a user's stake record, `None` before their first deposit.
pub fn fetch_user_stake<L: Ledger + ?Sized>(
    ledger: &L,
    address: &Pubkey,
) -> Result<Option<UserStakeRecord>, AgentError> {
    let Some(data) = ledger.account_data(address)? else {
        return Ok(None);
    };
    layout::decode_user_stake(&data).map(Some).map_err(|e| {
        error!("Failed to decode stake record: account={} len={} error={}", address, data.len(), e);
        AgentError::decode(*address, e)
    })
}

// ═══════════════════════════════════════════════════════════════
// RPC-backed ledger
// ═══════════════════════════════════════════════════════════════

pub struct RpcLedger {
    client: RpcClient,
    operator: Keypair,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(rpc_url: &str, operator: Keypair, confirm_timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed()),
            operator,
            confirm_timeout,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Ledger for RpcLedger {
    fn operator(&self) -> Pubkey {
        self.operator.pubkey()
    }

    fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
        let response = self
            .client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())?;
        Ok(response.value.map(|account| account.data))
    }

    fn token_accounts_for_mint(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, Vec<u8>)>, AgentError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::DataSize(spl_token::state::Account::LEN as u64),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(0, mint.as_ref())),
            ]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };
        let accounts = self
            .client
            .get_program_accounts_with_config(&spl_token::id(), config)?;
        Ok(accounts.into_iter().map(|(key, account)| (key, account.data)).collect())
    }

    fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError> {
        let blockhash = self.client.get_latest_blockhash()?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.operator.pubkey()),
            &[&self.operator],
            blockhash,
        );
        let signature = self.client.send_transaction(&tx)?;
        debug!("Transaction sent: signature={}", signature);

        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self.client.get_signature_status(&signature) {
                Ok(Some(Ok(()))) => return Ok(signature),
                Ok(Some(Err(err))) => {
                    return Err(AgentError::Rejected(LedgerRejection::classify(&err)));
                }
                Ok(None) => {}
                // Status polling errors don't tell us whether the tx landed.
                Err(err) => warn!("Signature status poll failed: signature={} error={}", signature, err),
            }
            if Instant::now() >= deadline {
                return Err(AgentError::ConfirmationTimeout { signature });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// In-memory ledger
// ═══════════════════════════════════════════════════════════════

/// In-process stand-in for the cluster: executes the pool instructions with
/// the reward engine and the token program's delegate-transfer rules.
///
/// Transactions are atomic: every instruction runs against a scratch copy of
/// the accounts, committed only if all succeed.
pub struct MemoryLedger<C: Clock> {
    program: PoolProgram,
    operator: Pubkey,
    clock: C,
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Pubkey, Vec<u8>>,
    token_accounts: BTreeSet<Pubkey>,
    signers: BTreeSet<Pubkey>,
    scripted_failures: VecDeque<AgentError>,
    executed: Vec<PoolInstruction>,
    sequence: u64,
}

type Accounts = HashMap<Pubkey, Vec<u8>>;

fn rejected(e: PoolError) -> AgentError {
    AgentError::Rejected(LedgerRejection::Pool(e))
}

impl<C: Clock> MemoryLedger<C> {
    pub fn new(program: PoolProgram, operator: Pubkey, clock: C) -> Self {
        let mut state = MemoryState::default();
        state.signers.insert(operator);
        Self { program, operator, clock, inner: Mutex::new(state) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, AgentError> {
        self.inner
            .lock()
            .map_err(|_| AgentError::Store("memory ledger lock poisoned".to_string()))
    }

    pub fn program(&self) -> &PoolProgram {
        &self.program
    }

    /// Treat `key` as having signed every transaction (a user wallet).
    pub fn add_signer(&self, key: Pubkey) -> Result<(), AgentError> {
        self.lock()?.signers.insert(key);
        Ok(())
    }

    pub fn put_pool(&self, pool: &PoolState) -> Result<(), AgentError> {
        let data = layout::encode_pool_state(pool)
            .map_err(|e| AgentError::decode(self.program.pool_state, e))?;
        self.lock()?.accounts.insert(self.program.pool_state, data);
        Ok(())
    }

    pub fn pool(&self) -> Result<PoolState, AgentError> {
        fetch_pool_state(self, &self.program.pool_state)
    }

    pub fn user_stake(&self, user: &Pubkey) -> Result<Option<UserStakeRecord>, AgentError> {
        fetch_user_stake(self, &self.program.user_stake(user))
    }

    pub fn put_token_account(&self, address: Pubkey, view: &TokenAccountView) -> Result<(), AgentError> {
        let mut state = self.lock()?;
        state.accounts.insert(address, layout::encode_token_account(view));
        state.token_accounts.insert(address);
        Ok(())
    }

    /// Store raw bytes under `address`, listed as a token account.
    pub fn put_raw_token_account(&self, address: Pubkey, data: Vec<u8>) -> Result<(), AgentError> {
        let mut state = self.lock()?;
        state.accounts.insert(address, data);
        state.token_accounts.insert(address);
        Ok(())
    }

    pub fn token_account(&self, address: &Pubkey) -> Result<Option<TokenAccountView>, AgentError> {
        let state = self.lock()?;
        state
            .accounts
            .get(address)
            .map(|data| layout::decode_token_account(data).map_err(|e| AgentError::decode(*address, e)))
            .transpose()
    }

    /// Make the next `submit` fail with `err` without touching state.
    pub fn fail_next_submit(&self, err: AgentError) -> Result<(), AgentError> {
        self.lock()?.scripted_failures.push_back(err);
        Ok(())
    }

    /// Instructions committed so far, in order.
    pub fn executed(&self) -> Result<Vec<PoolInstruction>, AgentError> {
        Ok(self.lock()?.executed.clone())
    }

    fn execute(
        &self,
        accounts: &mut Accounts,
        signers: &BTreeSet<Pubkey>,
        index: usize,
        ix: &Instruction,
    ) -> Result<PoolInstruction, AgentError> {
        if ix.program_id != self.program.program_id {
            return Err(AgentError::Rejected(LedgerRejection::Transaction(format!(
                "unknown program {}",
                ix.program_id
            ))));
        }
        if let Some(meta) = ix.accounts.iter().find(|m| m.is_signer && !signers.contains(&m.pubkey)) {
            return Err(AgentError::Rejected(LedgerRejection::Transaction(format!(
                "missing signature for {}",
                meta.pubkey
            ))));
        }
        let decoded = PoolInstruction::unpack(&ix.data)
            .map_err(|e| AgentError::InvalidRequest(format!("instruction {}: {}", index, e)))?;
        let key = |i: usize| {
            ix.accounts.get(i).map(|m| m.pubkey).ok_or_else(|| {
                AgentError::Rejected(LedgerRejection::Transaction(format!(
                    "instruction {} missing account {}",
                    index, i
                )))
            })
        };
        let now = self.clock.unix_timestamp();

        match decoded {
            PoolInstruction::InitializePool { config } => {
                let pool_address = key(2)?;
                if accounts.contains_key(&pool_address) {
                    // System program: account already in use
                    return Err(AgentError::Rejected(LedgerRejection::Custom {
                        instruction: index as u8,
                        code: 0,
                    }));
                }
                config.validate().map_err(rejected)?;
                let pool = PoolState {
                    pool_authority: key(0)?,
                    pool_delegate: key(1)?,
                    vault_ata: key(3)?,
                    voucher_mint: key(5)?,
                    config,
                    created_at: now,
                    last_yield_update: now,
                    bump: state::derive_pool_state(&self.program.program_id).1,
                    ..PoolState::default()
                };
                store_pool(accounts, &pool_address, &pool)?;
            }
            PoolInstruction::DepositVoucher { amount } => {
                let (user, delegate, pool_address) = (key(0)?, key(1)?, key(2)?);
                let (record_address, user_ata, vault) = (key(3)?, key(4)?, key(5)?);
                let mut pool = load_pool(accounts, &pool_address)?;
                if delegate != pool.pool_delegate {
                    return Err(rejected(PoolError::UnauthorizedDelegate));
                }
                let mut source = load_token(accounts, &user_ata)?;
                if source.mint != pool.voucher_mint {
                    return Err(rejected(PoolError::InvalidMint));
                }
                if source.owner != user {
                    return Err(rejected(PoolError::InvalidOwner));
                }
                if vault != pool.vault_ata {
                    return Err(rejected(PoolError::InvalidVault));
                }
                let mut record = match accounts.get(&record_address) {
                    Some(data) => layout::decode_user_stake(data)
                        .map_err(|e| AgentError::decode(record_address, e))?,
                    None => {
                        let bump = state::derive_user_stake(&self.program.program_id, &pool_address, &user).1;
                        UserStakeRecord::new(user, pool_address, bump)
                    }
                };
                rewards::apply_deposit(&mut pool, &mut record, amount, now).map_err(rejected)?;

                // Token program: delegated transfer
                if source.delegate != Some(delegate) {
                    return Err(AgentError::Rejected(LedgerRejection::TokenOwnerMismatch));
                }
                if source.delegated_amount < amount || source.amount < amount {
                    return Err(AgentError::Rejected(LedgerRejection::TokenInsufficientFunds));
                }
                source.amount -= amount;
                source.delegated_amount -= amount;
                if source.delegated_amount == 0 {
                    source.delegate = None;
                }
                let mut dest = load_token(accounts, &vault)?;
                dest.amount = dest.amount.checked_add(amount).ok_or_else(|| rejected(PoolError::Overflow))?;

                accounts.insert(user_ata, layout::encode_token_account(&source));
                accounts.insert(vault, layout::encode_token_account(&dest));
                store_user(accounts, &record_address, &record)?;
                store_pool(accounts, &pool_address, &pool)?;
            }
            PoolInstruction::RecordYield { amount } => {
                let (delegate, pool_address) = (key(0)?, key(1)?);
                let mut pool = load_pool(accounts, &pool_address)?;
                if delegate != pool.pool_delegate {
                    return Err(rejected(PoolError::UnauthorizedDelegate));
                }
                rewards::accrue(&mut pool, amount, now).map_err(rejected)?;
                store_pool(accounts, &pool_address, &pool)?;
            }
            PoolInstruction::RedeemVoucher { amount } => {
                let (user, pool_address, record_address) = (key(0)?, key(1)?, key(2)?);
                let (user_ata, vault) = (key(3)?, key(4)?);
                let mut pool = load_pool(accounts, &pool_address)?;
                if vault != pool.vault_ata {
                    return Err(rejected(PoolError::InvalidVault));
                }
                let data = accounts
                    .get(&record_address)
                    .ok_or(AgentError::AccountNotFound(record_address))?;
                let mut record = layout::decode_user_stake(data)
                    .map_err(|e| AgentError::decode(record_address, e))?;
                if record.user != user {
                    return Err(rejected(PoolError::InvalidOwner));
                }
                rewards::apply_redeem(&mut pool, &mut record, amount, now).map_err(rejected)?;

                let mut source = load_token(accounts, &vault)?;
                if source.amount < amount {
                    return Err(AgentError::Rejected(LedgerRejection::TokenInsufficientFunds));
                }
                source.amount -= amount;
                let mut dest = load_token(accounts, &user_ata)?;
                dest.amount = dest.amount.checked_add(amount).ok_or_else(|| rejected(PoolError::Overflow))?;

                accounts.insert(vault, layout::encode_token_account(&source));
                accounts.insert(user_ata, layout::encode_token_account(&dest));
                store_user(accounts, &record_address, &record)?;
                store_pool(accounts, &pool_address, &pool)?;
            }
            PoolInstruction::UpdatePoolConfig { config } => {
                let (authority, pool_address) = (key(0)?, key(1)?);
                let mut pool = load_pool(accounts, &pool_address)?;
                if authority != pool.pool_authority {
                    return Err(rejected(PoolError::Unauthorized));
                }
                config.validate().map_err(rejected)?;
                pool.config = config;
                store_pool(accounts, &pool_address, &pool)?;
            }
        }
        Ok(decoded)
    }
}

fn load_pool(accounts: &Accounts, address: &Pubkey) -> Result<PoolState, AgentError> {
    let data = accounts.get(address).ok_or(AgentError::AccountNotFound(*address))?;
    layout::decode_pool_state(data).map_err(|e| AgentError::decode(*address, e))
}

fn store_pool(accounts: &mut Accounts, address: &Pubkey, pool: &PoolState) -> Result<(), AgentError> {
    let data = layout::encode_pool_state(pool).map_err(|e| AgentError::decode(*address, e))?;
    accounts.insert(*address, data);
    Ok(())
}

fn store_user(
    accounts: &mut Accounts,
    address: &Pubkey,
    record: &UserStakeRecord,
) -> Result<(), AgentError> {
    let data = layout::encode_user_stake(record).map_err(|e| AgentError::decode(*address, e))?;
    accounts.insert(*address, data);
    Ok(())
}

fn load_token(accounts: &Accounts, address: &Pubkey) -> Result<TokenAccountView, AgentError> {
    let data = accounts.get(address).ok_or(AgentError::AccountNotFound(*address))?;
    layout::decode_token_account(data).map_err(|e| AgentError::decode(*address, e))
}

impl<C: Clock> Ledger for MemoryLedger<C> {
    fn operator(&self) -> Pubkey {
        self.operator
    }

    fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, AgentError> {
        Ok(self.lock()?.accounts.get(address).cloned())
    }

    fn token_accounts_for_mint(&self, mint: &Pubkey) -> Result<Vec<(Pubkey, Vec<u8>)>, AgentError> {
        let state = self.lock()?;
        Ok(state
            .token_accounts
            .iter()
            .filter_map(|key| state.accounts.get(key).map(|data| (*key, data)))
            .filter(|(_, data)| data.len() >= 32 && &data[..32] == mint.as_ref())
            .map(|(key, data)| (key, data.clone()))
            .collect())
    }

    fn submit(&self, instructions: &[Instruction]) -> Result<Signature, AgentError> {
        let mut state = self.lock()?;
        if let Some(err) = state.scripted_failures.pop_front() {
            return Err(err);
        }
        let mut scratch = state.accounts.clone();
        let mut executed = Vec::with_capacity(instructions.len());
        for (index, ix) in instructions.iter().enumerate() {
            executed.push(self.execute(&mut scratch, &state.signers, index, ix)?);
        }
        state.accounts = scratch;
        state.executed.extend(executed);
        state.sequence += 1;

        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&state.sequence.to_le_bytes());
        Ok(Signature::from(bytes))
    }
}
