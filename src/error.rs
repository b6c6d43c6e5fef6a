use std::fmt;

use solana_client::client_error::ClientError;
use solana_program::{instruction::InstructionError, program_error::ProgramError, pubkey::Pubkey};
use solana_sdk::{signature::Signature, transaction::TransactionError};

use crate::layout::DecodeError;

/// Anchor offsets user-defined error codes by this value.
pub const PROGRAM_ERROR_OFFSET: u32 = 6000;

/// Custom error codes of the voucher pool program that this agent can hit.
///
/// Discriminants are the on-ledger codes (`6000 + variant index` in the program's
/// error enum), so a `Custom(code)` from a failed transaction maps straight back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PoolError {
    /// Token balance too small for the requested transfer
    InsufficientBalance = 6016,
    /// Zero amount, below minimum, or otherwise out of bounds
    InvalidAmount = 6022,
    /// Signer is not the pool authority
    Unauthorized = 6023,
    /// Signer is not the pool delegate
    UnauthorizedDelegate = 6024,
    /// Pool is not accepting deposits
    DepositsDisabled = 6025,
    /// Pool is not accepting redemptions
    WithdrawalsDisabled = 6026,
    /// Deposit would exceed max_stake_per_user
    ExceedsMaxStake = 6027,
    /// Vault account mismatch
    InvalidVault = 6028,
    /// Token mint mismatch
    InvalidMint = 6029,
    /// Token account owner mismatch
    InvalidOwner = 6030,
    /// Arithmetic overflow
    Overflow = 6031,
    /// Division by zero (accrual against an empty pool)
    DivisionByZero = 6032,
}

impl PoolError {
    pub const ALL: [PoolError; 12] = [
        PoolError::InsufficientBalance,
        PoolError::InvalidAmount,
        PoolError::Unauthorized,
        PoolError::UnauthorizedDelegate,
        PoolError::DepositsDisabled,
        PoolError::WithdrawalsDisabled,
        PoolError::ExceedsMaxStake,
        PoolError::InvalidVault,
        PoolError::InvalidMint,
        PoolError::InvalidOwner,
        PoolError::Overflow,
        PoolError::DivisionByZero,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolError::InsufficientBalance => "insufficient_balance",
            PoolError::InvalidAmount => "invalid_amount",
            PoolError::Unauthorized => "unauthorized",
            PoolError::UnauthorizedDelegate => "unauthorized_delegate",
            PoolError::DepositsDisabled => "deposits_disabled",
            PoolError::WithdrawalsDisabled => "withdrawals_disabled",
            PoolError::ExceedsMaxStake => "exceeds_max_stake",
            PoolError::InvalidVault => "invalid_vault",
            PoolError::InvalidMint => "invalid_mint",
            PoolError::InvalidOwner => "invalid_owner",
            PoolError::Overflow => "overflow",
            PoolError::DivisionByZero => "division_by_zero",
        }
    }
}

impl From<PoolError> for ProgramError {
    fn from(e: PoolError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl std::error::Error for PoolError {}

/// SPL token program error codes surfaced through the deposit transfer.
pub const TOKEN_INSUFFICIENT_FUNDS: u32 = 1;
pub const TOKEN_OWNER_MISMATCH: u32 = 4;

/// Structured reason a submitted transaction was rejected by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRejection {
    /// The pool program refused the instruction
    Pool(PoolError),
    /// Token transfer exceeded the remaining delegation or balance.
    /// A replayed deposit of an already consumed delegation lands here.
    TokenInsufficientFunds,
    /// Delegate no longer matches (revoked or re-delegated)
    TokenOwnerMismatch,
    /// Unrecognised custom code
    Custom { instruction: u8, code: u32 },
    /// Non-instruction transaction failure (blockhash, fees, ...)
    Transaction(String),
}

impl LedgerRejection {
    pub fn classify(err: &TransactionError) -> Self {
        match err {
            TransactionError::InstructionError(index, InstructionError::Custom(code)) => {
                if let Some(pool) = PoolError::from_code(*code) {
                    LedgerRejection::Pool(pool)
                } else if *code == TOKEN_INSUFFICIENT_FUNDS {
                    LedgerRejection::TokenInsufficientFunds
                } else if *code == TOKEN_OWNER_MISMATCH {
                    LedgerRejection::TokenOwnerMismatch
                } else {
                    LedgerRejection::Custom { instruction: *index, code: *code }
                }
            }
            other => LedgerRejection::Transaction(other.to_string()),
        }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            LedgerRejection::Pool(e) => Some(e.code()),
            LedgerRejection::TokenInsufficientFunds => Some(TOKEN_INSUFFICIENT_FUNDS),
            LedgerRejection::TokenOwnerMismatch => Some(TOKEN_OWNER_MISMATCH),
            LedgerRejection::Custom { code, .. } => Some(*code),
            LedgerRejection::Transaction(_) => None,
        }
    }
}

impl fmt::Display for LedgerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerRejection::Pool(e) => write!(f, "pool program: {}", e),
            LedgerRejection::TokenInsufficientFunds => {
                write!(f, "token program: insufficient funds or delegation")
            }
            LedgerRejection::TokenOwnerMismatch => write!(f, "token program: owner/delegate mismatch"),
            LedgerRejection::Custom { instruction, code } => {
                write!(f, "instruction {} failed with custom code {}", instruction, code)
            }
            LedgerRejection::Transaction(msg) => write!(f, "transaction failed: {}", msg),
        }
    }
}

/// Agent-side failure taxonomy.
#[derive(Debug)]
pub enum AgentError {
    /// RPC timeout or network failure. Retried on the next tick.
    Rpc(String),
    /// Submitted but not confirmed in time. Outcome unknown: re-read ledger state
    /// before retrying.
    ConfirmationTimeout { signature: Signature },
    /// Ledger refused the transaction. Not retried automatically.
    Rejected(LedgerRejection),
    /// Account bytes do not match the expected layout
    Decode { account: Pubkey, source: DecodeError },
    /// Expected account does not exist
    AccountNotFound(Pubkey),
    /// Idempotency key is already Pending
    IdempotencyConflict { key: String },
    /// Idempotency or record store failure
    Store(String),
    /// Arithmetic overflow in off-chain math
    Overflow,
    /// Bad or missing configuration
    Config(String),
    /// Malformed request (HTTP body, instruction data)
    InvalidRequest(String),
    /// HTTP server failure
    Server(String),
}

impl AgentError {
    /// Whether the failure is worth retrying on the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Rpc(_))
    }

    /// Whether the ledger may or may not have applied the operation.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, AgentError::ConfirmationTimeout { .. })
    }

    pub fn decode(account: Pubkey, source: DecodeError) -> Self {
        AgentError::Decode { account, source }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Rpc(msg) => write!(f, "rpc error: {}", msg),
            AgentError::ConfirmationTimeout { signature } => {
                write!(f, "confirmation timed out for {} (outcome unknown)", signature)
            }
            AgentError::Rejected(r) => write!(f, "ledger rejected transaction: {}", r),
            AgentError::Decode { account, source } => {
                write!(f, "failed to decode account {}: {}", account, source)
            }
            AgentError::AccountNotFound(key) => write!(f, "account {} not found", key),
            AgentError::IdempotencyConflict { key } => {
                write!(f, "operation with idempotency key {} is in progress", key)
            }
            AgentError::Store(msg) => write!(f, "store error: {}", msg),
            AgentError::Overflow => write!(f, "arithmetic overflow"),
            AgentError::Config(msg) => write!(f, "configuration error: {}", msg),
            AgentError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            AgentError::Server(msg) => write!(f, "server error: {}", msg),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ClientError> for AgentError {
    fn from(err: ClientError) -> Self {
        match err.get_transaction_error() {
            Some(tx_err) => AgentError::Rejected(LedgerRejection::classify(&tx_err)),
            None => AgentError::Rpc(err.to_string()),
        }
    }
}

impl From<PoolError> for AgentError {
    fn from(e: PoolError) -> Self {
        AgentError::Rejected(LedgerRejection::Pool(e))
    }
}
