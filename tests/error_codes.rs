//! Error code uniqueness and mapping tests.

use solana_program::instruction::InstructionError;
use solana_program::program_error::ProgramError;
use solana_sdk::transaction::TransactionError;
use voucher_stake_agent::error::{AgentError, LedgerRejection, PoolError, PROGRAM_ERROR_OFFSET};

#[test]
fn test_all_error_codes_unique() {
    let mut codes: Vec<u32> = PoolError::ALL.iter().map(|e| e.code()).collect();
    let n = codes.len();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), n, "Duplicate error codes detected!");
}

#[test]
fn test_codes_in_program_range() {
    for e in PoolError::ALL {
        assert!(e.code() >= PROGRAM_ERROR_OFFSET, "{:?} below program offset", e);
    }
}

#[test]
fn test_known_program_codes() {
    // Program error enum index + 6000
    assert_eq!(PoolError::InsufficientBalance.code(), 6016);
    assert_eq!(PoolError::InvalidAmount.code(), 6022);
    assert_eq!(PoolError::ExceedsMaxStake.code(), 6027);
    assert_eq!(PoolError::DivisionByZero.code(), 6032);
}

#[test]
fn test_from_code_roundtrips_every_variant() {
    for e in PoolError::ALL {
        assert_eq!(PoolError::from_code(e.code()), Some(e));
    }
    assert_eq!(PoolError::from_code(6000), None);
    assert_eq!(PoolError::from_code(0), None);
}

#[test]
fn test_error_to_program_error() {
    let pe: ProgramError = PoolError::Unauthorized.into();
    assert_eq!(pe, ProgramError::Custom(6023));
}

#[test]
fn test_names_unique() {
    let mut names: Vec<&str> = PoolError::ALL.iter().map(|e| e.as_str()).collect();
    let n = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), n);
}

// ── Ledger rejection classification ──

fn custom(index: u8, code: u32) -> TransactionError {
    TransactionError::InstructionError(index, InstructionError::Custom(code))
}

#[test]
fn test_classify_pool_error() {
    assert_eq!(
        LedgerRejection::classify(&custom(0, 6027)),
        LedgerRejection::Pool(PoolError::ExceedsMaxStake)
    );
}

#[test]
fn test_classify_consumed_delegation() {
    assert_eq!(LedgerRejection::classify(&custom(0, 1)), LedgerRejection::TokenInsufficientFunds);
    assert_eq!(LedgerRejection::classify(&custom(0, 4)), LedgerRejection::TokenOwnerMismatch);
}

#[test]
fn test_classify_unknown_custom() {
    assert_eq!(
        LedgerRejection::classify(&custom(2, 9999)),
        LedgerRejection::Custom { instruction: 2, code: 9999 }
    );
}

#[test]
fn test_classify_transaction_level() {
    let r = LedgerRejection::classify(&TransactionError::BlockhashNotFound);
    assert!(matches!(r, LedgerRejection::Transaction(_)));
    assert_eq!(r.code(), None);
}

#[test]
fn test_agent_error_retry_classes() {
    assert!(AgentError::Rpc("timeout".into()).is_transient());
    assert!(!AgentError::from(PoolError::Unauthorized).is_transient());
    assert!(!AgentError::IdempotencyConflict { key: "k".into() }.is_transient());
    let timeout = AgentError::ConfirmationTimeout { signature: Default::default() };
    assert!(timeout.is_outcome_unknown());
    assert!(!timeout.is_transient());
}
