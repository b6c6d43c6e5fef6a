//! Voucher Stake Agent
//!
//! Off-chain operator for the voucher staking pool program. Users delegate
//! voucher tokens to the pool's operating key; this agent consumes those
//! delegations into the vault, records pool-wide yield on a fixed cadence, and
//! reconciles ledger transactions with off-chain records exactly once.
//!
//! Architecture:
//! - `layout` decodes PoolState / UserStakeRecord from explicit offset tables
//! - `math` + `rewards` mirror the program's yield and reward-index arithmetic
//! - `scheduler` decides skip-vs-submit for `recordYield` (Idle/Submitting)
//! - `deposit` scans delegations and submits `depositVoucher` per user
//! - `idempotency` guards ledger + record writes with Pending/Completed/Failed keys
//! - `ledger` is the only I/O seam: `RpcLedger` for a cluster, `MemoryLedger`
//!   executes the same instructions in-process
//!
//! Instructions consumed (8-byte Anchor discriminators):
//!   initialize_pool:    Create the pool state with a validated config
//!   deposit_voucher:    Delegate moves user vouchers into the vault
//!   record_yield:       Delegate distributes yield through the reward index
//!   redeem_voucher:     User withdraws principal, yield settled
//!   update_pool_config: Authority replaces the pool config

pub mod clock;
pub mod config;
pub mod deposit;
pub mod error;
pub mod idempotency;
pub mod instruction;
pub mod layout;
pub mod ledger;
pub mod math;
pub mod program;
pub mod rewards;
pub mod scheduler;
pub mod server;
pub mod state;
