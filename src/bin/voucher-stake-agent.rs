//! Process entry for the voucher stake agent.
//!
//! Usage: voucher-stake-agent <command> [--force]
//!
//!   accrue-once   One accrual check, submit if due (`--force` skips the interval)
//!   scheduler     Accrual check every YIELD_POLL_SECONDS
//!   scan-once     One delegation scan
//!   scanner       Delegation scan every SCAN_INTERVAL_SECONDS
//!   serve         HTTP preview/trigger on HTTP_BIND

use std::env;
use std::process;
use std::sync::atomic::AtomicBool;

use log::{error, info, warn};
use solana_sdk::signature::Signer;

use voucher_stake_agent::clock::SystemClock;
use voucher_stake_agent::config::AgentConfig;
use voucher_stake_agent::deposit::{DepositAgent, DepositResult};
use voucher_stake_agent::error::AgentError;
use voucher_stake_agent::idempotency::{MemoryRecordSink, MemoryStore};
use voucher_stake_agent::ledger::RpcLedger;
use voucher_stake_agent::scheduler::{AccrualOutcome, AccrualScheduler};
use voucher_stake_agent::server::{self, YieldApi};

const USAGE: &str = "usage: voucher-stake-agent <accrue-once [--force] | scheduler | scan-once | scanner | serve>";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

fn connect(config: &AgentConfig) -> Result<RpcLedger, AgentError> {
    let operator = config.load_operator()?;
    info!(
        "Connecting: rpc={} program={} operator={}",
        config.rpc_url,
        config.program_id,
        operator.pubkey()
    );
    Ok(RpcLedger::new(&config.rpc_url, operator, config.confirm_timeout))
}

fn run() -> Result<(), AgentError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");
    let force = args.iter().skip(1).any(|a| a == "--force");

    if matches!(command, "" | "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = AgentConfig::from_env()?;
    let program = config.program();
    let policy = config.accrual_policy()?;
    // Runs until the process is terminated.
    let stop = AtomicBool::new(false);

    match command {
        "accrue-once" => {
            let mut scheduler =
                AccrualScheduler::new(connect(&config)?, SystemClock, program, policy, config.poll_interval);
            match scheduler.run_once(force)? {
                AccrualOutcome::Submitted { amount, signature } => {
                    println!("submitted amount={} signature={}", amount, signature)
                }
                AccrualOutcome::Skipped(reason) => println!("skipped reason={:?}", reason),
            }
        }
        "scheduler" => {
            let mut scheduler =
                AccrualScheduler::new(connect(&config)?, SystemClock, program, policy, config.poll_interval);
            scheduler.run(&stop);
        }
        "scan-once" => {
            let mut agent = DepositAgent::new(connect(&config)?, program, config.voucher_mint);
            let report = agent.scan()?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    DepositResult::Deposited { amount, signature } => {
                        println!("deposited user={} amount={} signature={}", outcome.user, amount, signature)
                    }
                    DepositResult::Skipped(reason) => println!("skipped user={} reason={:?}", outcome.user, reason),
                    DepositResult::Failed(e) => println!("failed user={} error={}", outcome.user, e),
                }
            }
        }
        "scanner" => {
            let mut agent = DepositAgent::new(connect(&config)?, program, config.voucher_mint);
            agent.run(config.scan_interval, &stop);
        }
        "serve" => {
            warn!("Idempotency keys and accrual records are held in memory and lost on restart");
            let api = YieldApi::new(
                connect(&config)?,
                SystemClock,
                program,
                policy,
                config.admin_token.clone(),
                MemoryStore::new(),
                MemoryRecordSink::new(),
                config.pending_ttl_secs,
            );
            server::serve(&api, &config.http_bind, &stop)?;
        }
        other => {
            return Err(AgentError::Config(format!("unknown command {}; {}", other, USAGE)));
        }
    }
    Ok(())
}
