//! Environment configuration, read and validated once at start-up.

use std::str::FromStr;
use std::time::Duration;

use solana_program::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};

use crate::error::AgentError;
use crate::math::{YearBasis, BASIS_POINTS_DENOMINATOR};
use crate::program::{PoolProgram, DEFAULT_PROGRAM_ID};
use crate::scheduler::{AccrualPolicy, SECONDS_PER_HOUR};

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 6;
pub const DEFAULT_POLL_SECONDS: u64 = 300;
pub const DEFAULT_CONFIRM_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_SCAN_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_PENDING_TTL_SECONDS: u64 = 900;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub rpc_url: String,
    pub program_id: Pubkey,
    /// Keypair file path or inline JSON byte array
    pub operator_keypair: Option<String>,
    pub voucher_mint: Option<Pubkey>,
    pub check_interval_hours: u64,
    pub poll_interval: Duration,
    pub apy_override: Option<u16>,
    pub year_basis: YearBasis,
    pub admin_token: Option<String>,
    pub http_bind: String,
    pub confirm_timeout: Duration,
    pub scan_interval: Duration,
    pub pending_ttl_secs: u64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let program_id = match get("POOL_PROGRAM_ID") {
            Some(v) => parse_pubkey("POOL_PROGRAM_ID", &v)?,
            None => DEFAULT_PROGRAM_ID,
        };
        let voucher_mint = get("VOUCHER_MINT")
            .map(|v| parse_pubkey("VOUCHER_MINT", &v))
            .transpose()?;
        let check_interval_hours = parse_or("YIELD_CHECK_INTERVAL_HOURS", get("YIELD_CHECK_INTERVAL_HOURS"), DEFAULT_CHECK_INTERVAL_HOURS)?;
        let poll_seconds = parse_or("YIELD_POLL_SECONDS", get("YIELD_POLL_SECONDS"), DEFAULT_POLL_SECONDS)?;
        let apy_override = get("YIELD_APY_BASIS_POINTS")
            .map(|v| parse::<u16>("YIELD_APY_BASIS_POINTS", &v))
            .transpose()?;
        let year_basis = match get("YIELD_YEAR_BASIS") {
            Some(v) => YearBasis::parse(&v).ok_or_else(|| {
                AgentError::Config(format!("YIELD_YEAR_BASIS: expected julian or calendar, got {}", v))
            })?,
            None => YearBasis::default(),
        };
        let confirm_seconds = parse_or("CONFIRM_TIMEOUT_SECONDS", get("CONFIRM_TIMEOUT_SECONDS"), DEFAULT_CONFIRM_TIMEOUT_SECONDS)?;
        let scan_seconds = parse_or("SCAN_INTERVAL_SECONDS", get("SCAN_INTERVAL_SECONDS"), DEFAULT_SCAN_INTERVAL_SECONDS)?;
        let pending_ttl_secs = parse_or(
            "IDEMPOTENCY_PENDING_TTL_SECONDS",
            get("IDEMPOTENCY_PENDING_TTL_SECONDS"),
            DEFAULT_PENDING_TTL_SECONDS,
        )?;

        let config = Self {
            rpc_url: get("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            program_id,
            operator_keypair: get("OPERATOR_KEYPAIR"),
            voucher_mint,
            check_interval_hours,
            poll_interval: Duration::from_secs(poll_seconds),
            apy_override,
            year_basis,
            admin_token: get("ADMIN_TOKEN"),
            http_bind: get("HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string()),
            confirm_timeout: Duration::from_secs(confirm_seconds),
            scan_interval: Duration::from_secs(scan_seconds),
            pending_ttl_secs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.check_interval_hours == 0 {
            return Err(AgentError::Config("YIELD_CHECK_INTERVAL_HOURS must be > 0".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(AgentError::Config("YIELD_POLL_SECONDS must be > 0".into()));
        }
        if self.scan_interval.is_zero() {
            return Err(AgentError::Config("SCAN_INTERVAL_SECONDS must be > 0".into()));
        }
        if self.pending_ttl_secs == 0 {
            return Err(AgentError::Config("IDEMPOTENCY_PENDING_TTL_SECONDS must be > 0".into()));
        }
        if self.confirm_timeout.is_zero() {
            return Err(AgentError::Config("CONFIRM_TIMEOUT_SECONDS must be > 0".into()));
        }
        if let Some(apy) = self.apy_override {
            if apy as u64 > BASIS_POINTS_DENOMINATOR {
                return Err(AgentError::Config(format!(
                    "YIELD_APY_BASIS_POINTS must be <= {}, got {}",
                    BASIS_POINTS_DENOMINATOR, apy
                )));
            }
        }
        Ok(())
    }

    pub fn program(&self) -> PoolProgram {
        PoolProgram::new(self.program_id)
    }

    pub fn accrual_policy(&self) -> Result<AccrualPolicy, AgentError> {
        let interval_secs = self
            .check_interval_hours
            .checked_mul(SECONDS_PER_HOUR)
            .ok_or_else(|| AgentError::Config("YIELD_CHECK_INTERVAL_HOURS too large".into()))?;
        Ok(AccrualPolicy {
            interval_secs,
            apy_override: self.apy_override,
            year_basis: self.year_basis,
        })
    }

    /// Load the operating keypair. Required for every write path.
    pub fn load_operator(&self) -> Result<Keypair, AgentError> {
        let source = self
            .operator_keypair
            .as_deref()
            .ok_or_else(|| AgentError::Config("OPERATOR_KEYPAIR is not set".into()))?;
        load_keypair(source)
    }
}

/// Keypair from an inline JSON byte array (`[12,34,...]`) or a keypair file.
pub fn load_keypair(source: &str) -> Result<Keypair, AgentError> {
    if source.trim_start().starts_with('[') {
        let bytes: Vec<u8> = serde_json::from_str(source)
            .map_err(|e| AgentError::Config(format!("OPERATOR_KEYPAIR: invalid byte array: {}", e)))?;
        #[allow(deprecated)]
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| AgentError::Config(format!("OPERATOR_KEYPAIR: invalid keypair bytes: {}", e)))?;
        return Ok(keypair);
    }
    read_keypair_file(source)
        .map_err(|e| AgentError::Config(format!("OPERATOR_KEYPAIR: cannot read {}: {}", source, e)))
}

fn parse_pubkey(name: &str, value: &str) -> Result<Pubkey, AgentError> {
    Pubkey::from_str(value).map_err(|e| AgentError::Config(format!("{}: invalid pubkey {}: {}", name, value, e)))
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, AgentError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| AgentError::Config(format!("{}: invalid value {}: {}", name, value, e)))
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, AgentError>
where
    T::Err: std::fmt::Display,
{
    value.map(|v| parse(name, &v)).transpose().map(|v| v.unwrap_or(default))
}
