//! HTTP accrual preview/trigger.
//!
//! `GET /api/yield`  pool snapshot, accrual preview and `needsUpdate`.
//! `POST /api/yield` force or attempt an accrual under an idempotency key;
//! body `{"force": bool}` (optional). When an admin token is configured the
//! request must carry `Authorization: Bearer <token>`.
//!
//! Routing and handling are pure over `ApiRequest` so they are testable
//! without a socket; `serve` only adapts `tiny_http` requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::error::AgentError;
use crate::idempotency::{self, Executed, IdempotencyCoordinator, IdempotencyStore, RecordSink, Submission};
use crate::ledger::{self, Ledger};
use crate::program::PoolProgram;
use crate::scheduler::{self, AccrualOutcome, AccrualPolicy, AccrualPreview, SkipReason};
use crate::state::PoolState;

pub const YIELD_PATH: &str = "/api/yield";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub idempotency_key: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            authorization: None,
            idempotency_key: None,
            body: Vec::new(),
        }
    }

    pub fn post(path: &str, body: &str) -> Self {
        Self { method: Method::Post, body: body.as_bytes().to_vec(), ..Self::get(path) }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, error: &str, message: impl Into<String>) -> Self {
        Self { status, body: json!({ "error": error, "message": message.into() }) }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TriggerBody {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolSnapshot {
    address: String,
    total_staked: u64,
    total_yield_earned: u64,
    total_stakers: u64,
    /// Decimal string; exceeds JSON number precision
    reward_index: String,
    last_yield_update: i64,
    apy_basis_points: u16,
    deposits_enabled: bool,
    withdrawals_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewBody {
    elapsed_seconds: u64,
    remaining_seconds: u64,
    apy_basis_points: u16,
    projected_yield: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    pool: PoolSnapshot,
    preview: PreviewBody,
    needs_update: bool,
    now: i64,
}

fn snapshot(address: String, pool: &PoolState) -> PoolSnapshot {
    PoolSnapshot {
        address,
        total_staked: pool.total_staked,
        total_yield_earned: pool.total_yield_earned,
        total_stakers: pool.total_stakers,
        reward_index: pool.reward_index.to_string(),
        last_yield_update: pool.last_yield_update,
        apy_basis_points: pool.config.apy_basis_points,
        deposits_enabled: pool.config.deposits_enabled,
        withdrawals_enabled: pool.config.withdrawals_enabled,
    }
}

fn skip_body(reason: &SkipReason) -> Value {
    let mut body = json!({ "status": "skipped", "reason": reason.as_str() });
    if let SkipReason::NotEnoughTime { elapsed_secs, remaining_secs } = reason {
        body["elapsedSeconds"] = json!(elapsed_secs);
        body["remainingSeconds"] = json!(remaining_secs);
    }
    body
}

/// Map an agent error onto a structured HTTP failure.
pub fn error_response(err: &AgentError) -> ApiResponse {
    match err {
        AgentError::IdempotencyConflict { key } => ApiResponse {
            status: 409,
            body: json!({ "error": "in_progress", "key": key, "message": err.to_string() }),
        },
        AgentError::Rejected(rejection) => ApiResponse {
            status: 422,
            body: json!({ "error": "rejected", "code": rejection.code(), "message": rejection.to_string() }),
        },
        AgentError::ConfirmationTimeout { signature } => ApiResponse {
            status: 504,
            body: json!({ "error": "outcome_unknown", "signature": signature.to_string(), "message": err.to_string() }),
        },
        AgentError::Rpc(_) => ApiResponse::error(502, "rpc_unavailable", err.to_string()),
        AgentError::AccountNotFound(_) => ApiResponse::error(404, "pool_not_found", err.to_string()),
        AgentError::InvalidRequest(_) => ApiResponse::error(400, "invalid_request", err.to_string()),
        AgentError::Decode { .. } => ApiResponse::error(500, "decode_error", err.to_string()),
        _ => ApiResponse::error(500, "internal", err.to_string()),
    }
}

pub struct YieldApi<L, C, S, R>
where
    L: Ledger,
    C: Clock + Clone,
    S: IdempotencyStore,
    R: RecordSink,
{
    ledger: L,
    clock: C,
    program: PoolProgram,
    policy: AccrualPolicy,
    admin_token: Option<String>,
    coordinator: IdempotencyCoordinator<S, C>,
    sink: R,
}

impl<L, C, S, R> YieldApi<L, C, S, R>
where
    L: Ledger,
    C: Clock + Clone,
    S: IdempotencyStore,
    R: RecordSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: L,
        clock: C,
        program: PoolProgram,
        policy: AccrualPolicy,
        admin_token: Option<String>,
        store: S,
        sink: R,
        pending_ttl_secs: u64,
    ) -> Self {
        let coordinator = IdempotencyCoordinator::new(store, clock.clone(), pending_ttl_secs);
        Self { ledger, clock, program, policy, admin_token, coordinator, sink }
    }

    pub fn handle(&self, req: &ApiRequest) -> ApiResponse {
        let path = req.path.split('?').next().unwrap_or("");
        if path != YIELD_PATH {
            return ApiResponse::error(404, "not_found", format!("no route for {}", path));
        }
        let result = match req.method {
            Method::Get => self.status(),
            Method::Post => self.trigger(req),
            Method::Other => return ApiResponse::error(405, "method_not_allowed", "use GET or POST"),
        };
        result.unwrap_or_else(|e| {
            warn!("Request failed: path={} error={}", path, e);
            error_response(&e)
        })
    }

    fn status(&self) -> Result<ApiResponse, AgentError> {
        let pool = ledger::fetch_pool_state(&self.ledger, &self.program.pool_state)?;
        let now = self.clock.unix_timestamp();
        let AccrualPreview { elapsed_secs, remaining_secs, apy_basis_points, projected_yield, needs_update } =
            self.policy.preview(&pool, now)?;
        let body = StatusBody {
            pool: snapshot(self.program.pool_state.to_string(), &pool),
            preview: PreviewBody {
                elapsed_seconds: elapsed_secs,
                remaining_seconds: remaining_secs,
                apy_basis_points,
                projected_yield,
            },
            needs_update,
            now,
        };
        let body = serde_json::to_value(body).map_err(|e| AgentError::Server(e.to_string()))?;
        Ok(ApiResponse::ok(body))
    }

    fn authorized(&self, req: &ApiRequest) -> bool {
        match &self.admin_token {
            None => true,
            Some(token) => req
                .authorization
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|presented| presented.trim() == token)
                .unwrap_or(false),
        }
    }

    fn trigger(&self, req: &ApiRequest) -> Result<ApiResponse, AgentError> {
        if !self.authorized(req) {
            return Ok(ApiResponse::error(401, "unauthorized", "missing or invalid admin token"));
        }
        let body: TriggerBody = if req.body.iter().all(u8::is_ascii_whitespace) {
            TriggerBody::default()
        } else {
            serde_json::from_slice(&req.body).map_err(|e| AgentError::InvalidRequest(e.to_string()))?
        };

        let key = match req.idempotency_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => k.to_string(),
            None => {
                // Same pool, same last accrual, same intent: same key
                let pool = ledger::fetch_pool_state(&self.ledger, &self.program.pool_state)?;
                let mut payload = self.program.pool_state.to_bytes().to_vec();
                payload.extend_from_slice(&pool.last_yield_update.to_le_bytes());
                payload.push(body.force as u8);
                idempotency::derive_key("record_yield", &payload)
            }
        };
        debug!("Accrual trigger: key={} force={}", key, body.force);

        let executed = self.coordinator.execute(
            &key,
            || {
                let outcome =
                    scheduler::attempt_accrual(&self.ledger, &self.clock, &self.program, &self.policy, body.force)?;
                Ok(match outcome {
                    AccrualOutcome::Submitted { signature, .. } => {
                        Submission::Landed { tx_signature: signature.to_string(), value: outcome }
                    }
                    AccrualOutcome::Skipped(_) => Submission::NoEffect(outcome),
                })
            },
            |tx_signature, outcome| {
                let amount = match outcome {
                    AccrualOutcome::Submitted { amount, .. } => *amount,
                    AccrualOutcome::Skipped(_) => 0,
                };
                self.sink.insert(
                    "yield_accrual",
                    tx_signature,
                    &json!({ "pool": self.program.pool_state.to_string(), "amount": amount, "force": body.force }),
                )
            },
        )?;

        let body = match executed {
            Executed::Completed { tx_signature, db_record_id, value } => {
                let amount = match value {
                    AccrualOutcome::Submitted { amount, .. } => amount,
                    AccrualOutcome::Skipped(_) => 0,
                };
                json!({
                    "status": "submitted",
                    "amount": amount,
                    "signature": tx_signature,
                    "recordId": db_record_id,
                    "idempotencyKey": key,
                })
            }
            Executed::Replayed { tx_signature, db_record_id, result } => {
                let amount = result.as_ref().and_then(|r| r.get("amount")).cloned().unwrap_or(Value::Null);
                json!({
                    "status": "submitted",
                    "replayed": true,
                    "amount": amount,
                    "signature": tx_signature,
                    "recordId": db_record_id,
                    "idempotencyKey": key,
                })
            }
            Executed::NoEffect(AccrualOutcome::Skipped(reason)) => skip_body(&reason),
            Executed::NoEffect(AccrualOutcome::Submitted { .. }) => {
                return Err(AgentError::Server("submitted accrual reported as no-op".into()));
            }
        };
        Ok(ApiResponse::ok(body))
    }
}

/// Whole request body, or a 400 when it cannot be read in full.
fn read_body(reader: &mut dyn std::io::Read) -> Result<Vec<u8>, ApiResponse> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body).map_err(|e| {
        warn!("Failed to read request body: {}", e);
        ApiResponse::error(400, "invalid_request", format!("unreadable request body: {}", e))
    })?;
    Ok(body)
}

fn to_method(m: &tiny_http::Method) -> Method {
    match m {
        tiny_http::Method::Get => Method::Get,
        tiny_http::Method::Post => Method::Post,
        _ => Method::Other,
    }
}

fn header(req: &tiny_http::Request, name: &'static str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

/// Serve until `stop` is set. One request at a time.
pub fn serve<L, C, S, R>(api: &YieldApi<L, C, S, R>, bind: &str, stop: &AtomicBool) -> Result<(), AgentError>
where
    L: Ledger,
    C: Clock + Clone,
    S: IdempotencyStore,
    R: RecordSink,
{
    let server = tiny_http::Server::http(bind).map_err(|e| AgentError::Server(format!("bind {}: {}", bind, e)))?;
    info!("HTTP server listening: bind={} path={}", bind, YIELD_PATH);

    while !stop.load(Ordering::Relaxed) {
        let mut request = match server.recv_timeout(Duration::from_millis(500)) {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                error!("HTTP receive failed: {}", e);
                continue;
            }
        };
        let method = to_method(request.method());
        let path = request.url().to_string();
        let response = match read_body(request.as_reader()) {
            Ok(body) => api.handle(&ApiRequest {
                method,
                path: path.clone(),
                authorization: header(&request, "Authorization"),
                idempotency_key: header(&request, IDEMPOTENCY_HEADER),
                body,
            }),
            Err(response) => response,
        };
        debug!("HTTP {:?} {} -> {}", method, path, response.status);

        let mut http_response =
            tiny_http::Response::from_string(response.body.to_string()).with_status_code(response.status);
        if let Ok(h) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            http_response = http_response.with_header(h);
        }
        if let Err(e) = request.respond(http_response) {
            warn!("Failed to send response: {}", e);
        }
    }
    info!("HTTP server stopped");
    Ok(())
}
