//! Budget Governor — token/cost/call/time accounting and reservation.
//!
//! Owns the `BudgetLedger`. Every root or sub-call goes through
//! reserve → commit (or release on failure), so the ledger only ever grows:
//! reservations provisionally debit the ledger, `commit` reconciles the
//! provisional debit against actuals, `release` returns it unspent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::BudgetAxis;

/// Per-model `(price_per_input_token, price_per_output_token)`.
pub type ModelPricing = HashMap<String, (f64, f64)>;

/// Immutable caps for a session's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_session_tokens: u64,
    pub max_session_usd: f64,
    pub max_root_calls: u32,
    pub max_sub_calls: u32,
    pub session_timeout_seconds: u64,
    /// Fallback estimator: characters per token.
    pub chars_per_token: f64,
    #[serde(default)]
    pub model_pricing: ModelPricing,
    /// Fallback pricing used when `model_pricing` has no entry for the
    /// requested model id.
    #[serde(default)]
    pub default_pricing: Option<(f64, f64)>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_session_tokens: 200_000,
            max_session_usd: 5.0,
            max_root_calls: 50,
            max_sub_calls: 20,
            session_timeout_seconds: 300,
            chars_per_token: 4.0,
            model_pricing: HashMap::new(),
            default_pricing: None,
        }
    }
}

impl BudgetConfig {
    /// Default allocation for sub-LLM calls: a deliberately stricter
    /// fraction of the root caps (see DESIGN.md Open Question #1).
    pub fn default_sub_budget() -> Self {
        Self {
            max_session_tokens: 20_000,
            max_session_usd: 0.5,
            max_root_calls: 10,
            max_sub_calls: 10,
            session_timeout_seconds: 60,
            chars_per_token: 4.0,
            model_pricing: HashMap::new(),
            default_pricing: None,
        }
    }

    /// Critical validation: any cap <= 0 is a configuration error. Returns
    /// the name of the first offending field, if any.
    pub fn first_invalid_field(&self) -> Option<&'static str> {
        if self.max_session_tokens == 0 {
            return Some("budget.max_session_tokens");
        }
        if self.max_session_usd <= 0.0 {
            return Some("budget.max_session_usd");
        }
        if self.max_root_calls == 0 {
            return Some("budget.max_root_calls");
        }
        if self.max_sub_calls == 0 {
            return Some("budget.max_sub_calls");
        }
        if self.session_timeout_seconds == 0 {
            return Some("budget.session_timeout_seconds");
        }
        if self.chars_per_token <= 0.0 {
            return Some("budget.chars_per_token");
        }
        None
    }

    /// Deterministic input-token estimate: `ceil(len(text) / chars_per_token)`.
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u64
    }
}

/// Mutable accounting state. Single-threaded owner: the session loop (via
/// `BudgetGovernor`).
#[derive(Debug, Clone, Default)]
pub struct BudgetLedger {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub dollars: f64,
    pub calls_root: u32,
    pub calls_sub: u32,
}

impl BudgetLedger {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// A read-only snapshot of the ledger plus elapsed time, returned by
/// `snapshot()` and placed in the terminal `RLMResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub tokens: u64,
    pub dollars: f64,
    pub calls_root: u32,
    pub calls_sub: u32,
    pub elapsed_ms: u64,
}

/// Which side of the governor issued a reservation. Sub-call reservations
/// are checked against `max_sub_calls`/the sub-budget's own token/usd caps
/// instead of the root's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationKind {
    Root,
    Sub,
}

/// A provisional debit against the ledger. Must be resolved by exactly one
/// of `commit`/`release`.
#[derive(Debug, Clone)]
pub struct Reservation {
    kind: ReservationKind,
    estimated_tokens: u64,
    /// The floor applied when reserving (`max(estimated_tokens, min_reserve)`).
    reserved_tokens: u64,
}

/// A cap was reached; the session loop must terminate with this reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt(pub BudgetAxis);

/// Minimum tokens reserved per call regardless of estimate, so a
/// pathologically small estimate can't starve the accounting of headroom
/// for the eventual actual usage.
const MIN_RESERVE_TOKENS: u64 = 64;

/// Owns the ledger and enforces the reserve/commit/release protocol.
pub struct BudgetGovernor {
    root_config: BudgetConfig,
    sub_config: BudgetConfig,
    ledger: BudgetLedger,
    start: Instant,
}

impl BudgetGovernor {
    pub fn new(root_config: BudgetConfig, sub_config: BudgetConfig) -> Self {
        Self {
            root_config,
            sub_config,
            ledger: BudgetLedger::default(),
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn check_timeout(&self) -> Option<Halt> {
        if self.elapsed().as_secs() >= self.root_config.session_timeout_seconds {
            Some(Halt(BudgetAxis::Timeout))
        } else {
            None
        }
    }

    /// Reserve tokens for a root-model call.
    pub fn reserve_root(&mut self, estimated_tokens: u64) -> Result<Reservation, Halt> {
        if let Some(h) = self.check_timeout() {
            return Err(h);
        }
        if self.ledger.calls_root >= self.root_config.max_root_calls {
            return Err(Halt(BudgetAxis::RootCalls));
        }
        let reserved = estimated_tokens.max(MIN_RESERVE_TOKENS);
        if self.ledger.total_tokens() + reserved > self.root_config.max_session_tokens {
            return Err(Halt(BudgetAxis::Tokens));
        }
        self.ledger.tokens_in += reserved;
        Ok(Reservation {
            kind: ReservationKind::Root,
            estimated_tokens,
            reserved_tokens: reserved,
        })
    }

    /// Reserve tokens for a sub-LLM call, checked against the stricter
    /// sub-budget rather than the root caps.
    pub fn reserve_sub(&mut self, estimated_tokens: u64) -> Result<Reservation, Halt> {
        if let Some(h) = self.check_timeout() {
            return Err(h);
        }
        if self.ledger.calls_sub >= self.sub_config.max_root_calls.max(self.sub_config.max_sub_calls)
        {
            return Err(Halt(BudgetAxis::SubCalls));
        }
        let reserved = estimated_tokens.max(MIN_RESERVE_TOKENS);
        if reserved > self.sub_config.max_session_tokens {
            return Err(Halt(BudgetAxis::Tokens));
        }
        self.ledger.tokens_in += reserved;
        Ok(Reservation {
            kind: ReservationKind::Sub,
            estimated_tokens,
            reserved_tokens: reserved,
        })
    }

    /// Reconcile a reservation with actual usage, converting tokens to
    /// dollars via `pricing[model_id]` (falling back to `default_pricing`,
    /// then zero with a warning).
    pub fn commit(
        &mut self,
        reservation: Reservation,
        actual_in: u64,
        actual_out: u64,
        model_id: &str,
    ) -> Result<(), Halt> {
        // Undo the provisional estimate, then apply the real figures.
        self.ledger.tokens_in = self
            .ledger
            .tokens_in
            .saturating_sub(reservation.reserved_tokens);
        self.ledger.tokens_in += actual_in;
        self.ledger.tokens_out += actual_out;

        let config = match reservation.kind {
            ReservationKind::Root => &self.root_config,
            ReservationKind::Sub => &self.sub_config,
        };

        let (price_in, price_out) = config
            .model_pricing
            .get(model_id)
            .copied()
            .or(config.default_pricing)
            .unwrap_or_else(|| {
                tracing::warn!(model = model_id, "no pricing entry; cost contribution is zero");
                (0.0, 0.0)
            });
        let cost = price_in * actual_in as f64 + price_out * actual_out as f64;
        self.ledger.dollars += cost;

        match reservation.kind {
            ReservationKind::Root => self.ledger.calls_root += 1,
            ReservationKind::Sub => self.ledger.calls_sub += 1,
        }

        if self.ledger.dollars > self.root_config.max_session_usd {
            return Err(Halt(BudgetAxis::Usd));
        }
        if self.ledger.total_tokens() > self.root_config.max_session_tokens {
            return Err(Halt(BudgetAxis::Tokens));
        }
        if let Some(h) = self.check_timeout() {
            return Err(h);
        }
        Ok(())
    }

    /// Return a reservation's provisional debit unspent, e.g. on failure
    /// before a commit could be issued.
    pub fn release(&mut self, reservation: Reservation) {
        self.ledger.tokens_in = self
            .ledger
            .tokens_in
            .saturating_sub(reservation.reserved_tokens);
        let _ = reservation.estimated_tokens;
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            tokens: self.ledger.total_tokens(),
            dollars: self.ledger.dollars,
            calls_root: self.ledger.calls_root,
            calls_sub: self.ledger.calls_sub,
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn estimate_root_tokens(&self, text: &str) -> u64 {
        self.root_config.estimate_tokens(text)
    }

    pub fn estimate_sub_tokens(&self, text: &str) -> u64 {
        self.sub_config.estimate_tokens(text)
    }
}
