//! Error types for the engine and its collaborators

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::PositionId;

/// Failures reported by an exchange gateway.
///
/// The split drives the order retry policy: transient failures are
/// retried with backoff, fatal ones never are.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Network-class failure (timeouts, connection resets, 5xx, rate limits)
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// Bad symbol, rejected credentials, exchange-side rule violation
    #[error("fatal gateway error: {0}")]
    Fatal(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return GatewayError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                GatewayError::Transient(err.to_string())
            }
            _ => GatewayError::Fatal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Fatal(format!("malformed exchange payload: {}", err))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// The model cannot produce a forecast; the engine treats this as HOLD
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("retraining failed: {0}")]
    TrainingFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("slippage exceeded: live price {live} beyond limit {limit}")]
    SlippageExceeded { live: Decimal, limit: Decimal },

    #[error("order execution failed after {attempts} attempts: {last_error}")]
    ExecutionFailed { attempts: u32, last_error: String },

    #[error("order rejected by exchange: {0}")]
    Rejected(String),

    #[error("order submission cancelled by shutdown after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("decision is not executable: {0}")]
    InvalidDecision(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient {asset}: need {needed}, have {available}")]
    InsufficientBalance {
        asset: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("unknown position: {0}")]
    UnknownPosition(PositionId),

    #[error("decision is not executable: {0}")]
    InvalidDecision(String),
}

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("invalid indicator window: {0}")]
    InvalidWindow(String),
}

impl From<ta::errors::TaError> for IndicatorError {
    fn from(err: ta::errors::TaError) -> Self {
        IndicatorError::InvalidWindow(format!("{:?}", err))
    }
}

/// Conditions that abort a cycle and reach the trading loop.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("state persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Fatal errors count toward the degraded-health signal.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Gateway(e) => !e.is_transient(),
            EngineError::Order(OrderError::Rejected(_))
            | EngineError::Order(OrderError::ExecutionFailed { .. }) => true,
            EngineError::Ledger(_) => true,
            _ => false,
        }
    }
}
