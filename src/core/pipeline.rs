// src/core/pipeline.rs
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::connectors::traits::ExchangeGateway;
use crate::core::shutdown::RetryTimer;
use crate::error::{GatewayError, OrderError};
use crate::types::{OrderRequest, OrderResult, Position, Side, TradeDecision};

/// Exponential backoff before retrying after failed attempt `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Slippage guard + bounded retry around order submission.
pub struct OrderPipeline {
    gateway: Arc<dyn ExchangeGateway>,
    timer: Arc<dyn RetryTimer>,
    config: ExecutionConfig,
    pair: String,
}

impl OrderPipeline {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        timer: Arc<dyn RetryTimer>,
        config: &ExecutionConfig,
        pair: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            timer,
            config: config.clone(),
            pair: pair.into(),
        }
    }

    /// Highest (BUY) or lowest (SELL) acceptable live price for an entry.
    pub fn slippage_limit(&self, entry_price: Decimal, side: Side) -> Decimal {
        let allowed = entry_price * self.config.max_slippage_fraction;
        match side {
            Side::Buy => entry_price + allowed,
            Side::Sell => entry_price - allowed,
        }
    }

    pub async fn submit(&self, decision: &TradeDecision, side: Side) -> Result<OrderResult, OrderError> {
        if !decision.valid {
            return Err(OrderError::InvalidDecision(
                decision.reason.clone().unwrap_or_else(|| "invalid decision".to_string()),
            ));
        }

        let live = self
            .gateway
            .fetch_live_price(&self.pair)
            .await
            .map_err(|e| match e {
                GatewayError::Fatal(msg) => OrderError::Rejected(msg),
                GatewayError::Transient(msg) => OrderError::ExecutionFailed {
                    attempts: 0,
                    last_error: format!("live price unavailable: {}", msg),
                },
            })?;

        let limit = self.slippage_limit(decision.entry_price, side);
        let exceeded = match side {
            Side::Buy => live > limit,
            Side::Sell => live < limit,
        };
        if exceeded {
            warn!(live = %live, limit = %limit, side = %side, "Trade rejected due to slippage");
            return Err(OrderError::SlippageExceeded { live, limit });
        }

        self.submit_with_retry(side, decision.position_size).await
    }

    /// Closing order for a position. No slippage guard: an exit is never held back by price.
    pub async fn submit_exit(&self, position: &Position) -> Result<OrderResult, OrderError> {
        self.submit_with_retry(position.side.opposite(), position.size).await
    }

    async fn submit_with_retry(&self, side: Side, size: Decimal) -> Result<OrderResult, OrderError> {
        let intent = Uuid::new_v4().simple().to_string();
        let max_attempts = self.config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if self.timer.is_cancelled() {
                return Err(OrderError::Cancelled { attempts: attempt - 1 });
            }

            let request = OrderRequest {
                pair: self.pair.clone(),
                side,
                size,
                client_order_id: format!("{}-{}", intent, attempt),
            };
            info!(
                side = %side,
                size = %size,
                pair = %self.pair,
                attempt,
                max_attempts,
                client_order_id = %request.client_order_id,
                "Submitting order"
            );

            match self.gateway.submit_order(&request).await {
                Ok(resp) => {
                    info!(order_id = %resp.id, status = %resp.status, attempt, "Order accepted");
                    return Ok(OrderResult {
                        order_id: resp.id,
                        client_order_id: request.client_order_id,
                        side,
                        size,
                        status: resp.status,
                        attempts: attempt,
                    });
                }
                Err(GatewayError::Fatal(msg)) => {
                    error!(error = %msg, attempt, "Order rejected, not retrying");
                    return Err(OrderError::Rejected(msg));
                }
                Err(GatewayError::Transient(msg)) => {
                    warn!(error = %msg, attempt, "Order attempt failed");
                    last_error = msg;
                }
            }

            if attempt < max_attempts {
                let delay = backoff_delay(self.config.retry_base_delay(), attempt);
                if !self.timer.wait(delay).await {
                    warn!(attempt, "Shutdown during retry backoff, abandoning order");
                    return Err(OrderError::Cancelled { attempts: attempt });
                }
            }
        }

        error!(attempts = max_attempts, "Order execution failed after all attempts");
        Err(OrderError::ExecutionFailed {
            attempts: max_attempts,
            last_error,
        })
    }
}
