use crate::error::GatewayError;
use crate::types::{Balance, MarketSnapshot, OrderRequest, OrderResponse};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Everything the engine needs from an exchange.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Recent candles with derived indicators. `None` when the exchange returned no data.
    async fn fetch_snapshot(&self, pair: &str) -> Result<Option<MarketSnapshot>, GatewayError>;

    async fn fetch_balance(&self) -> Result<Balance, GatewayError>;

    async fn fetch_live_price(&self, pair: &str) -> Result<Decimal, GatewayError>;

    /// One submission attempt. Must not resend on its own.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError>;

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<(), GatewayError>;
}
