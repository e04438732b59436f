// src/connectors/spot.rs
use crate::config::ExchangeConfig;
use crate::connectors::messages::{parse_kline, AccountInfo, ApiErrorBody, OrderAck, TickerPrice};
use crate::connectors::traits::ExchangeGateway;
use crate::core::indicators::IndicatorSettings;
use crate::error::GatewayError;
use crate::types::{Balance, Candle, MarketSnapshot, OrderRequest, OrderResponse, Side};
use crate::utils::precision::normalize_quantity;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Signed REST client for spot v3 style exchanges.
///
/// With `live_trading = false` it reads real market data but simulates
/// order placement and reports the configured paper balance.
pub struct SpotClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: Url,
    config: ExchangeConfig,
    indicators: IndicatorSettings,
}

impl SpotClient {
    pub fn new(config: &ExchangeConfig, indicators: IndicatorSettings) -> Result<Self, GatewayError> {
        let base_rest_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Fatal(format!("invalid base url {}: {}", config.base_url, e)))?;
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GatewayError::Fatal(format!("http client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            http_client,
            base_rest_url,
            config: config.clone(),
            indicators,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_rest_url
            .join(path)
            .map_err(|e| GatewayError::Fatal(format!("bad endpoint {}: {}", path, e)))
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String, GatewayError> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)
            .map_err(|e| GatewayError::Fatal(format!("query encoding: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| GatewayError::Fatal("Invalid secret key length".to_string()))?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, GatewayError> {
        let mut url = self.endpoint(path)?;
        url.set_query(Some(&self.sign_and_build_query(params)?));

        let response = self
            .http_client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("X-MEXC-APIKEY", &self.api_key)
            .send()
            .await?;

        read_json(response).await
    }

    async fn send_public_request<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let url = self.endpoint(path)?;
        let response = self.http_client.get(url).query(params).send().await?;
        read_json(response).await
    }

    async fn fetch_candles(&self, pair: &str) -> Result<Vec<Candle>, GatewayError> {
        let rows: Vec<Vec<Value>> = self
            .send_public_request(
                "/api/v3/klines",
                &[
                    ("symbol", pair.to_string()),
                    ("interval", self.config.kline_interval.clone()),
                    ("limit", self.config.kline_limit.to_string()),
                ],
            )
            .await?;

        let candles: Vec<Candle> = rows.iter().filter_map(|row| parse_kline(row)).collect();
        if candles.len() != rows.len() {
            warn!(
                dropped = rows.len() - candles.len(),
                "Skipped malformed kline rows for {}", pair
            );
        }
        Ok(candles)
    }
}

/// Maps HTTP status + exchange error body onto transient / fatal.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => format!("{} (code {}): {}", status, err.code, err.msg),
        Err(_) => format!("{}: {}", status, body),
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.as_u16() == 418
    {
        Err(GatewayError::Transient(detail))
    } else {
        Err(GatewayError::Fatal(detail))
    }
}

#[async_trait]
impl ExchangeGateway for SpotClient {
    async fn fetch_snapshot(&self, pair: &str) -> Result<Option<MarketSnapshot>, GatewayError> {
        debug!("Fetching market data for {}", pair);
        let candles = self.fetch_candles(pair).await?;
        if candles.is_empty() {
            warn!("No OHLCV data received for {}", pair);
            return Ok(None);
        }

        let snapshot = MarketSnapshot::from_candles(pair, candles, &self.indicators)
            .map_err(|e| GatewayError::Fatal(e.to_string()))?;
        debug!(
            candles = snapshot.candles.len(),
            trend = ?snapshot.indicators.trend,
            volatility = snapshot.indicators.volatility,
            "Market data loaded"
        );
        Ok(Some(snapshot))
    }

    async fn fetch_balance(&self) -> Result<Balance, GatewayError> {
        let base = &self.config.base_asset;
        let quote = &self.config.quote_asset;

        if !self.config.live_trading {
            return Ok(Balance::new()
                .with(quote, self.config.paper_quote_balance)
                .with(base, self.config.paper_base_balance));
        }

        let account: AccountInfo = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;

        let free = |asset: &str| {
            account
                .balances
                .iter()
                .find(|b| b.asset == asset)
                .map(|b| b.free)
                .unwrap_or(Decimal::ZERO)
        };
        Ok(Balance::new().with(quote, free(quote)).with(base, free(base)))
    }

    async fn fetch_live_price(&self, pair: &str) -> Result<Decimal, GatewayError> {
        let ticker: TickerPrice = self
            .send_public_request("/api/v3/ticker/price", &[("symbol", pair.to_string())])
            .await?;
        if ticker.symbol != pair {
            return Err(GatewayError::Fatal(format!(
                "ticker for {} returned symbol {}",
                pair, ticker.symbol
            )));
        }
        Ok(ticker.price)
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        let quantity = normalize_quantity(request.size, self.config.symbol_step_size);
        if quantity <= Decimal::ZERO {
            return Err(GatewayError::Fatal(format!(
                "quantity {} below step size {}",
                request.size, self.config.symbol_step_size
            )));
        }

        let side_str = match request.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };

        if !self.config.live_trading {
            info!(
                "Paper {}: {} {} (client id {})",
                side_str, quantity, request.pair, request.client_order_id
            );
            return Ok(OrderResponse {
                id: format!("SIM-{}", request.client_order_id),
                symbol: request.pair.clone(),
                status: "SIMULATED".to_string(),
            });
        }

        let params = vec![
            ("symbol", request.pair.clone()),
            ("side", side_str.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
        ];

        info!("Sending Order: {} {} {}", side_str, quantity, request.pair);

        let ack: OrderAck = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        Ok(OrderResponse {
            id: ack.order_id.to_string(),
            symbol: ack.symbol,
            status: ack.status.unwrap_or_else(|| "NEW".to_string()),
        })
    }

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<(), GatewayError> {
        if !self.config.live_trading {
            info!("Paper cancel: {} on {}", order_id, pair);
            return Ok(());
        }
        let _: Value = self
            .send_signed_request(
                Method::DELETE,
                "/api/v3/order",
                vec![("symbol", pair.to_string()), ("orderId", order_id.to_string())],
            )
            .await?;
        info!("Order cancelled: {}", order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn paper_client() -> SpotClient {
        let config = ExchangeConfig {
            secret_key: "secret".to_string(),
            paper_quote_balance: dec!(250),
            paper_base_balance: dec!(3),
            symbol_step_size: dec!(0.01),
            ..ExchangeConfig::default()
        };
        SpotClient::new(&config, IndicatorSettings::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_base_url() {
        let config = ExchangeConfig {
            base_url: "not a url".to_string(),
            ..ExchangeConfig::default()
        };
        assert!(matches!(
            SpotClient::new(&config, IndicatorSettings::default()),
            Err(GatewayError::Fatal(_))
        ));
    }

    #[test]
    fn signed_query_appends_hex_signature() {
        let query = paper_client()
            .sign_and_build_query(vec![("symbol", "PIUSDT".to_string())])
            .unwrap();
        assert!(query.starts_with("symbol=PIUSDT&timestamp="));
        let signature = query.rsplit("signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn paper_mode_reports_configured_balance() {
        let balance = paper_client().fetch_balance().await.unwrap();
        assert_eq!(balance.get("USDT"), dec!(250));
        assert_eq!(balance.get("PI"), dec!(3));
    }

    #[tokio::test]
    async fn paper_orders_are_simulated_and_step_checked() {
        let client = paper_client();
        let mut request = OrderRequest {
            pair: "PIUSDT".to_string(),
            side: Side::Buy,
            size: dec!(0.4),
            client_order_id: "abc-1".to_string(),
        };
        let resp = client.submit_order(&request).await.unwrap();
        assert_eq!(resp.id, "SIM-abc-1");
        assert_eq!(resp.status, "SIMULATED");

        request.size = dec!(0.004);
        assert!(matches!(client.submit_order(&request).await, Err(GatewayError::Fatal(_))));
        assert!(client.cancel_order("PIUSDT", &resp.id).await.is_ok());
    }
}
