// src/connectors/messages.rs
//! REST payloads of spot v3 style exchange APIs.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use crate::types::Candle;

/// `GET /api/v3/ticker/price`
#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
}

/// `GET /api/v3/account`
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

/// Some venues send numeric order ids, others strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Numeric(u64),
    Text(String),
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderId::Numeric(id) => write!(f, "{}", id),
            OrderId::Text(id) => f.write_str(id),
        }
    }
}

/// `POST /api/v3/order`
#[derive(Debug, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub symbol: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body returned with 4xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

fn decimal_field(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Kline rows are positional arrays: `[openTime, open, high, low, close, volume, closeTime, ...]`.
pub fn parse_kline(row: &[Value]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    Some(Candle {
        open_time: row[0].as_u64()?,
        open: decimal_field(&row[1])?,
        high: decimal_field(&row[2])?,
        low: decimal_field(&row[3])?,
        close: decimal_field(&row[4])?,
        volume: decimal_field(&row[5])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_kline_rows() {
        let rows: Vec<Vec<Value>> = serde_json::from_str(
            r#"[[1704067200000,"1.50","1.55","1.48","1.52","1200.5",1704067259999,"1824.76",42,"600","912","0"],
                [1704067260000,"1.52","1.53",1.51,"1.51","10",1704067319999]]"#,
        )
        .unwrap();
        let candles: Vec<Candle> = rows.iter().filter_map(|r| parse_kline(r)).collect();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(1.52));
        assert_eq!(candles[0].volume, dec!(1200.5));
        assert_eq!(candles[1].low, dec!(1.51));
    }

    #[test]
    fn rejects_truncated_rows() {
        let row: Vec<Value> = serde_json::from_str(r#"[1704067200000,"1.50"]"#).unwrap();
        assert!(parse_kline(&row).is_none());
    }

    #[test]
    fn order_ids_may_be_numbers_or_strings() {
        let numeric: OrderAck =
            serde_json::from_str(r#"{"orderId":28,"symbol":"PIUSDT","status":"FILLED"}"#).unwrap();
        let text: OrderAck = serde_json::from_str(r#"{"orderId":"C02__443","symbol":"PIUSDT"}"#).unwrap();
        assert_eq!(numeric.order_id.to_string(), "28");
        assert_eq!(text.order_id.to_string(), "C02__443");
        assert!(text.status.is_none());
    }
}
