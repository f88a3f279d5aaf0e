use crate::auth::sign_request;
use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use configuration::ExchangeConfig;
use core_types::{Kline, OrderRequest, OrderSide};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod auth;
pub mod error;
pub mod responses;

pub use responses::{AccountResponse, ApiErrorResponse, BalanceResponse, OrderResponse, SymbolFilters};

const MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Free/locked balance for one asset (C1 contract).
#[derive(Debug, Clone, Copy)]
pub struct AssetBalance {
    pub free: Decimal,
    pub locked: Decimal,
}

/// The result of a filled market order (C1 contract).
#[derive(Debug, Clone)]
pub struct FillResult {
    pub fill_price: Decimal,
    pub filled_qty: Decimal,
    pub quote_spent: Decimal,
    pub ts: DateTime<Utc>,
}

/// The generic, abstract interface for a spot trading exchange API client.
/// This is the contract the trading loop consumes; the concrete
/// implementation (live HTTP client or test stub) is swappable behind it.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError>;

    /// Every non-zero asset balance on the account (spec §4.7.4): the
    /// supervisor's orphan sweep walks this to find holdings with no
    /// owning bot, rather than probing one asset at a time.
    async fn get_account_balances(&self) -> Result<Vec<(String, AssetBalance)>, ExchangeError>;

    async fn get_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError>;

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError>;

    /// Places a market order. `order.quantity` carries quote amount for a
    /// BUY (`order.price == None`) and base quantity for a SELL, matching
    /// the caller conventions in `trading-loop`.
    async fn market_order(&self, order: &OrderRequest) -> Result<FillResult, ExchangeError>;
}

/// Rounds `value` down to the nearest multiple of `step` (spec §4.1:
/// quantity/price must be truncated, never rounded up).
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// A concrete implementation of `ExchangeClient` for Binance spot.
#[derive(Clone)]
pub struct BinanceSpotClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl BinanceSpotClient {
    pub fn new(config: &ExchangeConfig) -> Self {
        let base_url = if config.use_testnet {
            "https://testnet.binance.vision".to_string()
        } else {
            "https://api.binance.com".to_string()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&config.api_key).expect("invalid API key header value"),
        );

        Self {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build reqwest client"),
            base_url,
            api_secret: config.api_secret.clone(),
        }
    }

    fn timestamp_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis()
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ExchangeError> {
        params.insert("timestamp", Self::timestamp_ms().to_string());
        let query_string = serde_qs::to_string(params)
            .map_err(|e| ExchangeError::Deserialization(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self
            .client
            .request(method, &url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_reqwest_error)?;

        if status.is_success() {
            serde_json::from_str::<T>(&text)
                .map_err(|e| ExchangeError::Deserialization(e.to_string()))
        } else if status.as_u16() == 401 {
            Err(ExchangeError::Auth(text))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ExchangeError::Deserialization(format!(
                    "failed to parse error body: {e}; raw: {text}"
                ))
            })?;
            Err(classify_binance_error(status.as_u16(), api_error))
        }
    }

    async fn get_with_backoff<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let mut attempt = 0;
        loop {
            let url = format!("{}{}", self.base_url, path);
            let result = self
                .client
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(classify_reqwest_error);

            match result {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let err = if status.as_u16() == 401 {
                        ExchangeError::Auth(text)
                    } else {
                        ExchangeError::Transient(format!("{status}: {text}"))
                    };
                    if !err.is_transient() || attempt >= MAX_RETRIES {
                        return Err(err);
                    }
                }
                Err(err) => {
                    if !err.is_transient() || attempt >= MAX_RETRIES {
                        return Err(err);
                    }
                }
            }
            let backoff = (BASE_BACKOFF_MS * 2u64.pow(attempt)).min(MAX_BACKOFF_MS);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            attempt += 1;
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() || e.is_connect() {
        ExchangeError::Transient(e.to_string())
    } else {
        ExchangeError::Request(e)
    }
}

fn classify_binance_error(status: u16, api_error: ApiErrorResponse) -> ExchangeError {
    match status {
        401 | 403 => ExchangeError::Auth(api_error.msg),
        _ if api_error.code == -1121 => ExchangeError::BadSymbol(api_error.msg),
        _ if api_error.code == -2010 => ExchangeError::InsufficientBalance(api_error.msg),
        _ if api_error.code == -1013 => ExchangeError::FilterReject(api_error.msg),
        500..=599 => ExchangeError::Transient(api_error.msg),
        _ => ExchangeError::Transient(api_error.msg),
    }
}

#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

#[async_trait]
impl ExchangeClient for BinanceSpotClient {
    async fn get_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError> {
        let mut params = BTreeMap::new();
        let account: AccountResponse = self
            .signed_request(reqwest::Method::GET, "/api/v3/account", &mut params)
            .await?;

        let balance = account
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .unwrap_or(BalanceResponse {
                asset: asset.to_string(),
                free: Decimal::ZERO,
                locked: Decimal::ZERO,
            });

        Ok(AssetBalance {
            free: balance.free,
            locked: balance.locked,
        })
    }

    async fn get_account_balances(&self) -> Result<Vec<(String, AssetBalance)>, ExchangeError> {
        let mut params = BTreeMap::new();
        let account: AccountResponse = self
            .signed_request(reqwest::Method::GET, "/api/v3/account", &mut params)
            .await?;

        Ok(account
            .balances
            .into_iter()
            .filter(|b| !b.free.is_zero() || !b.locked.is_zero())
            .map(|b| {
                (
                    b.asset,
                    AssetBalance {
                        free: b.free,
                        locked: b.locked,
                    },
                )
            })
            .collect())
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        #[derive(Deserialize)]
        struct TickerPrice {
            price: Decimal,
        }
        let ticker: TickerPrice = self
            .get_with_backoff("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let raw: Vec<RawKline> = self
            .get_with_backoff(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.min(1000).to_string()),
                ],
            )
            .await?;

        raw.into_iter()
            .map(|raw| {
                Ok(Kline {
                    open_time: Utc.timestamp_millis_opt(raw.0).single().ok_or_else(|| {
                        ExchangeError::Deserialization(format!("invalid open_time {}", raw.0))
                    })?,
                    open: Decimal::from_str(&raw.1)
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()))?,
                    high: Decimal::from_str(&raw.2)
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()))?,
                    low: Decimal::from_str(&raw.3)
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()))?,
                    close: Decimal::from_str(&raw.4)
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()))?,
                    volume: Decimal::from_str(&raw.5)
                        .map_err(|e| ExchangeError::Deserialization(e.to_string()))?,
                    close_time: Utc.timestamp_millis_opt(raw.6).single().ok_or_else(|| {
                        ExchangeError::Deserialization(format!("invalid close_time {}", raw.6))
                    })?,
                    interval: interval.to_string(),
                })
            })
            .collect()
    }

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        #[derive(Deserialize)]
        struct ExchangeInfo {
            symbols: Vec<SymbolInfo>,
        }
        #[derive(Deserialize)]
        struct SymbolInfo {
            symbol: String,
            filters: Vec<serde_json::Value>,
        }

        let info: ExchangeInfo = self
            .get_with_backoff("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;

        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::BadSymbol(symbol.to_string()))?;

        let mut min_notional = Decimal::ZERO;
        let mut qty_step = Decimal::ZERO;
        let mut price_step = Decimal::ZERO;

        for filter in symbol_info.filters {
            match filter.get("filterType").and_then(|v| v.as_str()) {
                Some("LOT_SIZE") => {
                    if let Some(step) = filter.get("stepSize").and_then(|v| v.as_str()) {
                        qty_step = Decimal::from_str(step).unwrap_or(Decimal::ZERO);
                    }
                }
                Some("PRICE_FILTER") => {
                    if let Some(step) = filter.get("tickSize").and_then(|v| v.as_str()) {
                        price_step = Decimal::from_str(step).unwrap_or(Decimal::ZERO);
                    }
                }
                Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                    if let Some(min) = filter.get("minNotional").and_then(|v| v.as_str()) {
                        min_notional = Decimal::from_str(min).unwrap_or(Decimal::ZERO);
                    }
                }
                _ => {}
            }
        }

        Ok(SymbolFilters {
            min_notional,
            qty_step,
            price_step,
        })
    }

    async fn market_order(&self, order: &OrderRequest) -> Result<FillResult, ExchangeError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", order.symbol.clone());
        params.insert(
            "side",
            match order.side {
                OrderSide::Buy => "BUY".to_string(),
                OrderSide::Sell => "SELL".to_string(),
            },
        );
        params.insert("type", "MARKET".to_string());
        params.insert("newClientOrderId", order.client_order_id.to_string());
        if order.side == OrderSide::Buy {
            params.insert("quoteOrderQty", order.quantity.to_string());
        } else {
            params.insert("quantity", order.quantity.to_string());
        }

        let response: OrderResponse = self
            .signed_request(reqwest::Method::POST, "/api/v3/order", &mut params)
            .await?;

        let filled_qty = response.executed_qty;
        let quote_spent = response.cummulative_quote_qty;
        let fill_price = if !filled_qty.is_zero() {
            quote_spent / filled_qty
        } else {
            Decimal::ZERO
        };

        Ok(FillResult {
            fill_price,
            filled_qty,
            quote_spent,
            ts: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_down_never_up() {
        assert_eq!(round_down_to_step(dec!(0.016789), dec!(0.001)), dec!(0.016));
        assert_eq!(round_down_to_step(dec!(0.001999), dec!(0.001)), dec!(0.001));
        assert_eq!(round_down_to_step(dec!(1), dec!(0.001)), dec!(1));
    }

    #[test]
    fn rounds_down_to_step_boundary_case_b1() {
        // spec B1: quote=100 at price=63_000 with qty_step=0.001 -> qty=0.001
        let raw_qty = dec!(100) / dec!(63_000);
        assert_eq!(round_down_to_step(raw_qty, dec!(0.001)), dec!(0.001));
    }

    #[test]
    fn zero_step_is_a_no_op() {
        assert_eq!(round_down_to_step(dec!(1.23456), Decimal::ZERO), dec!(1.23456));
    }

    #[test]
    fn classifies_known_binance_error_codes() {
        let bad_symbol = classify_binance_error(
            400,
            ApiErrorResponse { code: -1121, msg: "Invalid symbol.".to_string() },
        );
        assert!(matches!(bad_symbol, ExchangeError::BadSymbol(_)));

        let insufficient = classify_binance_error(
            400,
            ApiErrorResponse { code: -2010, msg: "Account has insufficient balance.".to_string() },
        );
        assert!(matches!(insufficient, ExchangeError::InsufficientBalance(_)));

        let filter_reject = classify_binance_error(
            400,
            ApiErrorResponse { code: -1013, msg: "Filter failure: NOTIONAL".to_string() },
        );
        assert!(matches!(filter_reject, ExchangeError::FilterReject(_)));

        let auth = classify_binance_error(401, ApiErrorResponse { code: -2014, msg: "bad key".to_string() });
        assert!(matches!(auth, ExchangeError::Auth(_)));

        let transient = classify_binance_error(503, ApiErrorResponse { code: -1001, msg: "down".to_string() });
        assert!(matches!(transient, ExchangeError::Transient(_)));
        assert!(transient.is_transient());
        assert!(!bad_symbol.is_transient());
    }

    #[test]
    fn raw_kline_deserializes_binance_array_shape() {
        let json = r#"[1625097600000,"35000.00","35200.00","34900.00","35100.00","123.456",1625097899999,"4321098.76",1500,"60.123","2100000.00","0"]"#;
        let raw: RawKline = serde_json::from_str(json).unwrap();
        assert_eq!(raw.0, 1625097600000);
        assert_eq!(raw.4, "35100.00");
    }
}
