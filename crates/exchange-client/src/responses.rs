use rust_decimal::Decimal;
use serde::Deserialize;

/// The response from a successful `POST /api/v3/order` (spot) request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: i64,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    pub side: String,
    #[serde(default)]
    pub fills: Vec<FillResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillResponse {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// A single asset's balance from `GET /api/v3/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub balances: Vec<BalanceResponse>,
}

/// Subset of `GET /api/v3/exchangeInfo` needed for order rounding (§4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolFilters {
    pub min_notional: Decimal,
    pub qty_step: Decimal,
    pub price_step: Decimal,
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}
