use crate::error::ExecutorError;
use core_types::{OrderRequest, OrderSide, OrderType};
use exchange_client::{round_down_to_step, ExchangeClient, FillResult, SymbolFilters};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Submits a market BUY for `quote_to_spend` units of quote currency.
/// Binance-style market buys are sized in quote currency directly, so
/// there is no `qty_step` to round against here — only the local
/// min-notional gate (spec §4.1 `FilterReject`, never a network
/// round-trip to find out).
pub async fn submit_buy(
    exchange: &dyn ExchangeClient,
    symbol: &str,
    quote_to_spend: Decimal,
    filters: &SymbolFilters,
) -> Result<FillResult, ExecutorError> {
    if quote_to_spend < filters.min_notional {
        return Err(ExecutorError::BelowMinNotional {
            notional: quote_to_spend,
            min_notional: filters.min_notional,
        });
    }

    let order = OrderRequest {
        client_order_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Market,
        quantity: quote_to_spend,
        price: None,
    };
    Ok(exchange.market_order(&order).await?)
}

/// Submits a market SELL for `quantity` units of base asset, rounded
/// down to the symbol's `qty_step` before submission (spec §4.1). The
/// resulting notional (at `price_hint`, the last observed price) is
/// checked against `min_notional` locally before placing the order.
pub async fn submit_sell(
    exchange: &dyn ExchangeClient,
    symbol: &str,
    quantity: Decimal,
    price_hint: Decimal,
    filters: &SymbolFilters,
) -> Result<FillResult, ExecutorError> {
    let rounded = round_down_to_step(quantity, filters.qty_step);
    if rounded.is_zero() {
        return Err(ExecutorError::ZeroQuantityAfterRounding);
    }

    let notional = rounded * price_hint;
    if notional < filters.min_notional {
        return Err(ExecutorError::BelowMinNotional {
            notional,
            min_notional: filters.min_notional,
        });
    }

    let order = OrderRequest {
        client_order_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        side: OrderSide::Sell,
        order_type: OrderType::Market,
        quantity: rounded,
        price: None,
    };
    Ok(exchange.market_order(&order).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            min_notional: dec!(10),
            qty_step: dec!(0.00001),
            price_step: dec!(0.01),
        }
    }

    #[test]
    fn sell_quantity_rounds_down_to_step() {
        let rounded = round_down_to_step(dec!(0.016789), filters().qty_step);
        assert_eq!(rounded, dec!(0.01678));
    }
}
