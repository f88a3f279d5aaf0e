use exchange_client::error::ExchangeError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("order notional {notional} is below the symbol's min_notional {min_notional}")]
    BelowMinNotional { notional: Decimal, min_notional: Decimal },

    #[error("quantity rounded down to zero at the symbol's qty_step")]
    ZeroQuantityAfterRounding,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}
