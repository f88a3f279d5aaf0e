use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccountingError {
    #[error(
        "allocating {requested} would bring total allocation to {would_be_total}, \
         exceeding the {available} currently available for allocation"
    )]
    OverAllocation {
        requested: Decimal,
        would_be_total: Decimal,
        available: Decimal,
    },
}
