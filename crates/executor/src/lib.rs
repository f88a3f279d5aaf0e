//! Order submission and position-mutation helpers sitting directly
//! above the exchange adapter: local rounding/min-notional enforcement
//! before a market order ever reaches the network (spec §4.1), and the
//! weighted-average cost-basis recomputation used on add-to-position
//! (spec §4.6, invariant I4). No state is owned here — callers persist
//! whatever `PositionSnapshot` this crate helps them compute.

pub mod error;
pub mod position;
pub mod submit;

pub use error::ExecutorError;
pub use position::weighted_average_entry;
pub use submit::{submit_buy, submit_sell};
