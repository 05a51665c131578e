// 8.0: order/position ledger. owns the order and position state machines,
// the clOrdId bookkeeping and the per-owner indexes; moves funds only through
// the custody ledger it holds. deterministic, no external I/O beyond custody.

mod config;
mod core;
mod orders;
mod positions;
mod results;

pub use config::LedgerConfig;
pub use core::Ledger;
pub use results::{ConversionResult, LedgerError};
