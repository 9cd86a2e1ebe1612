//! Trade execution - reconciles cash, holdings, and the audit log.

mod ledger;

pub use ledger::{Ledger, TradeError, TradeReceipt};
