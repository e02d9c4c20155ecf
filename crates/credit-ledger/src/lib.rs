//! Per-account credit ledger with idempotent, auditable balance mutation.
//!
//! Balances are integers in microcents (1/100,000,000 of a major currency
//! unit) and change only as the side effect of appending a ledger entry.
//! Operations tagged with an external reference are applied at most once.

mod error;
mod ledger;
mod pricing;
mod types;

pub use error::LedgerError;
pub use ledger::{CreditLedger, LedgerConfig};
pub use pricing::PricingCalculator;
pub use types::*;
