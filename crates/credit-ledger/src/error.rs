//! Ledger error types.

use thiserror::Error;

/// Errors that can occur in the credit ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Debit would drop the balance below the configured floor.
    #[error("Insufficient credits: required {required}, balance {balance}")]
    InsufficientCredits { required: i64, balance: i64 },

    /// Operation against an account that does not exist.
    #[error("Account not found: {0}")]
    MissingAccount(String),

    /// Credit and debit amounts must be strictly positive.
    #[error("Invalid amount: {0} (must be > 0)")]
    InvalidAmount(i64),

    /// Account already exists.
    #[error("Account already exists: {0}")]
    AccountExists(String),
}
