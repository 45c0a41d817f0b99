//! Validation errors for core types

use thiserror::Error;

/// Errors raised while constructing or validating core types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommonError {
    /// Symbol is empty, too long or contains non-alphanumeric characters
    #[error("Invalid symbol: {symbol:?}")]
    InvalidSymbol { symbol: String },

    /// Price is zero, negative or unparseable
    #[error("Invalid price: {value}")]
    InvalidPrice { value: String },

    /// Quantity is negative or unparseable
    #[error("Invalid quantity: {value}")]
    InvalidQuantity { value: String },
}
