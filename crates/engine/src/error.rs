//! The module contains the errors the engine can throw.
//!
//! The errors are:
//!
//! - [`ExistingKey`] thrown when an order number is already stored.
//! - [`Conflict`] thrown when an order number belongs to another user.
//! - [`InsufficientFunds`] thrown when a withdrawal exceeds the balance.
//! - [`KeyNotFound`] thrown when an item are not found.
//! - [`Corrupted`] thrown when stored rows cannot be turned back into values.
//!
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`Conflict`]: EngineError::Conflict
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`Corrupted`]: EngineError::Corrupted
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Corrupted data: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidNumber(a), Self::InvalidNumber(b)) => a == b,
            (Self::InvalidStatus(a), Self::InvalidStatus(b)) => a == b,
            (Self::Corrupted(a), Self::Corrupted(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Failures talking to the external accrual authority.
///
/// These never reach a user: the worker pool retries them with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccrualError {
    #[error("accrual transport error: {0}")]
    Transport(String),
    #[error("accrual response could not be decoded: {0}")]
    Decode(String),
}
