use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod order {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Order {
        pub number: String,
        pub status: String,
        /// Present once the order is processed.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "rust_decimal::serde::float_option"
        )]
        pub accrual: Option<Decimal>,
        pub uploaded_at: DateTime<Utc>,
    }
}

pub mod balance {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Balance {
        #[serde(with = "rust_decimal::serde::float")]
        pub current: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        pub withdrawn: Decimal,
    }
}

pub mod withdrawal {
    use super::*;

    /// Request body of `POST /api/user/balance/withdraw`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct WithdrawNew {
        pub order: String,
        #[serde(with = "rust_decimal::serde::float")]
        pub sum: Decimal,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Withdrawal {
        pub order: String,
        #[serde(with = "rust_decimal::serde::float")]
        pub sum: Decimal,
        pub processed_at: DateTime<Utc>,
    }
}
