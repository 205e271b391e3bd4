use api_types::ErrorResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

pub use server::{ServerState, router, run_with_listener};

mod balance;
mod orders;
mod server;
mod withdrawals;

pub mod types {
    pub mod order {
        pub use api_types::order::Order;
    }

    pub mod balance {
        pub use api_types::balance::Balance;
    }

    pub mod withdrawal {
        pub use api_types::withdrawal::{WithdrawNew, Withdrawal};
    }
}

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_) | EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
        EngineError::InvalidAmount(_) | EngineError::InvalidNumber(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::InvalidStatus(_) | EngineError::Corrupted(_) | EngineError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::InvalidStatus(status) => {
            tracing::error!("corrupted order status in storage: {status}");
            "internal server error".to_string()
        }
        EngineError::Corrupted(detail) => {
            tracing::error!("corrupted row in storage: {detail}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
