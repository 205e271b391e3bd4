//! Balance API endpoints

use api_types::{balance::Balance, withdrawal::WithdrawNew};
use axum::{Extension, Json, extract::State, http::StatusCode};
use engine::{to_decimal, to_minor_units, users};

use crate::{ServerError, server::ServerState};

pub async fn get(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Balance>, ServerError> {
    let balance = state.balance.balance(&user.username).await?;

    Ok(Json(Balance {
        current: to_decimal(balance.current),
        withdrawn: to_decimal(balance.withdrawn),
    }))
}

/// Spend part of the balance against a new order number
pub async fn withdraw(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<WithdrawNew>,
) -> Result<StatusCode, ServerError> {
    state
        .balance
        .withdraw(&user.username, &payload.order, to_minor_units(payload.sum))
        .await?;

    Ok(StatusCode::OK)
}
