use api_types::withdrawal::Withdrawal;
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use engine::{to_decimal, users};

use crate::{ServerError, server::ServerState};

pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Response, ServerError> {
    let withdrawals = state.balance.withdrawals(&user.username).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let withdrawals: Vec<Withdrawal> = withdrawals
        .into_iter()
        .map(|withdrawal| Withdrawal {
            order: withdrawal.order_number,
            sum: to_decimal(withdrawal.sum),
            processed_at: withdrawal.processed_at,
        })
        .collect();

    Ok(Json(withdrawals).into_response())
}
