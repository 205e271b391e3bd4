//! Order submission and listing endpoints

use api_types::order::Order;
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use engine::{OrderStatus, Submission, to_decimal, users};

use crate::{ServerError, server::ServerState};

/// Handle a plain-text order number upload
pub async fn submit(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    body: String,
) -> Result<StatusCode, ServerError> {
    if body.trim().is_empty() {
        return Err(ServerError::Generic("order number required".to_string()));
    }

    match state.intake.submit(&user.username, &body).await? {
        Submission::Accepted => Ok(StatusCode::ACCEPTED),
        Submission::AlreadyUploaded => Ok(StatusCode::OK),
    }
}

/// Handle requests for listing the user's orders
pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Response, ServerError> {
    let orders = state.intake.orders(&user.username).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let orders: Vec<Order> = orders
        .into_iter()
        .map(|order| Order {
            accrual: (order.status == OrderStatus::Processed).then(|| to_decimal(order.accrual)),
            status: order.status.to_string(),
            number: order.number,
            uploaded_at: order.uploaded_at,
        })
        .collect();

    Ok(Json(orders).into_response())
}
