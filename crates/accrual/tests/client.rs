use std::time::Duration;

use accrual::Client;
use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::get,
};
use engine::{AccrualError, AccrualReply, AccrualSource, Decimal};
use serde_json::json;

/// Fake authority keyed by order number.
async fn order(Path(number): Path<String>) -> Response {
    match number.as_str() {
        "79927398713" => Json(json!({
            "order": number,
            "status": "PROCESSED",
            "accrual": 500
        }))
        .into_response(),
        "12345678903" => Json(json!({"order": number, "status": "PROCESSING"})).into_response(),
        "18" => StatusCode::NO_CONTENT.into_response(),
        "26" => {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, "60".parse().unwrap());
            (StatusCode::TOO_MANY_REQUESTS, headers, "No more than N requests per minute allowed")
                .into_response()
        }
        "34" => (StatusCode::OK, "not json").into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn spawn_authority() -> String {
    let app = Router::new().route("/api/orders/{number}", get(order));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client() -> Client {
    Client::new(&spawn_authority().await, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn processed_order_carries_accrual() {
    let client = client().await;
    assert_eq!(
        client.fetch("79927398713").await.unwrap(),
        AccrualReply::Status {
            status: "PROCESSED".to_string(),
            accrual: Some(Decimal::new(500, 0)),
        }
    );
}

#[tokio::test]
async fn pending_order_has_no_accrual() {
    let client = client().await;
    assert_eq!(
        client.fetch("12345678903").await.unwrap(),
        AccrualReply::Status {
            status: "PROCESSING".to_string(),
            accrual: None,
        }
    );
}

#[tokio::test]
async fn no_content_means_not_registered() {
    let client = client().await;
    assert_eq!(
        client.fetch("18").await.unwrap(),
        AccrualReply::NotRegistered
    );
}

#[tokio::test]
async fn too_many_requests_reports_retry_after() {
    let client = client().await;
    assert_eq!(
        client.fetch("26").await.unwrap(),
        AccrualReply::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        }
    );
}

#[tokio::test]
async fn server_error_means_unavailable() {
    let client = client().await;
    assert_eq!(
        client.fetch("42").await.unwrap(),
        AccrualReply::Unavailable
    );
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let client = client().await;
    assert!(matches!(
        client.fetch("34").await,
        Err(AccrualError::Decode(_))
    ));
}

#[tokio::test]
async fn unreachable_authority_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new(&addr.to_string(), Duration::from_secs(1)).unwrap();
    assert!(matches!(
        client.fetch("18").await,
        Err(AccrualError::Transport(_))
    ));
}
