use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use sea_orm::{ConnectionTrait, Database, Statement};
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{
    BalanceLedger, Engine, MinorUnits, OrderIntake, OrderLedger, OrderStatus, TaskQueue,
};
use migration::MigratorTrait;
use server::ServerState;

struct TestApp {
    router: Router,
    engine: Arc<Engine>,
    queue: TaskQueue,
}

async fn app() -> TestApp {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    for (user, password) in [("alice", "wonderland"), ("bob", "builder")] {
        db.execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            "INSERT INTO users (username, password) VALUES (?, ?)",
            vec![user.into(), password.into()],
        ))
        .await
        .unwrap();
    }

    let engine = Arc::new(
        Engine::builder()
            .database(db.clone())
            .build()
            .await
            .unwrap(),
    );
    let queue = TaskQueue::new(20);
    let state = ServerState {
        intake: OrderIntake::new(engine.clone(), queue.clone()),
        balance: BalanceLedger::new(engine.clone()),
        db,
    };

    TestApp {
        router: server::router(state),
        engine,
        queue,
    }
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn alice() -> String {
    basic("alice", "wonderland")
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get(app: &TestApp, uri: &str, auth: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::get(uri)
        .header(header::AUTHORIZATION, auth)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn post_order(app: &TestApp, auth: &str, number: &str) -> StatusCode {
    let request = Request::post("/api/user/orders")
        .header(header::AUTHORIZATION, auth)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(number.to_string()))
        .unwrap();
    send(app, request).await.0
}

async fn withdraw(app: &TestApp, auth: &str, payload: Value) -> StatusCode {
    let request = Request::post("/api/user/balance/withdraw")
        .header(header::AUTHORIZATION, auth)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(app, request).await.0
}

async fn credit(app: &TestApp, owner: &str, number: &str, accrual: i64) {
    app.engine.insert_order(owner, number).await.unwrap();
    app.engine
        .update_status_and_accrual(number, OrderStatus::Processed, MinorUnits::new(accrual))
        .await
        .unwrap();
}

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let app = app().await;

    let request = Request::get("/api/user/balance")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.0, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&app, "/api/user/balance", &basic("alice", "wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&app, "/api/user/balance", &basic("ali", "wonderland")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_upload_status_codes() {
    let app = app().await;

    assert_eq!(
        post_order(&app, &alice(), "12345678903").await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        post_order(&app, &alice(), "12345678903\n").await,
        StatusCode::OK
    );
    assert_eq!(
        post_order(&app, &basic("bob", "builder"), "12345678903").await,
        StatusCode::CONFLICT
    );
    assert_eq!(
        post_order(&app, &alice(), "12345678901").await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        post_order(&app, &alice(), "  ").await,
        StatusCode::BAD_REQUEST
    );

    assert_eq!(app.queue.len(), 1);
    assert!(app.queue.is_tracked("12345678903"));
}

#[tokio::test]
async fn order_list_shows_accrual_only_when_processed() {
    let app = app().await;

    let (status, _) = get(&app, "/api/user/orders", &alice()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(
        post_order(&app, &alice(), "12345678903").await,
        StatusCode::ACCEPTED
    );
    credit(&app, "alice", "79927398713", 50_050).await;

    let (status, body) = get(&app, "/api/user/orders", &alice()).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(orders.len(), 2);

    let processed = orders
        .iter()
        .find(|order| order["number"] == "79927398713")
        .unwrap();
    assert_eq!(processed["status"], "PROCESSED");
    assert_eq!(processed["accrual"], 500.5);

    let pending = orders
        .iter()
        .find(|order| order["number"] == "12345678903")
        .unwrap();
    assert_eq!(pending["status"], "NEW");
    assert!(pending.get("accrual").is_none());
    assert!(pending["uploaded_at"].is_string());
}

#[tokio::test]
async fn balance_reflects_accruals_and_withdrawals() {
    let app = app().await;
    credit(&app, "alice", "79927398713", 1_000).await;

    let (status, body) = get(&app, "/api/user/balance", &alice()).await;
    assert_eq!(status, StatusCode::OK);
    let balance: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(balance, json!({"current": 10.0, "withdrawn": 0.0}));

    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "2377225624", "sum": 4})).await,
        StatusCode::OK
    );
    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "2377225624", "sum": 7})).await,
        StatusCode::PAYMENT_REQUIRED
    );

    let (_, body) = get(&app, "/api/user/balance", &alice()).await;
    let balance: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(balance, json!({"current": 6.0, "withdrawn": 4.0}));
}

#[tokio::test]
async fn withdraw_rejects_invalid_input() {
    let app = app().await;
    credit(&app, "alice", "79927398713", 1_000).await;

    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "12345678901", "sum": 1})).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "2377225624", "sum": -1})).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "2377225624", "sum": 0})).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn withdrawals_are_listed() {
    let app = app().await;

    let (status, _) = get(&app, "/api/user/withdrawals", &alice()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    credit(&app, "alice", "79927398713", 1_000).await;
    assert_eq!(
        withdraw(&app, &alice(), json!({"order": "2377225624", "sum": 2.5})).await,
        StatusCode::OK
    );

    let (status, body) = get(&app, "/api/user/withdrawals", &alice()).await;
    assert_eq!(status, StatusCode::OK);
    let withdrawals: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["order"], "2377225624");
    assert_eq!(withdrawals[0]["sum"], 2.5);
    assert!(withdrawals[0]["processed_at"].is_string());

    let (status, _) = get(&app, "/api/user/withdrawals", &basic("bob", "builder")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
