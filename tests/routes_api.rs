use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use serde_json::{json, Value};

use blackbike::auth::{create_jwt, Role};
use blackbike::cache::InMemoryCache;
use blackbike::notify::ChannelNotifier;
use blackbike::protocol::TextProtocolRenderer;
use blackbike::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use blackbike::repo::inmem::InMemRepo;
use blackbike::storage::FsPhotoStore;
use blackbike::{config, AppState, OrderLifecycle};

fn test_state(photo_dir: &std::path::Path) -> AppState {
    let repo = Arc::new(InMemRepo::ephemeral());
    let cache = Arc::new(InMemoryCache::new());
    let notifier = Arc::new(ChannelNotifier::spawn());
    AppState {
        lifecycle: Arc::new(OrderLifecycle::new(repo, cache, notifier)),
        photo_store: Arc::new(FsPhotoStore::at(photo_dir.to_path_buf())),
        renderer: Arc::new(TextProtocolRenderer),
        rate: RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env()),
        dashboard_ttl: Duration::from_secs(60),
        portal_url: "http://localhost:8080".to_string(),
    }
}

fn set_jwt_secret() {
    std::env::set_var("JWT_SECRET", "test-secret-test-secret-test-secret!");
}

fn staff_token() -> String {
    create_jwt("staff:anna", vec![Role::Staff]).unwrap()
}

fn customer_token(sub: &str) -> String {
    create_jwt(sub, vec![Role::Customer]).unwrap()
}

macro_rules! auth_header {
    ($token:expr) => {
        ("Authorization", format!("Bearer {}", $token))
    };
}

#[actix_web::test]
#[serial_test::serial]
async fn requests_without_a_token_are_rejected() {
    set_jwt_secret();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().configure(config).app_data(web::Data::new(test_state(dir.path()))),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/panel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial_test::serial]
async fn customer_token_cannot_reach_the_staff_panel() {
    set_jwt_secret();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().configure(config).app_data(web::Data::new(test_state(dir.path()))),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/panel")
        .insert_header(auth_header!(customer_token("user:1")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial_test::serial]
async fn intake_dedups_the_customer_and_the_panel_finds_the_order() {
    set_jwt_secret();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().configure(config).app_data(web::Data::new(test_state(dir.path()))),
    )
    .await;
    let token = staff_token();

    let intake = json!({
        "full_name": "Jana Kovacova",
        "email": "jana@example.com",
        "phone_number": "0905 111 222",
        "brand": "Canyon",
        "model": "Spectral",
        "issue_description": "creaking bottom bracket",
        "service_code": "ABC-7"
    });
    let req = test::TestRequest::post()
        .uri("/api/v1/intake")
        .insert_header(auth_header!(token.clone()))
        .set_json(&intake)
        .to_request();
    let first: Value = test::call_and_read_body_json(&app, req).await;
    let customer_id = first["customer"]["id"].as_i64().unwrap();
    let order_id = first["order"]["id"].as_i64().unwrap();

    // Same email: the customer record is reused, not duplicated.
    let mut second_intake = intake.clone();
    second_intake["brand"] = json!("Trek");
    second_intake["service_code"] = json!("");
    let req = test::TestRequest::post()
        .uri("/api/v1/intake")
        .insert_header(auth_header!(token.clone()))
        .set_json(&second_intake)
        .to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second["customer"]["id"].as_i64().unwrap(), customer_id);
    assert_ne!(second["order"]["id"].as_i64().unwrap(), order_id);

    // Exact search by "#<id>" pins the panel to that order.
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/panel?q=%23{order_id}"))
        .insert_header(auth_header!(token.clone()))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["order"]["id"].as_i64().unwrap(), order_id);

    // The order code works as an ordinary search token.
    let req = test::TestRequest::get()
        .uri("/api/v1/panel?q=ABC-7")
        .insert_header(auth_header!(token.clone()))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);

    // Token search across customer fields.
    let req = test::TestRequest::get()
        .uri("/api/v1/panel?q=jana%20canyon")
        .insert_header(auth_header!(token))
        .to_request();
    let rows: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[actix_web::test]
#[serial_test::serial]
async fn completing_an_order_stamps_it_and_logs_the_email() {
    set_jwt_secret();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().configure(config).app_data(web::Data::new(test_state(dir.path()))),
    )
    .await;
    let token = staff_token();

    let req = test::TestRequest::post()
        .uri("/api/v1/intake")
        .insert_header(auth_header!(token.clone()))
        .set_json(json!({
            "full_name": "Peter Novak",
            "email": "peter@example.com",
            "phone_number": "",
            "brand": "Trek",
            "model": "Marlin",
            "issue_description": "brakes rubbing"
        }))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = created["order"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{order_id}/status"))
        .insert_header(auth_header!(token.clone()))
        .set_json(json!({"status": "DONE"}))
        .to_request();
    let done: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(done["status"], "DONE");
    assert!(!done["completed_at"].is_null());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/orders/{order_id}"))
        .insert_header(auth_header!(token.clone()))
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    let logs = detail["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["kind"], "EMAIL_DONE");

    // Invalid status values are rejected.
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/orders/{order_id}/status"))
        .insert_header(auth_header!(token))
        .set_json(json!({"status": "FINISHED"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
}

#[actix_web::test]
#[serial_test::serial]
async fn portal_shows_only_the_linked_customers_orders() {
    set_jwt_secret();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().configure(config).app_data(web::Data::new(test_state(dir.path()))),
    )
    .await;
    let staff = staff_token();

    let req = test::TestRequest::post()
        .uri("/api/v1/intake")
        .insert_header(auth_header!(staff.clone()))
        .set_json(json!({
            "full_name": "Jana Kovacova",
            "email": "jana@example.com",
            "phone_number": "0905 111 222",
            "brand": "Canyon",
            "model": "Spectral",
            "issue_description": "creaking"
        }))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let customer_id = created["customer"]["id"].as_i64().unwrap();
    let order_id = created["order"]["id"].as_i64().unwrap();

    // Unlinked login sees nothing.
    let req = test::TestRequest::get()
        .uri("/api/v1/my/orders")
        .insert_header(auth_header!(customer_token("user:jana")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/customers/{customer_id}/link"))
        .insert_header(auth_header!(staff.clone()))
        .set_json(json!({"user_sub": "user:jana"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/v1/my/orders")
        .insert_header(auth_header!(customer_token("user:jana")))
        .to_request();
    let orders: Value = test::call_and_read_body_json(&app, req).await;
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order"]["id"].as_i64().unwrap(), order_id);

    // Ticket round trip: customer opens, staff replies, status follows.
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/my/orders/{order_id}/tickets"))
        .insert_header(auth_header!(customer_token("user:jana")))
        .set_json(json!({"subject": "", "message": "When will it be done?"}))
        .to_request();
    let ticket: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ticket["status"], "WAITING_ADMIN");
    assert_eq!(ticket["subject"], format!("Question about service #{order_id}"));
    let ticket_id = ticket["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/tickets/{ticket_id}/messages"))
        .insert_header(auth_header!(staff))
        .set_json(json!({"message": "Tomorrow afternoon."}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/my/tickets/{ticket_id}"))
        .insert_header(auth_header!(customer_token("user:jana")))
        .to_request();
    let thread: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(thread["ticket"]["status"], "WAITING_CUSTOMER");
    assert_eq!(thread["messages"].as_array().unwrap().len(), 1);
}
