//! HTTP surface integration tests

use actix_web::{test, web, App};
use serde_json::{json, Value};
use uuid::Uuid;

use storm_core::{Amount, GameConfig};
use storm_server::{configure, AppState};

/// Build the in-process test service for a given state
macro_rules! service {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(configure),
        )
        .await
    };
}

fn funded_player(state: &AppState) -> Uuid {
    let player = Uuid::new_v4();
    state.register_player(player, "api-tester", false);
    state.sessions.login_with_key(player, [11u8; 32]);
    player
}

#[actix_web::test]
async fn test_health_is_open() {
    let state = AppState::new(GameConfig::default());
    let app = service!(state);
    let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(response.status().is_success());
}

#[actix_web::test]
async fn test_spin_requires_identity() {
    let state = AppState::new(GameConfig::default());
    let app = service!(state);
    let request = test::TestRequest::post()
        .uri("/spin")
        .set_json(json!({ "betAmount": 1.0 }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_spin_returns_result_and_balance() {
    let state = AppState::new(GameConfig::default());
    let player = funded_player(&state);
    let app = service!(state.clone());

    let request = test::TestRequest::post()
        .uri("/spin")
        .insert_header(("X-Player-Id", player.to_string()))
        .set_json(json!({ "betAmount": 1.0 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["grid"].as_array().unwrap().len(), 6);
    assert_eq!(body["grid"][0].as_array().unwrap().len(), 5);
    assert!(body["spinId"].is_string());
    assert_eq!(body["validationHash"].as_str().unwrap().len(), 64);

    // balance = opening - bet + win
    let total_win = body["totalWin"].as_f64().unwrap();
    let balance = body["balance"].as_f64().unwrap();
    assert!((balance - (1_000.0 - 1.0 + total_win)).abs() < 0.001);
}

#[actix_web::test]
async fn test_invalid_bet_rejected_without_side_effect() {
    let state = AppState::new(GameConfig::default());
    let player = funded_player(&state);
    let app = service!(state.clone());

    let request = test::TestRequest::post()
        .uri("/spin")
        .insert_header(("X-Player-Id", player.to_string()))
        .set_json(json!({ "betAmount": -1.0 }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        state.wallet.balance(player).unwrap(),
        storm_server::DEMO_OPENING_BALANCE
    );
}

#[actix_web::test]
async fn test_insufficient_funds_is_payment_required() {
    let state = AppState::new(GameConfig::default());
    let player = Uuid::new_v4();
    state.register_player(player, "poor", false);
    state.sessions.login_with_key(player, [12u8; 32]);
    // Drain the account to exactly one cent
    state
        .wallet
        .process_adjustment(
            player,
            Amount::from_cents(1) - storm_server::DEMO_OPENING_BALANCE,
            "drain",
            "test",
        )
        .unwrap();

    let app = service!(state.clone());
    let request = test::TestRequest::post()
        .uri("/spin")
        .insert_header(("X-Player-Id", player.to_string()))
        .set_json(json!({ "betAmount": 1.0 }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 402);
    assert_eq!(state.wallet.balance(player).unwrap(), Amount::from_cents(1));
}

#[actix_web::test]
async fn test_history_and_verify_roundtrip() {
    let state = AppState::new(GameConfig::default());
    let player = funded_player(&state);
    let app = service!(state.clone());

    for _ in 0..3 {
        let request = test::TestRequest::post()
            .uri("/spin")
            .insert_header(("X-Player-Id", player.to_string()))
            .set_json(json!({ "betAmount": 1.0 }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert!(response.status().is_success());
    }

    let request = test::TestRequest::get()
        .uri("/history/spins?page=1&limit=2&order=desc")
        .insert_header(("X-Player-Id", player.to_string()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    assert_eq!(body["total"], 3);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let spin_id = items[0]["spinId"].as_str().unwrap().to_string();

    let request = test::TestRequest::get()
        .uri(&format!("/history/spins/{spin_id}/verify"))
        .insert_header(("X-Player-Id", player.to_string()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["valid"], true);
}

#[actix_web::test]
async fn test_wallet_endpoints() {
    let state = AppState::new(GameConfig::default());
    let player = funded_player(&state);
    let app = service!(state.clone());

    let request = test::TestRequest::get()
        .uri("/wallet/balance")
        .insert_header(("X-Player-Id", player.to_string()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    assert_eq!(body["balance"].as_f64().unwrap(), 1_000.0);

    let request = test::TestRequest::get()
        .uri("/wallet/transactions?type=adjustment")
        .insert_header(("X-Player-Id", player.to_string()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    // The opening balance is an adjustment transaction
    assert_eq!(body["transactions"]["total"], 1);

    let request = test::TestRequest::get()
        .uri("/wallet/stats")
        .insert_header(("X-Player-Id", player.to_string()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    assert_eq!(body["consistency"]["valid"], true);
}

#[actix_web::test]
async fn test_admin_adjust_requires_admin_flag() {
    let state = AppState::new(GameConfig::default());
    let player = funded_player(&state);
    let admin = Uuid::new_v4();
    state.register_player(admin, "ops", true);

    let app = service!(state.clone());
    let payload = json!({ "playerId": player, "amount": 25.0, "reason": "goodwill" });

    let request = test::TestRequest::post()
        .uri("/wallet/admin/adjust")
        .insert_header(("X-Player-Id", player.to_string()))
        .set_json(&payload)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 403);

    let request = test::TestRequest::post()
        .uri("/wallet/admin/adjust")
        .insert_header(("X-Player-Id", admin.to_string()))
        .set_json(&payload)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, request).await;
    assert_eq!(body["success"], true);
    assert_eq!(
        state.wallet.balance(player).unwrap(),
        storm_server::DEMO_OPENING_BALANCE + Amount::from_major(25)
    );
}
