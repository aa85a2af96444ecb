mod common;

use axum::http::StatusCode;
use axum::Router;
use migration::{Migrator, MigratorTrait};
use serde_json::json;

use latefine_api::changes::ChangeHub;
use latefine_api::config::{Config, Environment};
use latefine_api::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Test Infrastructure
// ─────────────────────────────────────────────────────────────────────────────

async fn test_app() -> Router {
    let db = sea_orm::Database::connect("sqlite::memory:")
        .await
        .unwrap_or_default();
    Migrator::up(&db, None).await.unwrap_or_default();

    let state = AppState {
        db,
        config: Config {
            database_url: String::new(),
            server_host: std::net::IpAddr::from([127, 0, 0, 1]),
            server_port: 0,
            environment: Environment::Development,
            log_level: "warn".to_string(),
            jwt_secret: "test-secret-key-for-testing-only-32chars".to_string(),
            jwt_access_expiration_secs: 900,
            frontend_url: "http://localhost:5173".to_string(),
        },
        changes: ChangeHub::new(),
    };

    latefine_api::routes::router().with_state(state)
}

/// Sign up an account and return its access token.
async fn signup(app: &Router, email: &str) -> String {
    let (status, body) = common::post_json(
        app,
        "/api/v1/auth/signup",
        &json!({ "email": email, "password": "SecurePass123!" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    v["token"].as_str().unwrap_or_default().to_string()
}

/// Create a game and return its response JSON.
async fn create_game(app: &Router, token: &str, body: &serde_json::Value) -> serde_json::Value {
    let (status, resp) = common::post_json_with_auth(app, "/api/v1/games", body, token).await;
    assert_eq!(status, StatusCode::CREATED, "create game failed: {resp}");
    serde_json::from_str(&resp).unwrap_or_default()
}

/// Add a player and return its id.
async fn add_player(app: &Router, token: &str, game_id: &str, name: &str) -> String {
    let (status, body) = common::post_json_with_auth(
        app,
        &format!("/api/v1/games/{game_id}/players"),
        &json!({ "name": name }),
        token,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "add player failed: {body}");
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    v["id"].as_str().unwrap_or_default().to_string()
}

/// Record a late event and return its response JSON.
async fn add_event(
    app: &Router,
    token: &str,
    game_id: &str,
    body: &serde_json::Value,
) -> serde_json::Value {
    let (status, resp) = common::post_json_with_auth(
        app,
        &format!("/api/v1/games/{game_id}/events"),
        body,
        token,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "add event failed: {resp}");
    serde_json::from_str(&resp).unwrap_or_default()
}

/// Fetch the full game snapshot.
async fn snapshot(app: &Router, token: &str, game_id: &str) -> serde_json::Value {
    let (status, body) =
        common::get_with_auth(app, &format!("/api/v1/games/{game_id}"), token).await;
    assert_eq!(status, StatusCode::OK, "snapshot failed: {body}");
    serde_json::from_str(&body).unwrap_or_default()
}

fn as_f64(v: &serde_json::Value) -> f64 {
    v.as_f64().unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Create / list
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_game_success_with_defaults() {
    let app = test_app().await;
    let token = signup(&app, "owner1@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Friday Futsal" })).await;

    assert_eq!(game["name"], "Friday Futsal");
    assert_eq!(game["season"], "S1");
    assert!((as_f64(&game["fineAmount"]) - 10.0).abs() < f64::EPSILON);
    assert_eq!(game["currency"], "RM");
    assert_eq!(game["userRole"], "owner");
    assert!(game["id"].is_string());
}

#[tokio::test]
async fn create_game_unauthenticated() {
    let app = test_app().await;

    let (status, _) =
        common::post_json(&app, "/api/v1/games", &json!({ "name": "No Auth" })).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_game_empty_name() {
    let app = test_app().await;
    let token = signup(&app, "owner2@example.com").await;

    let (status, body) =
        common::post_json_with_auth(&app, "/api/v1/games", &json!({ "name": "   " }), &token)
            .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn create_game_clamps_negative_fine() {
    let app = test_app().await;
    let token = signup(&app, "owner3@example.com").await;

    let game = create_game(
        &app,
        &token,
        &json!({ "name": "Clamped", "fineAmount": -5.0 }),
    )
    .await;

    assert!(as_f64(&game["fineAmount"]).abs() < f64::EPSILON);
}

#[tokio::test]
async fn list_games_newest_first() {
    let app = test_app().await;
    let token = signup(&app, "owner4@example.com").await;

    create_game(&app, &token, &json!({ "name": "First" })).await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    create_game(&app, &token, &json!({ "name": "Second" })).await;

    let (status, body) = common::get_with_auth(&app, "/api/v1/games", &token).await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    let games = v.as_array().cloned().unwrap_or_default();

    assert_eq!(games.len(), 2);
    assert_eq!(games[0]["name"], "Second");
    assert_eq!(games[1]["name"], "First");
    assert_eq!(games[0]["userRole"], "owner");
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot & aggregation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_scenario_totals_and_leaderboard() {
    let app = test_app().await;
    let token = signup(&app, "futsal@example.com").await;

    let game = create_game(
        &app,
        &token,
        &json!({ "name": "Friday Futsal", "fineAmount": 10.0, "currency": "RM" }),
    )
    .await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();

    let alice = add_player(&app, &token, &game_id, "Alice").await;
    let bob = add_player(&app, &token, &game_id, "Bob").await;

    add_event(
        &app,
        &token,
        &game_id,
        &json!({ "playerId": alice, "reason": "Traffic", "amount": 10.0 }),
    )
    .await;
    add_event(
        &app,
        &token,
        &game_id,
        &json!({ "playerId": bob, "reason": "Overslept", "amount": 15.0 }),
    )
    .await;

    let snap = snapshot(&app, &token, &game_id).await;

    assert!((as_f64(&snap["stats"]["totalPool"]) - 25.0).abs() < 1e-9);
    assert_eq!(snap["players"].as_array().map(Vec::len), Some(2));

    let leaderboard = snap["stats"]["leaderboard"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(leaderboard.len(), 2);
    assert_eq!(leaderboard[0]["name"], "Bob");
    assert!((as_f64(&leaderboard[0]["amount"]) - 15.0).abs() < 1e-9);
    assert_eq!(leaderboard[0]["lateCount"], 1);
    assert_eq!(leaderboard[1]["name"], "Alice");
    assert!((as_f64(&leaderboard[1]["amount"]) - 10.0).abs() < 1e-9);
    assert_eq!(leaderboard[1]["lateCount"], 1);
}

#[tokio::test]
async fn event_amounts_survive_fine_changes() {
    let app = test_app().await;
    let token = signup(&app, "snapshot@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Snapshots" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;

    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;

    // Raising the fine later must not rewrite history
    let (status, _) = common::patch_json_with_auth(
        &app,
        &format!("/api/v1/games/{game_id}"),
        &json!({ "fineAmount": 99.0 }),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let snap = snapshot(&app, &token, &game_id).await;
    assert!((as_f64(&snap["game"]["fineAmount"]) - 99.0).abs() < f64::EPSILON);
    assert!((as_f64(&snap["stats"]["totalPool"]) - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn streaks_reflect_event_recency() {
    let app = test_app().await;
    let token = signup(&app, "streaks@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Streaks" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let late = add_player(&app, &token, &game_id, "Late Today").await;
    add_player(&app, &token, &game_id, "Never Late").await;

    add_event(&app, &token, &game_id, &json!({ "playerId": late })).await;

    let snap = snapshot(&app, &token, &game_id).await;
    let leaderboard = snap["stats"]["leaderboard"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let late_row = leaderboard
        .iter()
        .find(|r| r["name"] == "Late Today")
        .cloned()
        .unwrap_or_default();
    let clean_row = leaderboard
        .iter()
        .find(|r| r["name"] == "Never Late")
        .cloned()
        .unwrap_or_default();

    assert_eq!(late_row["streakDays"], 0);
    assert_eq!(clean_row["streakDays"], 365);
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_event_defaults_reason_and_amount() {
    let app = test_app().await;
    let token = signup(&app, "defaults@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Defaults", "fineAmount": 7.5 })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;

    let event = add_event(
        &app,
        &token,
        &game_id,
        &json!({ "playerId": alice, "reason": "   " }),
    )
    .await;

    assert_eq!(event["reason"], "Late");
    assert!((as_f64(&event["amount"]) - 7.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn add_event_rejects_player_from_another_game() {
    let app = test_app().await;
    let token = signup(&app, "crossed@example.com").await;

    let game_a = create_game(&app, &token, &json!({ "name": "A" })).await;
    let game_b = create_game(&app, &token, &json!({ "name": "B" })).await;
    let a_id = game_a["id"].as_str().unwrap_or_default().to_string();
    let b_id = game_b["id"].as_str().unwrap_or_default().to_string();
    let stray = add_player(&app, &token, &a_id, "Stray").await;

    let (status, body) = common::post_json_with_auth(
        &app,
        &format!("/api/v1/games/{b_id}/events"),
        &json!({ "playerId": stray }),
        &token,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn delete_event_removes_single_row() {
    let app = test_app().await;
    let token = signup(&app, "deletes@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Deletes" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;

    let first = add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;
    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;

    let event_id = first["id"].as_str().unwrap_or_default();
    let (status, _) =
        common::delete_with_auth(&app, &format!("/api/v1/events/{event_id}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snap = snapshot(&app, &token, &game_id).await;
    assert_eq!(snap["events"].as_array().map(Vec::len), Some(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Player deletion cascade
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_player_cascades_to_their_events_only() {
    let app = test_app().await;
    let token = signup(&app, "cascade@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Cascade" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;
    let bob = add_player(&app, &token, &game_id, "Bob").await;

    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;
    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;
    add_event(&app, &token, &game_id, &json!({ "playerId": bob, "amount": 3.0 })).await;

    let (status, _) =
        common::delete_with_auth(&app, &format!("/api/v1/players/{alice}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let snap = snapshot(&app, &token, &game_id).await;
    assert_eq!(snap["players"].as_array().map(Vec::len), Some(1));
    assert_eq!(snap["events"].as_array().map(Vec::len), Some(1));
    assert_eq!(snap["events"][0]["playerId"].as_str().unwrap_or_default(), bob);
    assert!((as_f64(&snap["stats"]["totalPool"]) - 3.0).abs() < 1e-9);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reset season
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_season_clears_events_and_bumps_label() {
    let app = test_app().await;
    let token = signup(&app, "season@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Season", "season": "S3" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;
    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;

    let (status, body) = common::post_json_with_auth(
        &app,
        &format!("/api/v1/games/{game_id}/reset-season"),
        &json!({}),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    assert_eq!(v["season"], "S4");

    let snap = snapshot(&app, &token, &game_id).await;
    assert_eq!(snap["game"]["season"], "S4");
    assert_eq!(snap["events"].as_array().map(Vec::len), Some(0));
    // Players survive the reset
    assert_eq!(snap["players"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn reset_season_defaults_on_unparseable_label() {
    let app = test_app().await;
    let token = signup(&app, "oddseason@example.com").await;

    let game = create_game(
        &app,
        &token,
        &json!({ "name": "Odd", "season": "Season-X" }),
    )
    .await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();

    let (status, body) = common::post_json_with_auth(
        &app,
        &format!("/api/v1/games/{game_id}/reset-season"),
        &json!({}),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    assert_eq!(v["season"], "S2", "{body}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Update / delete game
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_game_normalizes_and_clamps() {
    let app = test_app().await;
    let token = signup(&app, "update@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Before" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();

    let (status, body) = common::patch_json_with_auth(
        &app,
        &format!("/api/v1/games/{game_id}"),
        &json!({ "name": "  After  ", "currency": "myr", "fineAmount": -2.0 }),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();

    assert_eq!(v["name"], "After");
    assert_eq!(v["currency"], "MYR");
    assert!(as_f64(&v["fineAmount"]).abs() < f64::EPSILON);
}

#[tokio::test]
async fn delete_game_cascades_and_revokes_access() {
    let app = test_app().await;
    let token = signup(&app, "teardown@example.com").await;

    let game = create_game(&app, &token, &json!({ "name": "Doomed" })).await;
    let game_id = game["id"].as_str().unwrap_or_default().to_string();
    let alice = add_player(&app, &token, &game_id, "Alice").await;
    add_event(&app, &token, &game_id, &json!({ "playerId": alice })).await;

    let (status, _) =
        common::delete_with_auth(&app, &format!("/api/v1/games/{game_id}"), &token).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = common::get_with_auth(&app, "/api/v1/games", &token).await;
    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
    assert_eq!(v.as_array().map(Vec::len), Some(0));

    // The id no longer resolves, and the denial stays opaque
    let (status, _) =
        common::get_with_auth(&app, &format!("/api/v1/games/{game_id}"), &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
