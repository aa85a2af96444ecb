mod auth;
mod events;
mod games;
mod health;
mod invites;
mod players;
mod session;

use axum::Router;

use crate::state::AppState;

/// Build the complete application router.
///
/// Structure:
/// - `GET /health` — lightweight health check (used by the deploy platform)
/// - `/api/v1/...` — versioned API surface
pub fn router() -> Router<AppState> {
    let api_v1 = Router::new()
        .nest("/auth", auth::router())
        .nest("/games", games::router())
        .nest("/players", players::router())
        .nest("/events", events::router())
        .nest("/invites", invites::router())
        .nest("/session", session::router())
        .merge(health::api_router());

    Router::new()
        .merge(health::root_router())
        .nest("/api/v1", api_v1)
}
