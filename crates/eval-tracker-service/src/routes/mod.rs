use axum::routing::{get, post, put};
use axum::Router;

use crate::state::ServiceState;

mod auth;
mod requests;
mod system;

pub fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/api/config", get(system::config))
        .route("/api/config/:section", get(system::config_section))
        .route("/api/auth/login", get(auth::login))
        .route("/api/auth/callback", get(auth::callback))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/requests", get(requests::list).post(requests::create))
        .route("/api/requests/search/:query", get(requests::search))
        .route("/api/requests/export/json", get(requests::export))
        .route("/api/requests/import/json", post(requests::import))
        .route(
            "/api/requests/:id",
            get(requests::show)
                .put(requests::update)
                .delete(requests::delete),
        )
        .route("/api/requests/:id/start", post(requests::start))
        .route("/api/requests/:id/links", post(requests::add_links))
        .route("/api/requests/:id/complete", post(requests::complete))
        .route("/api/requests/:id/priority", put(requests::update_priority))
        .with_state(state)
}
