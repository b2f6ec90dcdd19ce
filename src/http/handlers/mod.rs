//! REST handlers under `/api/v1`.
//!
//! Handlers only extract, delegate to a service and shape the response;
//! permission checks and validation live in the services.

pub mod activities;
pub mod attachments;
pub mod auth;
pub mod leads;
pub mod quotes;
pub mod tenants;
pub mod users;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::CrmConfig;
use crate::http::server::AppState;
use crate::http::websocket;
use crate::security::limits::upload_body_limit;

/// Optimistic concurrency token passed as a query parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct VersionQuery {
    pub expected_version: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health(State(_state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn api_routes(config: &CrmConfig) -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", post(auth::change_password))
        .route("/tenants", get(tenants::list).post(tenants::create))
        .route("/tenants/{id}", get(tenants::get).patch(tenants::update))
        .route("/tenants/{id}/suspend", post(tenants::suspend))
        .route("/tenants/{id}/activate", post(tenants::activate))
        .route("/tenant", get(tenants::current).patch(tenants::update_current))
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}", get(users::get).patch(users::update))
        .route("/users/{id}/activate", post(users::activate))
        .route("/users/{id}/deactivate", post(users::deactivate))
        .route("/leads", get(leads::list).post(leads::create))
        .route("/leads/board", get(leads::board))
        .route("/leads/bulk-assign", post(leads::bulk_assign))
        .route(
            "/leads/{id}",
            get(leads::get).patch(leads::update).delete(leads::archive),
        )
        .route("/leads/{id}/transitions", get(leads::transitions))
        .route("/leads/{id}/category", post(leads::change_category))
        .route("/leads/{id}/assign", post(leads::assign))
        .route("/leads/{id}/unassign", post(leads::unassign))
        .route(
            "/leads/{id}/activities",
            get(activities::list_for_lead).post(activities::log),
        )
        .route(
            "/leads/{id}/attachments",
            get(attachments::list)
                .post(attachments::upload)
                .layer(upload_body_limit(config)),
        )
        .route("/activities", get(activities::feed))
        .route(
            "/attachments/{id}",
            get(attachments::download).delete(attachments::delete),
        )
        .route("/quotes", get(quotes::list).post(quotes::create))
        .route(
            "/quotes/{id}",
            get(quotes::get).patch(quotes::update).delete(quotes::delete),
        )
        .route("/quotes/{id}/send", post(quotes::send))
        .route("/quotes/{id}/accept", post(quotes::accept))
        .route("/quotes/{id}/reject", post(quotes::reject))
        .route("/ws", get(websocket::ws_handler))
}
