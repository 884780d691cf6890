//! Route table and CORS assembly.

pub mod admin;
pub mod auth;
pub mod messages;
pub mod profile;
pub mod projects;
pub mod realtime;
pub mod tasks;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::http::header::CONTENT_TYPE;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    let cors = build_cors(&state.config.allow_origins);

    Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/auth/verify", get(auth::verify_email))
        .route("/api/resend-verification", post(auth::resend_verification))
        .route("/api/auth/setup", post(auth::complete_setup))
        .route("/api/profile", get(profile::get_profile).put(profile::update_profile))
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .put(projects::update)
                .delete(projects::remove),
        )
        .route(
            "/api/projects/{id}/members",
            get(projects::list_members).post(projects::add_member),
        )
        .route(
            "/api/projects/{id}/members/{user_id}",
            delete(projects::remove_member),
        )
        .route(
            "/api/projects/{id}/tasks",
            get(tasks::list).post(tasks::create),
        )
        .route(
            "/api/projects/{id}/tasks/{task_id}",
            put(tasks::update).delete(tasks::remove),
        )
        .route(
            "/api/projects/{id}/messages",
            get(messages::list).post(messages::create),
        )
        .route("/api/projects/{id}/realtime", get(realtime::sse))
        .route("/ws", get(realtime::ws))
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/api/admin/projects", get(admin::list_projects))
        .route("/api/admin/stats", get(admin::stats))
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any);
    }

    let headers: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    // Credentialed CORS forbids wildcard headers, so name them.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
}
