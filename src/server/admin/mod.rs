mod featured;
mod groups;
mod tokens;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // User routes
        .route("/users", post(users::create_user))
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}", patch(users::update_user))
        .route("/users/{id}", delete(users::delete_user))
        .route("/users/{id}/tokens", get(users::list_user_tokens))
        .route("/users/{id}/tokens", post(users::create_user_token))
        // Group routes
        .route("/groups", post(groups::create_group))
        .route("/groups", get(groups::list_groups))
        .route("/groups/{id}", get(groups::get_group))
        .route("/groups/{id}", delete(groups::delete_group))
        // Token routes
        .route("/tokens", get(tokens::list_tokens))
        .route("/tokens/{id}", get(tokens::get_token))
        .route("/tokens/{id}", delete(tokens::delete_token))
        // Featured community routes
        .route("/featured", post(featured::create_featured))
        .route("/featured", get(featured::list_featured))
        .route("/featured/{id}", delete(featured::delete_featured))
}
