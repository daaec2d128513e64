pub mod access;
mod communities;
mod invitations;
mod members;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn communities_router() -> Router<Arc<AppState>> {
    Router::new()
        // Communities
        .route("/communities", get(communities::search_communities))
        .route("/communities", post(communities::create_community))
        .route("/communities/featured", get(communities::list_featured))
        .route("/communities/{id}", get(communities::get_community))
        .route("/communities/{id}", patch(communities::update_community))
        .route("/communities/{id}", delete(communities::delete_community))
        // Members
        .route("/communities/{id}/members", get(members::list_members))
        .route("/communities/{id}/members", post(members::add_member))
        .route(
            "/communities/{id}/members/public",
            get(members::list_public_members),
        )
        .route(
            "/communities/{id}/members/{member_id}",
            patch(members::update_member),
        )
        .route(
            "/communities/{id}/members/{member_id}",
            delete(members::remove_member),
        )
        // Invitations
        .route(
            "/communities/{id}/invitations",
            get(invitations::list_invitations),
        )
        .route(
            "/communities/{id}/invitations",
            post(invitations::create_invitation),
        )
        .route(
            "/communities/{id}/invitations/{member_id}",
            patch(invitations::update_invitation),
        )
        .route(
            "/communities/{id}/invitations/{member_id}/actions/{action}",
            post(invitations::invitation_action),
        )
        // Self-service join requests
        .route(
            "/communities/{id}/membership_requests",
            post(invitations::create_membership_request),
        )
}
