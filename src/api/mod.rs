//! All API endpoint setup

use axum::Router;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use axum::routing::put;

pub use audit_trail::AuditTrail;
pub use current_user::CurrentPrincipal;
pub use current_user::PRINCIPAL_HEADER;
pub use request::Form;
pub use request::PathParameters;
pub use request::parse_url;
pub use response::Error;
pub use response::Success;

use crate::storage::Storage;

mod audit_trail;
mod current_user;
mod domains;
mod links;
mod organizations;
mod request;
mod response;
mod review;
mod roles;
mod stats;
mod utils;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    let stats = Router::new()
        .route("/", get(stats::overall::<S>))
        .route("/daily", get(stats::daily::<S>))
        .route("/monthly", get(stats::monthly::<S>))
        .route("/geoip", get(stats::geoip::<S>))
        .route("/browsers", get(stats::browsers::<S>))
        .route("/referers", get(stats::referers::<S>));

    let links = Router::new()
        .route("/", get(links::list::<S>))
        .route("/", post(links::create::<S>))
        .route("/{link}", get(links::single::<S>))
        .route("/{link}", patch(links::update::<S>))
        .route("/{link}", delete(links::delete::<S>))
        .route("/{link}/aliases", post(links::create_alias::<S>))
        .route("/{link}/aliases/{alias}", delete(links::delete_alias::<S>))
        .route("/{link}/visits", delete(links::clear_visits::<S>))
        .nest("/{link}/stats", stats);

    let review = Router::new()
        .route("/", get(review::list::<S>))
        .route("/{pending}/promote", post(review::promote::<S>))
        .route("/{pending}/reject", post(review::reject::<S>))
        .route("/{pending}/reconsider", post(review::reconsider::<S>));

    let roles = Router::new()
        .route("/{role}/{entity}", put(roles::grant::<S>))
        .route("/{role}/{entity}", delete(roles::revoke::<S>));

    let organizations = Router::new()
        .route("/", post(organizations::create::<S>))
        .route("/{organization}", get(organizations::single::<S>))
        .route("/{organization}/members", post(organizations::add_member::<S>));

    Router::new()
        .route("/stats/geoip", get(stats::geoip_site_wide::<S>))
        .route("/banned-domains/{domain}", put(domains::ban::<S>))
        .nest("/links", links)
        .nest("/review", review)
        .nest("/roles", roles)
        .nest("/organizations", organizations)
}
