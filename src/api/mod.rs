// REST surface of the lost-and-found service.

pub mod categories;
pub mod health;
pub mod items;
pub mod subscriptions;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::TokenVerifier;
use crate::db::{CategoryRepository, ItemRepository};
use crate::middleware::require_admin;
use crate::services::ingestion::IngestionService;
use crate::services::subscription_service::SubscriptionService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub items: Arc<dyn ItemRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub subscriptions: Arc<SubscriptionService>,
    /// `None` disables the admin check on item mutations.
    pub verifier: Option<TokenVerifier>,
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let admin = Router::new()
        .route("/item/update/:id", put(items::update_item))
        .route("/item/delete/:id", delete(items::delete_item))
        .route("/item/claim/:id", put(items::claim_item))
        .route("/item/unclaim/:id", put(items::unclaim_item))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let public = Router::new()
        .route("/items", get(items::list_items))
        .route("/item/create", post(items::create_item))
        .route("/item/:id", get(items::get_item))
        .route("/category", get(categories::list_categories))
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::subscribe),
        )
        .route("/subscriptions/verify", get(subscriptions::verify))
        .merge(health::health_routes());

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}
