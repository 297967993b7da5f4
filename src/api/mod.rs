//! HTTP API
//!
//! Every route except `/health` needs a buyer token.

pub mod auth;
pub mod cart;
pub mod error;
pub mod orders;
pub mod products;
pub mod wishlist;

use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::services::Services;
use auth::JwtKeys;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub fn new(services: Services, jwt_secret: &str) -> Self {
        Self { services, jwt: Arc::new(JwtKeys::new(jwt_secret)) }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"}))
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products", post(products::create))
        .route("/products/view/:id_or_slug", post(products::view))
        .route("/products/:id/resolve", get(products::resolve))
        .route("/products/variant/instock/:product_id", post(products::in_stock))
        .route("/products/:id/pricing", patch(products::reprice))
        .route("/products/:id/stock", patch(products::set_stock))
        .route("/cart", get(cart::view).post(cart::add))
        .route("/cart/make-cart-empty", delete(cart::empty))
        .route("/cart/:id", patch(cart::update).delete(cart::remove))
        .route("/wishlist/list", get(wishlist::list))
        .route("/wishlist/create", post(wishlist::create))
        .route("/wishlist/update/:id", patch(wishlist::update))
        .route("/wishlist/delete/:id", delete(wishlist::delete))
        .route("/wishlist/move-to-cart/:id", post(wishlist::move_to_cart))
        .route("/orders/place", post(orders::place))
        .route("/orders/list-group/:product_type", get(orders::list_group))
        .route("/orders/view-orders/:order_group_id", get(orders::view))
        .route("/orders/cancel", patch(orders::cancel))
        .route("/orders/cancel-item", patch(orders::cancel_item))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
