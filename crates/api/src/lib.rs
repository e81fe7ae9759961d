//! HTTP API server for the commerce backend.
//!
//! Exposes auth, catalog, cart, checkout and back-office endpoints over a
//! pluggable store, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Auth
        .route("/auth/register", post(routes::auth::register::<S>))
        .route("/auth/login", post(routes::auth::login::<S>))
        .route("/auth/profile", get(routes::auth::profile::<S>))
        // Catalog
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/categories", get(routes::products::categories::<S>))
        // Cart
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/add", post(routes::cart::add::<S>))
        .route(
            "/cart/items/{id}",
            put(routes::cart::update_item::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route("/cart/clear", delete(routes::cart::clear::<S>))
        .route("/cart/summary", get(routes::cart::summary::<S>))
        // Checkout and customer orders
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/checkout/history", get(routes::checkout::history::<S>))
        .route("/checkout/orders/{id}", get(routes::checkout::get::<S>))
        .route(
            "/checkout/orders/{id}/cancel",
            put(routes::checkout::cancel::<S>),
        )
        // Back office
        .route("/admin/orders", get(routes::admin::list_orders::<S>))
        .route("/admin/orders/{id}", get(routes::admin::get_order::<S>))
        .route(
            "/admin/orders/{id}/status",
            put(routes::admin::update_status::<S>),
        )
        .route(
            "/admin/orders/{id}/payment",
            put(routes::admin::update_payment::<S>),
        )
        .route(
            "/admin/products",
            get(routes::products::admin_list::<S>).post(routes::products::create::<S>),
        )
        .route(
            "/admin/products/{id}",
            put(routes::products::update::<S>).delete(routes::products::delete::<S>),
        )
        .route(
            "/admin/categories",
            post(routes::products::create_category::<S>),
        )
        .route(
            "/admin/users",
            get(routes::users::list::<S>).post(routes::users::create::<S>),
        )
        .route(
            "/admin/users/{id}",
            get(routes::users::get::<S>)
                .put(routes::users::update::<S>)
                .delete(routes::users::delete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state, seeding the bootstrap administrator when
/// one is configured.
pub async fn create_state<S: CommerceStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Result<Arc<AppState<S>>, domain::CommerceError> {
    let state = AppState::new(store, config);

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        state.auth.ensure_admin(email, password).await?;
    }
    Ok(Arc::new(state))
}
