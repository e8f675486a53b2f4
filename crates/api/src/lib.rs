//! HTTP surface for the order fulfillment services.
//!
//! One binary serves any [`Role`](config::Role): the orchestrator, the
//! reservation and finalization services over the inventory ledger, the
//! reference payment and notification services, or all of them at once.
//! Every role exposes `/health` and `/metrics`, traces requests and answers
//! errors with a `{"message": ...}` body.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Role;
pub use state::{Coordinator, InventoryServices, Services, StartupError};

/// Creates the Axum application router for the services a process serves.
pub fn create_app(services: Services, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let mut app = Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router);

    if let Some(coordinator) = services.coordinator {
        app = app.merge(
            routes::orchestrator::router(coordinator).layer(cors(services.allowed_origin)),
        );
    }
    if let Some(inventory) = services.inventory {
        if services.role != Role::Finalization {
            app = app
                .merge(routes::reservation::router(inventory.clone()))
                .merge(routes::cart::router(inventory.clone()));
        }
        if services.role != Role::Reservation {
            app = app.merge(routes::finalization::router(inventory));
        }
    }
    if let Some(payment) = services.payment {
        app = app.merge(routes::payment::router(payment));
    }
    if let Some(notification) = services.notification {
        app = app.merge(routes::notification::router(notification));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Cross-origin access to the orchestrator: one origin, GET/POST/OPTIONS,
/// `Content-Type` and `Authorization` headers.
fn cors(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}
