//! HTTP router assembly.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, middleware, state::AppState};

/// Build the application router.
///
/// # Routes
///
/// Public:
/// - `GET /health`
/// - `POST /payment/initiate`
/// - `GET|POST /payment/return`
/// - `GET /payment/transactions?payerIdentifier=...`
/// - `POST /payment/razorpay/order`
/// - `POST /payment/stripe/intent`
/// - `GET /payment/stripe/key`
///
/// Admin (`Authorization: Bearer <ADMIN_API_KEY>`):
/// - `GET /payment/transactions/all`
/// - `POST /payment/transactions/{merchantTransactionId}/reconcile`
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/payment/transactions/all",
            get(handlers::payments::list_all_transactions),
        )
        .route(
            "/payment/transactions/{merchant_transaction_id}/reconcile",
            post(handlers::payments::reconcile_transaction),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/payment/initiate",
            post(handlers::payments::initiate_payment),
        )
        .route(
            "/payment/return",
            get(handlers::payments::payment_return).post(handlers::payments::payment_return),
        )
        .route(
            "/payment/transactions",
            get(handlers::payments::list_transactions),
        )
        .route(
            "/payment/razorpay/order",
            post(handlers::payments::create_razorpay_order),
        )
        .route(
            "/payment/stripe/intent",
            post(handlers::payments::create_stripe_intent),
        )
        .route("/payment/stripe/key", get(handlers::payments::stripe_api_key))
        .merge(admin_routes)
        .layer(cors_layer(&state.frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the storefront frontend, with credentials.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(frontend_url, error = %e, "FRONTEND_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}
