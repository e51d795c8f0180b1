//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Health check
//!
//! # Checkout API (one checkout per visitor)
//! GET  /api/checkout                    - Current checkout view
//! GET  /api/checkout/shipping-options   - Shipping catalog
//! POST /api/checkout/contact            - Email/phone edit (debounced lookup)
//! PUT  /api/checkout/shipping-option    - Pick a shipping option by hand
//! GET  /api/checkout/discount           - Loyalty discount, looked up now
//! POST /api/checkout/shipping           - Shipping suggestion for a postal code
//! POST /api/checkout/quote              - Set cart and payment, price it
//! POST /api/checkout/orders             - Place an order
//! GET  /checkout/orders/{id}/invoice    - Redirect to the backend invoice
//!
//! # Lucky wheel
//! GET  /api/mini-game/wheel             - Wheel layout and today's allowance
//! POST /api/mini-game/spin              - Spin (once per day)
//!
//! # Referrals
//! GET  /ref/{code}                      - Store referral code, redirect home
//!
//! Anything else                         - 404 with a JSON error body
//! ```

pub mod checkout;
pub mod mini_game;
pub mod referral;

use axum::{
    Router,
    http::Uri,
    middleware::map_response,
    routing::{get, post, put},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, rate_limited_json, spin_rate_limiter};
use crate::state::AppState;

/// Create the checkout API routes router.
pub fn checkout_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::view))
        .route("/shipping-options", get(checkout::shipping_options))
        .route("/contact", post(checkout::contact))
        .route("/shipping-option", put(checkout::select_shipping_option))
        .route("/discount", get(checkout::discount))
        .route("/shipping", post(checkout::shipping))
        .route("/quote", post(checkout::quote))
        .route("/orders", post(checkout::place_order))
        .layer(api_rate_limiter())
        .layer(map_response(rate_limited_json))
}

/// Create the lucky wheel API routes router.
pub fn mini_game_api_routes() -> Router<AppState> {
    Router::new()
        .route("/wheel", get(mini_game::wheel))
        .route(
            "/spin",
            post(mini_game::spin)
                .layer(spin_rate_limiter())
                .layer(map_response(rate_limited_json)),
        )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Checkout API
        .nest("/api/checkout", checkout_api_routes())
        // Invoice redirect
        .route("/checkout/orders/{id}/invoice", get(checkout::invoice))
        // Lucky wheel API
        .nest("/api/mini-game", mini_game_api_routes())
        // Referral links
        .route("/ref/{code}", get(referral::capture))
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
