//! REST backend client.
//!
//! # Architecture
//!
//! - The backend is the source of truth for customers, orders and the prize
//!   draw; the storefront never persists any of it
//! - Plain JSON over HTTP via `reqwest`, camelCase on the wire
//! - The wheel layout is cached in memory via `moka` (5 minute TTL)
//!
//! # Seams
//!
//! Services depend on the [`CheckoutApi`] and [`MiniGameApi`] traits rather
//! than on [`BackendClient`] directly, so they can be driven by in-memory
//! fakes in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use spoke_storefront::backend::{BackendClient, CheckoutApi};
//!
//! let client = BackendClient::new(&config.backend)?;
//! let quote = client.calculate_shipping(&PostalCode::parse("150-0001")?).await?;
//! ```

mod cache;
mod client;
pub mod types;

use std::future::Future;

use spoke_core::{Email, LoyaltyDiscount, Phone, PostalCode, PrizeResult, WheelConfig};
use thiserror::Error;

pub use client::BackendClient;
pub use types::{
    OrderConfirmation, OrderCustomer, OrderItem, OrderPricing, OrderRequest, ShippingQuote,
};

/// Errors that can occur when talking to the REST backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// Whether the backend reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// Backend endpoints the checkout page uses.
pub trait CheckoutApi: Send + Sync + 'static {
    /// `GET customers/checkDiscount`. `Ok(None)` means the customer is not
    /// eligible for a loyalty discount.
    fn check_discount(
        &self,
        email: Option<&Email>,
        phone: Option<&Phone>,
    ) -> impl Future<Output = Result<Option<LoyaltyDiscount>, BackendError>> + Send;

    /// `POST shipping/calculate`.
    fn calculate_shipping(
        &self,
        postal_code: &PostalCode,
    ) -> impl Future<Output = Result<ShippingQuote, BackendError>> + Send;

    /// `POST orders`.
    fn create_order(
        &self,
        order: &OrderRequest,
    ) -> impl Future<Output = Result<OrderConfirmation, BackendError>> + Send;
}

/// Backend endpoints the lucky wheel uses.
pub trait MiniGameApi: Send + Sync + 'static {
    /// `GET miniGame/wheelConfig`.
    fn wheel_config(&self) -> impl Future<Output = Result<WheelConfig, BackendError>> + Send;

    /// `POST miniGame/spinWheel`. The backend draws the prize.
    fn spin_wheel(&self) -> impl Future<Output = Result<PrizeResult, BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Api {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 503 - maintenance");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        let err = BackendError::Api {
            status: 404,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!BackendError::Parse("bad".to_string()).is_not_found());
    }
}
