//! Application state shared across handlers.

use std::sync::Arc;

use spoke_core::Clock;

use crate::backend::{BackendClient, BackendError};
use crate::config::StorefrontConfig;
use crate::services::{CheckoutSession, CheckoutSessions, SpinGate};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the backend client, the visitors' checkouts, the spin gate and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: Arc<BackendClient>,
    checkouts: CheckoutSessions<BackendClient>,
    spin_gate: SpinGate<BackendClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `clock` - Source of "today" for the daily spin
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built.
    pub fn new(config: StorefrontConfig, clock: Arc<dyn Clock>) -> Result<Self, BackendError> {
        let backend = Arc::new(BackendClient::new(&config.backend)?);
        let checkouts = CheckoutSessions::new(Arc::clone(&backend), config.checkout);
        let spin_gate = SpinGate::new(Arc::clone(&backend), clock, config.mini_game);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                checkouts,
                spin_gate,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the REST backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get a reference to the daily spin gate.
    #[must_use]
    pub fn spin_gate(&self) -> &SpinGate<BackendClient> {
        &self.inner.spin_gate
    }

    /// The visitor's checkout, started on first use.
    pub async fn checkout(&self, visitor: &str) -> Arc<CheckoutSession<BackendClient>> {
        self.inner.checkouts.for_visitor(visitor).await
    }
}
