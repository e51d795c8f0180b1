//! `reqwest`-based implementation of the backend traits.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use spoke_core::{Email, LoyaltyDiscount, OrderId, Phone, PostalCode, PrizeResult, WheelConfig};
use tracing::{debug, instrument};
use url::Url;

use super::cache::CacheKey;
use super::types::{OrderConfirmation, OrderRequest, ShippingQuote, ShippingRequest};
use super::{BackendError, CheckoutApi, MiniGameApi};
use crate::config::BackendConfig;

/// How long the wheel layout is served from memory.
const WHEEL_CONFIG_TTL: Duration = Duration::from_secs(300);

/// Longest slice of a response body copied into logs and errors.
const BODY_PREVIEW_CHARS: usize = 500;

/// Client for the REST backend.
///
/// Cheap to clone; all clones share one connection pool and cache.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<CacheKey, WheelConfig>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key.expose_secret())
                .map_err(|e| BackendError::Parse(format!("Invalid API key format: {e}")))?;
            value.set_sensitive(true);
            headers.insert("X-Api-Key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(8)
            .time_to_live(WHEEL_CONFIG_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Absolute URL of a backend endpoint.
    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// URL of the printable invoice for an order.
    ///
    /// The page opens it in a new window; the storefront never fetches it.
    ///
    /// # Errors
    ///
    /// Returns error if the order id cannot be placed in a URL path.
    pub fn invoice_url(&self, order_id: &OrderId) -> Result<Url, BackendError> {
        let mut url = self.endpoint("orders/")?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Parse("backend URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(order_id.as_str())
            .push("invoice");
        Ok(url)
    }

    /// Send a request and decode the JSON body.
    ///
    /// The body is read as text first so failures can be logged with what the
    /// backend actually said.
    async fn send<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let preview = body.chars().take(BODY_PREVIEW_CHARS).collect::<String>();
            if status != reqwest::StatusCode::NOT_FOUND {
                tracing::warn!(status = %status, body = %preview, "Backend returned non-success status");
            }
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: extract_message(&preview),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(BODY_PREVIEW_CHARS).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e.to_string())
        })
    }
}

impl CheckoutApi for BackendClient {
    #[instrument(skip_all, fields(has_email = email.is_some(), has_phone = phone.is_some()))]
    async fn check_discount(
        &self,
        email: Option<&Email>,
        phone: Option<&Phone>,
    ) -> Result<Option<LoyaltyDiscount>, BackendError> {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(2);
        if let Some(email) = email {
            query.push(("email", email.as_str()));
        }
        if let Some(phone) = phone {
            query.push(("phone", phone.as_str()));
        }

        let request = self
            .inner
            .client
            .get(self.endpoint("customers/checkDiscount")?)
            .query(&query);

        match Self::send::<Option<LoyaltyDiscount>>(request).await {
            Ok(discount) => {
                debug!(matched = discount.is_some(), "Loyalty discount resolved");
                Ok(discount)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(postal_code = %postal_code))]
    async fn calculate_shipping(
        &self,
        postal_code: &PostalCode,
    ) -> Result<ShippingQuote, BackendError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("shipping/calculate")?)
            .json(&ShippingRequest {
                postal_code: postal_code.as_str(),
            });
        Self::send(request).await
    }

    #[instrument(skip_all, fields(items = order.items.len(), total = order.pricing.total.amount()))]
    async fn create_order(&self, order: &OrderRequest) -> Result<OrderConfirmation, BackendError> {
        let request = self.inner.client.post(self.endpoint("orders")?).json(order);
        let confirmation: OrderConfirmation = Self::send(request).await?;
        tracing::info!(order_number = %confirmation.order_number, "Order created");
        Ok(confirmation)
    }
}

impl MiniGameApi for BackendClient {
    #[instrument(skip(self))]
    async fn wheel_config(&self) -> Result<WheelConfig, BackendError> {
        if let Some(config) = self.inner.cache.get(&CacheKey::WheelConfig).await {
            debug!("Wheel config cache hit");
            return Ok(config);
        }

        let request = self.inner.client.get(self.endpoint("miniGame/wheelConfig")?);
        let config: WheelConfig = Self::send(request).await?;

        self.inner
            .cache
            .insert(CacheKey::WheelConfig, config.clone())
            .await;
        Ok(config)
    }

    #[instrument(skip(self))]
    async fn spin_wheel(&self) -> Result<PrizeResult, BackendError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("miniGame/spinWheel")?)
            .json(&serde_json::json!({}));
        Self::send(request).await
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend usually answers `{"message": "..."}`; anything else is passed
/// through as-is.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
