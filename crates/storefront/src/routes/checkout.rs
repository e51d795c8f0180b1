//! Checkout route handlers.
//!
//! Every visitor has one [`CheckoutSession`](crate::services::CheckoutSession),
//! found through the `visitor_id` in their session. The page forwards each
//! edit as it happens: contact keystrokes go to `/contact`, where the session
//! debounces the loyalty lookup and drops stale answers; manual shipping picks
//! go to `/shipping-option` and win over an estimate still in flight. Most
//! calls answer with a [`CheckoutView`] the page renders as is.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::LOCATION},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use spoke_core::{
    CartLine, OrderId, PaymentMethod, PriceBreakdown, SHIPPING_OPTIONS, ShippingOption,
    ShippingOptionId, Yen,
};
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::backend::BackendClient;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::session::{referral_code, visitor_id};
use crate::services::{
    CheckoutSession, CheckoutView, CustomerDetails, LoyaltyStatus, ShippingSuggestion,
};
use crate::state::AppState;

/// Loyalty lookup query.
#[derive(Debug, Deserialize)]
pub struct DiscountQuery {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// Contact field edit.
#[derive(Debug, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// Manual shipping selection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOptionForm {
    pub shipping_option: ShippingOptionId,
}

/// Postal-code shipping estimate request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingForm {
    pub postal_code: String,
}

/// Price quote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Order placement request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderForm {
    pub items: Vec<CartLine>,
    pub customer: CustomerDetails,
    /// Selection shown on the page; the session's own is used when absent.
    #[serde(default)]
    pub shipping_option: Option<ShippingOptionId>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_preference: String,
    #[serde(default)]
    pub notes: String,
}

/// Order placement response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_number: String,
    pub id: OrderId,
    pub pricing: PriceBreakdown,
    /// Storefront URL that redirects to the printable invoice.
    pub invoice_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_coupon: Option<serde_json::Value>,
}

/// `GET /api/checkout/shipping-options`
pub async fn shipping_options() -> Json<&'static [ShippingOption]> {
    let options: &'static [ShippingOption] = &SHIPPING_OPTIONS;
    Json(options)
}

/// `GET /api/checkout`
#[instrument(skip_all)]
pub async fn view(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let checkout = visitor_checkout(&state, &session).await?;
    Ok(Json(checkout.view()))
}

/// `POST /api/checkout/contact`
///
/// Answers straight away; the lookup is sent once the fields have been quiet
/// for the debounce window and shows up in a later view.
#[instrument(skip_all)]
pub async fn contact(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<ContactForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = visitor_checkout(&state, &session).await?;
    checkout.update_contact(&form.email, &form.phone);
    Ok(Json(checkout.view()))
}

/// `PUT /api/checkout/shipping-option`
#[instrument(skip_all, fields(shipping = %form.shipping_option))]
pub async fn select_shipping_option(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<ShippingOptionForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = visitor_checkout(&state, &session).await?;
    checkout.select_shipping_option(form.shipping_option);
    Ok(Json(checkout.view()))
}

/// `GET /api/checkout/discount`
///
/// Looks the discount up without waiting for the debounce window.
#[instrument(skip_all)]
pub async fn discount(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<DiscountQuery>,
) -> Result<Json<LoyaltyStatus>> {
    let checkout = visitor_checkout(&state, &session).await?;
    let status = checkout
        .resolve_loyalty_now(&query.email, &query.phone)
        .await?;
    Ok(Json(status))
}

/// `POST /api/checkout/shipping`
///
/// Answers 409 while another estimate for the same visitor is in flight.
#[instrument(skip_all)]
pub async fn shipping(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<ShippingForm>,
) -> Result<Json<ShippingSuggestion>> {
    let checkout = visitor_checkout(&state, &session).await?;
    let suggestion = checkout
        .resolve_shipping_by_postal_code(&form.postal_code)
        .await?;
    Ok(Json(suggestion))
}

/// `POST /api/checkout/quote`
///
/// Prices the cart with the discount and shipping the visitor's checkout
/// holds. A failed loyalty lookup never fails the quote; it comes back as a
/// notice and the previous discount stays.
#[instrument(skip_all, fields(items = request.items.len()))]
pub async fn quote(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<CheckoutView>> {
    validate_items(&request.items)?;

    let checkout = visitor_checkout(&state, &session).await?;
    checkout.set_cart(request.items);
    checkout.set_payment_method(request.payment_method);

    Ok(Json(checkout.view()))
}

/// `POST /api/checkout/orders`
#[instrument(skip_all, fields(items = form.items.len()))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<OrderForm>,
) -> Result<impl IntoResponse> {
    validate_items(&form.items)?;

    let checkout = visitor_checkout(&state, &session).await?;
    checkout.set_cart(form.items);
    checkout.set_payment_method(form.payment_method);
    if let Some(id) = form.shipping_option
        && id != checkout.shipping_option()
    {
        checkout.select_shipping_option(id);
    }

    if let Err(e) = checkout
        .confirm_loyalty(&form.customer.email, &form.customer.phone)
        .await
    {
        warn!(error = %e, "Placing order without loyalty discount");
    }

    let partner = referral_code(&session).await?;
    let pricing = checkout.breakdown();
    let confirmation = checkout
        .submit_order(form.customer, form.delivery_preference, form.notes, partner)
        .await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_number", confirmation.order_number.as_str())]),
    );

    let invoice_url = format!("/checkout/orders/{}/invoice", confirmation.id);
    Ok((
        StatusCode::CREATED,
        Json(OrderPlaced {
            order_number: confirmation.order_number,
            id: confirmation.id,
            pricing,
            invoice_url,
            restaurant_coupon: confirmation.restaurant_coupon,
        }),
    ))
}

/// `GET /checkout/orders/{id}/invoice`
///
/// The invoice is rendered by the backend; the storefront only points at it.
#[instrument(skip(state))]
pub async fn invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let url = state.backend().invoice_url(&OrderId::new(id))?;
    Ok((StatusCode::FOUND, [(LOCATION, url.to_string())]))
}

async fn visitor_checkout(
    state: &AppState,
    session: &Session,
) -> Result<Arc<CheckoutSession<BackendClient>>> {
    let visitor = visitor_id(session).await?;
    Ok(state.checkout(&visitor).await)
}

fn validate_items(items: &[CartLine]) -> Result<()> {
    if items.iter().any(|line| line.unit_price < Yen::ZERO) {
        return Err(AppError::BadRequest(
            "Item prices cannot be negative".to_string(),
        ));
    }
    if items.iter().any(|line| line.quantity == 0) {
        return Err(AppError::BadRequest(
            "Item quantities must be at least 1".to_string(),
        ));
    }
    Ok(())
}
