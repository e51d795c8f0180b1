//! Request and response bodies exchanged with the REST backend.

use serde::{Deserialize, Serialize};
use spoke_core::{
    CartLine, Email, OrderId, PaymentMethod, Phone, PriceBreakdown, ProductId, ShippingOptionId,
    Yen,
};

/// Body of `POST shipping/calculate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRequest<'a> {
    pub postal_code: &'a str,
}

/// Distance-based delivery estimate for a postal code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    /// Distance from the shop; older backends call it `estimatedDistance`.
    #[serde(default, alias = "estimatedDistance")]
    pub distance_km: Option<f64>,
    /// Fee the backend computed; informational, the local catalog fee is
    /// what gets charged.
    pub fee: Yen,
    /// Suggested shipping option id.
    pub method: String,
    #[serde(default)]
    pub description: String,
}

impl ShippingQuote {
    /// The local option the backend suggests, if it names one we offer.
    #[must_use]
    pub fn suggested_option(&self) -> Option<ShippingOptionId> {
        self.method.parse().ok()
    }
}

/// Customer block of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCustomer {
    pub name: String,
    pub email: Email,
    pub phone: Phone,
    /// Empty for store pickup.
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// One ordered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product: ProductId,
    pub quantity: u32,
    pub price: Yen,
}

impl From<&CartLine> for OrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product: line.product_id.clone(),
            quantity: line.quantity,
            price: line.unit_price,
        }
    }
}

/// Price summary sent alongside the order so the backend can cross-check it.
pub type OrderPricing = PriceBreakdown;

/// Body of `POST orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub customer: OrderCustomer,
    pub items: Vec<OrderItem>,
    pub payment_method: PaymentMethod,
    pub shipping_option: ShippingOptionId,
    pub delivery_preference: String,
    pub notes: String,
    /// Affiliate/referral code that brought the customer in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    pub pricing: OrderPricing,
}

/// Response of `POST orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_number: String,
    #[serde(rename = "_id")]
    pub id: OrderId,
    /// Partner-restaurant voucher some orders come with; shape is owned by
    /// the backend and passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_coupon: Option<serde_json::Value>,
}
