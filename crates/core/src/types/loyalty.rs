//! Loyalty discount as resolved by the customer service.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Purchase-history tier a returning customer has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Discount the customer service grants to an email/phone pair.
///
/// `discount` is a percentage of the cart subtotal. It never applies to
/// shipping or the COD surcharge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyDiscount {
    /// True when the backend has never seen this customer.
    #[serde(default)]
    pub is_new_customer: bool,
    /// Percentage, 0 to 100.
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    /// Tier, if the backend reports one this storefront knows about.
    #[serde(default, deserialize_with = "lenient_tier")]
    pub tier: Option<LoyaltyTier>,
    /// Localized tier label.
    #[serde(default)]
    pub tier_name: String,
    /// Message to show next to the discount line.
    #[serde(default)]
    pub message: String,
}

impl LoyaltyDiscount {
    /// Discount percentage clamped into `0..=100`.
    #[must_use]
    pub fn percent(&self) -> Decimal {
        self.discount.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
    }
}

/// Tiers are added server-side from time to time; an unknown one must not
/// make the whole lookup fail.
fn lenient_tier<'de, D>(deserializer: D) -> Result<Option<LoyaltyTier>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}
