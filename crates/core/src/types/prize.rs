//! Lucky-wheel prizes and spin results.
//!
//! The backend owns the odds and picks the prize; these types only carry
//! what it returns.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::PrizeId;

/// What a prize segment gives the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrizeType {
    /// Percentage off the next order.
    Discount,
    /// Free shipping on the next order.
    Freeship,
    /// A physical gift (bell, bottle cage, ...).
    Gift,
    /// Better luck next time.
    #[default]
    None,
}

impl PrizeType {
    /// Whether winning this prize is worth celebrating.
    #[must_use]
    pub const fn is_win(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One segment of the wheel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: PrizeId,
    pub name: String,
    /// Vietnamese label, shown when the storefront language is `vi`.
    #[serde(default)]
    pub name_vi: String,
    /// Segment colour (CSS colour string); absent in spin results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, rename = "type")]
    pub prize_type: PrizeType,
    /// Percentage for discount prizes.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<Decimal>,
}

/// Last day a coupon can be redeemed.
///
/// The backend has sent both full timestamps and bare dates. Anything else is
/// kept as sent; the prize has already been drawn by then and must not be
/// lost over a date format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CouponExpiry {
    At(DateTime<Utc>),
    On(NaiveDate),
    Unparsed(String),
}

impl CouponExpiry {
    /// Calendar date of the expiry, when one could be read.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::At(at) => Some(at.date_naive()),
            Self::On(date) => Some(*date),
            Self::Unparsed(_) => None,
        }
    }
}

/// Coupon issued for a winning spin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    pub valid_until: CouponExpiry,
    #[serde(default)]
    pub description: String,
}

/// Outcome of a spin as chosen by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeResult {
    pub prize: Prize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    #[serde(default)]
    pub message: String,
}

impl PrizeResult {
    /// Enforce that a losing result never shows a coupon block.
    ///
    /// Returns `true` if a coupon had to be dropped.
    pub fn strip_coupon_if_losing(&mut self) -> bool {
        if self.prize.prize_type.is_win() {
            return false;
        }
        self.coupon.take().is_some()
    }

    /// The coupon to display, if any. Always `None` for a losing prize.
    #[must_use]
    pub fn visible_coupon(&self) -> Option<&Coupon> {
        if self.prize.prize_type.is_win() {
            self.coupon.as_ref()
        } else {
            None
        }
    }
}

/// Wheel layout as configured in the back-office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WheelConfig {
    /// Segments in clockwise order starting at the pointer.
    pub prizes: Vec<Prize>,
}

impl WheelConfig {
    /// Position of a prize on the wheel, looked up by id.
    #[must_use]
    pub fn index_of(&self, id: &PrizeId) -> Option<usize> {
        self.prizes.iter().position(|prize| &prize.id == id)
    }
}
