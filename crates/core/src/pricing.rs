//! Checkout price breakdown.
//!
//! Pure functions of the cart, the resolved loyalty discount, the selected
//! shipping option and the payment method. Callers re-derive the breakdown
//! whenever an input changes; nothing here holds state.

use serde::Serialize;

use crate::types::{CartLine, LoyaltyDiscount, PaymentMethod, ShippingOption, Yen};

/// What the customer is charged, line by line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Yen,
    pub loyalty_discount_amount: Yen,
    pub shipping_fee: Yen,
    pub cod_fee: Yen,
    pub total: Yen,
}

/// Sum of `unit_price × quantity` over all cart lines.
#[must_use]
pub fn compute_subtotal(cart: &[CartLine]) -> Yen {
    cart.iter().map(CartLine::line_total).sum()
}

/// `round(subtotal × discount / 100)`, or zero when no discount is resolved.
#[must_use]
pub fn loyalty_discount_amount(subtotal: Yen, discount: Option<&LoyaltyDiscount>) -> Yen {
    discount.map_or(Yen::ZERO, |d| subtotal.percentage(d.percent()))
}

/// Derive the full breakdown.
///
/// The discount only ever reduces the subtotal; shipping and the COD fee are
/// added on top untouched.
///
/// ```
/// use spoke_core::pricing::compute_breakdown;
/// use spoke_core::{PaymentMethod, ShippingOptionId, Yen};
///
/// let breakdown = compute_breakdown(
///     Yen::new(100_000),
///     None,
///     ShippingOptionId::FreeDelivery.option(),
///     PaymentMethod::Cod,
/// );
/// assert_eq!(breakdown.total, Yen::new(100_500));
/// ```
#[must_use]
pub fn compute_breakdown(
    subtotal: Yen,
    discount: Option<&LoyaltyDiscount>,
    shipping: &ShippingOption,
    payment: PaymentMethod,
) -> PriceBreakdown {
    let loyalty_discount_amount = loyalty_discount_amount(subtotal, discount);
    let shipping_fee = shipping.fee;
    let cod_fee = payment.fee();

    PriceBreakdown {
        subtotal,
        loyalty_discount_amount,
        shipping_fee,
        cod_fee,
        total: subtotal - loyalty_discount_amount + shipping_fee + cod_fee,
    }
}
