//! Core types for Spoke Cycles.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod checkout;
pub mod contact;
pub mod id;
pub mod loyalty;
pub mod money;
pub mod prize;

pub use checkout::{
    COD_FEE, CartLine, PaymentMethod, SHIPPING_OPTIONS, ShippingOption, ShippingOptionId,
};
pub use contact::{ContactError, Email, Phone, PostalCode};
pub use id::*;
pub use loyalty::{LoyaltyDiscount, LoyaltyTier};
pub use money::Yen;
pub use prize::{Coupon, CouponExpiry, Prize, PrizeResult, PrizeType, WheelConfig};
