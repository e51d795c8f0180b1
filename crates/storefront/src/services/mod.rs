//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `checkout` - Per-visitor checkout sessions: price breakdown, debounced
//!   loyalty lookup, postal-code shipping suggestion, order submission
//! - `mini_game` - Once-per-day lucky wheel gate and prize reveal
//!
//! Both are generic over the backend traits in [`crate::backend`] so tests
//! can drive them without a network.

pub mod checkout;
pub mod mini_game;

pub use checkout::{
    CheckoutError, CheckoutSession, CheckoutSessions, CheckoutView, CustomerDetails,
    LoyaltyStatus, Notice, NoticeKind, ShippingSuggestion,
};
pub use mini_game::{PlayedDateStore, SpinError, SpinGate, SpinOutcome, WheelView};
