//! Spoke Cycles Core - Shared checkout and mini-game types.
//!
//! This crate provides the domain types and derivations the storefront owns
//! on its side of the REST backend:
//! - the checkout price breakdown (subtotal, loyalty discount, shipping, COD)
//! - the once-per-day lucky-wheel gate and prize reveal
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no ambient clock. "Today" is always passed in through a
//! [`spin::Clock`], so day-boundary behaviour is deterministic in tests.
//!
//! # Modules
//!
//! - [`types`] - Money, ids, contact fields, cart/shipping/payment, loyalty, prizes
//! - [`pricing`] - Price breakdown derivation
//! - [`spin`] - Spin gate state machine and wheel rotation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod spin;
pub mod types;

pub use pricing::{PriceBreakdown, compute_breakdown, compute_subtotal};
pub use spin::{Clock, FixedClock, LocalClock, SpinPhase, SpinRejected, SpinState};
pub use types::*;
