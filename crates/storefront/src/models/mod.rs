//! Data the storefront keeps per visitor.

pub mod session;
