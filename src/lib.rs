//! Integration protection layer: library crate.
//!
//! Guards every call to and from the commerce partner: credential encryption
//! at rest, webhook/OAuth signature verification, and rate limiting.

pub mod api;
pub mod config;
pub mod errors;
pub mod guard;
pub mod middleware;
pub mod store;
pub mod vault;
