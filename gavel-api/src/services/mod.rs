//! Service Layer
//!
//! The bid critical section and the two primitives it is built from.

mod bid_service;
mod lock_service;
mod price_cache;

pub use bid_service::*;
pub use lock_service::*;
pub use price_cache::*;
