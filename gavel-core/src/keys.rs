//! Key naming for the shared key-value store.
//!
//! ```text
//! lock:auction:<id>     ownership token, expires after the lock TTL
//! auction:<id>:price    string-encoded integer, no expiry
//! ```

use crate::AuctionId;

/// Prefix the lock service puts in front of every lock name.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Channel carrying [`crate::PriceUpdate`] payloads.
pub const DEFAULT_PRICE_CHANNEL: &str = "auction_updates";

/// Lock name guarding one auction's critical section.
pub fn lock_name(auction_id: AuctionId) -> String {
    format!("auction:{}", auction_id)
}

/// Store key backing a named lock.
pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, name)
}

/// Store key of an auction's cached price.
pub fn price_key(auction_id: AuctionId) -> String {
    format!("auction:{}:price", auction_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_for_auction() {
        assert_eq!(lock_key(&lock_name(42)), "lock:auction:42");
    }

    #[test]
    fn test_price_key() {
        assert_eq!(price_key(42), "auction:42:price");
    }

    #[test]
    fn test_lock_and_price_keys_never_collide() {
        for id in [0, 1, 42, i64::MAX] {
            assert_ne!(lock_key(&lock_name(id)), price_key(id));
        }
    }
}
