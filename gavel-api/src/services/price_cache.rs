//! Price Cache
//!
//! Cache-aside view of each auction's current price. Entries never expire;
//! they change only through [`PriceCache::set_price`], which callers invoke
//! while holding the auction's lock.

use gavel_core::{price_key, AuctionId, GavelResult, Price, StorageError};
use gavel_storage::KeyValueStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct PriceCache {
    store: Arc<dyn KeyValueStore>,
}

impl PriceCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Cached price, or `None` on a miss.
    pub async fn get_price(&self, auction_id: AuctionId) -> GavelResult<Option<Price>> {
        let key = price_key(auction_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<Price>()
                .map(Some)
                .map_err(|e| {
                    StorageError::CorruptValue {
                        key,
                        reason: format!("{:?} is not a price: {}", raw, e),
                    }
                    .into()
                }),
        }
    }

    /// Overwrite the cached price.
    pub async fn set_price(&self, auction_id: AuctionId, price: Price) -> GavelResult<()> {
        self.store
            .set(&price_key(auction_id), &price.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::GavelError;
    use gavel_storage::InMemoryKvStore;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = PriceCache::new(Arc::new(InMemoryKvStore::new()));
        assert_eq!(cache.get_price(1).await.unwrap(), None);
        cache.set_price(1, 150).await.unwrap();
        assert_eq!(cache.get_price(1).await.unwrap(), Some(150));
        assert_eq!(cache.get_price(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_is_unconditional() {
        let cache = PriceCache::new(Arc::new(InMemoryKvStore::new()));
        cache.set_price(1, 500).await.unwrap();
        cache.set_price(1, 100).await.unwrap();
        assert_eq!(cache.get_price(1).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_corrupt() {
        let store = Arc::new(InMemoryKvStore::new());
        store.set("auction:9:price", "twelve").await.unwrap();
        let cache = PriceCache::new(store);
        let err = cache.get_price(9).await.unwrap_err();
        assert!(matches!(
            err,
            GavelError::Storage(StorageError::CorruptValue { .. })
        ));
    }
}
