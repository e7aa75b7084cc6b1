//! Lock Service
//!
//! Named mutual-exclusion locks over the key-value store's atomic
//! set-if-absent with expiry. Acquisition never blocks or retries; the
//! caller decides what to do when a lock is taken.

use gavel_core::{lock_key, GavelResult};
use gavel_storage::KeyValueStore;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque proof of one acquisition. Only the matching token can release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn KeyValueStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock `name` for `ttl`.
    ///
    /// Returns `None` when someone else holds it. Store failures propagate;
    /// they never read as "not acquired".
    pub async fn acquire(&self, name: &str, ttl: Duration) -> GavelResult<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .store
            .set_if_absent(&lock_key(name), token.as_str(), ttl)
            .await?;
        Ok(acquired.then_some(token))
    }

    /// Release `name` if it is still held by `token`.
    ///
    /// Returns `false` when the lock had already expired or changed hands.
    /// That is a no-op, not an error.
    pub async fn release(&self, name: &str, token: &LockToken) -> GavelResult<bool> {
        self.store
            .delete_if_equals(&lock_key(name), token.as_str())
            .await
    }

    /// Scoped form of [`acquire`](Self::acquire).
    pub async fn try_lock(&self, name: &str, ttl: Duration) -> GavelResult<Option<LockGuard>> {
        Ok(self.acquire(name, ttl).await?.map(|token| LockGuard {
            service: self.clone(),
            name: name.to_string(),
            token: Some(token),
            acquired_at: Instant::now(),
        }))
    }
}

/// A held lock.
///
/// Call [`release`](LockGuard::release) on every path. If the guard is
/// dropped instead (panic, cancelled future) the release is spawned onto
/// the current runtime; without a runtime the lock is left to its TTL.
pub struct LockGuard {
    service: LockService,
    name: String,
    token: Option<LockToken>,
    acquired_at: Instant,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long the lock has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub async fn release(mut self) -> GavelResult<bool> {
        match self.token.take() {
            Some(token) => self.service.release(&self.name, &token).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let service = self.service.clone();
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = service.release(&name, &token).await {
                        tracing::warn!(lock = %name, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock = %name, "Lock dropped outside a runtime; left to expire");
            }
        }
    }
}
