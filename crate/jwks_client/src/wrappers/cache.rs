use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

use crate::{
    error::{JwksClientError, result::JwksClientResult},
    resolver::SigningKeyResolver,
    signing_key::SigningKey,
};

type InFlight = Shared<BoxFuture<'static, JwksClientResult<SigningKey>>>;

/// The resolved key, or the resolution every concurrent caller waits on
enum Slot {
    Ready(SigningKey),
    Pending(InFlight),
}

/// Outcome of a cache lookup
enum Lookup {
    Hit(SigningKey),
    Wait(InFlight),
}

struct CacheEntry {
    slot: Slot,
    inserted_at: Instant,
}

/// Memoizes signing keys per `kid` in a bounded LRU with a maximum age.
///
/// A request without `kid` is cached under `None`. At most one resolution per
/// key is in flight: concurrent callers attach to it. Failures are never kept.
pub struct CachedResolver {
    inner: Arc<dyn SigningKeyResolver>,
    max_age: Duration,
    entries: Mutex<LruCache<Option<String>, CacheEntry>>,
}

impl CachedResolver {
    pub fn new(
        inner: Arc<dyn SigningKeyResolver>,
        max_entries: NonZeroUsize,
        max_age: Duration,
    ) -> Self {
        Self {
            inner,
            max_age,
            entries: Mutex::new(LruCache::new(max_entries)),
        }
    }

    fn lock(&self) -> JwksClientResult<MutexGuard<'_, LruCache<Option<String>, CacheEntry>>> {
        self.entries.lock().map_err(|e| {
            JwksClientError::Default(format!("cannot lock the signing key cache. Error: {e:?}"))
        })
    }

    /// Number of entries, resolved or in flight
    pub fn len(&self) -> JwksClientResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> JwksClientResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Drop the entry of `kid`, if any
    pub fn evict(&self, kid: Option<&str>) -> JwksClientResult<()> {
        self.lock()?.pop(&kid.map(ToOwned::to_owned));
        Ok(())
    }

    /// Return a fresh cached key, or the in-flight resolution to wait on,
    /// starting one when needed
    fn lookup(&self, key: &Option<String>) -> JwksClientResult<Lookup> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(CacheEntry {
                slot: Slot::Ready(signing_key),
                inserted_at,
            }) if inserted_at.elapsed() <= self.max_age => {
                trace!("Signing key cache hit for kid {key:?}");
                return Ok(Lookup::Hit(signing_key.clone()));
            }
            Some(CacheEntry {
                slot: Slot::Pending(in_flight),
                ..
            }) => {
                trace!("Joining the in-flight resolution for kid {key:?}");
                return Ok(Lookup::Wait(in_flight.clone()));
            }
            Some(_) => trace!("Signing key cache entry expired for kid {key:?}"),
            None => trace!("Signing key cache miss for kid {key:?}"),
        }

        let inner = Arc::clone(&self.inner);
        let kid = key.clone();
        let in_flight = async move { inner.get_signing_key(kid.as_deref()).await }
            .boxed()
            .shared();
        entries.put(
            key.clone(),
            CacheEntry {
                slot: Slot::Pending(in_flight.clone()),
                inserted_at: Instant::now(),
            },
        );
        Ok(Lookup::Wait(in_flight))
    }

    /// Replace the in-flight entry by its outcome; an entry that was evicted
    /// or replaced meanwhile is left alone
    fn settle(
        &self,
        key: &Option<String>,
        in_flight: &InFlight,
        result: &JwksClientResult<SigningKey>,
    ) -> JwksClientResult<()> {
        let mut entries = self.lock()?;
        let is_ours = matches!(
            entries.peek(key),
            Some(CacheEntry { slot: Slot::Pending(pending), .. }) if pending.ptr_eq(in_flight)
        );
        if !is_ours {
            return Ok(());
        }
        match result {
            Ok(signing_key) => {
                entries.put(
                    key.clone(),
                    CacheEntry {
                        slot: Slot::Ready(signing_key.clone()),
                        inserted_at: Instant::now(),
                    },
                );
            }
            Err(_) => {
                entries.pop(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SigningKeyResolver for CachedResolver {
    async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
        let key = kid.map(ToOwned::to_owned);
        let in_flight = match self.lookup(&key)? {
            Lookup::Hit(signing_key) => return Ok(signing_key),
            Lookup::Wait(in_flight) => in_flight,
        };
        let result = in_flight.clone().await;
        self.settle(&key, &in_flight, &result)?;
        result
    }
}

#[expect(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::CachedResolver;
    use crate::{
        JwksClientError, error::result::JwksClientResult, resolver::SigningKeyResolver,
        signing_key::SigningKey,
    };

    /// Resolves after a short delay and counts the calls
    #[derive(Default)]
    struct Slow(AtomicUsize);

    #[async_trait]
    impl SigningKeyResolver for Slow {
        async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
            let call = self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            match kid {
                Some("fail") => Err(JwksClientError::Jwks(format!("failure {call}"))),
                _ => Ok(SigningKey::new(
                    kid.map(ToOwned::to_owned),
                    None,
                    format!("pem {call}"),
                )),
            }
        }
    }

    fn cached(inner: &Arc<Slow>, max_entries: usize, max_age: Duration) -> CachedResolver {
        CachedResolver::new(
            inner.clone(),
            NonZeroUsize::new(max_entries).unwrap(),
            max_age,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_and_expiry() {
        let inner = Arc::new(Slow::default());
        let cache = cached(&inner, 5, Duration::from_secs(600));

        let first = cache.get_signing_key(Some("a")).await.unwrap();
        let second = cache.get_signing_key(Some("a")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        cache.get_signing_key(Some("a")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let refreshed = cache.get_signing_key(Some("a")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.public_key, "pem 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_are_coalesced() {
        let inner = Arc::new(Slow::default());
        let cache = Arc::new(cached(&inner, 5, Duration::from_secs(600)));

        let calls: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_signing_key(Some("a")).await })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap().unwrap().public_key, "pem 0");
        }
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);

        // without kid, under its own single entry
        let (a, b) = tokio::join!(cache.get_signing_key(None), cache.get_signing_key(None));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_shared_but_not_cached() {
        let inner = Arc::new(Slow::default());
        let cache = cached(&inner, 5, Duration::from_secs(600));

        let (a, b) = tokio::join!(
            cache.get_signing_key(Some("fail")),
            cache.get_signing_key(Some("fail"))
        );
        assert_eq!(a.unwrap_err(), JwksClientError::Jwks("failure 0".to_owned()));
        assert_eq!(b.unwrap_err(), JwksClientError::Jwks("failure 0".to_owned()));
        assert!(cache.is_empty().unwrap());

        let c = cache.get_signing_key(Some("fail")).await;
        assert_eq!(c.unwrap_err(), JwksClientError::Jwks("failure 1".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_least_recently_used_is_evicted() {
        let inner = Arc::new(Slow::default());
        let cache = cached(&inner, 2, Duration::from_secs(600));

        cache.get_signing_key(Some("a")).await.unwrap();
        cache.get_signing_key(Some("b")).await.unwrap();
        // touch "a" so that "b" is the least recently used
        cache.get_signing_key(Some("a")).await.unwrap();
        cache.get_signing_key(Some("c")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len().unwrap(), 2);

        cache.get_signing_key(Some("a")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 3);
        cache.get_signing_key(Some("b")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 4);

        cache.evict(Some("b")).unwrap();
        cache.get_signing_key(Some("b")).await.unwrap();
        assert_eq!(inner.0.load(Ordering::SeqCst), 5);
    }
}
