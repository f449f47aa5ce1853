use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Compute-once slot for a delegate's SDK version.
///
/// The outer `Option` is presence in the cache, the inner one is the
/// resolved value, so "the source declares no SDK" is cached too.
#[derive(Debug, Default)]
pub struct SdkVersionCache {
    slot: Mutex<Option<Option<String>>>,
    resolutions: AtomicUsize,
}

impl SdkVersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concurrent callers wait on the first resolution instead of
    /// starting their own.
    pub async fn get_or_resolve<F, Fut>(&self, resolve: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            return cached.clone();
        }
        let resolved = resolve().await;
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        *slot = Some(resolved.clone());
        resolved
    }

    /// How many times the resolver actually ran
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_once() {
        let cache = SdkVersionCache::new();
        let first = cache.get_or_resolve(|| async { Some("3.25.0".to_string()) }).await;
        let second = cache.get_or_resolve(|| async { Some("9.9.9".to_string()) }).await;
        assert_eq!(first.as_deref(), Some("3.25.0"));
        assert_eq!(second.as_deref(), Some("3.25.0"));
        assert_eq!(cache.resolutions(), 1);
    }

    #[tokio::test]
    async fn test_absent_version_is_cached() {
        let cache = SdkVersionCache::new();
        assert_eq!(cache.get_or_resolve(|| async { None }).await, None);
        assert_eq!(
            cache.get_or_resolve(|| async { Some("1.0.0".to_string()) }).await,
            None
        );
        assert_eq!(cache.resolutions(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_resolution() {
        let cache = SdkVersionCache::new();
        let slow = || async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Some("0.4.1".to_string())
        };
        let (a, b) = tokio::join!(cache.get_or_resolve(slow), cache.get_or_resolve(slow));
        assert_eq!(a, b);
        assert_eq!(cache.resolutions(), 1);
    }
}
