//! Process-lifetime bearer token cache with single-flight acquisition.
//!
//! At most one acquisition runs at a time. Callers that need a token while
//! one is in flight attach to the same shared future and receive its result,
//! whether that is a token or a failure. The in-flight slot is cleared as
//! soon as the acquisition resolves, so a failed attempt is retried by the
//! next caller rather than cached.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

type Acquisition = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct TokenState {
    token: Option<String>,
    in_flight: Option<Acquisition>,
}

#[derive(Default)]
pub struct TokenCache {
    state: Mutex<TokenState>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if any.
    pub fn current(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    /// Returns the cached token, or joins/starts an acquisition.
    ///
    /// `acquire` is only invoked when no token is cached and no acquisition
    /// is in flight.
    pub async fn get_or_acquire<F>(&self, acquire: F) -> Option<String>
    where
        F: FnOnce() -> BoxFuture<'static, Option<String>>,
    {
        let acquisition = {
            let mut state = self.state.lock();
            if let Some(token) = &state.token {
                return Some(token.clone());
            }

            match &state.in_flight {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let in_flight = acquire().shared();
                    state.in_flight = Some(in_flight.clone());
                    in_flight
                }
            }
        };

        let token = acquisition.clone().await;

        let mut state = self.state.lock();
        if state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ptr_eq(&acquisition))
        {
            state.in_flight = None;
            state.token = token.clone();
        }

        token
    }

    /// Discards `token` if it is still the cached one.
    ///
    /// A token rejected by a slow request must not evict a newer token that
    /// another caller acquired in the meantime.
    pub fn invalidate(&self, token: &str) {
        let mut state = self.state.lock();
        if state.token.as_deref() == Some(token) {
            tracing::info!("Discarding rejected store auth token");
            state.token = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn acquirer(
        calls: Arc<AtomicUsize>,
        result: Option<&'static str>,
    ) -> impl FnOnce() -> BoxFuture<'static, Option<String>> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                result.map(String::from)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_acquisition() {
        let cache = TokenCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_acquire(acquirer(calls.clone(), Some("token-1"))),
            cache.get_or_acquire(acquirer(calls.clone(), Some("token-2"))),
            cache.get_or_acquire(acquirer(calls.clone(), Some("token-3"))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.as_deref(), Some("token-1"));
        assert_eq!(b.as_deref(), Some("token-1"));
        assert_eq!(c.as_deref(), Some("token-1"));
        assert_eq!(cache.current().as_deref(), Some("token-1"));

        // Cached: no further acquisitions.
        let d = cache
            .get_or_acquire(acquirer(calls.clone(), Some("token-4")))
            .await;
        assert_eq!(d.as_deref(), Some("token-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_acquisition_is_shared_and_not_cached() {
        let cache = TokenCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get_or_acquire(acquirer(calls.clone(), None)),
            cache.get_or_acquire(acquirer(calls.clone(), None)),
        );
        assert_eq!(a, None);
        assert_eq!(b, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.current(), None);

        let c = cache
            .get_or_acquire(acquirer(calls.clone(), Some("token")))
            .await;
        assert_eq!(c.as_deref(), Some("token"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquisition() {
        let cache = TokenCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_acquire(acquirer(calls.clone(), Some("old")))
            .await;

        // A stale token does not evict the cached one.
        cache.invalidate("something-else");
        assert_eq!(cache.current().as_deref(), Some("old"));

        cache.invalidate("old");
        assert_eq!(cache.current(), None);

        let token = cache
            .get_or_acquire(acquirer(calls.clone(), Some("new")))
            .await;
        assert_eq!(token.as_deref(), Some("new"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
