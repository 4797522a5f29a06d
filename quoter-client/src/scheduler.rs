//! # Quote scheduler
//!
//! Turns one-shot resolutions into live subscriptions. A [`QuoteSubscription`] follows the cache
//! entry of its request, refreshes it when it is missing or stale, and re-resolves it on the
//! request's poll interval.
//!
//! Resolutions run as detached tasks: dropping or re-targeting a subscription never cancels a
//! network call that is already under way. Its result still lands in the cache, but it is not
//! shown to a subscription that moved on to another request.
use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::watch::{self, error::RecvError},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, trace, Instrument};

use crate::{
    args::{Fingerprint, QuoteRequest},
    cache::{CacheSnapshot, QueryCache},
    error::QuoteError,
    quote::QuoteResult,
    resolver::QuoteResolver,
};

/// What a subscriber currently sees.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteView {
    /// Fingerprint of the request the view is bound to, `None` without a request.
    pub fingerprint: Option<Fingerprint>,
    pub result: QuoteResult,
}

impl QuoteView {
    fn loading(fingerprint: Fingerprint) -> Self {
        Self { fingerprint: Some(fingerprint), result: QuoteResult::Loading }
    }

    fn without_request() -> Self {
        Self {
            fingerprint: None,
            result: QuoteResult::Error(QuoteError::Invalid("no quote request".to_string())),
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.is_error()
    }
}

#[derive(Clone)]
pub struct QuoteScheduler {
    cache: Arc<QueryCache>,
    resolver: Arc<dyn QuoteResolver>,
}

impl QuoteScheduler {
    pub fn new(cache: Arc<QueryCache>, resolver: Arc<dyn QuoteResolver>) -> Self {
        Self { cache, resolver }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Subscribes to a quote, polling it every `poll_interval` while the subscription lives.
    pub fn use_quote(
        &self,
        request: Option<QuoteRequest>,
        poll_interval: Option<Duration>,
    ) -> QuoteSubscription {
        let (view, rx) = watch::channel(QuoteView::without_request());
        let mut subscription =
            QuoteSubscription { scheduler: self.clone(), view: Arc::new(view), rx, driver: None };
        subscription.update(request, poll_interval);
        subscription
    }

    /// Resolves a request once through the cache, sharing any in-flight resolution.
    pub async fn fetch(&self, request: QuoteRequest) -> QuoteResult {
        match self.spawn_fetch(request).await {
            Ok(result) => result,
            Err(err) => QuoteResult::Error(QuoteError::Unknown {
                message: format!("resolution task failed: {err}"),
                cause: Some(Arc::new(err)),
            }),
        }
    }

    fn spawn_fetch(&self, request: QuoteRequest) -> JoinHandle<QuoteResult> {
        let cache = self.cache.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let fingerprint = request.fingerprint();
            cache
                .fetch(&fingerprint, || resolver.resolve(&request))
                .await
        })
    }
}

/// A live view on one quote request.
///
/// Dropping the subscription stops its polling.
pub struct QuoteSubscription {
    scheduler: QuoteScheduler,
    view: Arc<watch::Sender<QuoteView>>,
    rx: watch::Receiver<QuoteView>,
    driver: Option<JoinHandle<()>>,
}

impl QuoteSubscription {
    pub fn current(&self) -> QuoteView {
        self.rx.borrow().clone()
    }

    pub fn is_error(&self) -> bool {
        self.rx.borrow().is_error()
    }

    /// Waits until the view changes and returns it.
    pub async fn changed(&mut self) -> Result<QuoteView, RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }

    pub fn receiver(&self) -> watch::Receiver<QuoteView> {
        self.rx.clone()
    }

    /// Re-targets the subscription.
    ///
    /// A new fingerprint rebinds the view right away, to the cached result if there is one.
    /// Keeping the fingerprint only changes the poll interval.
    pub fn update(&mut self, request: Option<QuoteRequest>, poll_interval: Option<Duration>) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        let Some(request) = request else {
            self.view
                .send_replace(QuoteView::without_request());
            self.rx.borrow_and_update();
            return;
        };

        let fingerprint = request.fingerprint();
        let cached = self
            .scheduler
            .cache
            .get(&fingerprint)
            .and_then(|s| s.result);
        self.view.send_if_modified(|view| {
            if view.fingerprint.as_ref() == Some(&fingerprint) {
                return false;
            }
            *view = QuoteView::loading(fingerprint.clone());
            if let Some(result) = cached {
                view.result = result;
            }
            true
        });
        // The caller sees the rebound view through `current`, `changed` only reports updates.
        self.rx.borrow_and_update();

        let span = tracing::debug_span!("quote_driver", %fingerprint);
        let driver = drive(self.scheduler.clone(), request, poll_interval, self.view.clone());
        self.driver = Some(tokio::spawn(driver.instrument(span)));
    }
}

impl Drop for QuoteSubscription {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Copies a cache snapshot into the view, unless the view is bound to another request.
fn forward(view: &watch::Sender<QuoteView>, fingerprint: &Fingerprint, snapshot: &CacheSnapshot) {
    let Some(result) = snapshot.result.as_ref() else {
        return;
    };
    let forwarded = view.send_if_modified(|current| {
        if current.fingerprint.as_ref() != Some(fingerprint) || &current.result == result {
            return false;
        }
        current.result = result.clone();
        true
    });
    if forwarded {
        trace!(%fingerprint, "Forwarded cache update to subscriber");
    }
}

/// Drives `fut` to completion while forwarding every cache update to the view.
async fn forwarding<F: Future>(
    fut: F,
    updates: &mut watch::Receiver<CacheSnapshot>,
    view: &watch::Sender<QuoteView>,
    fingerprint: &Fingerprint,
) -> F::Output {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return out,
            changed = updates.changed() => {
                if changed.is_err() {
                    return fut.await;
                }
                let snapshot = updates.borrow_and_update().clone();
                forward(view, fingerprint, &snapshot);
            }
        }
    }
}

async fn drive(
    scheduler: QuoteScheduler,
    request: QuoteRequest,
    poll_interval: Option<Duration>,
    view: Arc<watch::Sender<QuoteView>>,
) {
    let fingerprint = request.fingerprint();
    let handle = scheduler.cache.attach(&fingerprint);
    let mut updates = handle.subscribe();
    let snapshot = updates.borrow_and_update().clone();
    forward(&view, &fingerprint, &snapshot);

    let mut last_attempt = None;
    if snapshot.is_stale(scheduler.cache.stale_time()) {
        let job = scheduler.spawn_fetch(request.clone());
        // A failed join only means the resolution task panicked, the next tick retries.
        let _ = forwarding(job, &mut updates, &view, &fingerprint).await;
        last_attempt = Some(Instant::now());
    } else {
        debug!("Serving fresh cached quote");
    }

    let Some(interval) = poll_interval else {
        forwarding(std::future::pending::<()>(), &mut updates, &view, &fingerprint).await;
        return;
    };
    loop {
        // Polls are timed from the entry's last result, whoever resolved it, so an entry shared
        // by several subscribers is refreshed once per interval.
        let last = handle
            .snapshot()
            .updated_at
            .max(last_attempt);
        if let Some(deadline) = last.map(|at| at + interval) {
            if deadline > Instant::now() {
                forwarding(sleep_until(deadline), &mut updates, &view, &fingerprint).await;
                continue;
            }
        }
        trace!("Poll interval elapsed");
        let job = scheduler.spawn_fetch(request.clone());
        let _ = forwarding(job, &mut updates, &view, &fingerprint).await;
        last_attempt = Some(Instant::now());
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use quoter_common::models::RouterPreference;
    use tokio::time::{advance, sleep};

    use super::*;
    use crate::{
        resolver::MockQuoteResolver,
        testing::{quote_data, request},
        transform::transform_quote,
    };

    /// Resolves after `delay` with a trade whose block number counts the resolutions.
    struct CountingResolver {
        calls: AtomicU32,
        delay: Duration,
    }

    impl CountingResolver {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self { calls: AtomicU32::new(0), delay })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteResolver for CountingResolver {
        async fn resolve(&self, request: &QuoteRequest) -> QuoteResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            sleep(self.delay).await;
            let amount = request
                .amount
                .map(|a| a.to::<u64>())
                .unwrap_or_default();
            match transform_quote(request, quote_data(call as u64, amount, amount / 2)) {
                Ok(result) => QuoteResult::Success(result),
                Err(err) => panic!("fixture quote must transform: {err}"),
            }
        }
    }

    fn scheduler(resolver: Arc<dyn QuoteResolver>) -> QuoteScheduler {
        let cache = QueryCache::new("test", Duration::from_secs(10), Duration::from_secs(300));
        QuoteScheduler::new(Arc::new(cache), resolver)
    }

    fn block(view: &QuoteView) -> Option<u64> {
        view.result
            .as_success()
            .map(|r| r.block_number)
    }

    /// Lets spawned tasks run without moving the paused clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_resolves_and_polls() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());

        let mut sub = scheduler.use_quote(
            Some(request(100, RouterPreference::Api)),
            Some(Duration::from_secs(15)),
        );
        assert_eq!(sub.current().result, QuoteResult::Loading);

        let view = sub.changed().await.unwrap();
        assert_eq!(block(&view), Some(1));

        // next resolution starts 15s after the previous one completed and takes 1s
        advance(Duration::from_secs(14)).await;
        settle().await;
        assert_eq!(resolver.calls(), 1);

        let view = sub.changed().await.unwrap();
        assert_eq!(block(&view), Some(2));
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_poll_interval_resolves_once() {
        let resolver = CountingResolver::new(Duration::from_millis(10));
        let scheduler = scheduler(resolver.clone());

        let mut sub = scheduler.use_quote(Some(request(100, RouterPreference::Skip)), None);
        sub.changed().await.unwrap();

        sleep(Duration::from_secs(3600)).await;

        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_subscribers_share_resolution() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());

        let mut a = scheduler.use_quote(Some(request(100, RouterPreference::Api)), None);
        let mut b = scheduler.use_quote(Some(request(100, RouterPreference::Api)), None);

        let (va, vb) = tokio::join!(a.changed(), b.changed());

        assert_eq!(resolver.calls(), 1);
        assert_eq!(va.unwrap(), vb.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cache_is_served_without_request() {
        let mut resolver = MockQuoteResolver::new();
        resolver.expect_resolve().never();
        let scheduler = scheduler(Arc::new(resolver));
        let request = request(100, RouterPreference::Api);
        scheduler
            .cache()
            .set(&request.fingerprint(), QuoteResult::NotFound);

        let sub = scheduler.use_quote(Some(request), Some(Duration::from_secs(15)));
        settle().await;

        assert_eq!(sub.current().result, QuoteResult::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cache_is_served_while_refreshing() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());
        let request = request(100, RouterPreference::Api);
        scheduler
            .cache()
            .set(&request.fingerprint(), QuoteResult::NotFound);
        advance(Duration::from_secs(11)).await;

        let mut sub = scheduler.use_quote(Some(request), None);

        assert_eq!(sub.current().result, QuoteResult::NotFound);
        let view = sub.changed().await.unwrap();
        assert_eq!(block(&view), Some(1));
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_is_not_shown() {
        let resolver = CountingResolver::new(Duration::from_secs(5));
        let scheduler = scheduler(resolver.clone());
        let first = request(100, RouterPreference::Api);
        let second = request(200, RouterPreference::Api);

        let mut sub = scheduler.use_quote(Some(first.clone()), None);
        settle().await;
        assert_eq!(resolver.calls(), 1);

        advance(Duration::from_secs(1)).await;
        sub.update(Some(second.clone()), None);
        assert_eq!(sub.current().fingerprint, Some(second.fingerprint()));
        assert_eq!(sub.current().result, QuoteResult::Loading);

        let view = sub.changed().await.unwrap();
        assert_eq!(view.fingerprint, Some(second.fingerprint()));
        let trade = view.result.as_success().unwrap();
        assert_eq!(trade.trade.input_amount(), quoter_common::U256::from(200u64));

        // the first resolution was not cancelled, it still filled the cache
        sleep(Duration::from_secs(5)).await;
        let first_cached = scheduler
            .cache()
            .get(&first.fingerprint())
            .and_then(|s| s.result);
        assert!(matches!(first_cached, Some(QuoteResult::Success(_))));
        assert_eq!(sub.current().fingerprint, Some(second.fingerprint()));
    }

    #[tokio::test]
    async fn test_without_request_is_error() {
        let mut resolver = MockQuoteResolver::new();
        resolver.expect_resolve().never();
        let scheduler = scheduler(Arc::new(resolver));

        let sub = scheduler.use_quote(None, Some(Duration::from_secs(15)));

        assert!(sub.is_error());
        assert_eq!(sub.current().fingerprint, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_is_deduplicated_with_subscription() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());
        let request = request(100, RouterPreference::Api);

        let _sub = scheduler.use_quote(Some(request.clone()), None);
        settle().await;
        let result = scheduler.fetch(request).await;

        assert_eq!(resolver.calls(), 1);
        assert_eq!(result.as_success().map(|r| r.block_number), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_fingerprint_polls_once_per_interval() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());
        let interval = Some(Duration::from_secs(15));

        let _a = scheduler.use_quote(Some(request(100, RouterPreference::Api)), interval);
        sleep(Duration::from_secs(8)).await;
        let b = scheduler.use_quote(Some(request(100, RouterPreference::Api)), interval);
        sleep(Duration::from_secs(60)).await;

        // resolutions start at 0s, 16s, 32s, 48s and 64s
        assert_eq!(resolver.calls(), 5);
        assert_eq!(block(&b.current()), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortest_interval_governs_shared_entry() {
        let resolver = CountingResolver::new(Duration::from_secs(1));
        let scheduler = scheduler(resolver.clone());

        let _slow = scheduler.use_quote(
            Some(request(100, RouterPreference::Api)),
            Some(Duration::from_secs(120)),
        );
        let _fast = scheduler.use_quote(
            Some(request(100, RouterPreference::Api)),
            Some(Duration::from_secs(15)),
        );
        sleep(Duration::from_secs(125)).await;

        // 0s then every 16s up to 112s, the slow subscriber always finds the entry fresh
        assert_eq!(resolver.calls(), 8);
    }
}
