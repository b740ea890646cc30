use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::caching::{FetchError, QueryKey, QueryResult};
use crate::config::QueryOptions;
use crate::coordinator::QueryCoordinator;
use crate::subscription::QueryState;
use crate::time;

/// Returns a fetcher that resolves to `value` after `delay`, counting its
/// invocations.
fn counting_fetcher(
    calls: &Arc<AtomicUsize>,
    value: u32,
    delay: Duration,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, QueryResult<u32>> + Send + 'static {
    use futures::FutureExt;
    let calls = Arc::clone(calls);
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            time::sleep(delay).await;
            Ok(value)
        }
        .boxed()
    }
}

fn failing_fetcher(
    calls: &Arc<AtomicUsize>,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, QueryResult<u32>> + Send + 'static {
    use futures::FutureExt;
    let calls = Arc::clone(calls);
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Fetch("upstream unavailable".into()))
        }
        .boxed()
    }
}

/// Collects every state transition pushed to a subscriber.
fn recording_listener(
    states: &Arc<Mutex<Vec<QueryState<u32>>>>,
) -> impl Fn(QueryState<u32>) + Send + Sync + 'static {
    let states = Arc::clone(states);
    move |state| states.lock().unwrap().push(state)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_queries_fetch_once() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new();

    let (a, b, c, d, e) = futures::join!(
        coordinator.query("users", counting_fetcher(&calls, 7, Duration::from_millis(100)), options),
        coordinator.query("users", counting_fetcher(&calls, 7, Duration::from_millis(100)), options),
        coordinator.query("users", counting_fetcher(&calls, 7, Duration::from_millis(100)), options),
        coordinator.query("users", counting_fetcher(&calls, 7, Duration::from_millis(100)), options),
        coordinator.query("users", counting_fetcher(&calls, 7, Duration::from_millis(100)), options),
    );

    assert_eq!(a, Ok(7));
    assert_eq!(b, Ok(7));
    assert_eq!(c, Ok(7));
    assert_eq!(d, Ok(7));
    assert_eq!(e, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_fetching(&"users"));
}

#[tokio::test(start_paused = true)]
async fn test_fresh_hit_skips_fetcher() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new().with_stale_time(Duration::from_secs(60));

    let first = coordinator
        .query("users", counting_fetcher(&calls, 7, Duration::ZERO), options)
        .await;
    let second = coordinator
        .query("users", counting_fetcher(&calls, 99, Duration::ZERO), options)
        .await;

    assert_eq!(first, Ok(7));
    assert_eq!(second, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_hit_returns_then_refreshes() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new().with_stale_time(Duration::from_millis(10));

    let first = coordinator
        .query("users", counting_fetcher(&calls, 1, Duration::ZERO), options)
        .await;
    assert_eq!(first, Ok(1));

    time::advance(Duration::from_millis(20)).await;

    // Past its stale window the entry is still served, with a refresh
    // kicked off in the background.
    let second = coordinator
        .query("users", counting_fetcher(&calls, 2, Duration::ZERO), options)
        .await;
    assert_eq!(second, Ok(1));

    while coordinator.cached(&"users") == Some(1) {
        tokio::task::yield_now().await;
    }
    assert_eq!(coordinator.cached(&"users"), Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_cached_value() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new();

    coordinator
        .query("users", counting_fetcher(&calls, 1, Duration::ZERO), options)
        .await
        .unwrap();

    let refetched = coordinator
        .refetch("users", failing_fetcher(&calls), options)
        .await;

    assert_eq!(
        refetched,
        Err(FetchError::Fetch("upstream unavailable".into()))
    );
    assert_eq!(coordinator.cached(&"users"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_notifies_error() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let states = Arc::new(Mutex::new(Vec::new()));
    let _subscription = coordinator.subscribe("users", recording_listener(&states));

    let result = coordinator
        .query("users", failing_fetcher(&calls), QueryOptions::new())
        .await;

    assert!(result.is_err());
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            QueryState::Loading,
            QueryState::Error(FetchError::Fetch("upstream unavailable".into())),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_does_not_cancel_in_flight_fetch() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));

    let task = tokio::spawn({
        let coordinator = coordinator.clone();
        let fetcher = counting_fetcher(&calls, 7, Duration::from_millis(100));
        async move { coordinator.query("users", fetcher, QueryOptions::new()).await }
    });
    tokio::task::yield_now().await;
    assert!(coordinator.is_fetching(&"users"));

    coordinator.invalidate(&"users");

    // The fetch settles normally and repopulates the slot it was started
    // for.
    assert_eq!(task.await.unwrap(), Ok(7));
    assert_eq!(coordinator.cached(&"users"), Some(7));
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_resets_to_idle() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new();

    coordinator
        .query("users", counting_fetcher(&calls, 1, Duration::ZERO), options)
        .await
        .unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let _subscription = coordinator.subscribe("users", recording_listener(&states));

    coordinator.invalidate(&"users");
    coordinator.invalidate(&"users");

    assert_eq!(coordinator.cached(&"users"), None);
    // The second invalidate found nothing and stayed silent.
    assert_eq!(
        *states.lock().unwrap(),
        vec![QueryState::Success(1), QueryState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_query_touches_nothing() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new().disabled();

    let result = coordinator
        .query("users", counting_fetcher(&calls, 7, Duration::ZERO), options)
        .await;

    assert_eq!(result, Err(FetchError::Disabled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.cached(&"users"), None);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_loading_then_success() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let states = Arc::new(Mutex::new(Vec::new()));
    let _subscription = coordinator.subscribe("users", recording_listener(&states));

    coordinator
        .query(
            "users",
            counting_fetcher(&calls, 7, Duration::from_millis(10)),
            QueryOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![QueryState::Loading, QueryState::Success(7)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_replays_cached_value() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));

    coordinator
        .query(
            "users",
            counting_fetcher(&calls, 7, Duration::ZERO),
            QueryOptions::new(),
        )
        .await
        .unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let _subscription = coordinator.subscribe("users", recording_listener(&states));

    assert_eq!(*states.lock().unwrap(), vec![QueryState::Success(7)]);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_notifications() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let states = Arc::new(Mutex::new(Vec::new()));

    let subscription = coordinator.subscribe("users", recording_listener(&states));
    subscription.unsubscribe();

    coordinator
        .query(
            "users",
            counting_fetcher(&calls, 7, Duration::ZERO),
            QueryOptions::new(),
        )
        .await
        .unwrap();

    assert!(states.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ttl_expiry_forces_refetch() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new()
        .with_ttl(Duration::from_millis(100))
        .with_stale_time(Duration::from_secs(60));

    coordinator
        .query("users", counting_fetcher(&calls, 1, Duration::ZERO), options)
        .await
        .unwrap();

    time::advance(Duration::from_millis(150)).await;
    assert_eq!(coordinator.cached(&"users"), None);

    let refetched = coordinator
        .query("users", counting_fetcher(&calls, 2, Duration::ZERO), options)
        .await;

    assert_eq!(refetched, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_query_keys_with_equal_params_share_entries() {
    fn user_key(id: u32, include_posts: bool) -> QueryKey {
        let mut builder = QueryKey::builder("get_user");
        builder.write_param("id", id).unwrap();
        builder.write_param("include_posts", include_posts).unwrap();
        builder.build()
    }

    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new().with_stale_time(Duration::from_secs(60));

    coordinator
        .query(
            user_key(42, true),
            counting_fetcher(&calls, 7, Duration::ZERO),
            options,
        )
        .await
        .unwrap();

    // Same parameters rebuild the same key; different parameters miss.
    assert_eq!(coordinator.cached(&user_key(42, true)), Some(7));
    assert_eq!(coordinator.cached(&user_key(42, false)), None);

    let hit = coordinator
        .query(
            user_key(42, true),
            counting_fetcher(&calls, 99, Duration::ZERO),
            options,
        )
        .await;
    assert_eq!(hit, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_and_len() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new();

    for key in ["a", "b", "c"] {
        coordinator
            .query(key, counting_fetcher(&calls, 1, Duration::ZERO), options)
            .await
            .unwrap();
    }
    assert_eq!(coordinator.len(), 3);

    coordinator.clear();
    assert!(coordinator.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lru_backed_coordinator_evicts_cold_keys() {
    let coordinator = QueryCoordinator::lru(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new().with_stale_time(Duration::from_secs(60));

    for (key, value) in [("a", 1), ("b", 2)] {
        coordinator
            .query(key, counting_fetcher(&calls, value, Duration::ZERO), options)
            .await
            .unwrap();
    }

    // Touch "a" so "b" is the eviction candidate.
    coordinator
        .query("a", counting_fetcher(&calls, 99, Duration::ZERO), options)
        .await
        .unwrap();
    coordinator
        .query("c", counting_fetcher(&calls, 3, Duration::ZERO), options)
        .await
        .unwrap();

    assert_eq!(coordinator.cached(&"a"), Some(1));
    assert_eq!(coordinator.cached(&"b"), None);
    assert_eq!(coordinator.cached(&"c"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_refetch_coalesces_with_running_fetch() {
    let coordinator = QueryCoordinator::expiring();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::new();

    let (a, b) = futures::join!(
        coordinator.refetch("users", counting_fetcher(&calls, 7, Duration::from_millis(50)), options),
        coordinator.refetch("users", counting_fetcher(&calls, 7, Duration::from_millis(50)), options),
    );

    assert_eq!(a, Ok(7));
    assert_eq!(b, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
