//! End-to-end scenarios from §8: S1 (single-task happy path), S2 (timed
//! multi-task ordering), S3 (cancellation mid-flight), S4 (two outstanding
//! promises forbidden), plus the proxy spawn/join round-trip law.

use station_runtime::actor::CancelToken;
use station_runtime::errors::PromiseError;
use station_runtime::expose_actor;
use station_runtime::proxy::Proxy;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Adder;

impl Adder {
    async fn add(&mut self, a: i64, b: i64, _cancel: &CancelToken) -> Result<i64, String> {
        Ok(a + b)
    }
}

expose_actor! {
    resource: Adder,
    proxy: AdderProxy,
    methods: {
        fn add(a: i64, b: i64) -> i64;
    }
}

#[tokio::test]
async fn single_task_happy_path() {
    let proxy = Proxy::spawn(Adder);
    let mut proxy = AdderProxy::new(proxy);
    let value = proxy.add(2, 3).now().await.unwrap();
    assert_eq!(value, serde_json::json!(5));
    proxy.join().await;
}

#[tokio::test]
async fn proxy_join_returns_the_original_resource() {
    let proxy = Proxy::spawn(Adder);
    let proxy = AdderProxy::new(proxy);
    let returned = proxy.join().await;
    assert_eq!(returned, Adder);
}

#[tokio::test]
async fn on_shutdown_hook_runs_while_draining() {
    use station_runtime::actor::ActorWorker;
    use station_runtime::channel::DuplexChannel;
    use station_runtime::registry::Advice;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let (mut parent, worker_end) = DuplexChannel::in_process_pair();
    let cancel = CancelToken::new();
    let mut worker = ActorWorker::new(Adder, worker_end, cancel);

    let ran = Arc::new(AtomicBool::new(false));
    let ran2 = Arc::clone(&ran);
    worker.on_shutdown(Advice::Bare(Arc::new(move |_| {
        ran2.store(true, Ordering::SeqCst);
        Ok(())
    })));

    let handle = tokio::spawn(worker.run());
    parent.kill_other().await;
    handle.await.unwrap();

    assert!(ran.load(Ordering::SeqCst), "on_shutdown advice must run before the worker stops");
}

struct Clock;

impl Clock {
    async fn tick(&mut self, _cancel: &CancelToken) -> Result<i64, String> {
        Ok(chrono::Local::now().timestamp_millis())
    }
}

expose_actor! {
    resource: Clock,
    proxy: ClockProxy,
    methods: {
        fn tick() -> i64;
    }
}

#[tokio::test]
async fn timed_multi_task_ordering() {
    let proxy = Proxy::spawn(Clock);
    let mut proxy = ClockProxy::new(proxy);
    let t0 = chrono::Local::now();

    let mut promise = proxy
        .tick()
        .after(
            vec![
                Duration::from_millis(20),
                Duration::from_millis(10),
                Duration::from_millis(30),
            ],
            None,
        )
        .issue()
        .await
        .unwrap();

    let value = promise
        .resolve(Some(Duration::from_millis(500)))
        .await
        .unwrap();
    let results = value.into_list();
    assert_eq!(results.len(), 3);

    let ms: Vec<i64> = results.iter().map(|v| v.as_i64().unwrap()).collect();
    assert!(ms[0] <= ms[1] && ms[1] <= ms[2], "expected non-decreasing results: {ms:?}");

    let t0ms = t0.timestamp_millis();
    assert!(ms[0] >= t0ms + 5);
    assert!(ms[1] >= t0ms + 15);
    assert!(ms[2] >= t0ms + 25);

    proxy.join().await;
}

struct Sleeper;

impl Sleeper {
    async fn slow(&mut self, cancel: &CancelToken) -> Result<(), String> {
        for _ in 0..50 {
            cancel.check_cancel().map_err(|e| e.to_string())?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }
}

expose_actor! {
    resource: Sleeper,
    proxy: SleeperProxy,
    methods: {
        fn slow() -> ();
    }
}

#[tokio::test]
async fn cancellation_mid_flight() {
    let proxy = Proxy::spawn(Sleeper);
    let mut proxy = SleeperProxy::new(proxy);

    let mut promise = proxy.slow().issue().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    proxy.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = promise
        .resolve(Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert_eq!(err, PromiseError::Cancelled);

    // The proxy accepts a new promise immediately after cancellation.
    let second = proxy.slow().issue().await;
    assert!(second.is_ok());
    proxy.cancel();

    proxy.join().await;
}

#[tokio::test]
async fn promise_next_yields_one_result_per_call() {
    let proxy = Proxy::spawn(Clock);
    let mut proxy = ClockProxy::new(proxy);

    let mut promise = proxy
        .tick()
        .after(
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(15),
            ],
            None,
        )
        .issue()
        .await
        .unwrap();

    let first = promise.next().await.unwrap();
    assert!(first.is_some(), "first next() must yield exactly one result");
    let second = promise.next().await.unwrap();
    assert!(second.is_some());
    let third = promise.next().await.unwrap();
    assert!(third.is_some());

    // All three expected results are in; iteration is exhausted.
    assert_eq!(promise.next().await.unwrap(), None);

    proxy.join().await;
}

#[tokio::test]
async fn now_after_a_scheduling_modifier_is_a_conflict() {
    let proxy = Proxy::spawn(Adder);
    let mut proxy = AdderProxy::new(proxy);

    let err = proxy
        .add(1, 2)
        .after(vec![Duration::from_millis(5)], None)
        .now()
        .await
        .unwrap_err();
    assert!(matches!(err, PromiseError::ModifierConflict(_)));

    proxy.join().await;
}

#[tokio::test]
async fn two_outstanding_promises_forbidden() {
    let proxy = Proxy::spawn(Sleeper);
    let mut proxy = SleeperProxy::new(proxy);

    let first = proxy.slow().issue().await;
    assert!(first.is_ok());

    let second = proxy.slow().issue().await;
    assert!(matches!(second, Err(PromiseError::Outstanding)));

    proxy.cancel();
    proxy.join().await;
}
