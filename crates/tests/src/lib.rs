//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 -> 调度器 装配测试
//! - MemoryQueue + 模拟 sink 的 e2e 测试（无需 Redis）
//! - 关停语义：停止令牌、完成屏障、重复终止

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{ContractError, DeliverySink, DispatchConfig, Endpoint, Item, RetryConfig};
    use tokio::time::{sleep, Instant};

    pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn source() -> Endpoint {
        Endpoint::new("memory", "", "q")
    }

    pub fn dispatch() -> DispatchConfig {
        DispatchConfig {
            dequeue_timeout_ms: DEQUEUE_TIMEOUT.as_millis() as u64,
        }
    }

    pub fn retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 2,
            max_delay_ms: 10,
            multiplier: 2.0,
            max_retries: 5,
        }
    }

    /// Poll `cond` until it holds, failing the test after two seconds
    pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Sink whose delivery never completes
    #[derive(Clone)]
    pub struct BlockingSink {
        name: String,
        pub started: Arc<AtomicU64>,
    }

    impl BlockingSink {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                started: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn started(&self) -> u64 {
            self.started.load(Ordering::Relaxed)
        }
    }

    impl DeliverySink for BlockingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&mut self, _item: &Item) -> Result<(), ContractError> {
            self.started.fetch_add(1, Ordering::Relaxed);
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// Sink that rejects every item
    pub struct FailingSink {
        name: String,
    }

    impl FailingSink {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
        }
    }

    impl DeliverySink for FailingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&mut self, _item: &Item) -> Result<(), ContractError> {
            Err(ContractError::sink_delivery(&self.name, "rejected"))
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod config_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::create_dispatcher;
    use queue_client::MemoryQueue;

    use crate::support::wait_until;

    const CONFIG: &str = r#"{
        "source": { "addr": "127.0.0.1:6379", "password": "", "key": "q" },
        "sinks": [
            { "addr": "127.0.0.1:6380", "password": "", "key": "a" },
            { "addr": "127.0.0.1:6381", "password": "", "key": "b" },
            { "addr": "127.0.0.1:6382", "password": "", "key": "c", "name": "audit" }
        ],
        "dispatch": { "dequeue_timeout_ms": 50 }
    }"#;

    /// k sink descriptors => k sink workers + 1 source, barrier starts at k+1
    #[tokio::test]
    async fn test_worker_count_matches_sinks() {
        let config = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Json).unwrap();
        let dispatcher = create_dispatcher(&config, MemoryQueue::new("memory")).unwrap();

        assert_eq!(dispatcher.sink_count(), 3);
        assert_eq!(dispatcher.worker_count(), 4);
        assert_eq!(dispatcher.outstanding(), 4);

        let names: Vec<_> = dispatcher.worker_states().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["source", "sink-0", "sink-1", "audit"]);

        let summary = dispatcher.shutdown().await;
        assert_eq!(summary.workers.len(), 4);
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn test_toml_config_end_to_end() {
        let toml = r#"
            [source]
            addr = "127.0.0.1:6379"
            key = "q"

            [[sinks]]
            addr = "127.0.0.1:6380"
            key = "a"

            [[sinks]]
            addr = "127.0.0.1:6381"
            key = "b"
            delivery = { mode = "buffered", capacity = 4 }

            [dispatch]
            dequeue_timeout_ms = 50
        "#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let queue = MemoryQueue::new("memory");
        queue.push("q", "hello");

        let dispatcher = create_dispatcher(&config, queue.clone()).unwrap();
        wait_until("queue drained", || queue.is_empty("q")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let summary = dispatcher.shutdown().await;
        assert!(summary.is_clean());
        assert_eq!(summary.sink("sink-0").map(|m| m.delivered_count), Some(1));
        assert_eq!(summary.sink("sink-1").map(|m| m.delivered_count), Some(1));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use contracts::{DeliveryConfig, DeliveryMode, ErrorPolicy, OverflowPolicy};
    use dispatcher::{
        DispatcherBuilder, MemorySink, SinkSettings, WorkerExit, WorkerRole, WorkerState,
    };
    use queue_client::MemoryQueue;
    use tokio::time::{sleep, timeout, Instant};

    use crate::support::{
        dispatch, retry, source, wait_until, BlockingSink, FailingSink, DEQUEUE_TIMEOUT,
    };

    fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new(dispatch(), retry())
    }

    /// Items i1..in, no shutdown => every sink sees i1..in in order, n*k in total
    #[tokio::test]
    async fn test_every_sink_receives_every_item_in_order() {
        const ITEMS: u64 = 20;
        let queue = MemoryQueue::new("memory");
        let sinks: Vec<_> = (0..3).map(|i| MemorySink::new(format!("m{i}"))).collect();

        let mut builder = builder();
        for sink in &sinks {
            builder = builder.add_sink(sink.clone(), SinkSettings::new(sink_name(sink)));
        }
        let dispatcher = builder.start(queue.clone(), &source());

        for i in 1..=ITEMS {
            queue.push("q", format!("item-{i}"));
        }
        wait_until("all deliveries", || {
            sinks.iter().all(|s| s.len() as u64 == ITEMS)
        })
        .await;

        for sink in &sinks {
            let items = sink.items();
            let seqs: Vec<u64> = items.iter().map(|item| item.seq).collect();
            assert_eq!(seqs, (1..=ITEMS).collect::<Vec<_>>());
            let expected: Vec<String> = (1..=ITEMS).map(|i| format!("item-{i}")).collect();
            assert_eq!(sink.texts(), expected);
        }

        let summary = dispatcher.shutdown().await;
        let total: u64 = summary.sinks.iter().map(|(_, m)| m.delivered_count).sum();
        assert_eq!(total, ITEMS * 3);
        assert_eq!(summary.source.dequeued_count, ITEMS);
    }

    fn sink_name(sink: &MemorySink) -> String {
        use contracts::DeliverySink;
        sink.name().to_string()
    }

    /// Termination => all workers stop within one dequeue timeout
    #[tokio::test]
    async fn test_stop_within_one_dequeue_timeout() {
        let queue = MemoryQueue::new("memory");
        let a = MemorySink::new("a");
        let b = MemorySink::new("b");
        let dispatcher = builder()
            .add_sink(a.clone(), SinkSettings::new("a"))
            .add_sink(b.clone(), SinkSettings::new("b"))
            .start(queue.clone(), &source());

        queue.push("q", "last");
        wait_until("broadcast", || a.len() == 1 && b.len() == 1).await;

        let started = Instant::now();
        let summary = dispatcher.shutdown().await;
        let elapsed = started.elapsed();

        assert!(
            elapsed < DEQUEUE_TIMEOUT + Duration::from_millis(100),
            "shutdown took {elapsed:?}"
        );
        assert_eq!(summary.workers.len(), 3);
        assert!(summary.is_clean());
        assert!(a.is_closed() && b.is_closed());
    }

    /// Double termination request => no panic, one report, no hang
    #[tokio::test]
    async fn test_double_termination_request() {
        let queue = MemoryQueue::new("memory");
        let dispatcher = builder()
            .add_sink(MemorySink::new("a"), SinkSettings::new("a"))
            .add_sink(MemorySink::new("b"), SinkSettings::new("b"))
            .start(queue, &source());

        let trigger = dispatcher.shutdown_trigger();
        let first = trigger.clone();
        let second = trigger.clone();
        let signals = tokio::spawn(async move {
            let fired_first = first.fire();
            sleep(Duration::from_millis(5)).await;
            let fired_second = second.fire();
            (fired_first, fired_second)
        });

        let summary = timeout(Duration::from_secs(2), dispatcher.run_until(trigger.fired()))
            .await
            .expect("shutdown hung");

        assert_eq!(signals.await.unwrap(), (true, false));
        assert!(!trigger.fire());
        assert_eq!(summary.workers.len(), 3);
        assert!(summary.is_clean());
    }

    /// k = 0 => broadcast is a no-op; the source still loops and stops
    #[tokio::test]
    async fn test_zero_sinks() {
        let queue = MemoryQueue::new("memory");
        let dispatcher = builder().start(queue.clone(), &source());
        assert_eq!(dispatcher.worker_count(), 1);

        queue.push("q", "one");
        queue.push("q", "two");
        wait_until("queue drained", || queue.is_empty("q")).await;

        let summary = timeout(Duration::from_secs(1), dispatcher.shutdown())
            .await
            .unwrap();
        assert_eq!(summary.workers.len(), 1);
        assert_eq!(summary.workers.workers[0].role, WorkerRole::Source);
        assert_eq!(summary.source.dequeued_count, 2);
        assert!(summary.is_clean());
    }

    /// Key "q", two sinks, push "hello" once => each delivers it exactly once
    #[tokio::test]
    async fn test_hello_delivered_once_per_sink() {
        let queue = MemoryQueue::new("memory");
        let a = MemorySink::new("a");
        let b = MemorySink::new("b");
        let dispatcher = builder()
            .add_sink(a.clone(), SinkSettings::new("a"))
            .add_sink(b.clone(), SinkSettings::new("b"))
            .start(queue.clone(), &source());

        queue.push("q", "hello");
        wait_until("hello delivered", || a.len() == 1 && b.len() == 1).await;

        // keeps running until stopped
        sleep(DEQUEUE_TIMEOUT * 3).await;
        assert_eq!(dispatcher.outstanding(), 3);
        assert_eq!(a.texts(), vec!["hello"]);
        assert_eq!(b.texts(), vec!["hello"]);
        assert!(dispatcher.source_metrics().empty_polls >= 1);

        let summary = dispatcher.shutdown().await;
        assert!(summary.is_clean());
    }

    /// Sink B blocks forever => A's next item waits on B's pending send;
    /// shutdown still completes
    #[tokio::test]
    async fn test_blocked_sink_stalls_broadcast_until_stop() {
        let queue = MemoryQueue::new("memory");
        let a = MemorySink::new("a");
        let b = BlockingSink::new("b");
        let dispatcher = builder()
            .add_sink(a.clone(), SinkSettings::new("a"))
            .add_sink(b.clone(), SinkSettings::new("b"))
            .start(queue.clone(), &source());

        for i in 1..=3 {
            queue.push("q", format!("item-{i}"));
        }

        // item-1 reaches both; item-2 reaches A then waits on B
        wait_until("A has two items", || a.len() == 2).await;
        sleep(DEQUEUE_TIMEOUT * 2).await;
        assert_eq!(a.len(), 2, "broadcast proceeded past the blocked sink");
        assert_eq!(b.started(), 1);
        assert_eq!(queue.len("q"), 1);

        let summary = timeout(Duration::from_secs(1), dispatcher.shutdown())
            .await
            .expect("shutdown hung on a blocked sink");
        assert!(summary.is_clean());
        assert_eq!(summary.sink("b").map(|m| m.dropped_count), Some(2));
        assert_eq!(summary.sink("a").map(|m| m.delivered_count), Some(2));
    }

    /// drop_newest buffer => a stalled sink no longer throttles the others
    #[tokio::test]
    async fn test_drop_newest_isolates_slow_sink() {
        let queue = MemoryQueue::new("memory");
        let a = MemorySink::new("a");
        let b = BlockingSink::new("b");
        let isolated = DeliveryConfig {
            mode: DeliveryMode::Buffered,
            capacity: 2,
            overflow: OverflowPolicy::DropNewest,
            ..Default::default()
        };
        let dispatcher = builder()
            .add_sink(a.clone(), SinkSettings::new("a"))
            .add_sink(b, SinkSettings::new("b").with_delivery(isolated))
            .start(queue.clone(), &source());

        for i in 1..=10 {
            queue.push("q", format!("item-{i}"));
        }
        wait_until("A has every item", || {
            a.len() == 10 && dispatcher.metrics()[1].1.dropped_count >= 7
        })
        .await;

        let dropped_before = dispatcher.metrics()[1].1.dropped_count;
        assert!((7..=8).contains(&dropped_before), "dropped {dropped_before}");

        let summary = dispatcher.shutdown().await;
        // everything sent to B is lost: overflow, abandoned or still buffered
        assert_eq!(summary.sink("b").map(|m| m.dropped_count), Some(10));
        assert!(summary.is_clean());
    }

    /// Queue connection failures are retried with backoff
    #[tokio::test]
    async fn test_queue_failures_are_retried() {
        let queue = MemoryQueue::new("memory");
        queue.inject_failures(3);
        queue.push("q", "survivor");

        let a = MemorySink::new("a");
        let dispatcher = builder()
            .add_sink(a.clone(), SinkSettings::new("a"))
            .start(queue.clone(), &source());

        wait_until("delivery after reconnect", || a.len() == 1).await;
        assert_eq!(dispatcher.source_metrics().queue_retries, 3);
        assert!(queue.connect_count() >= 4);

        assert!(dispatcher.shutdown().await.is_clean());
    }

    /// on_error = stop ends one worker; the rest keep going
    #[tokio::test]
    async fn test_failing_sink_with_stop_policy() {
        let queue = MemoryQueue::new("memory");
        let a = MemorySink::new("a");
        let dispatcher = builder()
            .add_sink(
                FailingSink::new("strict"),
                SinkSettings::new("strict").with_on_error(ErrorPolicy::Stop),
            )
            .add_sink(a.clone(), SinkSettings::new("a"))
            .start(queue.clone(), &source());

        queue.push("q", "first");
        queue.push("q", "second");
        wait_until("A has both items", || a.len() == 2).await;

        let summary = dispatcher.shutdown().await;
        assert!(!summary.is_clean());

        let failed: Vec<_> = summary.workers.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "strict");
        assert!(matches!(failed[0].exit, WorkerExit::Failed(_)));

        let strict = summary.sink("strict").unwrap();
        assert_eq!(strict.failure_count, 1);
        assert_eq!(strict.dropped_count, 1);
    }

    #[tokio::test]
    async fn test_source_leaves_queue_alone_after_every_sink_exited() {
        let queue = MemoryQueue::new("memory");
        let dispatcher = builder()
            .add_sink(
                FailingSink::new("strict"),
                SinkSettings::new("strict").with_on_error(ErrorPolicy::Stop),
            )
            .start(queue.clone(), &source());

        queue.push("q", "first");
        wait_until("source stopped", || {
            dispatcher
                .worker_states()
                .iter()
                .any(|(name, state)| name == "source" && *state == WorkerState::Stopped)
        })
        .await;

        for i in 0..100 {
            queue.push("q", format!("late-{i}"));
        }
        sleep(DEQUEUE_TIMEOUT * 2).await;
        assert_eq!(queue.len("q"), 100);

        let summary = timeout(
            Duration::from_secs(1),
            dispatcher.run_until(std::future::pending::<()>()),
        )
        .await
        .expect("run_until waits although every worker exited");

        assert_eq!(summary.source.dequeued_count, 1);
        let source = &summary.workers.workers[0];
        assert_eq!(source.role, WorkerRole::Source);
        assert!(matches!(source.exit, WorkerExit::Failed(ref reason) if reason == "all sinks exited"));
    }
}
