use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use procvisor::{
    Command, Event, EventKind, ExitRegistry, LiveSet, ManagerConfig, ProcessManager, ProcessSpec,
    Subscribe,
};

#[derive(Default)]
struct CountFinished(AtomicUsize);

#[async_trait]
impl Subscribe for CountFinished {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::ProcessFinished {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    fn name(&self) -> &'static str {
        "count-finished"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spawns_finish_exactly_once() {
    const N: usize = 100;

    let registry = ExitRegistry::new();
    let mgr = ProcessManager::builder(ManagerConfig::default())
        .with_registry(Arc::clone(&registry))
        .build();
    let mut rx = mgr.subscribe();

    let handles: Vec<_> = (0..N)
        .map(|i| {
            mgr.spawn(ProcessSpec::new(format!("exit {}", i % 2)).with_accepted_codes([0, 1]))
                .unwrap()
        })
        .collect();
    let pids: HashSet<u32> = handles.iter().map(|h| h.pid()).collect();
    assert_eq!(pids.len(), N);

    for handle in &handles {
        handle.wait().await.unwrap();
    }

    let mut started = HashSet::new();
    let mut finished = HashSet::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while finished.len() < N {
            let ev = rx.recv().await.unwrap();
            let pid = ev.pid.unwrap();
            match ev.kind {
                EventKind::ProcessStarted => assert!(started.insert(pid)),
                EventKind::ProcessFinished => {
                    assert!(started.contains(&pid), "finished before started");
                    assert!(finished.insert(pid), "finished twice");
                    assert!(ev.result.is_some());
                }
                _ => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(finished, pids);
    assert_eq!(registry.tracked(), 0);
    assert_eq!(registry.pending(), 0);
    assert_eq!(registry.unclaimed(), 0);
    assert!(!registry.is_subscribed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribers_receive_lifecycle() {
    let live = Arc::new(LiveSet::new());
    let count = Arc::new(CountFinished::default());
    let mgr = ProcessManager::builder(ManagerConfig::default())
        .with_registry(ExitRegistry::new())
        .with_subscribers(vec![live.clone(), count.clone()])
        .build();
    assert_eq!(mgr.subscribers(), 2);

    let handle = mgr.spawn(ProcessSpec::new(Command::argv(["sleep", "5"]))).unwrap();
    let pid = handle.pid();

    let mut seen = false;
    for _ in 0..200 {
        if live.snapshot() == vec![pid] {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen);

    handle.kill();
    let _ = handle.wait().await;

    for _ in 0..200 {
        if count.0.load(Ordering::SeqCst) == 1 && live.snapshot().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscribers did not observe ProcessFinished");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_started_event_carries_spec_and_command() {
    let mgr = ProcessManager::builder(ManagerConfig::default())
        .with_registry(ExitRegistry::new())
        .build();
    let mut rx = mgr.subscribe();

    let handle = mgr.spawn(ProcessSpec::new("exit 0")).unwrap();
    handle.wait().await.unwrap();

    let started = rx.recv().await.unwrap();
    assert_eq!(started.kind, EventKind::ProcessStarted);
    assert_eq!(started.pid, Some(handle.pid()));
    assert_eq!(started.command.as_deref(), Some("exit 0"));
    assert!(started.spec.is_some());

    let finished = rx.recv().await.unwrap();
    assert_eq!(finished.kind, EventKind::ProcessFinished);
    assert_eq!(finished.exit_code, Some(0));
    assert_eq!(finished.reason.as_deref(), Some("success"));
    assert!(finished.seq > started.seq);
}
