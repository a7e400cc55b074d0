use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rosterwatch_core::browser::{
    BrowserMode, BrowserResult, BrowserSession, MarkerPresence, SessionLauncher, StorageSnapshot,
};
use rosterwatch_core::config::ScheduleSection;
use rosterwatch_core::graph::{ApiMethod, ApiRequest, GraphApi, GraphError, GraphResult};
use rosterwatch_core::notify::{Notifier, NotifyError, NotifyResult};
use rosterwatch_core::roster::{EntityRecord, EntitySnapshot, SnapshotStore};
use rosterwatch_core::session::{
    AcquisitionController, Credential, ProbeTarget, SessionProber, TokenExtractor,
};
use rosterwatch_core::watch::{WatchCycle, Watcher};

const TOKEN_KEY: &str = "6172:web_token:login:auth";

/// Session that is already logged in and holds a token.
struct LoggedInSession;

#[async_trait]
impl BrowserSession for LoggedInSession {
    fn mode(&self) -> BrowserMode {
        BrowserMode::Headless
    }

    async fn navigate(&mut self, _url: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn wait_for_markers(
        &mut self,
        _first: &str,
        _second: &str,
        _timeout: Duration,
    ) -> BrowserResult<MarkerPresence> {
        Ok(MarkerPresence {
            first: false,
            second: true,
        })
    }

    async fn read_storage(&mut self) -> BrowserResult<StorageSnapshot> {
        let mut storage = StorageSnapshot::new();
        storage.insert(TOKEN_KEY, r#"{"access_token":"tok-live"}"#);
        Ok(storage)
    }

    async fn shutdown(self: Box<Self>) -> BrowserResult<()> {
        Ok(())
    }
}

struct LoggedInLauncher;

#[async_trait]
impl SessionLauncher for LoggedInLauncher {
    async fn launch(&self, _mode: BrowserMode) -> BrowserResult<Box<dyn BrowserSession>> {
        Ok(Box::new(LoggedInSession))
    }
}

/// Answers `friends.get` with queued results, one per call.
#[derive(Default)]
struct MockGraph {
    responses: Mutex<VecDeque<GraphResult<Value>>>,
    tokens: Mutex<Vec<String>>,
}

impl MockGraph {
    fn with_pages(pages: Vec<GraphResult<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(pages.into()),
            tokens: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn call(&self, credential: &Credential, request: ApiRequest) -> GraphResult<Value> {
        assert_eq!(request.method(), ApiMethod::FriendsGet);
        self.tokens
            .lock()
            .unwrap()
            .push(credential.expose().to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GraphError::Unexpected("no scripted response".into())))
    }
}

fn friends_page(friends: &[(i64, &str)]) -> GraphResult<Value> {
    let items: Vec<Value> = friends
        .iter()
        .map(|(id, name)| json!({"id": id, "first_name": name, "last_name": ""}))
        .collect();
    Ok(json!({"count": friends.len(), "items": items}))
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    broken: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, text: &str) -> NotifyResult<bool> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.broken {
            Err(NotifyError::Configuration("bot token revoked".into()))
        } else {
            Ok(true)
        }
    }
}

fn cycle(
    store_path: &Path,
    graph: Arc<MockGraph>,
    notifier: Arc<RecordingNotifier>,
    cancel: CancellationToken,
) -> WatchCycle {
    let acquisition = AcquisitionController::new(
        Arc::new(LoggedInLauncher),
        SessionProber::new(ProbeTarget {
            url: "https://social.example".into(),
            unauthenticated_marker: "login_panel".into(),
            authenticated_marker: "feed_root".into(),
            timeout: Duration::from_secs(10),
        }),
        TokenExtractor::new(":web_token:login:auth"),
        Duration::from_secs(60),
        cancel,
    );
    WatchCycle::new(
        acquisition,
        graph,
        SnapshotStore::new(store_path),
        notifier,
        "1",
        5000,
    )
}

fn snapshot(entries: &[(&str, &str)]) -> EntitySnapshot {
    entries.iter().copied().collect()
}

#[tokio::test]
async fn drift_is_reported_and_snapshot_replaced() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    SnapshotStore::new(&path)
        .save(&snapshot(&[("1", "Alice"), ("2", "Bob")]))
        .unwrap();
    let graph = MockGraph::with_pages(vec![friends_page(&[(2, "Bob"), (3, "Carol")])]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = cycle(&path, graph.clone(), notifier.clone(), CancellationToken::new())
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.added, vec![EntityRecord::new("3", "Carol")]);
    assert_eq!(report.removed, vec![EntityRecord::new("1", "Alice")]);
    assert!(report.notified);

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        "Removed entities:\n1: Alice\n\nAdded entities:\n3: Carol"
    );
    assert!(!sent[0].contains("Bob"));

    assert_eq!(
        SnapshotStore::new(&path).load().unwrap(),
        snapshot(&[("2", "Bob"), ("3", "Carol")])
    );
    assert_eq!(graph.tokens.lock().unwrap().as_slice(), ["tok-live"]);
}

#[tokio::test]
async fn unchanged_entities_send_nothing_but_rewrite_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    std::fs::write(&path, r#"{"1":"Alice","2":"Bob"}"#).unwrap();
    let graph = MockGraph::with_pages(vec![friends_page(&[(1, "Alice"), (2, "Bob")])]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = cycle(&path, graph, notifier.clone(), CancellationToken::new())
        .run_once()
        .await
        .unwrap();

    assert!(!report.has_drift());
    assert!(!report.notified);
    assert!(report.message.is_none());
    assert!(notifier.sent.lock().unwrap().is_empty());
    // rewritten in the pretty-printed form
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains('\n'));
}

#[tokio::test]
async fn first_run_reports_everyone_as_added() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state/entities.json");
    let graph = MockGraph::with_pages(vec![friends_page(&[(1, "Alice")])]);
    let notifier = Arc::new(RecordingNotifier::default());

    let report = cycle(&path, graph, notifier.clone(), CancellationToken::new())
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.added.len(), 1);
    assert!(report.removed.is_empty());
    assert!(path.exists());
}

#[tokio::test]
async fn notifier_failure_keeps_the_new_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    let graph = MockGraph::with_pages(vec![friends_page(&[(1, "Alice")])]);
    let notifier = Arc::new(RecordingNotifier {
        broken: true,
        ..Default::default()
    });

    let report = cycle(&path, graph, notifier.clone(), CancellationToken::new())
        .run_once()
        .await
        .unwrap();

    assert!(!report.notified);
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    assert_eq!(
        SnapshotStore::new(&path).load().unwrap(),
        snapshot(&[("1", "Alice")])
    );
}

#[tokio::test]
async fn permission_failure_is_fatal_and_leaves_store_alone() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    let graph = MockGraph::with_pages(vec![Err(GraphError::Permission {
        code: 5,
        message: "User authorization failed".into(),
    })]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();
    let schedule = ScheduleSection {
        refresh_interval_seconds: 3600,
        failure_retry_seconds: Some(600),
    };

    let mut watcher = Watcher::new(
        cycle(&path, graph, notifier, cancel.clone()),
        schedule,
        cancel,
    );
    let err = watcher.run().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn watcher_retries_after_transient_failure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    let graph = MockGraph::with_pages(vec![
        Err(GraphError::Api {
            code: 6,
            message: "Too many requests per second".into(),
        }),
        friends_page(&[(1, "Alice")]),
    ]);
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();
    let schedule = ScheduleSection {
        refresh_interval_seconds: 3600,
        failure_retry_seconds: Some(600),
    };
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = Watcher::new(
        cycle(&path, graph, notifier, cancel.clone()),
        schedule,
        cancel.clone(),
    )
    .with_reports(tx);
    let handle = tokio::spawn(async move { watcher.run().await });

    let report = rx.recv().await.unwrap();
    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(report.entities, 1);
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
}
