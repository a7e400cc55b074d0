use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::browser::{
    poll_markers, BrowserError, BrowserMode, BrowserResult, BrowserSession, MarkerPresence,
    SessionLauncher, StorageSnapshot,
};

#[derive(Clone, Default)]
pub(crate) struct DriverLog(Arc<Mutex<Vec<String>>>);

impl DriverLog {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Browser session whose page behaviour is scripted up front.
pub(crate) struct ScriptedSession {
    mode: BrowserMode,
    log: DriverLog,
    markers: Option<(Duration, MarkerPresence)>,
    storage: VecDeque<BrowserResult<StorageSnapshot>>,
    fail_navigation: bool,
    navigated_at: Option<Instant>,
}

impl ScriptedSession {
    pub(crate) fn new(mode: BrowserMode) -> Self {
        Self {
            mode,
            log: DriverLog::default(),
            markers: None,
            storage: VecDeque::new(),
            fail_navigation: false,
            navigated_at: None,
        }
    }

    /// Markers render `after` the navigation completes.
    pub(crate) fn markers_after(mut self, after: Duration, first: bool, second: bool) -> Self {
        self.markers = Some((after, MarkerPresence { first, second }));
        self
    }

    /// Queued storage reads; once drained, reads return an empty snapshot.
    pub(crate) fn storage(mut self, read: BrowserResult<StorageSnapshot>) -> Self {
        self.storage.push_back(read);
        self
    }

    pub(crate) fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.log.push(format!("navigate {} {url}", self.mode));
        if self.fail_navigation {
            return Err(BrowserError::Unexpected("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        self.navigated_at = Some(Instant::now());
        Ok(())
    }

    async fn wait_for_markers(
        &mut self,
        _first: &str,
        _second: &str,
        timeout: Duration,
    ) -> BrowserResult<MarkerPresence> {
        let Some(started) = self.navigated_at else {
            return Ok(MarkerPresence::default());
        };
        let markers = self.markers;
        Ok(poll_markers(
            move || async move {
                match markers {
                    Some((after, presence)) if started.elapsed() >= after => presence,
                    _ => MarkerPresence::default(),
                }
            },
            timeout,
            Duration::from_millis(250),
        )
        .await)
    }

    async fn read_storage(&mut self) -> BrowserResult<StorageSnapshot> {
        self.log.push(format!("read_storage {}", self.mode));
        self.storage
            .pop_front()
            .unwrap_or_else(|| Ok(StorageSnapshot::new()))
    }

    async fn shutdown(self: Box<Self>) -> BrowserResult<()> {
        self.log.push(format!("shutdown {}", self.mode));
        Ok(())
    }
}

/// Hands out the queued sessions in order; launching past the end fails.
pub(crate) struct ScriptedLauncher {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    log: DriverLog,
}

impl ScriptedLauncher {
    pub(crate) fn new(sessions: Vec<ScriptedSession>) -> (Arc<Self>, DriverLog) {
        let log = DriverLog::default();
        let sessions = sessions
            .into_iter()
            .map(|mut session| {
                session.log = log.clone();
                session
            })
            .collect();
        let launcher = Arc::new(Self {
            sessions: Mutex::new(sessions),
            log: log.clone(),
        });
        (launcher, log)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, mode: BrowserMode) -> BrowserResult<Box<dyn BrowserSession>> {
        self.log.push(format!("launch {mode}"));
        let mut session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BrowserError::SessionCreation("no scripted session left".into()))?;
        session.mode = mode;
        Ok(Box::new(session))
    }
}

pub(crate) fn token_storage(key: &str, token: &str) -> StorageSnapshot {
    let mut snapshot = StorageSnapshot::new();
    snapshot.insert("theme", "dark");
    snapshot.insert(key, format!(r#"{{"access_token":"{token}","expires":0}}"#));
    snapshot
}
