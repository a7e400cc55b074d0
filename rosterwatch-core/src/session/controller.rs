use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserError, BrowserMode, BrowserSession, SessionLauncher};
use crate::config::SessionSection;

use super::probe::{AuthDiscriminant, ProbeTarget, SessionProber};
use super::token::{Credential, TokenExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Init,
    ProbeUnattended,
    ExtractDirect,
    RelaunchInteractive,
    PollForToken,
    Done,
    Failed,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcquisitionState::Init => "init",
            AcquisitionState::ProbeUnattended => "probe_unattended",
            AcquisitionState::ExtractDirect => "extract_direct",
            AcquisitionState::RelaunchInteractive => "relaunch_interactive",
            AcquisitionState::PollForToken => "poll_for_token",
            AcquisitionState::Done => "done",
            AcquisitionState::Failed => "failed",
        })
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("session state could not be determined within {0:?}")]
    ProbeTimeout(Duration),
    #[error("no usable token in storage keys matching {pattern:?}")]
    TokenNotFound { pattern: String },
    #[error("credential acquisition cancelled")]
    Cancelled,
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

enum Step {
    Init,
    ProbeUnattended(Box<dyn BrowserSession>),
    ExtractDirect(Box<dyn BrowserSession>),
    RelaunchInteractive(Box<dyn BrowserSession>),
    PollForToken(Box<dyn BrowserSession>),
    Done(Box<dyn BrowserSession>, Credential),
    Failed(Option<Box<dyn BrowserSession>>, AcquisitionError),
}

impl Step {
    fn state(&self) -> AcquisitionState {
        match self {
            Step::Init => AcquisitionState::Init,
            Step::ProbeUnattended(_) => AcquisitionState::ProbeUnattended,
            Step::ExtractDirect(_) => AcquisitionState::ExtractDirect,
            Step::RelaunchInteractive(_) => AcquisitionState::RelaunchInteractive,
            Step::PollForToken(_) => AcquisitionState::PollForToken,
            Step::Done(..) => AcquisitionState::Done,
            Step::Failed(..) => AcquisitionState::Failed,
        }
    }

    fn into_session(self) -> Option<Box<dyn BrowserSession>> {
        match self {
            Step::Init => None,
            Step::ProbeUnattended(session)
            | Step::ExtractDirect(session)
            | Step::RelaunchInteractive(session)
            | Step::PollForToken(session)
            | Step::Done(session, _) => Some(session),
            Step::Failed(session, _) => session,
        }
    }
}

/// Drives the browser until a session token is available.
///
/// A headless probe is tried first; if the site shows its login page the
/// browser is relaunched visibly and storage is polled until the operator
/// has logged in or the cancellation token fires. The browser is always
/// stopped before `acquire` returns.
pub struct AcquisitionController {
    launcher: Arc<dyn SessionLauncher>,
    prober: SessionProber,
    extractor: TokenExtractor,
    poll_interval: Duration,
    cancel: CancellationToken,
    history: Vec<AcquisitionState>,
}

impl AcquisitionController {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        prober: SessionProber,
        extractor: TokenExtractor,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            launcher,
            prober,
            extractor,
            poll_interval,
            cancel,
            history: Vec::new(),
        }
    }

    pub fn from_config(
        launcher: Arc<dyn SessionLauncher>,
        config: &SessionSection,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            launcher,
            SessionProber::new(ProbeTarget::from_config(config)),
            TokenExtractor::new(config.token_key_pattern.clone()),
            config.poll_interval(),
            cancel,
        )
    }

    /// States visited by the last `acquire` call, in order.
    pub fn history(&self) -> &[AcquisitionState] {
        &self.history
    }

    pub async fn acquire(&mut self) -> AcquisitionResult<Credential> {
        self.history.clear();
        self.history.push(AcquisitionState::Init);
        let mut step = Step::Init;
        loop {
            let from = step.state();
            step = match step {
                Step::Done(session, credential) => {
                    self.stop(session).await;
                    info!(fingerprint = %credential.fingerprint(), "credential acquired");
                    return Ok(credential);
                }
                Step::Failed(session, err) => {
                    if let Some(session) = session {
                        self.stop(session).await;
                    }
                    return Err(err);
                }
                other => self.advance(other).await,
            };
            let to = step.state();
            if from == to {
                debug!(state = %to, "acquisition state unchanged");
            } else {
                info!(from = %from, to = %to, "acquisition state transition");
                self.history.push(to);
            }
        }
    }

    async fn advance(&self, step: Step) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Failed(step.into_session(), AcquisitionError::Cancelled);
        }
        match step {
            Step::Init => {
                match self
                    .until_cancelled(self.launcher.launch(BrowserMode::Headless))
                    .await
                {
                    Some(Ok(session)) => Step::ProbeUnattended(session),
                    Some(Err(err)) => Step::Failed(None, err.into()),
                    None => Step::Failed(None, AcquisitionError::Cancelled),
                }
            }
            Step::ProbeUnattended(mut session) => {
                let verdict = self
                    .until_cancelled(self.prober.probe(session.as_mut()))
                    .await;
                match verdict {
                    Some(AuthDiscriminant::Authenticated) => Step::ExtractDirect(session),
                    Some(AuthDiscriminant::Unauthenticated) => Step::RelaunchInteractive(session),
                    Some(AuthDiscriminant::Unknown) => Step::Failed(
                        Some(session),
                        AcquisitionError::ProbeTimeout(self.prober.target().timeout),
                    ),
                    None => Step::Failed(Some(session), AcquisitionError::Cancelled),
                }
            }
            Step::ExtractDirect(mut session) => match self.read_token(session.as_mut()).await {
                Some(credential) => Step::Done(session, credential),
                None => Step::Failed(
                    Some(session),
                    AcquisitionError::TokenNotFound {
                        pattern: self.extractor.pattern().to_string(),
                    },
                ),
            },
            Step::RelaunchInteractive(headless) => {
                self.stop(headless).await;
                let mut visible = match self
                    .until_cancelled(self.launcher.launch(BrowserMode::Visible))
                    .await
                {
                    Some(Ok(session)) => session,
                    Some(Err(err)) => return Step::Failed(None, err.into()),
                    None => return Step::Failed(None, AcquisitionError::Cancelled),
                };
                let url = &self.prober.target().url;
                let navigated = self.until_cancelled(visible.navigate(url)).await;
                match navigated {
                    Some(Ok(())) => {}
                    // the operator can still reach the login page by hand
                    Some(Err(err)) => warn!(%url, error = %err, "interactive navigation failed"),
                    None => return Step::Failed(Some(visible), AcquisitionError::Cancelled),
                }
                Step::PollForToken(visible)
            }
            Step::PollForToken(mut session) => {
                if let Some(credential) = self.read_token(session.as_mut()).await {
                    return Step::Done(session, credential);
                }
                info!(
                    interval_secs = self.poll_interval.as_secs(),
                    "waiting for interactive login"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        Step::Failed(Some(session), AcquisitionError::Cancelled)
                    }
                    _ = sleep(self.poll_interval) => Step::PollForToken(session),
                }
            }
            terminal @ (Step::Done(..) | Step::Failed(..)) => terminal,
        }
    }

    /// `None` when the cancellation token fires before `work` completes.
    async fn until_cancelled<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            output = work => Some(output),
        }
    }

    async fn read_token(&self, session: &mut dyn BrowserSession) -> Option<Credential> {
        match session.read_storage().await {
            Ok(snapshot) => {
                let credential = self.extractor.extract(&snapshot);
                if credential.is_none() {
                    warn!(
                        pattern = %self.extractor.pattern(),
                        entries = snapshot.len(),
                        "no token found in client storage"
                    );
                }
                credential
            }
            Err(err) => {
                error!(error = %err, "client storage read failed");
                None
            }
        }
    }

    async fn stop(&self, session: Box<dyn BrowserSession>) {
        let mode = session.mode();
        if let Err(err) = session.shutdown().await {
            warn!(%mode, error = %err, "browser shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{token_storage, ScriptedLauncher, ScriptedSession};

    const KEY: &str = "6172:web_token:login:auth";

    fn controller(launcher: Arc<ScriptedLauncher>, cancel: CancellationToken) -> AcquisitionController {
        AcquisitionController::new(
            launcher,
            SessionProber::new(ProbeTarget {
                url: "https://social.example".into(),
                unauthenticated_marker: "login_panel".into(),
                authenticated_marker: "feed_root".into(),
                timeout: Duration::from_secs(10),
            }),
            TokenExtractor::new(":web_token:login:auth"),
            Duration::from_secs(60),
            cancel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn headless_session_extracts_directly() {
        let (launcher, log) = ScriptedLauncher::new(vec![ScriptedSession::new(
            BrowserMode::Headless,
        )
        .markers_after(Duration::from_millis(500), false, true)
        .storage(Ok(token_storage(KEY, "tok-1")))]);
        let mut controller = controller(launcher, CancellationToken::new());

        let credential = controller.acquire().await.unwrap();

        assert_eq!(credential.expose(), "tok-1");
        assert_eq!(
            controller.history(),
            &[
                AcquisitionState::Init,
                AcquisitionState::ProbeUnattended,
                AcquisitionState::ExtractDirect,
                AcquisitionState::Done,
            ]
        );
        assert_eq!(log.events().last().unwrap(), "shutdown headless");
    }

    #[tokio::test(start_paused = true)]
    async fn login_page_relaunches_visible_and_polls() {
        let (launcher, log) = ScriptedLauncher::new(vec![
            ScriptedSession::new(BrowserMode::Headless).markers_after(Duration::ZERO, true, false),
            ScriptedSession::new(BrowserMode::Visible)
                .storage(Ok(Default::default()))
                .storage(Err(BrowserError::Storage("page reloading".into())))
                .storage(Ok(token_storage(KEY, "tok-2"))),
        ]);
        let mut controller = controller(launcher, CancellationToken::new());

        let credential = controller.acquire().await.unwrap();

        assert_eq!(credential.expose(), "tok-2");
        assert_eq!(
            controller.history(),
            &[
                AcquisitionState::Init,
                AcquisitionState::ProbeUnattended,
                AcquisitionState::RelaunchInteractive,
                AcquisitionState::PollForToken,
                AcquisitionState::Done,
            ]
        );
        let events = log.events();
        let headless_down = events.iter().position(|e| e == "shutdown headless").unwrap();
        let visible_up = events.iter().position(|e| e == "launch visible").unwrap();
        assert!(headless_down < visible_up);
        assert_eq!(
            events.iter().filter(|e| *e == "read_storage visible").count(),
            3
        );
        assert_eq!(events.last().unwrap(), "shutdown visible");
    }

    #[tokio::test(start_paused = true)]
    async fn probe_without_markers_fails_and_stops_browser() {
        let (launcher, log) =
            ScriptedLauncher::new(vec![ScriptedSession::new(BrowserMode::Headless)]);
        let mut controller = controller(launcher, CancellationToken::new());

        let err = controller.acquire().await.unwrap_err();

        assert!(matches!(err, AcquisitionError::ProbeTimeout(timeout) if timeout == Duration::from_secs(10)));
        assert_eq!(controller.history().last(), Some(&AcquisitionState::Failed));
        assert_eq!(log.events().last().unwrap(), "shutdown headless");
    }

    #[tokio::test(start_paused = true)]
    async fn direct_extraction_miss_fails() {
        let (launcher, log) = ScriptedLauncher::new(vec![ScriptedSession::new(
            BrowserMode::Headless,
        )
        .markers_after(Duration::ZERO, false, true)
        .storage(Ok(token_storage(KEY, "")))]);
        let mut controller = controller(launcher, CancellationToken::new());

        let err = controller.acquire().await.unwrap_err();

        assert!(matches!(err, AcquisitionError::TokenNotFound { ref pattern } if pattern == ":web_token:login:auth"));
        assert_eq!(log.events().last().unwrap(), "shutdown headless");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_polling_stops_browser() {
        let (launcher, log) = ScriptedLauncher::new(vec![
            ScriptedSession::new(BrowserMode::Headless).markers_after(Duration::ZERO, true, false),
            ScriptedSession::new(BrowserMode::Visible),
        ]);
        let cancel = CancellationToken::new();
        let mut controller = controller(launcher, cancel.clone());

        let canceller = tokio::spawn(async move {
            sleep(Duration::from_secs(150)).await;
            cancel.cancel();
        });
        let err = controller.acquire().await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, AcquisitionError::Cancelled));
        let events = log.events();
        assert_eq!(events.last().unwrap(), "shutdown visible");
        // polls at 0s, 60s and 120s before the token fires at 150s
        assert_eq!(
            events.iter().filter(|e| *e == "read_storage visible").count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn storage_error_during_direct_extraction_is_token_not_found() {
        let (launcher, log) = ScriptedLauncher::new(vec![ScriptedSession::new(
            BrowserMode::Headless,
        )
        .markers_after(Duration::ZERO, false, true)
        .storage(Err(BrowserError::Storage("execution context destroyed".into())))]);
        let mut controller = controller(launcher, CancellationToken::new());

        let err = controller.acquire().await.unwrap_err();

        assert!(matches!(err, AcquisitionError::TokenNotFound { .. }));
        assert_eq!(
            controller.history(),
            &[
                AcquisitionState::Init,
                AcquisitionState::ProbeUnattended,
                AcquisitionState::ExtractDirect,
                AcquisitionState::Failed,
            ]
        );
        assert_eq!(log.events().last().unwrap(), "shutdown headless");
    }

    #[tokio::test(start_paused = true)]
    async fn visible_launch_failure_leaves_no_browser_running() {
        let (launcher, log) = ScriptedLauncher::new(vec![
            ScriptedSession::new(BrowserMode::Headless).markers_after(Duration::ZERO, true, false),
        ]);
        let mut controller = controller(launcher, CancellationToken::new());

        let err = controller.acquire().await.unwrap_err();

        assert!(matches!(
            err,
            AcquisitionError::Browser(BrowserError::SessionCreation(_))
        ));
        assert_eq!(
            controller.history(),
            &[
                AcquisitionState::Init,
                AcquisitionState::ProbeUnattended,
                AcquisitionState::RelaunchInteractive,
                AcquisitionState::Failed,
            ]
        );
        let events = log.events();
        assert_eq!(
            events.iter().filter(|e| e.starts_with("shutdown")).count(),
            1
        );
        assert_eq!(events.last().unwrap(), "launch visible");
        assert!(!events.iter().any(|e| e == "read_storage visible"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_pending_login_check() {
        let (launcher, log) =
            ScriptedLauncher::new(vec![ScriptedSession::new(BrowserMode::Headless)]);
        let cancel = CancellationToken::new();
        let mut controller = controller(launcher, cancel.clone());
        let started = tokio::time::Instant::now();

        let canceller = tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            cancel.cancel();
        });
        let err = controller.acquire().await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, AcquisitionError::Cancelled));
        // login check timeout is 10s
        assert!(started.elapsed() < Duration::from_secs(5));
        let events = log.events();
        assert_eq!(events.last().unwrap(), "shutdown headless");
        assert!(!events.iter().any(|e| e == "launch visible"));
    }

    #[tokio::test]
    async fn launch_failure_is_surfaced() {
        let (launcher, _) = ScriptedLauncher::new(Vec::new());
        let mut controller = controller(launcher, CancellationToken::new());
        let err = controller.acquire().await.unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Browser(BrowserError::SessionCreation(_))
        ));
    }

    #[tokio::test]
    async fn already_cancelled_token_never_launches() {
        let (launcher, log) =
            ScriptedLauncher::new(vec![ScriptedSession::new(BrowserMode::Headless)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut controller = controller(launcher, cancel);
        assert!(matches!(
            controller.acquire().await,
            Err(AcquisitionError::Cancelled)
        ));
        assert!(log.events().is_empty());
    }
}
