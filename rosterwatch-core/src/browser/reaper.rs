use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use super::error::{BrowserError, BrowserResult};
use super::profile::BrowserProfile;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<ExitStatus>;
}

pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<ExitStatus> {
        Command::new(program).args(args).status().await
    }
}

/// Kills browser processes left over from a crashed run and clears the
/// profile locks they held.
pub struct StaleProcessReaper {
    profile: BrowserProfile,
    executor: Arc<dyn CommandExecutor>,
}

impl StaleProcessReaper {
    pub fn new(profile: BrowserProfile) -> Self {
        Self {
            profile,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Platform kill command targeting the browser that owns this profile.
    pub fn kill_command(&self) -> (PathBuf, Vec<String>) {
        if cfg!(windows) {
            (
                PathBuf::from("taskkill"),
                vec!["/F".into(), "/IM".into(), "chrome.exe".into()],
            )
        } else {
            (
                PathBuf::from("pkill"),
                vec![
                    "-f".into(),
                    "--".into(),
                    format!("--user-data-dir={}", self.profile.path().display()),
                ],
            )
        }
    }

    /// Clears the profile locks even when the kill command cannot be run;
    /// that failure is reported afterwards.
    pub async fn reap(&self) -> BrowserResult<()> {
        let (program, args) = self.kill_command();
        let killed = self.executor.run(&program, &args).await;
        self.profile.clear_singleton_locks()?;
        let status =
            killed.map_err(|err| BrowserError::Reap(format!("{}: {err}", program.display())))?;
        match status.code() {
            Some(0) => info!(program = %program.display(), "terminated stale browser processes"),
            // pkill: no process matched
            Some(1) => info!(program = %program.display(), "no stale browser process found"),
            code => warn!(program = %program.display(), ?code, "kill command returned failure"),
        }
        Ok(())
    }

    /// Runs `launch`; if it fails to create a session, reaps stale processes
    /// and tries exactly once more. A failed cleanup does not prevent the
    /// retry; the second launch's outcome is returned as is.
    pub async fn launch_with_recovery<F, Fut, T>(&self, mut launch: F) -> BrowserResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = BrowserResult<T>>,
    {
        match launch(0).await {
            Err(BrowserError::SessionCreation(reason)) => {
                error!(%reason, "browser session could not be created; cleaning up stale processes");
                if let Err(err) = self.reap().await {
                    error!(error = %err, "stale process cleanup failed");
                }
                info!("retrying browser launch");
                launch(1).await
            }
            other => other,
        }
    }
}

impl fmt::Debug for StaleProcessReaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleProcessReaper")
            .field("profile", &self.profile)
            .finish()
    }
}
