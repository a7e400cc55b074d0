use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{BrowserSession, MarkerPresence};
use crate::config::SessionSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDiscriminant {
    Unauthenticated,
    Authenticated,
    Unknown,
}

impl AuthDiscriminant {
    /// The login marker wins when both render.
    pub fn classify(presence: MarkerPresence) -> Self {
        if presence.first {
            AuthDiscriminant::Unauthenticated
        } else if presence.second {
            AuthDiscriminant::Authenticated
        } else {
            AuthDiscriminant::Unknown
        }
    }
}

impl fmt::Display for AuthDiscriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthDiscriminant::Unauthenticated => "unauthenticated",
            AuthDiscriminant::Authenticated => "authenticated",
            AuthDiscriminant::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub url: String,
    /// Rendered only for a logged-out visitor.
    pub unauthenticated_marker: String,
    /// Rendered only once the session is live.
    pub authenticated_marker: String,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn from_config(config: &SessionSection) -> Self {
        Self {
            url: config.target_url.clone(),
            unauthenticated_marker: config.unauthenticated_marker.clone(),
            authenticated_marker: config.authenticated_marker.clone(),
            timeout: config.probe_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionProber {
    target: ProbeTarget,
}

impl SessionProber {
    pub fn new(target: ProbeTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    pub async fn probe(&self, session: &mut dyn BrowserSession) -> AuthDiscriminant {
        let target = &self.target;
        if let Err(err) = session.navigate(&target.url).await {
            warn!(url = %target.url, error = %err, "probe navigation failed");
            return AuthDiscriminant::Unknown;
        }
        let presence = match session
            .wait_for_markers(
                &target.unauthenticated_marker,
                &target.authenticated_marker,
                target.timeout,
            )
            .await
        {
            Ok(presence) => presence,
            Err(err) => {
                warn!(url = %target.url, error = %err, "probe marker wait failed");
                return AuthDiscriminant::Unknown;
            }
        };
        let discriminant = AuthDiscriminant::classify(presence);
        info!(url = %target.url, mode = %session.mode(), state = %discriminant, "session probed");
        discriminant
    }
}
