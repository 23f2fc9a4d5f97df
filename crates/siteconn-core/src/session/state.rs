/// Lifecycle of a session's live connection.
///
/// `Unconnected -> Connecting -> Connected -> Initializing -> Ready`, with
/// `ConnectFailed` and `InitFailed` as failure branches. Failure states are
/// left again only by calling `connect`/`init` once more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Connected,
    Initializing,
    Ready,
    ConnectFailed,
    InitFailed,
}

impl SessionState {
    /// Whether a transport handle has been built for this session.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connected
                | SessionState::Initializing
                | SessionState::Ready
                | SessionState::InitFailed
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::ConnectFailed => "connect-failed",
            SessionState::InitFailed => "init-failed",
        }
    }
}

/// How a completed `init` ended.
///
/// Authorization denials are recovered locally, so the two give-up cases are
/// outcomes rather than errors; the session is simply left not ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// Denied, and the credential has no secret to re-authenticate with.
    ReauthUnavailable,
    /// Denied again after the single reconnect-and-retry.
    AuthRetryExhausted,
}

impl InitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, InitOutcome::Ready)
    }
}
