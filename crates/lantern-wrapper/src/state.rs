//! Wrapper states and control messages

/// Requests delivered to a running wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Kill the child and start it again
    Restart,
    /// Kill the child and exit; carries the trigger for logging
    Shutdown(&'static str),
}

/// Lifecycle of the supervised child as seen by the wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    Starting,
    Running,
    Restarting,
    ShuttingDown,
    Terminated,
}

impl WrapperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperState::Starting => "starting",
            WrapperState::Running => "running",
            WrapperState::Restarting => "restarting",
            WrapperState::ShuttingDown => "shutting-down",
            WrapperState::Terminated => "terminated",
        }
    }

    /// A restart request is only honoured from `Running`
    pub fn accepts_restart(&self) -> bool {
        matches!(self, WrapperState::Running)
    }

    /// Shutdown is idempotent: once shutting down, further requests are ignored
    pub fn accepts_shutdown(&self) -> bool {
        !matches!(self, WrapperState::ShuttingDown | WrapperState::Terminated)
    }
}

impl std::fmt::Display for WrapperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
