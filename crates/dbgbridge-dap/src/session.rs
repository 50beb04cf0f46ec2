//! DAP session state machine.

use serde::Serialize;

use crate::capabilities::DapCapabilities;
use crate::error::DapError;
use crate::protocol::Capabilities;

/// The current state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session has been created but not initialized.
    Uninitialized,
    /// The `initialize` handshake has completed.
    Initialized,
    /// A launch has been performed; the debuggee is running.
    Running,
    /// The debuggee is stopped (e.g. at a breakpoint).
    Stopped,
    /// The session has been terminated/disconnected.
    Terminated,
}

/// Manages the lifecycle state of a single debug session.
#[derive(Debug)]
pub struct DapSession {
    state: SessionState,
    capabilities: DapCapabilities,
    next_seq: i64,
}

impl DapSession {
    /// Create a new session in the [`Uninitialized`](SessionState::Uninitialized) state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            capabilities: DapCapabilities::default(),
            next_seq: 1,
        }
    }

    /// Return the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a debuggee is attached (running or stopped).
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Stopped)
    }

    /// Return the resolved adapter capabilities.
    pub fn capabilities(&self) -> &DapCapabilities {
        &self.capabilities
    }

    /// Allocate the next sequence number for an outgoing request.
    pub fn next_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Transition: Uninitialized → Initialized.
    ///
    /// Call after receiving a successful `initialize` response.
    pub fn initialize(&mut self, caps: &Capabilities) -> Result<(), DapError> {
        self.require_not_terminated()?;
        if self.state != SessionState::Uninitialized {
            return Err(self.rejected("initialize"));
        }
        self.capabilities = DapCapabilities::from_initialize_response(caps);
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Transition: Initialized → Running.
    pub fn launch(&mut self) -> Result<(), DapError> {
        match self.state {
            SessionState::Uninitialized => Err(DapError::NotInitialized),
            SessionState::Terminated => Err(DapError::Terminated),
            SessionState::Initialized => {
                self.state = SessionState::Running;
                Ok(())
            }
            _ => Err(self.rejected("launch")),
        }
    }

    /// Transition: Running → Stopped (when a stopped event is received).
    ///
    /// A second stop while already stopped (another thread) is accepted.
    /// Adapters that honour `stopOnEntry` may stop before the launch
    /// response arrives, so a stop while Initialized is accepted too.
    pub fn handle_stopped(&mut self) -> Result<(), DapError> {
        self.require_not_terminated()?;
        match self.state {
            SessionState::Initialized | SessionState::Running | SessionState::Stopped => {
                self.state = SessionState::Stopped;
                Ok(())
            }
            _ => Err(self.rejected("stop")),
        }
    }

    /// Transition: Stopped → Running (via continue).
    pub fn continue_execution(&mut self) -> Result<(), DapError> {
        self.require_not_terminated()?;
        if self.state != SessionState::Stopped {
            return Err(self.rejected("continue"));
        }
        self.state = SessionState::Running;
        Ok(())
    }

    /// Transition: any → Terminated (via disconnect or adapter exit).
    pub fn disconnect(&mut self) -> Result<(), DapError> {
        self.require_not_terminated()?;
        self.state = SessionState::Terminated;
        Ok(())
    }

    fn require_not_terminated(&self) -> Result<(), DapError> {
        if self.state == SessionState::Terminated {
            return Err(DapError::Terminated);
        }
        Ok(())
    }

    fn rejected(&self, op: &str) -> DapError {
        DapError::Rejected {
            message: format!("cannot {op}: session is in {:?} state", self.state),
        }
    }
}

impl Default for DapSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_caps() -> Capabilities {
        Capabilities {
            supports_configuration_done_request: Some(true),
            supports_conditional_breakpoints: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn session_lifecycle_happy_path() {
        let mut session = DapSession::new();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.is_active());

        session.initialize(&sample_caps()).unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(session.capabilities().supports_configuration_done_request);

        session.launch().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.is_active());

        session.handle_stopped().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        session.continue_execution().unwrap();
        assert_eq!(session.state(), SessionState::Running);

        session.handle_stopped().unwrap();
        session.disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(!session.is_active());
    }

    #[test]
    fn session_launch_before_init() {
        let mut session = DapSession::new();
        assert!(matches!(session.launch(), Err(DapError::NotInitialized)));
    }

    #[test]
    fn session_operations_after_disconnect() {
        let mut session = DapSession::new();
        session.initialize(&sample_caps()).unwrap();
        session.disconnect().unwrap();

        assert!(matches!(
            session.initialize(&sample_caps()),
            Err(DapError::Terminated)
        ));
        assert!(matches!(session.launch(), Err(DapError::Terminated)));
        assert!(matches!(
            session.continue_execution(),
            Err(DapError::Terminated)
        ));
        assert!(matches!(
            session.handle_stopped(),
            Err(DapError::Terminated)
        ));
        assert!(matches!(session.disconnect(), Err(DapError::Terminated)));
    }

    #[test]
    fn session_repeated_stop_is_accepted() {
        let mut session = DapSession::new();
        session.initialize(&sample_caps()).unwrap();
        session.launch().unwrap();
        session.handle_stopped().unwrap();
        session.handle_stopped().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn session_stop_on_entry_before_launch_response() {
        let mut session = DapSession::new();
        session.initialize(&sample_caps()).unwrap();
        session.handle_stopped().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn session_stop_before_init_rejected() {
        let mut session = DapSession::new();
        let err = session.handle_stopped().unwrap_err();
        assert!(matches!(err, DapError::Rejected { .. }));
    }

    #[test]
    fn session_sequence_tracking() {
        let mut session = DapSession::new();
        assert_eq!(session.next_seq(), 1);
        assert_eq!(session.next_seq(), 2);
        assert_eq!(session.next_seq(), 3);
    }

    #[test]
    fn session_double_initialize_rejected() {
        let mut session = DapSession::new();
        session.initialize(&sample_caps()).unwrap();
        let err = session.initialize(&sample_caps()).unwrap_err();
        assert!(matches!(err, DapError::Rejected { .. }));
    }

    #[test]
    fn session_cannot_continue_when_running() {
        let mut session = DapSession::new();
        session.initialize(&sample_caps()).unwrap();
        session.launch().unwrap();
        let err = session.continue_execution().unwrap_err();
        assert!(matches!(err, DapError::Rejected { .. }));
    }

    #[test]
    fn session_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }
}
