//! DAP request construction.

use serde::Serialize;

use dbgbridge_config::LaunchTarget;

use crate::breakpoint::BreakpointManager;
use crate::error::DapError;
use crate::protocol::{
    ContinueArguments, DisconnectArguments, InitializeRequestArguments, LaunchRequestArguments,
    Request, SetBreakpointsArguments, SetFunctionBreakpointsArguments, Source, SourceBreakpoint,
    StackTraceArguments,
};
use crate::session::{DapSession, SessionState};

/// Client identifier sent in `initialize`.
const CLIENT_ID: &str = "dbgbridge";

/// Wraps session state and breakpoint tracking, and builds the requests
/// the bridge sends to the adapter.
#[derive(Debug)]
pub struct DapClient {
    session: DapSession,
    breakpoints: BreakpointManager,
}

impl DapClient {
    /// Create a new DAP client.
    pub fn new() -> Self {
        Self {
            session: DapSession::new(),
            breakpoints: BreakpointManager::new(),
        }
    }

    /// Return a reference to the underlying session.
    pub fn session(&self) -> &DapSession {
        &self.session
    }

    /// Return a mutable reference to the underlying session.
    pub fn session_mut(&mut self) -> &mut DapSession {
        &mut self.session
    }

    /// Return a reference to the breakpoint manager.
    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// Return a mutable reference to the breakpoint manager.
    pub fn breakpoints_mut(&mut self) -> &mut BreakpointManager {
        &mut self.breakpoints
    }

    /// Start over with a fresh session, keeping tracked breakpoints.
    pub fn reset_session(&mut self) {
        self.session = DapSession::new();
        self.breakpoints.reset_verification();
    }

    fn require_stopped(&self) -> Result<(), DapError> {
        match self.session.state() {
            SessionState::Uninitialized => Err(DapError::NotInitialized),
            SessionState::Terminated => Err(DapError::Terminated),
            SessionState::Stopped => Ok(()),
            other => Err(DapError::Rejected {
                message: format!("operation requires Stopped state, currently {other:?}"),
            }),
        }
    }

    fn require_at_least_initialized(&self) -> Result<(), DapError> {
        match self.session.state() {
            SessionState::Uninitialized => Err(DapError::NotInitialized),
            SessionState::Terminated => Err(DapError::Terminated),
            _ => Ok(()),
        }
    }

    fn build(
        &mut self,
        command: &str,
        arguments: Option<impl Serialize>,
    ) -> Result<Request, DapError> {
        let arguments = arguments
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DapError::Transport(e.to_string()))?;
        Ok(Request {
            seq: self.session.next_seq(),
            message_type: "request".into(),
            command: command.into(),
            arguments,
        })
    }

    /// Build the `initialize` request.
    pub fn initialize(&mut self, adapter_id: &str) -> Result<Request, DapError> {
        if self.session.state() != SessionState::Uninitialized {
            return Err(DapError::Rejected {
                message: "session is already initialized".into(),
            });
        }
        let args = InitializeRequestArguments {
            client_id: Some(CLIENT_ID.into()),
            client_name: Some(CLIENT_ID.into()),
            adapter_id: adapter_id.into(),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".into()),
            supports_run_in_terminal_request: Some(false),
        };
        self.build("initialize", Some(args))
    }

    /// Build the `launch` request for `target`.
    pub fn launch(&mut self, target: &LaunchTarget) -> Result<Request, DapError> {
        match self.session.state() {
            SessionState::Uninitialized => return Err(DapError::NotInitialized),
            SessionState::Terminated => return Err(DapError::Terminated),
            SessionState::Initialized => {}
            other => {
                return Err(DapError::Rejected {
                    message: format!("cannot launch: session is in {other:?} state"),
                })
            }
        }
        let args = LaunchRequestArguments {
            no_debug: None,
            program: target.program.clone(),
            args: target.args.clone(),
            cwd: target
                .cwd
                .as_ref()
                .map(|cwd| cwd.to_string_lossy().into_owned()),
            env: target.env.clone(),
            stop_on_entry: Some(target.stop_on_entry),
        };
        self.build("launch", Some(args))
    }

    /// Build a `setBreakpoints` request for the given file, using the
    /// enabled breakpoints currently tracked by the manager.
    ///
    /// A file whose breakpoints are all disabled or removed gets an empty
    /// list, which clears it in the adapter.
    pub fn set_breakpoints_for_file(&mut self, path: &str) -> Result<Request, DapError> {
        self.require_at_least_initialized()?;
        let breakpoints: Vec<SourceBreakpoint> = self
            .breakpoints
            .enabled_for_file(path)
            .map(|bp| SourceBreakpoint {
                line: bp.line,
                condition: bp.condition.clone(),
                log_message: bp.log_message.clone(),
            })
            .collect();

        let name = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let args = SetBreakpointsArguments {
            source: Source {
                name,
                path: Some(path.into()),
                source_reference: None,
            },
            breakpoints,
        };
        self.build("setBreakpoints", Some(args))
    }

    /// Build a `setFunctionBreakpoints` request from the tracked function
    /// breakpoints.
    pub fn set_function_breakpoints(&mut self) -> Result<Request, DapError> {
        self.require_at_least_initialized()?;
        let args = SetFunctionBreakpointsArguments {
            breakpoints: self.breakpoints.function_arguments(),
        };
        self.build("setFunctionBreakpoints", Some(args))
    }

    /// Build the `configurationDone` request.
    pub fn configuration_done(&mut self) -> Result<Request, DapError> {
        self.require_at_least_initialized()?;
        self.build("configurationDone", None::<()>)
    }

    /// Build a `stackTrace` request for the given thread.
    pub fn stack_trace(&mut self, thread_id: i64) -> Result<Request, DapError> {
        self.require_stopped()?;
        let args = StackTraceArguments {
            thread_id,
            start_frame: Some(0),
            levels: None,
        };
        self.build("stackTrace", Some(args))
    }

    /// Build a `continue` request for the given thread.
    pub fn continue_request(&mut self, thread_id: i64) -> Result<Request, DapError> {
        self.require_stopped()?;
        let args = ContinueArguments {
            thread_id,
            single_thread: None,
        };
        self.build("continue", Some(args))
    }

    /// Build a `disconnect` request.
    pub fn disconnect(&mut self, terminate_debuggee: Option<bool>) -> Result<Request, DapError> {
        if self.session.state() == SessionState::Terminated {
            return Err(DapError::Terminated);
        }
        let args = DisconnectArguments {
            restart: Some(false),
            terminate_debuggee,
        };
        self.build("disconnect", Some(args))
    }
}

impl Default for DapClient {
    fn default() -> Self {
        Self::new()
    }
}
