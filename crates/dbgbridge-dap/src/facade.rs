//! The debug session capability surface the control server drives.
//!
//! [`DebugSession`] is everything the HTTP endpoint and the event
//! correlator may call. [`DapDebugSession`](crate::backend::DapDebugSession)
//! implements it against a real adapter; [`mock::MockDebugSession`] backs
//! the tests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::DapError;
use crate::session::SessionState;

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A session state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEvent {
    /// The state the session moved to.
    pub state: SessionState,
    /// Thread that caused the transition, when the adapter reported one.
    pub thread_id: Option<i64>,
    /// Name of the launch configuration the session was started from.
    pub configuration: String,
}

impl SessionEvent {
    /// A stop of `thread_id` in the session started from `configuration`.
    pub fn stopped(configuration: impl Into<String>, thread_id: i64) -> Self {
        Self {
            state: SessionState::Stopped,
            thread_id: Some(thread_id),
            configuration: configuration.into(),
        }
    }
}

/// A breakpoint to arm or disarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakpointSpec {
    /// Line breakpoint in a source file.
    Source {
        /// Source file path as the adapter reports it.
        file: String,
        /// 1-based line.
        line: u32,
        /// Disabled breakpoints are tracked but not sent to the adapter.
        enabled: bool,
        /// Condition expression.
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        /// Log message (logpoint).
        #[serde(skip_serializing_if = "Option::is_none")]
        log_message: Option<String>,
    },
    /// Breakpoint on entry to a named function.
    Function {
        /// Function name.
        name: String,
        /// Condition expression.
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
}

impl BreakpointSpec {
    /// An enabled source breakpoint without condition or log message.
    pub fn source(file: impl Into<String>, line: u32) -> Self {
        BreakpointSpec::Source {
            file: file.into(),
            line,
            enabled: true,
            condition: None,
            log_message: None,
        }
    }

    /// Whether `self` and `other` address the same breakpoint slot.
    pub fn same_location(&self, other: &BreakpointSpec) -> bool {
        match (self, other) {
            (
                BreakpointSpec::Source { file, line, .. },
                BreakpointSpec::Source {
                    file: other_file,
                    line: other_line,
                    ..
                },
            ) => file == other_file && line == other_line,
            (
                BreakpointSpec::Function { name, .. },
                BreakpointSpec::Function {
                    name: other_name, ..
                },
            ) => name == other_name,
            _ => false,
        }
    }
}

/// A breakpoint as listed by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionBreakpoint {
    /// What and where.
    #[serde(flatten)]
    pub spec: BreakpointSpec,
    /// Whether the adapter confirmed it.
    pub verified: bool,
}

/// One frame of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameLocation {
    /// Source path, absent for frames without source (e.g. system libraries).
    pub path: Option<String>,
    /// 1-based line.
    pub line: u32,
}

impl fmt::Display for FrameLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}:{}", self.line),
            None => write!(f, "<unknown>:{}", self.line),
        }
    }
}

/// Result of a stack trace query, innermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackTrace {
    /// Frames, top of stack first.
    pub frames: Vec<FrameLocation>,
}

impl StackTrace {
    /// The frame execution is stopped in.
    pub fn top(&self) -> Option<&FrameLocation> {
        self.frames.first()
    }
}

/// Control surface of a running debugger.
#[async_trait]
pub trait DebugSession: Send + Sync {
    /// Start debugging the launch target called `name`.
    async fn start_target(&self, name: &str) -> Result<(), DapError>;

    /// Every breakpoint known to the session, armed or not.
    async fn list_breakpoints(&self) -> Result<Vec<SessionBreakpoint>, DapError>;

    /// Arm `spec`, replacing any breakpoint at the same location.
    async fn add_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError>;

    /// Disarm the breakpoint at `spec`'s location.
    async fn remove_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError>;

    /// Subscribe to session state changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Stack of a stopped thread.
    async fn stack_trace(&self, thread_id: i64) -> Result<StackTrace, DapError>;

    /// Resume a stopped thread.
    async fn continue_thread(&self, thread_id: i64) -> Result<(), DapError>;
}

pub mod mock {
    //! In-memory [`DebugSession`] for tests.
    //!
    //! Available to integration tests and downstream crates.

    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::*;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scriptable debug session that records every call.
    pub struct MockDebugSession {
        breakpoints: Mutex<Vec<BreakpointSpec>>,
        stack_traces: Mutex<HashMap<i64, StackTrace>>,
        failure: Mutex<Option<String>>,
        calls: Mutex<Vec<String>>,
        events: broadcast::Sender<SessionEvent>,
    }

    impl MockDebugSession {
        /// A session with no breakpoints and no scripted stacks.
        pub fn new() -> Self {
            let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            Self {
                breakpoints: Mutex::new(Vec::new()),
                stack_traces: Mutex::new(HashMap::new()),
                failure: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                events,
            }
        }

        /// Make every following call fail with `message`, or succeed again with `None`.
        pub fn set_failure(&self, message: Option<&str>) {
            *lock(&self.failure) = message.map(str::to_string);
        }

        /// Script the stack `stack_trace(thread_id)` returns.
        pub fn set_stack_trace(&self, thread_id: i64, frames: Vec<(&str, u32)>) {
            let trace = StackTrace {
                frames: frames
                    .into_iter()
                    .map(|(path, line)| FrameLocation {
                        path: Some(path.to_string()),
                        line,
                    })
                    .collect(),
            };
            lock(&self.stack_traces).insert(thread_id, trace);
        }

        /// Deliver `event` to all subscribers. Returns how many received it.
        pub fn emit(&self, event: SessionEvent) -> usize {
            self.events.send(event).unwrap_or(0)
        }

        /// Number of live subscriptions.
        pub fn subscriber_count(&self) -> usize {
            self.events.receiver_count()
        }

        /// Calls made so far, e.g. `"add /src/app.ts:42"`.
        pub fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }

        /// Breakpoints currently armed.
        pub fn breakpoints(&self) -> Vec<BreakpointSpec> {
            lock(&self.breakpoints).clone()
        }

        fn record(&self, call: String) -> Result<(), DapError> {
            lock(&self.calls).push(call);
            match lock(&self.failure).as_ref() {
                Some(message) => Err(DapError::Rejected {
                    message: message.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    impl Default for MockDebugSession {
        fn default() -> Self {
            Self::new()
        }
    }

    fn describe(spec: &BreakpointSpec) -> String {
        match spec {
            BreakpointSpec::Source { file, line, .. } => format!("{file}:{line}"),
            BreakpointSpec::Function { name, .. } => format!("fn {name}"),
        }
    }

    #[async_trait]
    impl DebugSession for MockDebugSession {
        async fn start_target(&self, name: &str) -> Result<(), DapError> {
            self.record(format!("start {name}"))
        }

        async fn list_breakpoints(&self) -> Result<Vec<SessionBreakpoint>, DapError> {
            self.record("list".to_string())?;
            Ok(lock(&self.breakpoints)
                .iter()
                .map(|spec| SessionBreakpoint {
                    spec: spec.clone(),
                    verified: true,
                })
                .collect())
        }

        async fn add_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError> {
            self.record(format!("add {}", describe(spec)))?;
            let mut breakpoints = lock(&self.breakpoints);
            breakpoints.retain(|existing| !existing.same_location(spec));
            breakpoints.push(spec.clone());
            Ok(())
        }

        async fn remove_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError> {
            self.record(format!("remove {}", describe(spec)))?;
            lock(&self.breakpoints).retain(|existing| !existing.same_location(spec));
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }

        async fn stack_trace(&self, thread_id: i64) -> Result<StackTrace, DapError> {
            self.record(format!("stack {thread_id}"))?;
            lock(&self.stack_traces)
                .get(&thread_id)
                .cloned()
                .ok_or_else(|| DapError::Rejected {
                    message: format!("unknown thread {thread_id}"),
                })
        }

        async fn continue_thread(&self, thread_id: i64) -> Result<(), DapError> {
            self.record(format!("continue {thread_id}"))
        }
    }
}
