//! Breakpoint bookkeeping for a debug session.
//!
//! The manager outlives individual launches: breakpoints armed before a
//! target starts are sent during its configuration phase, and survive a
//! relaunch.

use std::collections::BTreeMap;

use crate::facade::{BreakpointSpec, SessionBreakpoint};
use crate::protocol::{BreakpointResponse, FunctionBreakpoint as ProtocolFunctionBreakpoint};

/// A client-side source breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Source file path.
    pub path: String,
    /// Line number (1-based).
    pub line: i64,
    /// Disabled breakpoints stay tracked but are not sent to the adapter.
    pub enabled: bool,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Optional log message (logpoint).
    pub log_message: Option<String>,
    /// Whether the adapter has verified this breakpoint.
    pub verified: bool,
    /// Adapter-assigned ID (set after adapter response).
    pub adapter_id: Option<i64>,
}

impl Breakpoint {
    /// Create a new enabled, unverified breakpoint at the given path and line.
    pub fn new(path: impl Into<String>, line: i64) -> Self {
        Self {
            path: path.into(),
            line,
            enabled: true,
            condition: None,
            log_message: None,
            verified: false,
            adapter_id: None,
        }
    }

    /// Create a conditional breakpoint.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Create a logpoint.
    pub fn with_log_message(mut self, msg: impl Into<String>) -> Self {
        self.log_message = Some(msg.into());
        self
    }

    /// Create a disabled breakpoint.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn to_spec(&self) -> BreakpointSpec {
        BreakpointSpec::Source {
            file: self.path.clone(),
            line: u32::try_from(self.line).unwrap_or(0),
            enabled: self.enabled,
            condition: self.condition.clone(),
            log_message: self.log_message.clone(),
        }
    }
}

/// A client-side function breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBreakpoint {
    /// Function name.
    pub name: String,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Whether the adapter has verified this breakpoint.
    pub verified: bool,
}

/// Manages breakpoints across files for a debug session.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<String, Vec<Breakpoint>>,
    functions: Vec<FunctionBreakpoint>,
}

impl BreakpointManager {
    /// Create a new empty breakpoint manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a breakpoint, replacing any existing one on the same line.
    pub fn upsert(&mut self, bp: Breakpoint) {
        let list = self.breakpoints.entry(bp.path.clone()).or_default();
        match list.iter_mut().find(|existing| existing.line == bp.line) {
            Some(existing) => *existing = bp,
            None => {
                list.push(bp);
                list.sort_by_key(|bp| bp.line);
            }
        }
    }

    /// Remove a breakpoint at the given path and line.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn remove(&mut self, path: &str, line: i64) -> bool {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return false;
        };
        let before = list.len();
        list.retain(|bp| bp.line != line);
        let removed = before != list.len();
        if list.is_empty() {
            self.breakpoints.remove(path);
        }
        removed
    }

    /// Get all breakpoints for a file.
    pub fn get_for_file(&self, path: &str) -> &[Breakpoint] {
        self.breakpoints.get(path).map_or(&[], |v| v.as_slice())
    }

    /// Breakpoints for a file that should be armed in the adapter.
    pub fn enabled_for_file(&self, path: &str) -> impl Iterator<Item = &Breakpoint> {
        self.get_for_file(path).iter().filter(|bp| bp.enabled)
    }

    /// Files with at least one tracked breakpoint.
    pub fn files(&self) -> Vec<String> {
        self.breakpoints.keys().cloned().collect()
    }

    /// Apply a `setBreakpoints` response for `path`.
    ///
    /// The adapter answers in request order, which is the order of
    /// [`enabled_for_file`](Self::enabled_for_file).
    pub fn mark_verified(&mut self, path: &str, responses: &[BreakpointResponse]) {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return;
        };
        let mut responses = responses.iter();
        for bp in list.iter_mut() {
            if !bp.enabled {
                bp.verified = false;
                bp.adapter_id = None;
                continue;
            }
            match responses.next() {
                Some(response) => {
                    bp.verified = response.verified;
                    bp.adapter_id = response.id;
                }
                None => bp.verified = false,
            }
        }
    }

    /// Track a function breakpoint, replacing one with the same name.
    pub fn upsert_function(&mut self, name: impl Into<String>, condition: Option<String>) {
        let name = name.into();
        let bp = FunctionBreakpoint {
            name,
            condition,
            verified: false,
        };
        match self.functions.iter_mut().find(|f| f.name == bp.name) {
            Some(existing) => *existing = bp,
            None => self.functions.push(bp),
        }
    }

    /// Remove the function breakpoint on `name`.
    pub fn remove_function(&mut self, name: &str) -> bool {
        let before = self.functions.len();
        self.functions.retain(|f| f.name != name);
        before != self.functions.len()
    }

    /// Function breakpoints in the shape `setFunctionBreakpoints` expects.
    pub fn function_arguments(&self) -> Vec<ProtocolFunctionBreakpoint> {
        self.functions
            .iter()
            .map(|f| ProtocolFunctionBreakpoint {
                name: f.name.clone(),
                condition: f.condition.clone(),
            })
            .collect()
    }

    /// Whether any function breakpoint is tracked.
    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }

    /// Apply a `setFunctionBreakpoints` response.
    pub fn mark_functions_verified(&mut self, responses: &[BreakpointResponse]) {
        for (i, f) in self.functions.iter_mut().enumerate() {
            f.verified = responses.get(i).is_some_and(|r| r.verified);
        }
    }

    /// Forget adapter verification, e.g. before a new launch.
    pub fn reset_verification(&mut self) {
        for bp in self.breakpoints.values_mut().flatten() {
            bp.verified = false;
            bp.adapter_id = None;
        }
        for f in &mut self.functions {
            f.verified = false;
        }
    }

    /// Track the breakpoint described by `spec`.
    pub fn apply(&mut self, spec: &BreakpointSpec) {
        match spec {
            BreakpointSpec::Source {
                file,
                line,
                enabled,
                condition,
                log_message,
            } => self.upsert(Breakpoint {
                path: file.clone(),
                line: i64::from(*line),
                enabled: *enabled,
                condition: condition.clone(),
                log_message: log_message.clone(),
                verified: false,
                adapter_id: None,
            }),
            BreakpointSpec::Function { name, condition } => {
                self.upsert_function(name.clone(), condition.clone())
            }
        }
    }

    /// Stop tracking the breakpoint at `spec`'s location.
    pub fn discard(&mut self, spec: &BreakpointSpec) -> bool {
        match spec {
            BreakpointSpec::Source { file, line, .. } => self.remove(file, i64::from(*line)),
            BreakpointSpec::Function { name, .. } => self.remove_function(name),
        }
    }

    /// Every tracked breakpoint: source breakpoints by file and line, then
    /// function breakpoints in insertion order.
    pub fn listing(&self) -> Vec<SessionBreakpoint> {
        let sources = self.breakpoints.values().flatten().map(|bp| SessionBreakpoint {
            spec: bp.to_spec(),
            verified: bp.verified,
        });
        let functions = self.functions.iter().map(|f| SessionBreakpoint {
            spec: BreakpointSpec::Function {
                name: f.name.clone(),
                condition: f.condition.clone(),
            },
            verified: f.verified,
        });
        sources.chain(functions).collect()
    }
}
