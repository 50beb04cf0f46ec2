//! Request handlers for the control endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use dbgbridge_dap::{BreakpointSpec, DebugSession};

use crate::error::ApiError;
use crate::registry::{Breakpoint, BreakpointRegistry};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The debug session driven by the endpoint.
    pub session: Arc<dyn DebugSession>,
    /// Breakpoints and callback registrations.
    pub registry: Arc<BreakpointRegistry>,
}

/// Query parameters of `/launch`.
#[derive(Debug, Deserialize)]
pub struct LaunchParams {
    target: Option<String>,
}

/// Query parameters of `/breakpoints`.
#[derive(Debug, Deserialize)]
pub struct BreakpointParams {
    action: Option<String>,
    file: Option<String>,
    line: Option<String>,
    callback: Option<String>,
    condition: Option<String>,
    #[serde(rename = "logMessage")]
    log_message: Option<String>,
}

/// Query parameters of `/continue`.
#[derive(Debug, Deserialize)]
pub struct ContinueParams {
    thread: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::Validation(format!(
            "missing required parameter: {name}"
        ))),
    }
}

fn parse_line(value: &Option<String>) -> Result<u32, ApiError> {
    let raw = required(value, "line")?;
    match raw.parse::<u32>() {
        Ok(line) if line > 0 => Ok(line),
        _ => Err(ApiError::Validation(format!(
            "line must be a positive integer, got '{raw}'"
        ))),
    }
}

/// GET `/` - liveness greeting.
pub async fn index_handler() -> &'static str {
    "dbgbridge control server"
}

/// GET `/launch?target=<name>` - starts the named launch target.
///
/// # Response
/// - `200 OK` with `Launched debug target: <name>`
/// - `400 BAD_REQUEST` if `target` is missing or empty
/// - `500 INTERNAL_SERVER_ERROR` if the session fails to start it
pub async fn launch_handler(
    State(state): State<AppState>,
    Query(params): Query<LaunchParams>,
) -> Result<String, ApiError> {
    let target = required(&params.target, "target")?;
    tracing::info!(target_name = target, "launch request");
    state.session.start_target(target).await?;
    Ok(format!("Launched debug target: {target}"))
}

/// GET `/breakpoints?action=<list|set|modify>&...`.
///
/// # Response
/// - `list`: `200 OK` with a JSON array of the session's breakpoints
/// - `set`: `200 OK` once the breakpoint is armed and its callback registered
/// - `modify`: `200 OK` with the new enabled state, `404 NOT_FOUND` if no
///   breakpoint was set at the location
/// - `400 BAD_REQUEST` for a missing or unknown action or bad parameters
/// - `500 INTERNAL_SERVER_ERROR` if the debug session fails
pub async fn breakpoints_handler(
    State(state): State<AppState>,
    Query(params): Query<BreakpointParams>,
) -> Result<Response, ApiError> {
    match params.action.as_deref() {
        Some("list") => list_breakpoints(&state).await,
        Some("set") => set_breakpoint(&state, &params).await,
        Some("modify") => modify_breakpoint(&state, &params).await,
        Some(other) => Err(ApiError::Validation(format!("unknown action: {other}"))),
        None => Err(ApiError::Validation(
            "missing required parameter: action".into(),
        )),
    }
}

async fn list_breakpoints(state: &AppState) -> Result<Response, ApiError> {
    let breakpoints = state.session.list_breakpoints().await?;
    Ok(Json(breakpoints).into_response())
}

async fn set_breakpoint(state: &AppState, params: &BreakpointParams) -> Result<Response, ApiError> {
    let file = required(&params.file, "file")?;
    let line = parse_line(&params.line)?;
    let callback = required(&params.callback, "callback")?;

    let breakpoint = Breakpoint::new(file, line).with_callback(callback);
    let spec = breakpoint.to_spec();

    let existing = state.session.list_breakpoints().await?;
    if existing.iter().any(|bp| bp.spec.same_location(&spec)) {
        state.session.remove_breakpoint(&spec).await?;
    }
    state.session.add_breakpoint(&spec).await?;
    state.registry.upsert(breakpoint).await;

    tracing::info!(file, line, callback, "breakpoint set");
    Ok(format!("Set breakpoint at {file}:{line} with callback {callback}").into_response())
}

async fn modify_breakpoint(
    state: &AppState,
    params: &BreakpointParams,
) -> Result<Response, ApiError> {
    let file = required(&params.file, "file")?;
    let line = parse_line(&params.line)?;

    let current = state
        .registry
        .find(file, line)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no breakpoint at {file}:{line}")))?;
    let updated = current.toggled(params.condition.clone(), params.log_message.clone());

    // The registry only changes once the session has accepted the new breakpoint.
    let spec = updated.to_spec();
    state.session.remove_breakpoint(&spec).await?;
    if let Err(e) = state.session.add_breakpoint(&spec).await {
        if let Err(restore) = state.session.add_breakpoint(&current.to_spec()).await {
            tracing::warn!(file, line, "could not re-arm previous breakpoint: {restore}");
        }
        return Err(e.into());
    }
    let updated = state
        .registry
        .modify(
            file,
            line,
            params.condition.clone(),
            params.log_message.clone(),
        )
        .await
        .unwrap_or(updated);

    tracing::info!(file, line, enabled = updated.enabled, "breakpoint modified");
    Ok(format!(
        "Modified breakpoint at {file}:{line} (enabled: {})",
        updated.enabled
    )
    .into_response())
}

/// GET `/continue?thread=<id>` - resumes a stopped thread.
pub async fn continue_handler(
    State(state): State<AppState>,
    Query(params): Query<ContinueParams>,
) -> Result<String, ApiError> {
    let raw = required(&params.thread, "thread")?;
    let thread_id: i64 = raw
        .parse()
        .map_err(|_| ApiError::Validation(format!("thread must be an integer, got '{raw}'")))?;
    state.session.continue_thread(thread_id).await?;
    Ok(format!("Continued thread {thread_id}"))
}

/// Any unrouted path.
pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
