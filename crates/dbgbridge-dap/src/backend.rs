//! [`DebugSession`] backed by a real debug adapter process.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use dbgbridge_config::{AdapterConfig, Config, LaunchTarget};

use crate::client::DapClient;
use crate::connection::DapConnection;
use crate::error::DapError;
use crate::facade::{
    BreakpointSpec, DebugSession, FrameLocation, SessionBreakpoint, SessionEvent, StackTrace,
    EVENT_CHANNEL_CAPACITY,
};
use crate::protocol::{
    Capabilities, ContinuedEventBody, Event, ExitedEventBody, SetBreakpointsResponseBody,
    StackTraceResponseBody, StoppedEventBody,
};
use crate::session::SessionState;

/// How long a disconnect may take before the adapter is killed.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

struct Inner {
    client: DapClient,
    connection: Option<DapConnection>,
    configuration: Option<String>,
    pump: Option<JoinHandle<()>>,
    generation: u64,
}

/// Drives one debug adapter at a time on behalf of the control server.
pub struct DapDebugSession {
    adapter: AdapterConfig,
    targets: HashMap<String, LaunchTarget>,
    request_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
}

impl DapDebugSession {
    /// Build an idle session from the loaded configuration.
    ///
    /// Function breakpoints listed under `[session]` are armed on every launch.
    pub fn new(config: &Config) -> Self {
        let mut client = DapClient::new();
        for name in &config.session.function_breakpoints {
            client.breakpoints_mut().upsert_function(name.clone(), None);
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            adapter: config.adapter.clone(),
            targets: config.targets.clone(),
            request_timeout: Duration::from_secs(config.session.request_timeout_secs),
            inner: Arc::new(Mutex::new(Inner {
                client,
                connection: None,
                configuration: None,
                pump: None,
                generation: 0,
            })),
            events,
        }
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.client.session().state()
    }

    /// Name of the launch configuration currently debugged.
    pub async fn configuration(&self) -> Option<String> {
        self.inner.lock().await.configuration.clone()
    }

    /// Disconnect from the adapter and terminate the debuggee.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        self.teardown(&mut guard).await;
    }

    async fn teardown(&self, inner: &mut Inner) {
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        let Some(connection) = inner.connection.take() else {
            return;
        };
        if let Ok(request) = inner.client.disconnect(Some(true)) {
            match timeout(DISCONNECT_TIMEOUT, connection.request(&request)).await {
                Ok(Ok(_)) => tracing::debug!("debug adapter disconnected"),
                Ok(Err(e)) => tracing::debug!("disconnect failed: {e}"),
                Err(_) => tracing::debug!("disconnect timed out"),
            }
        }
        connection.shutdown().await;
        let was_active = inner.client.session_mut().disconnect().is_ok();
        if let (true, Some(configuration)) = (was_active, inner.configuration.take()) {
            let _ = self.events.send(SessionEvent {
                state: SessionState::Terminated,
                thread_id: None,
                configuration,
            });
        }
    }

    async fn launch<C>(
        &self,
        inner: &mut Inner,
        name: &str,
        target: &LaunchTarget,
        connect: C,
    ) -> Result<(), DapError>
    where
        C: FnOnce(mpsc::UnboundedSender<Event>) -> Result<DapConnection, DapError> + Send,
    {
        inner.generation += 1;
        inner.client.reset_session();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (initialized_tx, initialized_rx) = oneshot::channel();
        inner.pump = Some(tokio::spawn(pump_events(
            event_rx,
            initialized_tx,
            Arc::downgrade(&self.inner),
            self.events.clone(),
            name.to_string(),
            inner.generation,
        )));

        let connection = inner.connection.insert(connect(event_tx)?);

        let request = inner.client.initialize(&self.adapter.adapter_id)?;
        let body = connection.request(&request).await?;
        let caps: Capabilities = match body {
            Some(body) => serde_json::from_value(body)
                .map_err(|e| DapError::InvalidResponse(format!("initialize: {e}")))?,
            None => Capabilities::default(),
        };
        inner.client.session_mut().initialize(&caps)?;

        // The launch response may only arrive after configurationDone.
        let request = inner.client.launch(target)?;
        let launch = connection.send(&request).await?;

        timeout(self.request_timeout, initialized_rx)
            .await
            .map_err(|_| DapError::Timeout {
                command: "initialized".into(),
            })?
            .map_err(|_| DapError::Terminated)?;

        for file in inner.client.breakpoints().files() {
            sync_file(&mut inner.client, connection, &file).await?;
        }
        if inner.client.breakpoints().has_functions() {
            sync_functions(&mut inner.client, connection).await?;
        }
        if inner
            .client
            .session()
            .capabilities()
            .supports_configuration_done_request
        {
            let request = inner.client.configuration_done()?;
            connection.request(&request).await?;
        }

        connection.wait(launch).await?;
        inner.client.session_mut().launch()?;
        inner.configuration = Some(name.to_string());
        Ok(())
    }

    /// Launch `name` over the connection produced by `connect`.
    async fn start_with<C>(&self, name: &str, connect: C) -> Result<(), DapError>
    where
        C: FnOnce(mpsc::UnboundedSender<Event>) -> Result<DapConnection, DapError> + Send,
    {
        let target = self
            .targets
            .get(name)
            .ok_or_else(|| DapError::UnknownTarget(name.to_string()))?;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.teardown(inner).await;

        tracing::info!(launch_target = name, program = %target.program, "launching debug target");
        if let Err(e) = self.launch(inner, name, target, connect).await {
            tracing::warn!(launch_target = name, "launch failed: {e}");
            if let Some(pump) = inner.pump.take() {
                pump.abort();
            }
            if let Some(connection) = inner.connection.take() {
                connection.shutdown().await;
            }
            let _ = inner.client.session_mut().disconnect();
            return Err(e);
        }

        let _ = self.events.send(SessionEvent {
            state: SessionState::Running,
            thread_id: None,
            configuration: name.to_string(),
        });
        Ok(())
    }

    /// Push breakpoint changes to the adapter when a session is live.
    async fn sync(&self, inner: &mut Inner, spec: &BreakpointSpec) -> Result<(), DapError> {
        let live = inner.client.session().is_active();
        let Some(connection) = inner.connection.as_ref().filter(|_| live) else {
            return Ok(());
        };
        match spec {
            BreakpointSpec::Source { file, .. } => {
                sync_file(&mut inner.client, connection, file).await
            }
            BreakpointSpec::Function { .. } => sync_functions(&mut inner.client, connection).await,
        }
    }
}

async fn sync_file(
    client: &mut DapClient,
    connection: &DapConnection,
    file: &str,
) -> Result<(), DapError> {
    let request = client.set_breakpoints_for_file(file)?;
    let body = connection.request(&request).await?;
    if let Some(body) = body {
        let body: SetBreakpointsResponseBody = serde_json::from_value(body)
            .map_err(|e| DapError::InvalidResponse(format!("setBreakpoints: {e}")))?;
        client.breakpoints_mut().mark_verified(file, &body.breakpoints);
    }
    Ok(())
}

async fn sync_functions(
    client: &mut DapClient,
    connection: &DapConnection,
) -> Result<(), DapError> {
    if !client.session().capabilities().supports_function_breakpoints {
        tracing::warn!("debug adapter does not support function breakpoints");
        return Ok(());
    }
    let request = client.set_function_breakpoints()?;
    let body = connection.request(&request).await?;
    if let Some(body) = body {
        let body: SetBreakpointsResponseBody = serde_json::from_value(body)
            .map_err(|e| DapError::InvalidResponse(format!("setFunctionBreakpoints: {e}")))?;
        client
            .breakpoints_mut()
            .mark_functions_verified(&body.breakpoints);
    }
    Ok(())
}

/// Events that change the session state and so need the session lock.
fn changes_state(event: &str) -> bool {
    matches!(event, "stopped" | "continued" | "terminated" | "exited")
}

/// Consumes adapter events for one launch.
///
/// Routing and state updates run as two stages so `initialized` is never
/// queued behind the session lock, which the launch sequence holds while
/// it waits for that event.
async fn pump_events(
    events: mpsc::UnboundedReceiver<Event>,
    initialized: oneshot::Sender<()>,
    inner: Weak<Mutex<Inner>>,
    subscribers: broadcast::Sender<SessionEvent>,
    configuration: String,
    generation: u64,
) {
    let (state_tx, state_rx) = mpsc::unbounded_channel();
    tokio::join!(
        route_events(events, initialized, state_tx),
        apply_events(state_rx, inner, subscribers, configuration, generation),
    );
}

async fn route_events(
    mut events: mpsc::UnboundedReceiver<Event>,
    initialized: oneshot::Sender<()>,
    state_tx: mpsc::UnboundedSender<Event>,
) {
    let mut initialized = Some(initialized);
    while let Some(event) = events.recv().await {
        match event.event.as_str() {
            "initialized" => {
                if let Some(tx) = initialized.take() {
                    let _ = tx.send(());
                }
            }
            "output" => {
                if let Some(output) = event.body.as_ref().and_then(|b| b.get("output")) {
                    tracing::trace!(target: "debuggee", "{}", output.as_str().unwrap_or_default().trim_end());
                }
            }
            name if changes_state(name) => {
                if state_tx.send(event).is_err() {
                    break;
                }
            }
            other => tracing::debug!(event = other, "unhandled adapter event"),
        }
    }
}

/// Applies state-changing events to the session and republishes them.
async fn apply_events(
    mut events: mpsc::UnboundedReceiver<Event>,
    inner: Weak<Mutex<Inner>>,
    subscribers: broadcast::Sender<SessionEvent>,
    configuration: String,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let mut guard = inner.lock().await;
        if guard.generation != generation {
            break;
        }
        let session = guard.client.session_mut();
        let published = match event.event.as_str() {
            "stopped" => {
                let body: Option<StoppedEventBody> = event
                    .body
                    .and_then(|body| serde_json::from_value(body).ok());
                let thread_id = body.as_ref().and_then(|b| b.thread_id);
                tracing::info!(
                    reason = body.as_ref().map(|b| b.reason.as_str()).unwrap_or("unknown"),
                    thread_id = ?thread_id,
                    "debuggee stopped"
                );
                session.handle_stopped().ok().map(|()| SessionEvent {
                    state: SessionState::Stopped,
                    thread_id,
                    configuration: configuration.clone(),
                })
            }
            "continued" => {
                let thread_id = event
                    .body
                    .and_then(|body| serde_json::from_value::<ContinuedEventBody>(body).ok())
                    .map(|b| b.thread_id);
                session.continue_execution().ok().map(|()| SessionEvent {
                    state: SessionState::Running,
                    thread_id,
                    configuration: configuration.clone(),
                })
            }
            _ => {
                let exit_code = event
                    .body
                    .and_then(|body| serde_json::from_value::<ExitedEventBody>(body).ok())
                    .map(|b| b.exit_code);
                tracing::info!(event = %event.event, exit_code = ?exit_code, "debug session ended");
                session.disconnect().ok().map(|()| SessionEvent {
                    state: SessionState::Terminated,
                    thread_id: None,
                    configuration: configuration.clone(),
                })
            }
        };
        drop(guard);

        if let Some(published) = published {
            let _ = subscribers.send(published);
        }
    }
}

#[async_trait]
impl DebugSession for DapDebugSession {
    async fn start_target(&self, name: &str) -> Result<(), DapError> {
        self.start_with(name, |events| {
            DapConnection::spawn(&self.adapter, self.request_timeout, events)
        })
        .await
    }

    async fn list_breakpoints(&self) -> Result<Vec<SessionBreakpoint>, DapError> {
        Ok(self.inner.lock().await.client.breakpoints().listing())
    }

    async fn add_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.client.breakpoints_mut().apply(spec);
        self.sync(inner, spec).await
    }

    async fn remove_breakpoint(&self, spec: &BreakpointSpec) -> Result<(), DapError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.client.breakpoints_mut().discard(spec) {
            return Ok(());
        }
        self.sync(inner, spec).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn stack_trace(&self, thread_id: i64) -> Result<StackTrace, DapError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let connection = inner.connection.as_ref().ok_or(DapError::NoSession)?;
        let request = inner.client.stack_trace(thread_id)?;
        let body = connection
            .request(&request)
            .await?
            .ok_or_else(|| DapError::InvalidResponse("stackTrace without body".into()))?;
        let body: StackTraceResponseBody = serde_json::from_value(body)
            .map_err(|e| DapError::InvalidResponse(format!("stackTrace: {e}")))?;

        Ok(StackTrace {
            frames: body
                .stack_frames
                .into_iter()
                .map(|frame| FrameLocation {
                    path: frame.source.and_then(|source| source.path),
                    line: u32::try_from(frame.line).unwrap_or(0),
                })
                .collect(),
        })
    }

    async fn continue_thread(&self, thread_id: i64) -> Result<(), DapError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let connection = inner.connection.as_ref().ok_or(DapError::NoSession)?;
        let request = inner.client.continue_request(thread_id)?;
        connection.request(&request).await?;

        if inner.client.session_mut().continue_execution().is_ok() {
            let _ = self.events.send(SessionEvent {
                state: SessionState::Running,
                thread_id: Some(thread_id),
                configuration: inner.configuration.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}
