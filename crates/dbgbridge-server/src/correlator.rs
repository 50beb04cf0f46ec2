//! Matches debugger stops against callback registrations and fires the
//! matching callbacks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use dbgbridge_config::WatchPolicy;
use dbgbridge_dap::{DebugSession, SessionEvent, SessionState};

use crate::callback::{deliver, CallbackSender};
use crate::registry::BreakpointRegistry;

/// Whether any callback is waiting to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    /// No registrations.
    Idle,
    /// At least one registration.
    Watching,
}

/// Consumes session events one at a time and fires callbacks for stops
/// at registered locations.
pub struct EventCorrelator {
    session: Arc<dyn DebugSession>,
    registry: Arc<BreakpointRegistry>,
    sender: Arc<dyn CallbackSender>,
    configuration_name: String,
    watch: WatchPolicy,
}

impl EventCorrelator {
    /// Correlate stops of the session started from `configuration_name`.
    pub fn new(
        session: Arc<dyn DebugSession>,
        registry: Arc<BreakpointRegistry>,
        sender: Arc<dyn CallbackSender>,
        configuration_name: impl Into<String>,
        watch: WatchPolicy,
    ) -> Self {
        Self {
            session,
            registry,
            sender,
            configuration_name: configuration_name.into(),
            watch,
        }
    }

    /// Current state, derived from the registry.
    pub async fn state(&self) -> CorrelatorState {
        if self.registry.has_registrations().await {
            CorrelatorState::Watching
        } else {
            CorrelatorState::Idle
        }
    }

    /// Subscribe to the session and process its events on a new task.
    ///
    /// The subscription is taken before this returns, so no event emitted
    /// afterwards is missed. Aborting the task drops the subscription.
    pub fn spawn(self) -> JoinHandle<()> {
        let events = self.session.subscribe();
        tokio::spawn(self.run(events))
    }

    async fn run(self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle_event(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "correlator fell behind; session events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("session event channel closed");
                    break;
                }
            }
        }
    }

    /// Process one event. Returns the callback URLs dispatched for it.
    ///
    /// Each callback is delivered on its own task; delivery outcome is
    /// only logged.
    pub async fn handle_event(&self, event: &SessionEvent) -> Vec<String> {
        if event.state != SessionState::Stopped {
            return Vec::new();
        }
        if event.configuration != self.configuration_name {
            tracing::debug!(
                configuration = %event.configuration,
                "ignoring stop in another configuration"
            );
            return Vec::new();
        }
        let Some(thread_id) = event.thread_id else {
            tracing::debug!("ignoring stop without thread id");
            return Vec::new();
        };
        if self.state().await == CorrelatorState::Idle {
            return Vec::new();
        }

        let trace = match self.session.stack_trace(thread_id).await {
            Ok(trace) => trace,
            Err(e) => {
                tracing::warn!(thread_id, "stack trace query failed: {e}");
                return Vec::new();
            }
        };
        let Some(top) = trace.top() else {
            tracing::debug!(thread_id, "stopped thread has no frames");
            return Vec::new();
        };
        let Some(path) = top.path.as_deref() else {
            return Vec::new();
        };
        tracing::debug!(thread_id, location = %top, "debuggee stopped");

        let mut dispatched = Vec::new();
        let registrations = match self.watch {
            WatchPolicy::OneShot => self.registry.take_registrations_at(path, top.line).await,
            WatchPolicy::Persistent => self.registry.registrations_at(path, top.line).await,
        };
        for registration in registrations {
            let url = registration.url();
            tracing::info!(location = %registration.location(), %url, "firing callback");

            let sender = Arc::clone(&self.sender);
            let target = url.clone();
            tokio::spawn(async move { deliver(sender.as_ref(), &target).await });
            dispatched.push(url);
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use crate::registry::Breakpoint;
    use async_trait::async_trait;
    use dbgbridge_dap::facade::mock::MockDebugSession;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingSender {
        tx: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl CallbackSender for RecordingSender {
        async fn send(&self, url: &str) -> Result<u16, CallbackError> {
            let _ = self.tx.send(url.to_string());
            Ok(200)
        }
    }

    struct Fixture {
        session: Arc<MockDebugSession>,
        registry: Arc<BreakpointRegistry>,
        correlator: EventCorrelator,
        sent: mpsc::UnboundedReceiver<String>,
    }

    fn fixture(watch: WatchPolicy) -> Fixture {
        let session = Arc::new(MockDebugSession::new());
        let registry = Arc::new(BreakpointRegistry::new());
        let (tx, sent) = mpsc::unbounded_channel();
        let correlator = EventCorrelator::new(
            session.clone(),
            registry.clone(),
            Arc::new(RecordingSender { tx }),
            "Launch Program",
            watch,
        );
        Fixture {
            session,
            registry,
            correlator,
            sent,
        }
    }

    async fn register(registry: &BreakpointRegistry, file: &str, line: u32) {
        registry
            .upsert(Breakpoint::new(file, line).with_callback("http://x/cb?at={location}"))
            .await;
    }

    #[tokio::test]
    async fn state_follows_registrations() {
        let f = fixture(WatchPolicy::Persistent);
        assert_eq!(f.correlator.state().await, CorrelatorState::Idle);
        register(&f.registry, "/src/app.ts", 42).await;
        assert_eq!(f.correlator.state().await, CorrelatorState::Watching);
    }

    #[tokio::test]
    async fn stop_at_registered_location_fires_callback() {
        let mut f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session
            .set_stack_trace(1, vec![("/src/app.ts", 42), ("/src/main.ts", 7)]);

        let fired = f
            .correlator
            .handle_event(&SessionEvent::stopped("Launch Program", 1))
            .await;
        assert_eq!(fired, vec!["http://x/cb?at=/src/app.ts:42".to_string()]);
        assert_eq!(f.sent.recv().await.unwrap(), "http://x/cb?at=/src/app.ts:42");
        assert_eq!(f.correlator.state().await, CorrelatorState::Watching);
    }

    #[tokio::test]
    async fn only_top_frame_is_matched() {
        let f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/main.ts", 7).await;
        f.session
            .set_stack_trace(1, vec![("/src/app.ts", 42), ("/src/main.ts", 7)]);

        let fired = f
            .correlator
            .handle_event(&SessionEvent::stopped("Launch Program", 1))
            .await;
        assert!(fired.is_empty());
    }

    #[tokio::test]
    async fn other_configuration_is_ignored() {
        let f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_stack_trace(1, vec![("/src/app.ts", 42)]);

        let fired = f
            .correlator
            .handle_event(&SessionEvent::stopped("Launch Tests", 1))
            .await;
        assert!(fired.is_empty());
        assert!(f.session.calls().is_empty());
    }

    #[tokio::test]
    async fn non_stop_events_are_ignored() {
        let f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        let running = SessionEvent {
            state: SessionState::Running,
            thread_id: Some(1),
            configuration: "Launch Program".into(),
        };
        assert!(f.correlator.handle_event(&running).await.is_empty());
        assert!(f.session.calls().is_empty());
    }

    #[tokio::test]
    async fn idle_correlator_skips_stack_query() {
        let f = fixture(WatchPolicy::Persistent);
        f.session.set_stack_trace(1, vec![("/src/app.ts", 42)]);
        let fired = f
            .correlator
            .handle_event(&SessionEvent::stopped("Launch Program", 1))
            .await;
        assert!(fired.is_empty());
        assert!(f.session.calls().is_empty());
    }

    #[tokio::test]
    async fn stack_trace_failure_is_swallowed() {
        let f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_failure(Some("adapter gone"));

        let fired = f
            .correlator
            .handle_event(&SessionEvent::stopped("Launch Program", 1))
            .await;
        assert!(fired.is_empty());
        assert_eq!(f.session.calls(), vec!["stack 1".to_string()]);
    }

    #[tokio::test]
    async fn one_shot_fires_once_then_goes_idle() {
        let mut f = fixture(WatchPolicy::OneShot);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_stack_trace(1, vec![("/src/app.ts", 42)]);
        let stop = SessionEvent::stopped("Launch Program", 1);

        assert_eq!(f.correlator.handle_event(&stop).await.len(), 1);
        assert_eq!(f.correlator.state().await, CorrelatorState::Idle);
        assert!(f.correlator.handle_event(&stop).await.is_empty());
        assert!(f.registry.find("/src/app.ts", 42).await.is_some());

        assert!(f.sent.recv().await.is_some());
        assert!(f.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn one_shot_keeps_callback_set_after_dispatch() {
        let mut f = fixture(WatchPolicy::OneShot);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_stack_trace(1, vec![("/src/app.ts", 42)]);
        let stop = SessionEvent::stopped("Launch Program", 1);

        assert_eq!(f.correlator.handle_event(&stop).await.len(), 1);
        register(&f.registry, "/src/app.ts", 42).await;
        assert_eq!(f.correlator.state().await, CorrelatorState::Watching);
        assert_eq!(f.correlator.handle_event(&stop).await.len(), 1);

        assert!(f.sent.recv().await.is_some());
        assert!(f.sent.recv().await.is_some());
    }

    #[tokio::test]
    async fn persistent_fires_on_every_stop() {
        let mut f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_stack_trace(1, vec![("/src/app.ts", 42)]);
        let stop = SessionEvent::stopped("Launch Program", 1);

        f.correlator.handle_event(&stop).await;
        f.correlator.handle_event(&stop).await;
        assert!(f.sent.recv().await.is_some());
        assert!(f.sent.recv().await.is_some());
    }

    #[tokio::test]
    async fn spawned_correlator_consumes_broadcast_events() {
        let mut f = fixture(WatchPolicy::Persistent);
        register(&f.registry, "/src/app.ts", 42).await;
        f.session.set_stack_trace(3, vec![("/src/app.ts", 42)]);

        let handle = f.correlator.spawn();
        assert_eq!(f.session.subscriber_count(), 1);
        f.session.emit(SessionEvent::stopped("Launch Program", 3));

        let url = tokio::time::timeout(Duration::from_secs(5), f.sent.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url, "http://x/cb?at=/src/app.ts:42");

        handle.abort();
        let _ = handle.await;
        assert_eq!(f.session.subscriber_count(), 0);
    }
}
