//! In-memory breakpoint registry and the callback registrations derived
//! from it.
//!
//! Breakpoints are keyed by exact (file, line). The registry is shared by
//! the request handlers and the event correlator; every operation runs
//! under one async mutex.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::Mutex;

use dbgbridge_dap::BreakpointSpec;

/// Placeholder replaced by `<file>:<line>` when a callback fires.
pub const LOCATION_PLACEHOLDER: &str = "{location}";

/// A breakpoint known to the control server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    /// Source file path.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// Whether the breakpoint is armed.
    pub enabled: bool,
    /// Condition expression.
    pub condition: Option<String>,
    /// Log message (logpoint).
    pub log_message: Option<String>,
    /// Callback URL template.
    pub callback: Option<String>,
}

impl Breakpoint {
    /// An enabled breakpoint with no condition, log message or callback.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            enabled: true,
            condition: None,
            log_message: None,
            callback: None,
        }
    }

    /// Attach a callback URL template.
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    /// `<file>:<line>`.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// The facade-level description of this breakpoint.
    pub fn to_spec(&self) -> BreakpointSpec {
        BreakpointSpec::Source {
            file: self.file.clone(),
            line: self.line,
            enabled: self.enabled,
            condition: self.condition.clone(),
            log_message: self.log_message.clone(),
        }
    }

    /// A copy with `enabled` flipped, and the condition and log message
    /// replaced when given.
    pub fn toggled(&self, condition: Option<String>, log_message: Option<String>) -> Self {
        Self {
            enabled: !self.enabled,
            condition: condition.or_else(|| self.condition.clone()),
            log_message: log_message.or_else(|| self.log_message.clone()),
            ..self.clone()
        }
    }

    fn registration(&self) -> Option<CallbackRegistration> {
        self.callback
            .as_ref()
            .filter(|callback| !callback.is_empty())
            .map(|callback| CallbackRegistration {
                file: self.file.clone(),
                line: self.line,
                callback: callback.clone(),
            })
    }
}

/// A callback waiting for execution to stop at (file, line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRegistration {
    /// Source file path.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// URL template, may contain [`LOCATION_PLACEHOLDER`].
    pub callback: String,
}

impl CallbackRegistration {
    /// `<file>:<line>`.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// The callback URL with every placeholder substituted.
    pub fn url(&self) -> String {
        self.callback.replace(LOCATION_PLACEHOLDER, &self.location())
    }
}

type Key = (String, u32);

/// Breakpoints and callback registrations for the process lifetime.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    breakpoints: Mutex<BTreeMap<Key, Breakpoint>>,
}

impl BreakpointRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `breakpoint`, replacing any record at the same location.
    pub async fn upsert(&self, breakpoint: Breakpoint) -> Breakpoint {
        let key = (breakpoint.file.clone(), breakpoint.line);
        self.breakpoints.lock().await.insert(key, breakpoint.clone());
        breakpoint
    }

    /// The breakpoint at exactly (file, line).
    pub async fn find(&self, file: &str, line: u32) -> Option<Breakpoint> {
        self.breakpoints
            .lock()
            .await
            .get(&(file.to_string(), line))
            .cloned()
    }

    /// Every breakpoint, ordered by file then line.
    pub async fn all(&self) -> Vec<Breakpoint> {
        self.breakpoints.lock().await.values().cloned().collect()
    }

    /// Toggle `enabled` on the breakpoint at (file, line) and overwrite the
    /// condition and log message when given.
    ///
    /// Returns the updated record, or `None` when nothing is registered there.
    pub async fn modify(
        &self,
        file: &str,
        line: u32,
        condition: Option<String>,
        log_message: Option<String>,
    ) -> Option<Breakpoint> {
        let mut breakpoints = self.breakpoints.lock().await;
        let bp = breakpoints.get_mut(&(file.to_string(), line))?;
        *bp = bp.toggled(condition, log_message);
        Some(bp.clone())
    }

    /// All callback registrations.
    pub async fn registrations(&self) -> Vec<CallbackRegistration> {
        self.breakpoints
            .lock()
            .await
            .values()
            .filter_map(Breakpoint::registration)
            .collect()
    }

    /// Registrations whose location is exactly (file, line).
    pub async fn registrations_at(&self, file: &str, line: u32) -> Vec<CallbackRegistration> {
        self.breakpoints
            .lock()
            .await
            .get(&(file.to_string(), line))
            .and_then(Breakpoint::registration)
            .into_iter()
            .collect()
    }

    /// Like [`registrations_at`](Self::registrations_at), but the callbacks
    /// are removed in the same critical section.
    pub async fn take_registrations_at(&self, file: &str, line: u32) -> Vec<CallbackRegistration> {
        let mut breakpoints = self.breakpoints.lock().await;
        let Some(bp) = breakpoints.get_mut(&(file.to_string(), line)) else {
            return Vec::new();
        };
        let taken = bp.registration().into_iter().collect();
        bp.callback = None;
        taken
    }

    /// Drop the callback at (file, line), keeping the breakpoint.
    ///
    /// Returns `true` if a callback was removed.
    pub async fn clear_callback(&self, file: &str, line: u32) -> bool {
        let mut breakpoints = self.breakpoints.lock().await;
        breakpoints
            .get_mut(&(file.to_string(), line))
            .and_then(|bp| bp.callback.take())
            .is_some()
    }

    /// Whether at least one callback is registered.
    pub async fn has_registrations(&self) -> bool {
        self.breakpoints
            .lock()
            .await
            .values()
            .any(|bp| bp.registration().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_same_location() {
        let registry = BreakpointRegistry::new();
        registry
            .upsert(Breakpoint::new("/src/app.ts", 42).with_callback("http://a/{location}"))
            .await;
        let mut replacement = Breakpoint::new("/src/app.ts", 42).with_callback("http://b/");
        replacement.condition = Some("x > 1".into());
        registry.upsert(replacement).await;

        let all = registry.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].callback.as_deref(), Some("http://b/"));
        assert_eq!(all[0].condition.as_deref(), Some("x > 1"));
    }

    #[tokio::test]
    async fn find_requires_exact_location() {
        let registry = BreakpointRegistry::new();
        registry.upsert(Breakpoint::new("/src/app.ts", 42)).await;

        assert!(registry.find("/src/app.ts", 42).await.is_some());
        assert!(registry.find("/src/app.ts", 43).await.is_none());
        assert!(registry.find("src/app.ts", 42).await.is_none());
    }

    #[tokio::test]
    async fn modify_toggles_and_overwrites_given_fields() {
        let registry = BreakpointRegistry::new();
        let mut bp = Breakpoint::new("a.ts", 10);
        bp.condition = Some("old".into());
        bp.log_message = Some("keep".into());
        registry.upsert(bp).await;

        let first = registry
            .modify("a.ts", 10, Some("new".into()), None)
            .await
            .unwrap();
        assert!(!first.enabled);
        assert_eq!(first.condition.as_deref(), Some("new"));
        assert_eq!(first.log_message.as_deref(), Some("keep"));

        let second = registry.modify("a.ts", 10, None, None).await.unwrap();
        assert!(second.enabled);
        assert_eq!(second.condition.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn modify_missing_breakpoint_is_none() {
        let registry = BreakpointRegistry::new();
        assert!(registry.modify("a.ts", 1, None, None).await.is_none());
        assert!(registry.all().await.is_empty());
    }

    #[tokio::test]
    async fn registrations_skip_empty_callbacks() {
        let registry = BreakpointRegistry::new();
        assert!(!registry.has_registrations().await);

        registry.upsert(Breakpoint::new("a.ts", 1)).await;
        registry
            .upsert(Breakpoint::new("b.ts", 2).with_callback(""))
            .await;
        assert!(!registry.has_registrations().await);

        registry
            .upsert(Breakpoint::new("c.ts", 3).with_callback("http://x/cb"))
            .await;
        assert!(registry.has_registrations().await);
        assert_eq!(registry.registrations().await.len(), 1);
        assert_eq!(registry.registrations_at("c.ts", 3).await.len(), 1);
        assert!(registry.registrations_at("a.ts", 1).await.is_empty());
    }

    #[tokio::test]
    async fn clear_callback_keeps_breakpoint() {
        let registry = BreakpointRegistry::new();
        registry
            .upsert(Breakpoint::new("a.ts", 1).with_callback("http://x/cb"))
            .await;

        assert!(registry.clear_callback("a.ts", 1).await);
        assert!(!registry.clear_callback("a.ts", 1).await);
        assert!(registry.find("a.ts", 1).await.is_some());
        assert!(!registry.has_registrations().await);
    }

    #[tokio::test]
    async fn take_registrations_clears_only_that_location() {
        let registry = BreakpointRegistry::new();
        registry
            .upsert(Breakpoint::new("a.ts", 1).with_callback("http://x/{location}"))
            .await;
        registry
            .upsert(Breakpoint::new("a.ts", 2).with_callback("http://y/"))
            .await;

        let taken = registry.take_registrations_at("a.ts", 1).await;
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].url(), "http://x/a.ts:1");

        assert!(registry.take_registrations_at("a.ts", 1).await.is_empty());
        assert!(registry.take_registrations_at("b.ts", 9).await.is_empty());
        assert!(registry.find("a.ts", 1).await.unwrap().callback.is_none());
        assert_eq!(registry.registrations().await.len(), 1);
    }

    #[test]
    fn toggled_leaves_original_untouched() {
        let mut original = Breakpoint::new("a.ts", 4).with_callback("http://x/");
        original.condition = Some("n == 0".into());

        let flipped = original.toggled(None, Some("hit".into()));
        assert!(!flipped.enabled);
        assert_eq!(flipped.condition.as_deref(), Some("n == 0"));
        assert_eq!(flipped.log_message.as_deref(), Some("hit"));
        assert_eq!(flipped.callback, original.callback);
        assert!(original.enabled);
        assert!(original.log_message.is_none());
    }

    #[test]
    fn registration_substitutes_every_placeholder() {
        let registration = CallbackRegistration {
            file: "/src/app.ts".into(),
            line: 42,
            callback: "http://x/cb?at={location}&again={location}".into(),
        };
        assert_eq!(
            registration.url(),
            "http://x/cb?at=/src/app.ts:42&again=/src/app.ts:42"
        );
    }

    #[test]
    fn registration_without_placeholder_is_unchanged() {
        let registration = CallbackRegistration {
            file: "a.ts".into(),
            line: 1,
            callback: "http://x/ping".into(),
        };
        assert_eq!(registration.url(), "http://x/ping");
    }

    #[test]
    fn breakpoint_spec_mirrors_record() {
        let mut bp = Breakpoint::new("a.ts", 7);
        bp.enabled = false;
        bp.log_message = Some("hit".into());
        assert_eq!(
            bp.to_spec(),
            BreakpointSpec::Source {
                file: "a.ts".into(),
                line: 7,
                enabled: false,
                condition: None,
                log_message: Some("hit".into()),
            }
        );
        assert_eq!(bp.location(), "a.ts:7");
    }
}
