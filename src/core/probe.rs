// Environment probe - what the host knows about contexts and the user.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use super::model::{ContextId, Status};

/// Host-side view of contexts and user activity.
///
/// Hosts that can observe user input report it through
/// [`EnvironmentProbe::subscribe_interactions`]; the others forward it to
/// `AlertEngine::handle_interaction` (or `AlertHandle::interaction`).
pub trait EnvironmentProbe: Send + Sync {
    /// The context alerts belong to when the request names none.
    fn current_context(&self) -> ContextId;

    fn display_name(&self, context: &str) -> String;

    fn current_mode(&self, context: &str) -> Option<String>;

    /// Whether the context is shown anywhere.
    fn is_visible(&self, context: &str) -> bool;

    /// Whether the context is the one the user is working in.
    fn is_selected(&self, context: &str) -> bool;

    /// Time since the user last acted.
    fn idle_duration(&self) -> Duration;

    /// Stream of contexts the user acted in. `None` when the host has no
    /// such feed.
    fn subscribe_interactions(&self) -> Option<mpsc::UnboundedReceiver<ContextId>> {
        None
    }

    fn status(&self, context: &str, reveal_idle_threshold: Duration) -> Status {
        resolve_status(self, context, reveal_idle_threshold)
    }
}

/// Derive a context's status from visibility, selection and idle time.
pub fn resolve_status<P>(probe: &P, context: &str, reveal_idle_threshold: Duration) -> Status
where
    P: EnvironmentProbe + ?Sized,
{
    if !probe.is_visible(context) {
        return Status::Buried;
    }
    if !probe.is_selected(context) {
        return Status::Visible;
    }
    if probe.idle_duration() >= reveal_idle_threshold {
        Status::Idle
    } else {
        Status::Selected
    }
}

#[derive(Default)]
struct ManualState {
    current: ContextId,
    visible: HashSet<ContextId>,
    names: HashMap<ContextId, String>,
    modes: HashMap<ContextId, String>,
    idle: Duration,
    subscribers: Vec<mpsc::UnboundedSender<ContextId>>,
}

/// In-memory probe whose answers are set explicitly.
///
/// Useful for hosts without a windowing notion and for deterministic tests.
#[derive(Default)]
pub struct ManualProbe {
    state: Mutex<ManualState>,
}

impl ManualProbe {
    pub fn new(current: impl Into<ContextId>) -> Self {
        let probe = Self::default();
        probe.select(current);
        probe
    }

    /// Make `context` current and visible.
    pub fn select(&self, context: impl Into<ContextId>) {
        let context = context.into();
        let mut state = self.lock();
        state.visible.insert(context.clone());
        state.current = context;
    }

    pub fn show(&self, context: impl Into<ContextId>) {
        self.lock().visible.insert(context.into());
    }

    pub fn hide(&self, context: &str) {
        self.lock().visible.remove(context);
    }

    pub fn set_idle(&self, idle: Duration) {
        self.lock().idle = idle;
    }

    pub fn set_mode(&self, context: impl Into<ContextId>, mode: impl Into<String>) {
        self.lock().modes.insert(context.into(), mode.into());
    }

    pub fn set_display_name(&self, context: impl Into<ContextId>, name: impl Into<String>) {
        self.lock().names.insert(context.into(), name.into());
    }

    /// The user acted in `context`: idle time resets and every subscriber
    /// hears about it.
    pub fn interact(&self, context: impl Into<ContextId>) {
        let context = context.into();
        let mut state = self.lock();
        state.idle = Duration::ZERO;
        state
            .subscribers
            .retain(|tx| tx.send(context.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // State is plain data; a poisoned lock still holds a usable value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EnvironmentProbe for ManualProbe {
    fn current_context(&self) -> ContextId {
        self.lock().current.clone()
    }

    fn display_name(&self, context: &str) -> String {
        self.lock()
            .names
            .get(context)
            .cloned()
            .unwrap_or_else(|| context.to_string())
    }

    fn current_mode(&self, context: &str) -> Option<String> {
        self.lock().modes.get(context).cloned()
    }

    fn is_visible(&self, context: &str) -> bool {
        self.lock().visible.contains(context)
    }

    fn is_selected(&self, context: &str) -> bool {
        self.lock().current == context
    }

    fn idle_duration(&self) -> Duration {
        self.lock().idle
    }

    fn subscribe_interactions(&self) -> Option<mpsc::UnboundedReceiver<ContextId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Some(rx)
    }
}
