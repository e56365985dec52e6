//! Progress tracking for composite lifecycle execution.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Progress of one composite execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressContext {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub current_label: String,
}

impl ProgressContext {
    pub fn new(total_steps: usize, label: impl Into<String>) -> Self {
        Self {
            total_steps,
            completed_steps: 0,
            current_label: label.into(),
        }
    }

    /// Completion ratio in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        if self.total_steps == 0 {
            return 1.0;
        }
        self.completed_steps.min(self.total_steps) as f32 / self.total_steps as f32
    }
}

/// Tracks progress across (possibly nested) composite executions
///
/// A monitor is shared by reference for the duration of one lifecycle phase.
/// Each composite pushes its own [`ProgressContext`] and pops it when done, so
/// a service composite running inside a registry composite reports separately.
/// Observers read snapshots or subscribe to updates; nothing they do feeds
/// back into orchestration.
///
/// # Example
///
/// ```rust,ignore
/// let monitor = ProgressMonitor::single("Start management interface.", "instance-management");
/// channel.initialize(&monitor).await?;
/// channel.start(&monitor).await?;
/// ```
pub struct ProgressMonitor {
    source: String,
    contexts: Mutex<Vec<ProgressContext>>,
    updates: watch::Sender<Option<ProgressContext>>,
    cancelled: AtomicBool,
}

impl ProgressMonitor {
    /// Create a monitor seeded with an outer context
    pub fn new(context: ProgressContext, source: impl Into<String>) -> Self {
        let (updates, _) = watch::channel(Some(context.clone()));
        Self {
            source: source.into(),
            contexts: Mutex::new(vec![context]),
            updates,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Single-use monitor for a one-step operation
    pub fn single(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(ProgressContext::new(1, label), source)
    }

    /// Name of the component that owns this monitor (logging context)
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn push_context(&self, context: ProgressContext) {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        contexts.push(context);
        self.publish(&contexts);
    }

    pub fn pop_context(&self) -> Option<ProgressContext> {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        let popped = contexts.pop();
        self.publish(&contexts);
        popped
    }

    /// Mark the start of a step in the innermost context
    pub fn start_progress(&self, label: impl Into<String>) {
        let label = label.into();
        tracing::debug!("[{}] {}", self.source, label);
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = contexts.last_mut() {
            current.current_label = label;
        }
        self.publish(&contexts);
    }

    /// Mark the current step of the innermost context as completed
    pub fn finish_progress(&self) {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = contexts.last_mut() {
            current.completed_steps += 1;
        }
        self.publish(&contexts);
    }

    /// Innermost context, if any
    pub fn snapshot(&self) -> Option<ProgressContext> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Depth of the context stack
    pub fn depth(&self) -> usize {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Subscribe to innermost-context updates
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressContext>> {
        self.updates.subscribe()
    }

    /// Ask running composites to stop before their next step.
    ///
    /// The step currently executing always runs to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn publish(&self, contexts: &[ProgressContext]) {
        self.updates.send_replace(contexts.last().cloned());
    }
}
