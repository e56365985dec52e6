//! Lifecycle-specific error types

use super::{LifecycleOperation, LifecycleStatus};
use thiserror::Error;

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The requested operation is not allowed from the component's current state
    ///
    /// This is a programming error in the assembler of the component tree and
    /// is never retried.
    #[error("Invalid transition for {component}: cannot {operation} while {status}")]
    InvalidTransition {
        /// Name of the component
        component: String,
        /// The requested operation
        operation: LifecycleOperation,
        /// State the component was in
        status: LifecycleStatus,
    },

    /// A component hook reported a failure
    #[error("{0}")]
    HookFailed(String),

    /// A transition started but its hook failed; the component is now in `Error`
    #[error("{operation} failed for {component}: {source}")]
    TransitionFailed {
        /// Name of the component
        component: String,
        /// The attempted operation
        operation: LifecycleOperation,
        /// Underlying failure
        #[source]
        source: Box<LifecycleError>,
    },

    /// A required step failed and the composite was aborted
    #[error("Composite '{composite}' aborted at step {step} ({component}): {source}")]
    StepFailed {
        /// Label of the composite
        composite: String,
        /// Zero-based index of the failed step
        step: usize,
        /// Name of the component targeted by the step
        component: String,
        /// Underlying failure
        #[source]
        source: Box<LifecycleError>,
    },

    /// Execution was cancelled between two steps
    #[error("Composite '{composite}' cancelled before step {step}")]
    Cancelled {
        /// Label of the composite
        composite: String,
        /// Index of the first step that did not run
        step: usize,
    },

    /// Operation timed out
    #[error("Timeout during {phase}: {message}")]
    Timeout {
        /// The lifecycle phase where timeout occurred
        phase: String,
        /// Additional error message
        message: String,
    },
}

impl LifecycleError {
    /// Create a hook failure error
    pub fn hook_failed(message: impl Into<String>) -> Self {
        Self::HookFailed(message.into())
    }

    /// Create a timeout error
    pub fn timeout(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            phase: phase.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_transition(
        component: impl Into<String>,
        operation: LifecycleOperation,
        status: LifecycleStatus,
    ) -> Self {
        Self::InvalidTransition {
            component: component.into(),
            operation,
            status,
        }
    }

    pub(crate) fn transition_failed(
        component: impl Into<String>,
        operation: LifecycleOperation,
        source: LifecycleError,
    ) -> Self {
        Self::TransitionFailed {
            component: component.into(),
            operation,
            source: Box::new(source),
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
