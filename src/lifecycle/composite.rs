//! Composite Steps
//!
//! Ordered execution of lifecycle operations against a set of components.

use super::{
    LifecycleComponent, LifecycleError, LifecycleOperation, ProgressContext, ProgressMonitor,
    Result,
};
use serde::Serialize;
use std::sync::Arc;

/// How a composite reacts to failing steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A failing required step aborts the composite and is returned to the
    /// caller. Optional failures are logged and skipped.
    Propagate,
    /// Every failure is logged and recorded, none is returned, and every step
    /// runs. Used for teardown.
    BestEffort,
}

struct StepEntry {
    component: Arc<dyn LifecycleComponent>,
    operation: LifecycleOperation,
    required: bool,
}

/// A failed step recorded in a [`CompositeReport`]
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: usize,
    pub component: String,
    pub operation: LifecycleOperation,
    pub required: bool,
    pub message: String,
}

/// Outcome of a composite that ran to the end
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompositeReport {
    pub label: String,
    pub completed: usize,
    pub failures: Vec<StepFailure>,
}

impl CompositeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An ordered batch of lifecycle transitions executed as one phase
///
/// Steps run strictly in the order they were added, one at a time; list
/// dependencies first. The composite owns no component, it only holds shared
/// handles for the duration of one phase.
///
/// # Example
///
/// ```rust,ignore
/// let mut init = CompositeStep::initialize("Initialize Label Generation");
/// init.add_initialize_step(grpc_server.clone(), true);
/// init.add_initialize_step(device_management.clone(), true);
/// init.execute(&monitor).await?;
/// ```
pub struct CompositeStep {
    label: String,
    mode: ExecutionMode,
    steps: Vec<StepEntry>,
}

impl CompositeStep {
    pub fn new(label: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            label: label.into(),
            mode,
            steps: Vec::new(),
        }
    }

    /// Startup composite that propagates required failures
    pub fn initialize(label: impl Into<String>) -> Self {
        Self::new(label, ExecutionMode::Propagate)
    }

    /// Startup composite that propagates required failures
    pub fn start(label: impl Into<String>) -> Self {
        Self::new(label, ExecutionMode::Propagate)
    }

    /// Best-effort teardown composite
    pub fn stop(label: impl Into<String>) -> Self {
        Self::new(label, ExecutionMode::BestEffort)
    }

    /// Best-effort teardown composite
    pub fn terminate(label: impl Into<String>) -> Self {
        Self::new(label, ExecutionMode::BestEffort)
    }

    pub fn add_step(
        &mut self,
        component: Arc<dyn LifecycleComponent>,
        operation: LifecycleOperation,
        required: bool,
    ) -> &mut Self {
        self.steps.push(StepEntry {
            component,
            operation,
            required,
        });
        self
    }

    pub fn add_initialize_step(
        &mut self,
        component: Arc<dyn LifecycleComponent>,
        required: bool,
    ) -> &mut Self {
        self.add_step(component, LifecycleOperation::Initialize, required)
    }

    pub fn add_start_step(
        &mut self,
        component: Arc<dyn LifecycleComponent>,
        required: bool,
    ) -> &mut Self {
        self.add_step(component, LifecycleOperation::Start, required)
    }

    pub fn add_stop_step(&mut self, component: Arc<dyn LifecycleComponent>) -> &mut Self {
        self.add_step(component, LifecycleOperation::Stop, false)
    }

    pub fn add_terminate_step(&mut self, component: Arc<dyn LifecycleComponent>) -> &mut Self {
        self.add_step(component, LifecycleOperation::Terminate, false)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute all steps in order
    ///
    /// In [`ExecutionMode::Propagate`] the first failing required step aborts
    /// the composite: later steps never run, the failing component is left in
    /// `Error`, and the failure is returned. In
    /// [`ExecutionMode::BestEffort`] this never returns `Err`, and monitor
    /// cancellation is ignored.
    pub async fn execute(&self, monitor: &ProgressMonitor) -> Result<CompositeReport> {
        tracing::info!("{} ({} steps)", self.label, self.steps.len());
        monitor.push_context(ProgressContext::new(self.steps.len(), &self.label));

        let outcome = self.run_steps(monitor).await;
        monitor.pop_context();

        match &outcome {
            Ok(report) if report.is_clean() => {
                tracing::info!("{} complete ({} steps executed)", self.label, report.completed)
            }
            Ok(report) => tracing::warn!(
                "{} complete with {} failed step(s)",
                self.label,
                report.failures.len()
            ),
            Err(e) => tracing::error!("{} failed: {}", self.label, e),
        }
        outcome
    }

    async fn run_steps(&self, monitor: &ProgressMonitor) -> Result<CompositeReport> {
        let mut report = CompositeReport {
            label: self.label.clone(),
            ..CompositeReport::default()
        };

        for (index, step) in self.steps.iter().enumerate() {
            if self.mode == ExecutionMode::Propagate && monitor.is_cancelled() {
                return Err(LifecycleError::Cancelled {
                    composite: self.label.clone(),
                    step: index,
                });
            }

            let component = step.component.name().to_string();
            monitor.start_progress(format!("{} {}", step.operation, component));

            let result = match step.operation {
                LifecycleOperation::Initialize => step.component.initialize(monitor).await,
                LifecycleOperation::Start => step.component.start(monitor).await,
                LifecycleOperation::Stop => step.component.stop(monitor).await,
                LifecycleOperation::Terminate => step.component.terminate(monitor).await,
            };

            match result {
                Ok(()) => {
                    report.completed += 1;
                    monitor.finish_progress();
                }
                Err(e) if self.mode == ExecutionMode::Propagate && step.required => {
                    step.component.core().mark_error(e.to_string());
                    return Err(LifecycleError::StepFailed {
                        composite: self.label.clone(),
                        step: index,
                        component,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    if self.mode == ExecutionMode::BestEffort {
                        tracing::error!("{} {} failed: {}", step.operation, component, e);
                    } else {
                        tracing::warn!(
                            "Optional step {} {} failed, continuing: {}",
                            step.operation,
                            component,
                            e
                        );
                    }
                    report.failures.push(StepFailure {
                        step: index,
                        component,
                        operation: step.operation,
                        required: step.required,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
