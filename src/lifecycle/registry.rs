//! Service Registry
//!
//! Explicit registry of the process's top-level lifecycle components with a
//! boot and a shutdown sequence.

use super::{
    CompositeReport, CompositeStep, ExecutionMode, LifecycleComponent, LifecycleError, LifecycleOperation,
    LifecycleStatus, ProgressMonitor, Result,
};
use crate::config::RuntimeConfig;
use std::sync::Arc;
use std::time::Duration;

struct RegisteredComponent {
    component: Arc<dyn LifecycleComponent>,
    required: bool,
}

/// Registry of the components hosted by one process
///
/// Components are booted in registration order and shut down in reverse.
/// The registry owns the process's view of what is running; there is no
/// ambient global table.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::{ProgressMonitor, ServiceRegistry};
///
/// let registry = ServiceRegistry::builder()
///     .name("label-generation")
///     .register(label_service, true)
///     .boot_timeout(Duration::from_secs(30))
///     .build();
///
/// let monitor = Arc::new(ProgressMonitor::single("Boot", "label-generation"));
/// registry.boot(&monitor).await?;
/// // ... running ...
/// registry.shutdown(&ProgressMonitor::single("Shutdown", "label-generation")).await;
/// ```
pub struct ServiceRegistry {
    name: String,
    entries: Vec<RegisteredComponent>,
    boot_timeout: Option<Duration>,
}

impl ServiceRegistry {
    /// Create a new registry builder
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn boot_timeout(&self) -> Option<Duration> {
        self.boot_timeout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered components in boot order
    pub fn components(&self) -> impl Iterator<Item = &Arc<dyn LifecycleComponent>> {
        self.entries.iter().map(|entry| &entry.component)
    }

    /// Find a registered component by name
    pub fn find(&self, name: &str) -> Option<Arc<dyn LifecycleComponent>> {
        self.entries
            .iter()
            .find(|entry| entry.component.name() == name)
            .map(|entry| Arc::clone(&entry.component))
    }

    /// `true` when every required component is `Started`
    pub fn is_healthy(&self) -> bool {
        self.entries
            .iter()
            .filter(|entry| entry.required)
            .all(|entry| entry.component.status() == LifecycleStatus::Started)
    }

    /// Initialize, then start, every registered component
    ///
    /// A failing required component aborts the boot and the error is returned;
    /// the process must not report itself healthy afterwards. With a boot
    /// timeout configured, each phase runs on its own task: on expiry the
    /// in-flight step completes, no further step starts, and
    /// [`LifecycleError::Timeout`] is returned.
    pub async fn boot(&self, monitor: &Arc<ProgressMonitor>) -> Result<()> {
        tracing::info!("Booting {}...", self.name);

        self.run_phase(LifecycleOperation::Initialize, monitor)
            .await?;
        self.run_phase(LifecycleOperation::Start, monitor).await?;

        tracing::info!("{} booted ({} components)", self.name, self.entries.len());
        Ok(())
    }

    /// Stop, then terminate, every registered component in reverse order
    ///
    /// Failures are logged and recorded in the returned reports, never
    /// propagated.
    pub async fn shutdown(&self, monitor: &ProgressMonitor) -> Vec<CompositeReport> {
        tracing::info!("Shutting down {}...", self.name);

        let mut stop = CompositeStep::stop(format!("Stop {}", self.name));
        for entry in self.entries.iter().rev() {
            if entry.component.status() == LifecycleStatus::Started {
                stop.add_stop_step(Arc::clone(&entry.component));
            }
        }

        let mut reports = Vec::with_capacity(2);
        reports.extend(stop.execute(monitor).await.ok());

        let mut terminate = CompositeStep::terminate(format!("Terminate {}", self.name));
        for entry in self.entries.iter().rev() {
            match entry.component.status() {
                LifecycleStatus::Stopped | LifecycleStatus::Error => {
                    terminate.add_terminate_step(Arc::clone(&entry.component));
                }
                status => tracing::debug!(
                    "Skipping terminate of {} ({})",
                    entry.component.name(),
                    status
                ),
            }
        }
        reports.extend(terminate.execute(monitor).await.ok());

        tracing::info!("{} shutdown complete", self.name);
        reports
    }

    fn composite(&self, operation: LifecycleOperation) -> CompositeStep {
        let mut composite = CompositeStep::new(
            format!("{} {}", operation, self.name),
            ExecutionMode::Propagate,
        );
        for entry in &self.entries {
            composite.add_step(Arc::clone(&entry.component), operation, entry.required);
        }
        composite
    }

    async fn run_phase(
        &self,
        operation: LifecycleOperation,
        monitor: &Arc<ProgressMonitor>,
    ) -> Result<()> {
        let composite = self.composite(operation);

        let Some(timeout) = self.boot_timeout else {
            return composite.execute(monitor).await.map(|_| ());
        };

        let task_monitor = Arc::clone(monitor);
        let mut handle = tokio::spawn(async move { composite.execute(&task_monitor).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => joined
                .map_err(|e| {
                    LifecycleError::hook_failed(format!("{} task failed: {}", operation, e))
                })?
                .map(|_| ()),
            Err(_) => {
                monitor.cancel();
                if let Err(e) = handle.await {
                    tracing::error!("{} task failed after timeout: {}", operation, e);
                }
                Err(LifecycleError::timeout(
                    operation.to_string(),
                    format!("Timeout after {:?}", timeout),
                ))
            }
        }
    }
}

/// Builder for [`ServiceRegistry`]
pub struct ServiceRegistryBuilder {
    name: String,
    entries: Vec<RegisteredComponent>,
    boot_timeout: Option<Duration>,
}

impl Default for ServiceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self {
            name: "service registry".to_string(),
            entries: Vec::new(),
            boot_timeout: None,
        }
    }

    /// Named after the configured instance, with its boot timeout if any
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let builder = Self::new().name(config.instance_id.clone());
        match config.boot_timeout {
            Some(timeout) => builder.boot_timeout(timeout),
            None => builder,
        }
    }

    /// Name used in logs and composite labels
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a component; a failing required component aborts the boot
    pub fn register(mut self, component: Arc<dyn LifecycleComponent>, required: bool) -> Self {
        self.entries.push(RegisteredComponent {
            component,
            required,
        });
        self
    }

    /// Bound each boot phase
    pub fn boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            name: self.name,
            entries: self.entries,
            boot_timeout: self.boot_timeout,
        }
    }
}
