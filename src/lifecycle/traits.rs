//! The lifecycle contract shared by services, tenant engines and channels
//!
//! Every manageable entity embeds a [`LifecycleCore`] that owns its state and
//! implements the hook methods of [`LifecycleComponent`] it cares about. The
//! provided `initialize`/`start`/`stop`/`terminate` methods validate the
//! transition, run the hook and record the resulting state.

use super::{LifecycleError, LifecycleOperation, LifecycleStatus, ProgressMonitor, Result};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use uuid::Uuid;

/// State holder embedded in every lifecycle component
pub struct LifecycleCore {
    id: Uuid,
    name: String,
    status: RwLock<LifecycleStatus>,
    parent: RwLock<Option<Weak<dyn LifecycleComponent>>>,
    last_error: RwLock<Option<String>>,
}

impl LifecycleCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: RwLock::new(LifecycleStatus::Created),
            parent: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> LifecycleStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Message of the failure that last moved the component to `Error`
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the owning component. The reference is weak and only used for
    /// logging context.
    pub fn set_parent(&self, parent: Weak<dyn LifecycleComponent>) {
        *self.parent.write().unwrap_or_else(PoisonError::into_inner) = Some(parent);
    }

    pub fn parent_name(&self) -> Option<String> {
        self.parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|parent| parent.name().to_string())
    }

    /// Force the component into `Error`
    pub fn mark_error(&self, message: impl Into<String>) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = LifecycleStatus::Error;
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Check-and-set into the transient state of `operation`.
    fn begin(&self, operation: LifecycleOperation) -> Result<()> {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if !operation.is_allowed_from(*status) {
            return Err(LifecycleError::invalid_transition(
                &self.name, operation, *status,
            ));
        }
        *status = operation.transient_status();
        Ok(())
    }

    fn finish(&self, operation: LifecycleOperation) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = operation.target_status();
    }
}

impl std::fmt::Debug for LifecycleCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// A manageable unit with a strictly ordered lifecycle
///
/// Implementors provide [`core`](Self::core) and override the `on_*` hooks
/// they need. The transition methods should not be overridden.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::lifecycle::{LifecycleComponent, LifecycleCore, LifecycleError, ProgressMonitor};
/// use async_trait::async_trait;
///
/// struct Transport {
///     core: LifecycleCore,
/// }
///
/// #[async_trait]
/// impl LifecycleComponent for Transport {
///     fn core(&self) -> &LifecycleCore {
///         &self.core
///     }
///
///     async fn on_start(&self, _monitor: &ProgressMonitor) -> Result<(), LifecycleError> {
///         tracing::info!("Opening transport");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LifecycleComponent: Send + Sync {
    /// State holder for this component
    fn core(&self) -> &LifecycleCore;

    /// Called while the component is `Initializing`
    async fn on_initialize(&self, _monitor: &ProgressMonitor) -> Result<()> {
        Ok(())
    }

    /// Called while the component is `Starting`
    async fn on_start(&self, _monitor: &ProgressMonitor) -> Result<()> {
        Ok(())
    }

    /// Called while the component is `Stopping`
    async fn on_stop(&self, _monitor: &ProgressMonitor) -> Result<()> {
        Ok(())
    }

    /// Called while the component is `Terminating`
    async fn on_terminate(&self, _monitor: &ProgressMonitor) -> Result<()> {
        Ok(())
    }

    fn id(&self) -> Uuid {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn status(&self) -> LifecycleStatus {
        self.core().status()
    }

    /// Created → Initialized
    async fn initialize(&self, monitor: &ProgressMonitor) -> Result<()> {
        run_transition(self, LifecycleOperation::Initialize, monitor).await
    }

    /// Initialized | Stopped → Started
    async fn start(&self, monitor: &ProgressMonitor) -> Result<()> {
        run_transition(self, LifecycleOperation::Start, monitor).await
    }

    /// Started → Stopped
    async fn stop(&self, monitor: &ProgressMonitor) -> Result<()> {
        run_transition(self, LifecycleOperation::Stop, monitor).await
    }

    /// Stopped | Error → Terminated
    async fn terminate(&self, monitor: &ProgressMonitor) -> Result<()> {
        run_transition(self, LifecycleOperation::Terminate, monitor).await
    }
}

/// Conversion of specialised component handles into plain lifecycle handles
///
/// Blanket-implemented for every sized component, so traits extending
/// [`LifecycleComponent`] can hand their trait objects to a composite.
pub trait AsLifecycle {
    fn as_lifecycle(self: Arc<Self>) -> Arc<dyn LifecycleComponent>;
}

impl<T: LifecycleComponent + 'static> AsLifecycle for T {
    fn as_lifecycle(self: Arc<Self>) -> Arc<dyn LifecycleComponent> {
        self
    }
}

/// Run one transition against `component`.
pub async fn run_transition<C>(
    component: &C,
    operation: LifecycleOperation,
    monitor: &ProgressMonitor,
) -> Result<()>
where
    C: LifecycleComponent + ?Sized,
{
    let core = component.core();
    core.begin(operation)?;

    tracing::debug!(
        parent = core.parent_name().as_deref().unwrap_or("-"),
        "{} {}",
        operation,
        core.name()
    );

    let outcome = match operation {
        LifecycleOperation::Initialize => component.on_initialize(monitor).await,
        LifecycleOperation::Start => component.on_start(monitor).await,
        LifecycleOperation::Stop => component.on_stop(monitor).await,
        LifecycleOperation::Terminate => component.on_terminate(monitor).await,
    };

    match outcome {
        Ok(()) => {
            core.finish(operation);
            tracing::debug!("{} is {}", core.name(), operation.target_status());
            Ok(())
        }
        Err(e) => {
            core.mark_error(e.to_string());
            Err(LifecycleError::transition_failed(core.name(), operation, e))
        }
    }
}
