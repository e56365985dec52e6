use super::{ChannelFactory, ChannelSettings, ManagementChannel};
use crate::config::RuntimeConfig;
use crate::error::{ConductorError, IdentifierKind, Result};
use crate::lifecycle::{CompositeStep, ProgressMonitor};
use crate::topology::{FunctionIdentifier, TopologyResolver};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

/// A started management channel bound to one caller operation
///
/// Call [`release`](Self::release) when done. A lease dropped without release
/// (early return, panic unwind, abandoned future) schedules the same teardown
/// on the current runtime, so every acquired channel is stopped and
/// terminated exactly once.
pub struct ManagementChannelLease {
    channel: Arc<dyn ManagementChannel>,
    source: String,
    released: bool,
}

impl ManagementChannelLease {
    fn new(channel: Arc<dyn ManagementChannel>, source: String) -> Self {
        Self {
            channel,
            source,
            released: false,
        }
    }

    pub fn target(&self) -> FunctionIdentifier {
        self.channel.target()
    }

    /// The started channel
    pub fn channel(&self) -> &Arc<dyn ManagementChannel> {
        &self.channel
    }

    /// Stop then terminate the channel
    ///
    /// Teardown failures are logged, never returned. The teardown runs on its
    /// own task and completes even if this future is dropped.
    pub async fn release(mut self) {
        self.released = true;
        let handle = tokio::spawn(teardown(Arc::clone(&self.channel), self.source.clone()));
        if let Err(e) = handle.await {
            tracing::error!("Unable to shut down management channel: {}", e);
        }
    }
}

impl Drop for ManagementChannelLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let channel = Arc::clone(&self.channel);
        match Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(
                    "Management channel to {} dropped without release, shutting it down",
                    channel.target()
                );
                runtime.spawn(teardown(channel, self.source.clone()));
            }
            Err(_) => tracing::error!(
                "Management channel to {} dropped outside a runtime and was not shut down",
                channel.target()
            ),
        }
    }
}

impl std::fmt::Debug for ManagementChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementChannelLease")
            .field("target", &self.channel.target())
            .field("status", &self.channel.status())
            .field("released", &self.released)
            .finish()
    }
}

async fn teardown(channel: Arc<dyn ManagementChannel>, source: String) {
    let monitor = ProgressMonitor::single("Stop management interface.", source);
    let component = channel.as_lifecycle();

    let mut stop = CompositeStep::stop("Stop management interface");
    stop.add_stop_step(Arc::clone(&component));
    let mut terminate = CompositeStep::terminate("Terminate management interface");
    terminate.add_terminate_step(component);

    let mut failures = 0;
    for composite in [stop, terminate] {
        if let Ok(report) = composite.execute(&monitor).await {
            failures += report.failures.len();
        }
    }
    if failures > 0 {
        tracing::error!("Unable to shut down management channel cleanly");
    }
}

/// Acquires management channel leases
///
/// Every lease gets a freshly created channel; nothing is pooled or shared
/// between calls.
pub struct LeaseManager {
    factory: Arc<dyn ChannelFactory>,
    topology: Arc<dyn TopologyResolver>,
    settings: ChannelSettings,
    topology_key: String,
    source: String,
}

impl LeaseManager {
    /// `topology_key` selects the instance to reach for each function and
    /// `source` names the caller in progress reports.
    pub fn new(
        factory: Arc<dyn ChannelFactory>,
        topology: Arc<dyn TopologyResolver>,
        settings: ChannelSettings,
        topology_key: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            topology,
            settings,
            topology_key: topology_key.into(),
            source: source.into(),
        }
    }

    /// Manager reaching instances under the configured instance id, with
    /// channel settings from `config`
    pub fn from_config(
        factory: Arc<dyn ChannelFactory>,
        topology: Arc<dyn TopologyResolver>,
        config: &RuntimeConfig,
        source: impl Into<String>,
    ) -> Self {
        Self::new(
            factory,
            topology,
            ChannelSettings::from_config(config),
            config.instance_id.clone(),
            source,
        )
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Create a channel to `target` and bring it to `Started`
    ///
    /// The target must resolve to a known instance. If initialize or start
    /// fails the channel is terminated from `Error` and
    /// [`ConductorError::LeaseAcquisition`] is returned. Startup runs on its
    /// own task: if this future is dropped, the channel still finishes
    /// starting and is then shut down.
    pub async fn acquire(&self, target: FunctionIdentifier) -> Result<ManagementChannelLease> {
        let instance = self
            .topology
            .resolve_service_instance(target, &self.topology_key)
            .await?
            .ok_or_else(|| {
                ConductorError::invalid_identifier(
                    IdentifierKind::ServiceInstance,
                    format!("{}@{}", target, self.topology_key),
                )
            })?;

        tracing::debug!(
            "Leasing management channel to {} at {}",
            target,
            self.settings.endpoint(&instance)
        );
        let channel = self.factory.create_channel(&instance, &self.settings)?;
        let source = self.source.clone();

        tokio::spawn(start(channel, source))
            .await
            .map_err(|e| ConductorError::Internal(format!("Channel startup task failed: {}", e)))?
    }

    /// Run `operation` against a leased channel to `target`
    ///
    /// The lease is released on every exit path; a teardown failure never
    /// replaces the operation's own result.
    pub async fn with_lease<F, Fut, T>(&self, target: FunctionIdentifier, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ManagementChannel>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lease = self.acquire(target).await?;
        let outcome = operation(Arc::clone(lease.channel())).await;
        lease.release().await;
        outcome
    }
}

async fn start(
    channel: Arc<dyn ManagementChannel>,
    source: String,
) -> Result<ManagementChannelLease> {
    let monitor = ProgressMonitor::single("Start management interface.", source.as_str());
    let component = Arc::clone(&channel).as_lifecycle();

    let mut init = CompositeStep::initialize("Initialize management interface");
    init.add_initialize_step(Arc::clone(&component), true);
    let mut start = CompositeStep::start("Start management interface");
    start.add_start_step(Arc::clone(&component), true);

    let started = match init.execute(&monitor).await {
        Ok(_) => start.execute(&monitor).await,
        Err(e) => Err(e),
    };

    match started {
        Ok(_) => Ok(ManagementChannelLease::new(channel, source)),
        Err(e) => {
            let mut terminate = CompositeStep::terminate("Terminate management interface");
            terminate.add_terminate_step(component);
            if let Ok(report) = terminate.execute(&monitor).await {
                if !report.is_clean() {
                    tracing::error!(
                        "Unable to terminate failed management channel to {}",
                        channel.target()
                    );
                }
            }
            Err(ConductorError::LeaseAcquisition {
                target: channel.target().to_string(),
                source: e,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleOperation, LifecycleStatus};
    use crate::testing::{FakeChannelFactory, wait_until};
    use crate::topology::{InMemoryTopology, InstanceRef};

    fn manager(factory: &Arc<FakeChannelFactory>) -> LeaseManager {
        let topology = InMemoryTopology::new();
        topology.register_instance(InstanceRef::new(
            "default",
            FunctionIdentifier::LabelGeneration,
            "label-generation.default",
        ));
        LeaseManager::new(
            factory.clone(),
            Arc::new(topology),
            ChannelSettings::default(),
            "default",
            "instance-management",
        )
    }

    #[tokio::test]
    async fn test_lease_is_started_then_released() {
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = manager(&factory);

        let lease = leases.acquire(FunctionIdentifier::LabelGeneration).await.unwrap();
        assert_eq!(lease.channel().status(), LifecycleStatus::Started);
        assert_eq!(lease.target(), FunctionIdentifier::LabelGeneration);

        let channel = Arc::clone(lease.channel());
        lease.release().await;
        assert_eq!(channel.status(), LifecycleStatus::Terminated);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.terminated(), 1);
    }

    #[tokio::test]
    async fn test_manager_from_config() {
        let topology = InMemoryTopology::new();
        topology.register_instance(InstanceRef::new(
            "edge-1",
            FunctionIdentifier::LabelGeneration,
            "label-generation.edge-1",
        ));
        let config = RuntimeConfig {
            instance_id: "edge-1".to_string(),
            management_port: 9100,
            ..RuntimeConfig::default()
        };
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = LeaseManager::from_config(
            factory.clone(),
            Arc::new(topology),
            &config,
            "instance-management",
        );
        assert_eq!(leases.settings().management_port, 9100);

        let lease = leases.acquire(FunctionIdentifier::LabelGeneration).await.unwrap();
        lease.release().await;
        assert_eq!(factory.terminated(), 1);
    }

    #[tokio::test]
    async fn test_unknown_instance_is_invalid_identifier() {
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = manager(&factory);

        let err = leases
            .acquire(FunctionIdentifier::DeviceManagement)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConductorError::InvalidIdentifier {
                kind: IdentifierKind::ServiceInstance,
                ..
            }
        ));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_failed_start_returns_no_channel() {
        let factory = Arc::new(FakeChannelFactory::failing_on(LifecycleOperation::Start));
        let leases = manager(&factory);

        let err = leases
            .acquire(FunctionIdentifier::LabelGeneration)
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::LeaseAcquisition { .. }));
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.terminated(), 1);
        assert_eq!(factory.last_status(), Some(LifecycleStatus::Terminated));
    }

    #[tokio::test]
    async fn test_business_error_is_not_masked_by_teardown() {
        let factory = Arc::new(FakeChannelFactory::failing_on(LifecycleOperation::Stop));
        let leases = manager(&factory);

        let err = leases
            .with_lease(FunctionIdentifier::LabelGeneration, |_channel| async {
                Err::<(), _>(ConductorError::Conflict("business".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Conflict(_)));
        // stop failed, terminate still ran from Error
        assert_eq!(factory.terminated(), 1);
    }

    #[tokio::test]
    async fn test_with_lease_releases_on_success() {
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = manager(&factory);

        let model = leases
            .with_lease(FunctionIdentifier::LabelGeneration, |channel| async move {
                channel.configuration_model().await
            })
            .await
            .unwrap();
        assert_eq!(model.identifier, FunctionIdentifier::LabelGeneration);
        assert_eq!(factory.terminated(), 1);
    }

    #[tokio::test]
    async fn test_dropped_lease_is_torn_down() {
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = manager(&factory);

        let lease = leases.acquire(FunctionIdentifier::LabelGeneration).await.unwrap();
        drop(lease);

        assert!(wait_until(|| factory.terminated() == 1).await);
    }

    #[tokio::test]
    async fn test_abandoned_acquire_still_releases() {
        let factory = Arc::new(FakeChannelFactory::default());
        let leases = manager(&factory);

        let acquire = leases.acquire(FunctionIdentifier::LabelGeneration);
        let _ = tokio::time::timeout(std::time::Duration::ZERO, acquire).await;

        assert!(wait_until(|| factory.terminated() == factory.created()).await);
        assert!(factory.terminated() <= 1);
    }
}
