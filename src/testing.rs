//! Test doubles shared by the unit tests.

use crate::activation::{ActivationBroadcaster, ActivationNotification};
use crate::channel::{ChannelFactory, ChannelSettings, ManagementChannel};
use crate::configuration::ConfigurationModel;
use crate::error::{ConductorError, Result};
use crate::lifecycle::{
    self, LifecycleComponent, LifecycleCore, LifecycleError, LifecycleOperation, LifecycleStatus,
    ProgressMonitor,
};
use crate::service::{EngineFactory, TenantEngine};
use crate::topology::{FunctionIdentifier, InstanceRef, TenantRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Poll `condition` for up to a second
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Ordered record of hook invocations across components
#[derive(Clone, Default)]
pub struct OperationLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl OperationLog {
    pub fn record(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

/// Component that records its hooks and can fail or stall on one operation
pub struct RecordingComponent {
    core: LifecycleCore,
    log: Option<OperationLog>,
    operations: Mutex<Vec<LifecycleOperation>>,
    fail_on: Option<LifecycleOperation>,
    delay: Option<(LifecycleOperation, Duration)>,
}

impl RecordingComponent {
    pub fn new(name: &str) -> Self {
        Self {
            core: LifecycleCore::new(name),
            log: None,
            operations: Mutex::new(Vec::new()),
            fail_on: None,
            delay: None,
        }
    }

    pub fn with_log(name: &str, log: OperationLog) -> Self {
        Self {
            log: Some(log),
            ..Self::new(name)
        }
    }

    pub fn failing_on(name: &str, operation: LifecycleOperation) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::new(name)
        }
    }

    pub fn failing_with_log(name: &str, operation: LifecycleOperation, log: OperationLog) -> Self {
        Self {
            fail_on: Some(operation),
            log: Some(log),
            ..Self::new(name)
        }
    }

    pub fn slow(name: &str, operation: LifecycleOperation, delay: Duration) -> Self {
        Self {
            delay: Some((operation, delay)),
            ..Self::new(name)
        }
    }

    pub fn operations(&self) -> Vec<LifecycleOperation> {
        self.operations.lock().unwrap().clone()
    }

    pub async fn record(&self, operation: LifecycleOperation) -> lifecycle::Result<()> {
        self.operations.lock().unwrap().push(operation);
        if let Some(log) = &self.log {
            log.record(format!("{} {}", operation, self.core.name()));
        }
        if let Some((slow, delay)) = self.delay {
            if slow == operation {
                tokio::time::sleep(delay).await;
            }
        }
        if self.fail_on == Some(operation) {
            return Err(LifecycleError::hook_failed(format!(
                "{} of {} failed",
                operation,
                self.core.name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for RecordingComponent {
    fn core(&self) -> &LifecycleCore {
        &self.core
    }

    async fn on_initialize(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.record(LifecycleOperation::Initialize).await
    }

    async fn on_start(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.record(LifecycleOperation::Start).await
    }

    async fn on_stop(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.record(LifecycleOperation::Stop).await
    }

    async fn on_terminate(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.record(LifecycleOperation::Terminate).await
    }
}

/// Tenant engine named `engine-<token>`
pub struct FakeEngine {
    tenant: TenantRef,
    inner: RecordingComponent,
}

#[async_trait]
impl LifecycleComponent for FakeEngine {
    fn core(&self) -> &LifecycleCore {
        self.inner.core()
    }

    async fn on_initialize(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Initialize).await
    }

    async fn on_start(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Start).await
    }

    async fn on_stop(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Stop).await
    }

    async fn on_terminate(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Terminate).await
    }
}

impl TenantEngine for FakeEngine {
    fn tenant(&self) -> &TenantRef {
        &self.tenant
    }
}

#[derive(Default)]
pub struct FakeEngineFactory {
    log: Option<OperationLog>,
    failures: HashMap<String, LifecycleOperation>,
}

impl FakeEngineFactory {
    pub fn with_log(log: OperationLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Engines of tenant `token` fail on `operation`
    pub fn failing_for(mut self, token: &str, operation: LifecycleOperation) -> Self {
        self.failures.insert(token.to_string(), operation);
        self
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create_engine(&self, tenant: &TenantRef) -> Result<Arc<dyn TenantEngine>> {
        let name = format!("engine-{}", tenant.token);
        let mut inner = match &self.log {
            Some(log) => RecordingComponent::with_log(&name, log.clone()),
            None => RecordingComponent::new(&name),
        };
        inner.fail_on = self.failures.get(&tenant.token).copied();
        Ok(Arc::new(FakeEngine {
            tenant: tenant.clone(),
            inner,
        }))
    }
}

/// Management channel that counts terminations
pub struct FakeChannel {
    target: FunctionIdentifier,
    inner: RecordingComponent,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl LifecycleComponent for FakeChannel {
    fn core(&self) -> &LifecycleCore {
        self.inner.core()
    }

    async fn on_initialize(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Initialize).await
    }

    async fn on_start(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Start).await
    }

    async fn on_stop(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Stop).await
    }

    async fn on_terminate(&self, _monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.inner.record(LifecycleOperation::Terminate).await?;
        self.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ManagementChannel for FakeChannel {
    fn target(&self) -> FunctionIdentifier {
        self.target
    }

    async fn configuration_model(&self) -> Result<ConfigurationModel> {
        if self.status() != LifecycleStatus::Started {
            return Err(ConductorError::Internal(format!(
                "Channel to {} is {}",
                self.target,
                self.status()
            )));
        }
        Ok(ConfigurationModel::new(self.target, self.target.path()))
    }
}

#[derive(Default)]
pub struct FakeChannelFactory {
    fail_on: Option<LifecycleOperation>,
    created: AtomicUsize,
    terminated: Arc<AtomicUsize>,
    last: Mutex<Option<Arc<FakeChannel>>>,
}

impl FakeChannelFactory {
    pub fn failing_on(operation: LifecycleOperation) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<LifecycleStatus> {
        self.last.lock().unwrap().as_ref().map(|channel| channel.status())
    }
}

impl ChannelFactory for FakeChannelFactory {
    fn create_channel(
        &self,
        instance: &InstanceRef,
        _settings: &ChannelSettings,
    ) -> Result<Arc<dyn ManagementChannel>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut inner = RecordingComponent::new(&format!("{}-management", instance.function));
        inner.fail_on = self.fail_on;
        let channel = Arc::new(FakeChannel {
            target: instance.function,
            inner,
            terminated: Arc::clone(&self.terminated),
        });
        *self.last.lock().unwrap() = Some(Arc::clone(&channel));
        Ok(channel)
    }
}

/// Broadcaster that keeps every notification
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<ActivationNotification>>,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<ActivationNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl ActivationBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, notification: ActivationNotification) -> Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
