use super::{EngineFactory, EnginePolicy, EngineState, TenantEngine};
use crate::config::RuntimeConfig;
use crate::error::{ConductorError, Result};
use crate::lifecycle::{
    self, CompositeStep, ExecutionMode, LifecycleComponent, LifecycleCore, LifecycleError,
    LifecycleOperation, LifecycleStatus, ProgressMonitor,
};
use crate::topology::{FunctionIdentifier, TenantRef, TopologyResolver};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

struct Resource {
    component: Arc<dyn LifecycleComponent>,
    required: bool,
}

/// A service instance implementing one functional area
///
/// The service drives its resources through its own composites, in
/// declaration order. A non-global service also owns one engine per tenant;
/// engines are appended after the resources when starting up and torn down
/// before them.
///
/// # Example
///
/// ```rust,ignore
/// use conductor::service::{EnginePolicy, Service};
/// use conductor::topology::FunctionIdentifier;
///
/// let service = Service::builder(FunctionIdentifier::LabelGeneration)
///     .resource(grpc_server, true)
///     .resource(cached_device_management, true)
///     .engine_factory(Arc::new(LabelGenerationEngines))
///     .topology(topology)
///     .engine_policy(EnginePolicy::optional())
///     .build();
///
/// service.initialize(&monitor).await?;
/// service.start(&monitor).await?;
/// ```
pub struct Service {
    core: LifecycleCore,
    function: FunctionIdentifier,
    resources: Vec<Resource>,
    engines: RwLock<BTreeMap<String, Arc<dyn TenantEngine>>>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    topology: Option<Arc<dyn TopologyResolver>>,
    policy: EnginePolicy,
    this: Weak<Service>,
}

impl Service {
    pub fn builder(function: FunctionIdentifier) -> ServiceBuilder {
        ServiceBuilder::new(function)
    }

    pub fn function(&self) -> FunctionIdentifier {
        self.function
    }

    pub fn is_global(&self) -> bool {
        self.function.is_global()
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        self.policy
    }

    pub fn engine(&self, tenant_id: &str) -> Option<Arc<dyn TenantEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tenant_id)
            .cloned()
    }

    /// Engines ordered by tenant id
    pub fn engines(&self) -> Vec<Arc<dyn TenantEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn engine_states(&self) -> Vec<EngineState> {
        self.engines()
            .iter()
            .map(|engine| EngineState::of(engine.as_ref()))
            .collect()
    }

    /// Create an engine for `tenant` and bring it to the service's phase
    ///
    /// Before the service is initialized the engine is only registered. An
    /// `Initialized` or `Stopped` service initializes the engine so its next
    /// start picks it up; a `Started` service also starts it. A failure is
    /// returned to the caller and the failed engine is torn down and not
    /// kept. Other states are rejected with [`ConductorError::Conflict`].
    pub async fn add_tenant(&self, tenant: &TenantRef) -> Result<Arc<dyn TenantEngine>> {
        if self.is_global() {
            return Err(ConductorError::InvalidRequest(format!(
                "{} is global and hosts no tenant engines",
                self.function
            )));
        }
        if self.engine(&tenant.id).is_some() {
            return Err(ConductorError::Conflict(format!(
                "Tenant engine for '{}' already exists in {}",
                tenant.token, self.function
            )));
        }
        let operations: &[LifecycleOperation] = match self.status() {
            LifecycleStatus::Created => &[],
            LifecycleStatus::Initialized | LifecycleStatus::Stopped => {
                &[LifecycleOperation::Initialize]
            }
            LifecycleStatus::Started => &[LifecycleOperation::Initialize, LifecycleOperation::Start],
            status => {
                return Err(ConductorError::Conflict(format!(
                    "Cannot add tenant '{}' to {} while it is {}",
                    tenant.token,
                    self.name(),
                    status
                )));
            }
        };

        let engine = self.create_engine(tenant)?;
        let monitor = ProgressMonitor::single(
            format!("Start tenant engine {}.", tenant.token),
            self.name(),
        );
        for &operation in operations {
            let mut step = CompositeStep::new(
                format!("{} engine {}", operation, tenant.token),
                ExecutionMode::Propagate,
            );
            step.add_step(Arc::clone(&engine).as_lifecycle(), operation, true);
            if let Err(e) = step.execute(&monitor).await {
                self.discard_engine(&engine, &monitor).await;
                return Err(e.into());
            }
        }

        if let Err(e) = self.try_insert_engine(Arc::clone(&engine)) {
            self.discard_engine(&engine, &monitor).await;
            return Err(e);
        }
        tracing::info!(
            "Added tenant engine {} to {} ({})",
            tenant.token,
            self.name(),
            engine.status()
        );
        Ok(engine)
    }

    /// Remove the engine of `tenant_id`, stopping and terminating it
    /// best-effort
    pub async fn remove_tenant(&self, tenant_id: &str) -> Result<Arc<dyn TenantEngine>> {
        let engine = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tenant_id)
            .ok_or_else(|| ConductorError::not_found("Tenant engine", tenant_id))?;

        let monitor = ProgressMonitor::single(
            format!("Stop tenant engine {}.", engine.tenant().token),
            self.name(),
        );
        self.discard_engine(&engine, &monitor).await;

        tracing::info!("Removed tenant engine {} from {}", engine.tenant().token, self.name());
        Ok(engine)
    }

    fn create_engine(&self, tenant: &TenantRef) -> Result<Arc<dyn TenantEngine>> {
        let factory = self.engine_factory.as_ref().ok_or_else(|| {
            ConductorError::Configuration(format!("{} has no engine factory", self.function))
        })?;
        let engine = factory.create_engine(tenant)?;
        let parent: Weak<dyn LifecycleComponent> = self.this.clone();
        engine.core().set_parent(parent);
        Ok(engine)
    }

    fn try_insert_engine(&self, engine: Arc<dyn TenantEngine>) -> Result<()> {
        let mut engines = self.engines.write().unwrap_or_else(PoisonError::into_inner);
        let tenant = engine.tenant();
        if engines.contains_key(&tenant.id) {
            return Err(ConductorError::Conflict(format!(
                "Tenant engine for '{}' already exists in {}",
                tenant.token, self.function
            )));
        }
        engines.insert(tenant.id.clone(), Arc::clone(&engine));
        Ok(())
    }

    /// Stop and terminate an engine that is no longer tracked
    async fn discard_engine(&self, engine: &Arc<dyn TenantEngine>, monitor: &ProgressMonitor) {
        let component = Arc::clone(engine).as_lifecycle();
        for operation in [LifecycleOperation::Stop, LifecycleOperation::Terminate] {
            if !operation.is_allowed_from(component.status()) {
                continue;
            }
            let mut teardown = CompositeStep::new(
                format!("{} engine {}", operation, engine.tenant().token),
                ExecutionMode::BestEffort,
            );
            teardown.add_step(Arc::clone(&component), operation, false);
            if let Ok(report) = teardown.execute(monitor).await {
                if !report.is_clean() {
                    tracing::warn!(
                        "Tenant engine {} left in {} after {}",
                        engine.tenant().token,
                        component.status(),
                        operation
                    );
                }
            }
        }
    }

    /// Create engines for tenants listed by the topology that have none yet
    async fn load_tenant_engines(&self) -> lifecycle::Result<()> {
        let Some(topology) = self.topology.as_ref() else {
            return Ok(());
        };
        if self.is_global() || self.engine_factory.is_none() {
            return Ok(());
        }

        let tenants = topology
            .list_tenants()
            .await
            .map_err(|e| LifecycleError::hook_failed(format!("Unable to list tenants: {}", e)))?;

        for tenant in tenants {
            if self.engine(&tenant.id).is_some() {
                continue;
            }
            match self
                .create_engine(&tenant)
                .and_then(|engine| self.try_insert_engine(engine))
            {
                Ok(()) => {}
                Err(e) if self.policy.required => {
                    return Err(LifecycleError::hook_failed(format!(
                        "Unable to create engine for tenant {}: {}",
                        tenant.token, e
                    )));
                }
                Err(e) => tracing::warn!(
                    "Unable to create engine for tenant {}, skipping: {}",
                    tenant.token,
                    e
                ),
            }
        }
        Ok(())
    }

    fn startup_composite(&self, operation: LifecycleOperation) -> CompositeStep {
        let mut composite = CompositeStep::new(
            format!("{} {}", operation, self.name()),
            ExecutionMode::Propagate,
        );
        for resource in &self.resources {
            composite.add_step(Arc::clone(&resource.component), operation, resource.required);
        }
        for engine in self.engines() {
            composite.add_step(engine.as_lifecycle(), operation, self.policy.required);
        }
        composite
    }

    async fn teardown(&self, operation: LifecycleOperation, monitor: &ProgressMonitor) {
        let composite = self.teardown_composite(operation);
        if composite.is_empty() {
            return;
        }
        match composite.execute(monitor).await {
            Ok(report) if !report.is_clean() => {
                let failed: Vec<&str> = report
                    .failures
                    .iter()
                    .map(|failure| failure.component.as_str())
                    .collect();
                tracing::warn!(
                    "{} of {} did not complete for: {}",
                    operation,
                    self.name(),
                    failed.join(", ")
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("{} of {} failed: {}", operation, self.name(), e),
        }
    }

    /// Engines first, then resources, both in reverse order, filtered to the
    /// components the operation applies to
    fn teardown_composite(&self, operation: LifecycleOperation) -> CompositeStep {
        let mut composite = CompositeStep::new(
            format!("{} {}", operation, self.name()),
            ExecutionMode::BestEffort,
        );
        let engines = self
            .engines()
            .into_iter()
            .rev()
            .map(|engine| engine.as_lifecycle());
        let resources = self
            .resources
            .iter()
            .rev()
            .map(|resource| Arc::clone(&resource.component));

        for component in engines.chain(resources) {
            if operation.is_allowed_from(component.status()) {
                composite.add_step(component, operation, false);
            } else {
                tracing::debug!(
                    "Skipping {} of {} ({})",
                    operation,
                    component.name(),
                    component.status()
                );
            }
        }
        composite
    }
}

#[async_trait]
impl LifecycleComponent for Service {
    fn core(&self) -> &LifecycleCore {
        &self.core
    }

    async fn on_initialize(&self, monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.load_tenant_engines().await?;
        self.startup_composite(LifecycleOperation::Initialize)
            .execute(monitor)
            .await
            .map(|_| ())
    }

    async fn on_start(&self, monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.startup_composite(LifecycleOperation::Start)
            .execute(monitor)
            .await
            .map(|_| ())
    }

    async fn on_stop(&self, monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.teardown(LifecycleOperation::Stop, monitor).await;
        Ok(())
    }

    /// Children still `Started` (after a failed start) are stopped first
    async fn on_terminate(&self, monitor: &ProgressMonitor) -> lifecycle::Result<()> {
        self.teardown(LifecycleOperation::Stop, monitor).await;
        self.teardown(LifecycleOperation::Terminate, monitor).await;
        Ok(())
    }
}

/// Builder for [`Service`]
pub struct ServiceBuilder {
    function: FunctionIdentifier,
    name: Option<String>,
    resources: Vec<Resource>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    topology: Option<Arc<dyn TopologyResolver>>,
    policy: EnginePolicy,
}

impl ServiceBuilder {
    pub fn new(function: FunctionIdentifier) -> Self {
        Self {
            function,
            name: None,
            resources: Vec::new(),
            engine_factory: None,
            topology: None,
            policy: EnginePolicy::default(),
        }
    }

    /// Builder carrying the configured engine policy
    pub fn from_config(function: FunctionIdentifier, config: &RuntimeConfig) -> Self {
        Self::new(function).engine_policy(config.engine_policy)
    }

    /// Defaults to the function path
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a sub-resource; list dependencies first
    pub fn resource(mut self, component: Arc<dyn LifecycleComponent>, required: bool) -> Self {
        self.resources.push(Resource {
            component,
            required,
        });
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Source of the initial tenant list
    pub fn topology(mut self, topology: Arc<dyn TopologyResolver>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn engine_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Arc<Service> {
        let name = self.name.unwrap_or_else(|| self.function.path());
        Arc::new_cyclic(|this: &Weak<Service>| {
            let parent: Weak<dyn LifecycleComponent> = this.clone();
            for resource in &self.resources {
                resource.component.core().set_parent(parent.clone());
            }
            Service {
                core: LifecycleCore::new(name),
                function: self.function,
                resources: self.resources,
                engines: RwLock::new(BTreeMap::new()),
                engine_factory: self.engine_factory,
                topology: self.topology,
                policy: self.policy,
                this: this.clone(),
            }
        })
    }
}
