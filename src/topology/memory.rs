use super::{FunctionIdentifier, InstanceRef, TenantRef, TopologyResolver};
use crate::error::{ConductorError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory topology
#[derive(Clone, Default)]
pub struct InMemoryTopology {
    instances: Arc<DashMap<(FunctionIdentifier, String), InstanceRef>>,
    tenants: Arc<DashMap<String, TenantRef>>,
    global_configurations: Arc<DashMap<FunctionIdentifier, Vec<u8>>>,
    engine_configurations: Arc<DashMap<(FunctionIdentifier, String), Vec<u8>>>,
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its own instance id as topology key
    pub fn register_instance(&self, instance: InstanceRef) {
        self.instances.insert(
            (instance.function, instance.instance_id.clone()),
            instance,
        );
    }

    pub fn register_tenant(&self, tenant: TenantRef) {
        self.tenants.insert(tenant.token.clone(), tenant);
    }

    pub fn remove_tenant(&self, token: &str) -> Option<TenantRef> {
        let (_, tenant) = self.tenants.remove(token)?;
        self.engine_configurations
            .retain(|(_, tenant_id), _| tenant_id != &tenant.id);
        Some(tenant)
    }

    /// Create the engine record of a tenant for `function`
    pub fn register_tenant_engine(
        &self,
        function: FunctionIdentifier,
        tenant: &TenantRef,
        document: impl Into<Vec<u8>>,
    ) {
        self.engine_configurations
            .insert((function, tenant.id.clone()), document.into());
    }
}

#[async_trait]
impl TopologyResolver for InMemoryTopology {
    async fn resolve_service_instance(
        &self,
        function: FunctionIdentifier,
        topology_key: &str,
    ) -> Result<Option<InstanceRef>> {
        Ok(self
            .instances
            .get(&(function, topology_key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn resolve_tenant(&self, token: &str) -> Result<Option<TenantRef>> {
        Ok(self.tenants.get(token).map(|entry| entry.value().clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantRef>> {
        let mut tenants: Vec<TenantRef> = self
            .tenants
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tenants.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(tenants)
    }

    async fn global_configuration(&self, function: FunctionIdentifier) -> Result<Option<Vec<u8>>> {
        Ok(self
            .global_configurations
            .get(&function)
            .map(|entry| entry.value().clone()))
    }

    async fn update_global_configuration(
        &self,
        function: FunctionIdentifier,
        document: Vec<u8>,
    ) -> Result<()> {
        self.global_configurations.insert(function, document);
        Ok(())
    }

    async fn tenant_engine_configuration(
        &self,
        function: FunctionIdentifier,
        tenant: &TenantRef,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .engine_configurations
            .get(&(function, tenant.id.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn update_tenant_engine_configuration(
        &self,
        function: FunctionIdentifier,
        tenant: &TenantRef,
        document: Vec<u8>,
    ) -> Result<()> {
        match self
            .engine_configurations
            .get_mut(&(function, tenant.id.clone()))
        {
            Some(mut entry) => {
                *entry = document;
                Ok(())
            }
            None => Err(ConductorError::not_found(
                "Tenant engine",
                format!("{}/{}", function, tenant.token),
            )),
        }
    }
}
