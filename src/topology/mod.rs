//! Topology Module
//!
//! Contract for discovering service instances and tenants, and for reading
//! and writing the configuration documents stored on their records. The
//! crate never implements discovery itself; [`InMemoryTopology`] is provided
//! for embedding and tests.

mod memory;
mod model;

pub use memory::InMemoryTopology;
pub use model::{FunctionIdentifier, InstanceRef, TenantRef};

use crate::error::Result;
use async_trait::async_trait;

/// Resolves identifiers against the platform's resource store
///
/// Lookups that find nothing return `Ok(None)`; `Err` is reserved for
/// failures of the backing store.
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    /// Find the instance implementing `function` under `topology_key`
    async fn resolve_service_instance(
        &self,
        function: FunctionIdentifier,
        topology_key: &str,
    ) -> Result<Option<InstanceRef>>;

    /// Find a tenant by its token
    async fn resolve_tenant(&self, token: &str) -> Result<Option<TenantRef>>;

    /// Every tenant known to the platform
    async fn list_tenants(&self) -> Result<Vec<TenantRef>>;

    /// Raw global configuration document of a function
    async fn global_configuration(&self, function: FunctionIdentifier) -> Result<Option<Vec<u8>>>;

    async fn update_global_configuration(
        &self,
        function: FunctionIdentifier,
        document: Vec<u8>,
    ) -> Result<()>;

    /// Raw configuration document of a tenant engine, `None` when the tenant
    /// has no engine for `function`
    async fn tenant_engine_configuration(
        &self,
        function: FunctionIdentifier,
        tenant: &TenantRef,
    ) -> Result<Option<Vec<u8>>>;

    /// Replace the configuration document of an existing tenant engine
    async fn update_tenant_engine_configuration(
        &self,
        function: FunctionIdentifier,
        tenant: &TenantRef,
        document: Vec<u8>,
    ) -> Result<()>;
}
