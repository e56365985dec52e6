use crate::error::Result;
use crate::lifecycle::{AsLifecycle, LifecycleComponent, LifecycleStatus};
use crate::topology::TenantRef;
use serde::Serialize;
use std::sync::Arc;

/// A per-tenant runtime unit hosted by a non-global service
pub trait TenantEngine: LifecycleComponent + AsLifecycle {
    fn tenant(&self) -> &TenantRef;
}

/// Synchronously builds a fresh engine bound to one tenant
pub trait EngineFactory: Send + Sync {
    fn create_engine(&self, tenant: &TenantRef) -> Result<Arc<dyn TenantEngine>>;
}

/// Whether a failing tenant engine blocks its service
///
/// Engines are optional by default: one tenant's failure does not prevent
/// the other tenants or the service itself from starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnginePolicy {
    pub required: bool,
}

impl EnginePolicy {
    pub fn required() -> Self {
        Self { required: true }
    }

    pub fn optional() -> Self {
        Self { required: false }
    }
}

/// Runtime state of one tenant engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub tenant_id: String,
    pub tenant_token: String,
    pub status: LifecycleStatus,
    pub last_error: Option<String>,
}

impl EngineState {
    pub(crate) fn of(engine: &dyn TenantEngine) -> Self {
        Self {
            tenant_id: engine.tenant().id.clone(),
            tenant_token: engine.tenant().token.clone(),
            status: engine.status(),
            last_error: engine.core().last_error(),
        }
    }
}
