//! # Conductor
//!
//! Runtime backbone for a multi-tenant, multi-service platform.
//!
//! Conductor drives components through a shared lifecycle state machine,
//! hosts one engine per tenant inside each service, leases short-lived
//! management channels to sibling instances, and keeps a versioned script
//! catalog whose activations are broadcast to every running instance.
//!
//! ## Features
//!
//! - **Lifecycle orchestration**: composite steps with required and optional
//!   sub-components, best-effort teardown and progress tracking
//! - **Multi-tenant services**: tenant engines created from the topology and
//!   added or removed at runtime
//! - **Management channel leasing**: a channel is started for one call and
//!   always torn down afterwards, even when the caller is cancelled
//! - **Script versions**: create, update, clone, activate and delete scripts
//!   per function and tenant
//! - **Activation broadcast**: idempotent reload of the active version on the
//!   receiving side
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::prelude::*;
//! use conductor::script::{InMemoryScriptRepository, ScriptCreateRequest, ScriptScope};
//! use conductor::topology::{FunctionIdentifier, InMemoryTopology};
//!
//! #[tokio::main]
//! async fn main() -> conductor::Result<()> {
//!     let config = RuntimeConfig::from_env()?;
//!     conductor::telemetry::init_tracing(&config.log_filter);
//!
//!     let bus = ActivationBus::new(config.activation_capacity);
//!     let store = Arc::new(ScriptStore::new(
//!         Arc::new(InMemoryScriptRepository::new()),
//!         Arc::new(InMemoryTopology::new()),
//!         Arc::new(bus.clone()),
//!         config.script_uniqueness,
//!     ));
//!
//!     // Running instances keep the active version loaded
//!     let cache = Arc::new(ActiveScriptCache::new(
//!         FunctionIdentifier::LabelGeneration,
//!         Arc::clone(&store),
//!     ));
//!     Arc::clone(&cache).spawn_listener(bus.subscribe(FunctionIdentifier::LabelGeneration));
//!
//!     let scope = ScriptScope::global(FunctionIdentifier::LabelGeneration);
//!     let script = store
//!         .create(&scope, ScriptCreateRequest::new("qr-code", "render(qr)"))
//!         .await?;
//!     store
//!         .activate(&scope, &script.script_id, &script.versions[0].version_id)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod activation;
pub mod channel;
pub mod config;
pub mod configuration;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod script;
pub mod service;
pub mod telemetry;
pub mod topology;

mod lock;

#[cfg(test)]
mod testing;

// Re-export core types
pub use error::{ConductorError, IdentifierKind, Result};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use conductor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::{
        ActivationBroadcaster, ActivationBus, ActivationNotification, ActiveScriptCache,
    };
    pub use crate::channel::{ChannelFactory, ChannelSettings, LeaseManager, ManagementChannel};
    pub use crate::config::{ConfigService, RuntimeConfig};
    pub use crate::error::{ConductorError, Result};
    pub use crate::instance::InstanceManagement;
    pub use crate::lifecycle::{
        AsLifecycle, CompositeStep, ExecutionMode, LifecycleComponent, LifecycleCore,
        LifecycleError, LifecycleOperation, LifecycleStatus, ProgressMonitor, ServiceRegistry,
        ShutdownHandler, shutdown_signal,
    };
    pub use crate::script::{ScriptStore, ScriptUniqueness};
    pub use crate::service::{EngineFactory, EnginePolicy, Service, TenantEngine};
    pub use crate::topology::{FunctionIdentifier, TenantRef, TopologyResolver};
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
