//! Lifecycle Orchestration Module
//!
//! This module provides the state machine shared by every manageable entity
//! (services, tenant engines, management channels) and the composite executor
//! that drives groups of them through a phase.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration Loading
//!    ↓
//! 2. Registry Assembly (explicit, no globals)
//!    ↓
//! 3. Initialize composite (each component, declared order)   ← Propagate
//!    ↓
//! 4. Start composite (each component, declared order)        ← Propagate
//!    ↓
//! [Running...]
//!    ↓
//! 5. Shutdown Signal (SIGTERM/SIGINT)
//!    ↓
//! 6. Stop composite (reverse order)                          ← BestEffort
//!    ↓
//! 7. Terminate composite (reverse order)                     ← BestEffort
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::lifecycle::{LifecycleComponent, LifecycleCore, LifecycleError, ProgressMonitor};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService {
//!     core: LifecycleCore,
//! }
//!
//! #[async_trait]
//! impl LifecycleComponent for DatabaseService {
//!     fn core(&self) -> &LifecycleCore {
//!         &self.core
//!     }
//!
//!     async fn on_initialize(&self, _monitor: &ProgressMonitor) -> Result<(), LifecycleError> {
//!         tracing::info!("Initializing database connection");
//!         Ok(())
//!     }
//!
//!     async fn on_terminate(&self, _monitor: &ProgressMonitor) -> Result<(), LifecycleError> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//! ```

mod composite;
mod error;
mod monitor;
mod registry;
mod shutdown;
mod state;
mod traits;

pub use composite::{CompositeReport, CompositeStep, ExecutionMode, StepFailure};
pub use error::{LifecycleError, Result};
pub use monitor::{ProgressContext, ProgressMonitor};
pub use registry::{ServiceRegistry, ServiceRegistryBuilder};
pub use shutdown::{ShutdownHandler, shutdown_signal};
pub use state::{LifecycleOperation, LifecycleStatus};
pub use traits::{AsLifecycle, LifecycleComponent, LifecycleCore, run_transition};
