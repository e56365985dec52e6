//! Script Module
//!
//! Versioned script catalog scoped by function and tenant. Every script keeps
//! its immutable versions and at most one active version; activation is
//! published through an [`ActivationBroadcaster`](crate::activation::ActivationBroadcaster)
//! so running instances reload the new content.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::script::{ScriptCreateRequest, ScriptUpdateRequest};
//!
//! let scope = store.resolve_scope(FunctionIdentifier::LabelGeneration, Some("acme")).await?;
//! let created = store.create(&scope, ScriptCreateRequest::new("S", "v1")).await?;
//! let v1 = created.versions[0].version_id.clone();
//!
//! let updated = store
//!     .update(&scope, &created.script_id, &v1, ScriptUpdateRequest::new("v2").comment("fix"))
//!     .await?;
//! let v2 = updated.latest_version().unwrap().version_id.clone();
//! store.activate(&scope, &created.script_id, &v2).await?;
//! ```

mod model;
mod repository;
mod store;

pub use model::{
    ScriptCreateRequest, ScriptMetadata, ScriptScope, ScriptUniqueness, ScriptUpdateRequest,
    ScriptVersion, ScriptVersionSummary, TenantScope,
};
pub use repository::{InMemoryScriptRepository, ScriptRepository};
pub use store::ScriptStore;
