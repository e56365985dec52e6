//! Activation Module
//!
//! After a script version is activated in the store, every running instance
//! of the owning function is told to reload it. Delivery is at-least-once
//! and best-effort: the store stays the source of truth, and receivers apply
//! notifications idempotently.

mod bus;
mod cache;

pub use bus::ActivationBus;
pub use cache::{ActiveScript, ActiveScriptCache};

use crate::error::Result;
use crate::script::{ScriptScope, TenantScope};
use crate::topology::FunctionIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A script version became active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationNotification {
    pub function: FunctionIdentifier,
    pub tenant: TenantScope,
    pub script_id: String,
    pub version_id: String,
    pub activated_at: DateTime<Utc>,
}

impl ActivationNotification {
    pub fn new(scope: &ScriptScope, script_id: &str, version_id: &str) -> Self {
        Self {
            function: scope.function,
            tenant: scope.tenant.clone(),
            script_id: script_id.to_string(),
            version_id: version_id.to_string(),
            activated_at: Utc::now(),
        }
    }

    pub fn scope(&self) -> ScriptScope {
        ScriptScope {
            function: self.function,
            tenant: self.tenant.clone(),
        }
    }
}

/// Fire-and-forget fan-out of activation notifications
///
/// `broadcast` must not wait for receivers; an `Err` only means the
/// notification could not be handed to the transport.
pub trait ActivationBroadcaster: Send + Sync {
    fn broadcast(&self, notification: ActivationNotification) -> Result<()>;
}
