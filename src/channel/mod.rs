//! Management Channel Module
//!
//! Scoped, per-call connections to the management interface of a sibling
//! service instance. A channel is a lifecycle component whose hooks open and
//! close the transport; [`LeaseManager`] hands them out as
//! [`ManagementChannelLease`]s that are always torn down after use.
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::channel::LeaseManager;
//! use conductor::topology::FunctionIdentifier;
//!
//! let model = leases
//!     .with_lease(FunctionIdentifier::LabelGeneration, |channel| async move {
//!         channel.configuration_model().await
//!     })
//!     .await?;
//! ```

mod lease;

pub use lease::{LeaseManager, ManagementChannelLease};

use crate::config::RuntimeConfig;
use crate::configuration::ConfigurationModel;
use crate::error::Result;
use crate::lifecycle::{AsLifecycle, LifecycleComponent};
use crate::topology::{FunctionIdentifier, InstanceRef};
use async_trait::async_trait;
use std::sync::Arc;

/// Connection settings shared by every channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub management_port: u16,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            management_port: 9000,
        }
    }
}

impl ChannelSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            management_port: config.management_port,
        }
    }

    /// `host:port` of the management endpoint of `instance`
    pub fn endpoint(&self, instance: &InstanceRef) -> String {
        format!("{}:{}", instance.host, self.management_port)
    }
}

/// Transport to the management interface of one remote service
///
/// Usable only while `Started`.
#[async_trait]
pub trait ManagementChannel: LifecycleComponent + AsLifecycle {
    fn target(&self) -> FunctionIdentifier;

    /// Schema of the remote service's configuration documents
    async fn configuration_model(&self) -> Result<ConfigurationModel>;
}

/// Builds a fresh, `Created` channel for every lease
pub trait ChannelFactory: Send + Sync {
    fn create_channel(
        &self,
        instance: &InstanceRef,
        settings: &ChannelSettings,
    ) -> Result<Arc<dyn ManagementChannel>>;
}
