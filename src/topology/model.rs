use crate::error::{ConductorError, IdentifierKind, Result};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Functional area implemented by a service
///
/// The string form is the path segment used to address the service, e.g.
/// `label-generation`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FunctionIdentifier {
    InstanceManagement,
    UserManagement,
    TenantManagement,
    DeviceManagement,
    DeviceState,
    DeviceRegistration,
    EventManagement,
    EventSources,
    InboundProcessing,
    OutboundConnectors,
    CommandDelivery,
    BatchOperations,
    ScheduleManagement,
    AssetManagement,
    LabelGeneration,
    StreamingMedia,
}

impl FunctionIdentifier {
    /// Look up a function by its path segment
    pub fn from_path(path: &str) -> Result<Self> {
        path.parse()
            .map_err(|_| ConductorError::invalid_identifier(IdentifierKind::Function, path))
    }

    pub fn path(self) -> String {
        self.to_string()
    }

    /// Global services host no tenant engines
    pub fn is_global(self) -> bool {
        matches!(
            self,
            Self::InstanceManagement | Self::UserManagement | Self::TenantManagement
        )
    }

    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

/// A tenant record resolved from its token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub id: String,
    pub token: String,
    pub name: String,
}

impl TenantRef {
    pub fn new(id: impl Into<String>, token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            name: name.into(),
        }
    }
}

/// A running service instance that can be reached over its management port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub instance_id: String,
    pub function: FunctionIdentifier,
    pub host: String,
}

impl InstanceRef {
    pub fn new(
        instance_id: impl Into<String>,
        function: FunctionIdentifier,
        host: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            function,
            host: host.into(),
        }
    }
}
