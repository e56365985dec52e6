use crate::topology::{FunctionIdentifier, TenantRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Tenant half of a script scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TenantScope {
    Global,
    Tenant(String),
}

/// Namespace scripts live in: a function plus either one tenant or global
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptScope {
    pub function: FunctionIdentifier,
    pub tenant: TenantScope,
}

impl ScriptScope {
    pub fn global(function: FunctionIdentifier) -> Self {
        Self {
            function,
            tenant: TenantScope::Global,
        }
    }

    /// Scope of a tenant that has already been resolved
    pub fn for_tenant(function: FunctionIdentifier, tenant: &TenantRef) -> Self {
        Self {
            function,
            tenant: TenantScope::Tenant(tenant.id.clone()),
        }
    }
}

impl fmt::Display for ScriptScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant {
            TenantScope::Global => write!(f, "{}/global", self.function),
            TenantScope::Tenant(id) => write!(f, "{}/tenant/{}", self.function, id),
        }
    }
}

/// How `create` detects duplicate scripts within one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ScriptUniqueness {
    /// Script names are unique per scope
    #[default]
    ByName,
    /// No duplicate detection
    Unchecked,
}

/// Immutable content of one script version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptVersion {
    pub version_id: String,
    pub content: Vec<u8>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScriptVersion {
    pub(crate) fn new(content: Vec<u8>, comment: Option<String>) -> Self {
        Self {
            version_id: Uuid::new_v4().to_string(),
            content,
            comment,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> ScriptVersionSummary {
        ScriptVersionSummary {
            version_id: self.version_id.clone(),
            comment: self.comment.clone(),
            created_at: self.created_at,
        }
    }
}

/// Version entry listed on [`ScriptMetadata`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptVersionSummary {
    pub version_id: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMetadata {
    pub script_id: String,
    pub name: String,
    pub description: Option<String>,
    pub active_version_id: Option<String>,
    /// Oldest first
    pub versions: Vec<ScriptVersionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScriptMetadata {
    pub fn latest_version(&self) -> Option<&ScriptVersionSummary> {
        self.versions.last()
    }

    pub fn has_version(&self, version_id: &str) -> bool {
        self.versions.iter().any(|v| v.version_id == version_id)
    }

    pub fn is_active(&self, version_id: &str) -> bool {
        self.active_version_id.as_deref() == Some(version_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: Vec<u8>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ScriptCreateRequest {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            description: None,
            content: content.into(),
            comment: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// New content atop an existing version, with optional metadata edits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptUpdateRequest {
    pub content: Vec<u8>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ScriptUpdateRequest {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            comment: None,
            name: None,
            description: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
