use super::{
    ScriptCreateRequest, ScriptMetadata, ScriptRepository, ScriptScope, ScriptUniqueness,
    ScriptUpdateRequest, ScriptVersion,
};
use crate::activation::{ActivationBroadcaster, ActivationNotification};
use crate::error::{ConductorError, IdentifierKind, Result};
use crate::lock::{KeyedGuard, LockMap};
use crate::topology::{FunctionIdentifier, TopologyResolver};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Versioned script catalog
///
/// Mutations of one script (`update`, `clone`, `activate`, `delete`,
/// `delete_version`) are serialized by a per-script lock; mutations of
/// different scripts run independently. `create` and renames hold a
/// per-scope lock while checking name uniqueness. Reads take no lock.
///
/// New versions are written before the metadata that lists them, and
/// metadata is removed before its versions, so a reader never finds a listed
/// version missing.
pub struct ScriptStore {
    repository: Arc<dyn ScriptRepository>,
    topology: Arc<dyn TopologyResolver>,
    broadcaster: Arc<dyn ActivationBroadcaster>,
    uniqueness: ScriptUniqueness,
    script_locks: LockMap<(ScriptScope, String)>,
    scope_locks: LockMap<ScriptScope>,
}

impl ScriptStore {
    pub fn new(
        repository: Arc<dyn ScriptRepository>,
        topology: Arc<dyn TopologyResolver>,
        broadcaster: Arc<dyn ActivationBroadcaster>,
        uniqueness: ScriptUniqueness,
    ) -> Self {
        Self {
            repository,
            topology,
            broadcaster,
            uniqueness,
            script_locks: DashMap::new(),
            scope_locks: DashMap::new(),
        }
    }

    pub fn uniqueness(&self) -> ScriptUniqueness {
        self.uniqueness
    }

    /// Resolve the scope for `function`, global when `tenant_token` is `None`
    ///
    /// An unknown tenant token fails with
    /// [`ConductorError::InvalidIdentifier`].
    pub async fn resolve_scope(
        &self,
        function: FunctionIdentifier,
        tenant_token: Option<&str>,
    ) -> Result<ScriptScope> {
        let Some(token) = tenant_token else {
            return Ok(ScriptScope::global(function));
        };
        let tenant = self
            .topology
            .resolve_tenant(token)
            .await?
            .ok_or_else(|| ConductorError::invalid_identifier(IdentifierKind::TenantToken, token))?;
        Ok(ScriptScope::for_tenant(function, &tenant))
    }

    pub async fn list(&self, scope: &ScriptScope) -> Result<Vec<ScriptMetadata>> {
        Ok(self
            .repository
            .list_metadata(scope)
            .await?
            .iter()
            .map(|metadata| ScriptMetadata::clone(metadata))
            .collect())
    }

    pub async fn get_metadata(&self, scope: &ScriptScope, script_id: &str) -> Result<ScriptMetadata> {
        Ok(ScriptMetadata::clone(&*self.load_metadata(scope, script_id).await?))
    }

    pub async fn get_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptVersion> {
        self.load_metadata(scope, script_id).await?;
        let version = self.load_version(scope, script_id, version_id).await?;
        Ok(ScriptVersion::clone(&version))
    }

    pub async fn get_content(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Vec<u8>> {
        Ok(self.get_version(scope, script_id, version_id).await?.content)
    }

    /// Create a script with one initial version, which is not active
    pub async fn create(
        &self,
        scope: &ScriptScope,
        request: ScriptCreateRequest,
    ) -> Result<ScriptMetadata> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ConductorError::InvalidRequest(
                "Script name must not be empty".to_string(),
            ));
        }

        let _scope_guard = self.scope_lock(scope).await;
        self.ensure_unique_name(scope, &name, None).await?;

        let version = ScriptVersion::new(request.content, request.comment);
        let now = Utc::now();
        let metadata = ScriptMetadata {
            script_id: uuid::Uuid::new_v4().to_string(),
            name,
            description: request.description,
            active_version_id: None,
            versions: vec![version.summary()],
            created_at: now,
            updated_at: now,
        };

        self.repository
            .put_version(scope, &metadata.script_id, version)
            .await?;
        self.repository.put_metadata(scope, metadata.clone()).await?;

        tracing::info!(
            "Created script {} ({}) in {}",
            metadata.name,
            metadata.script_id,
            scope
        );
        Ok(metadata)
    }

    /// Add a version atop `version_id`; the new version becomes the latest
    /// but is not activated
    pub async fn update(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
        request: ScriptUpdateRequest,
    ) -> Result<ScriptMetadata> {
        let rename = match request.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ConductorError::InvalidRequest(
                    "Script name must not be empty".to_string(),
                ));
            }
            Some(name) => Some(name.to_string()),
            None => None,
        };
        // Lock order: scope, then script
        let _scope_guard = match rename {
            Some(_) => Some(self.scope_lock(scope).await),
            None => None,
        };
        let _guard = self.script_lock(scope, script_id).await;

        let mut metadata = ScriptMetadata::clone(&*self.load_metadata(scope, script_id).await?);
        self.load_version(scope, script_id, version_id).await?;
        if let Some(name) = &rename {
            if name != &metadata.name {
                self.ensure_unique_name(scope, name, Some(script_id)).await?;
            }
        }

        let version = ScriptVersion::new(request.content, request.comment);
        metadata.versions.push(version.summary());
        metadata.updated_at = version.created_at;
        if let Some(name) = rename {
            metadata.name = name;
        }
        if let Some(description) = request.description {
            metadata.description = Some(description);
        }

        self.repository.put_version(scope, script_id, version).await?;
        self.repository.put_metadata(scope, metadata.clone()).await?;

        tracing::info!("Updated script {} in {}", script_id, scope);
        Ok(metadata)
    }

    /// Copy the content of `version_id` into a new version
    pub async fn clone_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
        comment: Option<String>,
    ) -> Result<ScriptVersion> {
        let _guard = self.script_lock(scope, script_id).await;

        let mut metadata = ScriptMetadata::clone(&*self.load_metadata(scope, script_id).await?);
        let source = self.load_version(scope, script_id, version_id).await?;

        let version = ScriptVersion::new(source.content.clone(), comment);
        metadata.versions.push(version.summary());
        metadata.updated_at = version.created_at;

        self.repository
            .put_version(scope, script_id, version.clone())
            .await?;
        self.repository.put_metadata(scope, metadata).await?;

        tracing::info!(
            "Cloned version {} of script {} as {} in {}",
            version_id,
            script_id,
            version.version_id,
            scope
        );
        Ok(version)
    }

    /// Make `version_id` the active version and notify running instances
    ///
    /// The store is updated first; the broadcast is best-effort and a
    /// failure to publish is only logged.
    pub async fn activate(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptMetadata> {
        let _guard = self.script_lock(scope, script_id).await;

        let mut metadata = ScriptMetadata::clone(&*self.load_metadata(scope, script_id).await?);
        if !metadata.has_version(version_id) {
            return Err(ConductorError::not_found("Script version", version_id));
        }
        self.load_version(scope, script_id, version_id).await?;

        metadata.active_version_id = Some(version_id.to_string());
        metadata.updated_at = Utc::now();
        self.repository.put_metadata(scope, metadata.clone()).await?;

        tracing::info!(
            "Activated version {} of script {} in {}",
            version_id,
            script_id,
            scope
        );

        let notification = ActivationNotification::new(scope, script_id, version_id);
        if let Err(e) = self.broadcaster.broadcast(notification) {
            tracing::warn!(
                "Unable to broadcast activation of script {}: {}",
                script_id,
                e
            );
        }
        Ok(metadata)
    }

    /// Delete a script and all its versions, returning the metadata as it
    /// was before deletion
    pub async fn delete(&self, scope: &ScriptScope, script_id: &str) -> Result<ScriptMetadata> {
        let _guard = self.script_lock(scope, script_id).await;

        let metadata = self
            .repository
            .remove_metadata(scope, script_id)
            .await?
            .ok_or_else(|| ConductorError::not_found("Script", script_id))?;
        let removed = self.repository.remove_versions(scope, script_id).await?;

        tracing::info!(
            "Deleted script {} ({} versions) from {}",
            script_id,
            removed,
            scope
        );
        Ok(ScriptMetadata::clone(&metadata))
    }

    /// Delete one version
    ///
    /// The active version and the only remaining version cannot be deleted.
    pub async fn delete_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptVersion> {
        let _guard = self.script_lock(scope, script_id).await;

        let mut metadata = ScriptMetadata::clone(&*self.load_metadata(scope, script_id).await?);
        if !metadata.has_version(version_id) {
            return Err(ConductorError::not_found("Script version", version_id));
        }
        if metadata.is_active(version_id) {
            return Err(ConductorError::Conflict(format!(
                "Version {} is active and cannot be deleted",
                version_id
            )));
        }
        if metadata.versions.len() == 1 {
            return Err(ConductorError::Conflict(format!(
                "Version {} is the only version of script {}",
                version_id, script_id
            )));
        }

        metadata.versions.retain(|v| v.version_id != version_id);
        metadata.updated_at = Utc::now();
        self.repository.put_metadata(scope, metadata).await?;
        let version = self
            .repository
            .remove_version(scope, script_id, version_id)
            .await?
            .ok_or_else(|| ConductorError::not_found("Script version", version_id))?;

        tracing::info!(
            "Deleted version {} of script {} from {}",
            version_id,
            script_id,
            scope
        );
        Ok(ScriptVersion::clone(&version))
    }

    async fn load_metadata(&self, scope: &ScriptScope, script_id: &str) -> Result<Arc<ScriptMetadata>> {
        self.repository
            .get_metadata(scope, script_id)
            .await?
            .ok_or_else(|| ConductorError::not_found("Script", script_id))
    }

    async fn load_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Arc<ScriptVersion>> {
        self.repository
            .get_version(scope, script_id, version_id)
            .await?
            .ok_or_else(|| ConductorError::not_found("Script version", version_id))
    }

    async fn ensure_unique_name(
        &self,
        scope: &ScriptScope,
        name: &str,
        except: Option<&str>,
    ) -> Result<()> {
        if self.uniqueness == ScriptUniqueness::Unchecked {
            return Ok(());
        }
        let taken = self
            .repository
            .list_metadata(scope)
            .await?
            .iter()
            .any(|m| m.name == name && Some(m.script_id.as_str()) != except);
        if taken {
            return Err(ConductorError::Conflict(format!(
                "Script '{}' already exists in {}",
                name, scope
            )));
        }
        Ok(())
    }

    async fn script_lock(
        &self,
        scope: &ScriptScope,
        script_id: &str,
    ) -> KeyedGuard<'_, (ScriptScope, String)> {
        KeyedGuard::acquire(&self.script_locks, (scope.clone(), script_id.to_string())).await
    }

    async fn scope_lock(&self, scope: &ScriptScope) -> KeyedGuard<'_, ScriptScope> {
        KeyedGuard::acquire(&self.scope_locks, scope.clone()).await
    }
}
