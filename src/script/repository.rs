use super::{ScriptMetadata, ScriptScope, ScriptVersion};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Record storage for scripts, keyed by scope, script id and version id
///
/// Records are replaced whole; readers receive shared snapshots and never
/// observe a partial write.
#[async_trait]
pub trait ScriptRepository: Send + Sync {
    async fn list_metadata(&self, scope: &ScriptScope) -> Result<Vec<Arc<ScriptMetadata>>>;

    async fn get_metadata(
        &self,
        scope: &ScriptScope,
        script_id: &str,
    ) -> Result<Option<Arc<ScriptMetadata>>>;

    async fn put_metadata(&self, scope: &ScriptScope, metadata: ScriptMetadata) -> Result<()>;

    async fn remove_metadata(
        &self,
        scope: &ScriptScope,
        script_id: &str,
    ) -> Result<Option<Arc<ScriptMetadata>>>;

    async fn get_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Option<Arc<ScriptVersion>>>;

    async fn put_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version: ScriptVersion,
    ) -> Result<()>;

    async fn remove_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Option<Arc<ScriptVersion>>>;

    /// Remove every version of a script, returning how many were removed
    async fn remove_versions(&self, scope: &ScriptScope, script_id: &str) -> Result<usize>;
}

type MetadataKey = (ScriptScope, String);
type VersionKey = (ScriptScope, String, String);

/// In-memory script records
#[derive(Clone, Default)]
pub struct InMemoryScriptRepository {
    metadata: Arc<DashMap<MetadataKey, Arc<ScriptMetadata>>>,
    versions: Arc<DashMap<VersionKey, Arc<ScriptVersion>>>,
}

impl InMemoryScriptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

#[async_trait]
impl ScriptRepository for InMemoryScriptRepository {
    async fn list_metadata(&self, scope: &ScriptScope) -> Result<Vec<Arc<ScriptMetadata>>> {
        let mut scripts: Vec<Arc<ScriptMetadata>> = self
            .metadata
            .iter()
            .filter(|entry| &entry.key().0 == scope)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        scripts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.script_id.cmp(&b.script_id))
        });
        Ok(scripts)
    }

    async fn get_metadata(
        &self,
        scope: &ScriptScope,
        script_id: &str,
    ) -> Result<Option<Arc<ScriptMetadata>>> {
        Ok(self
            .metadata
            .get(&(scope.clone(), script_id.to_string()))
            .map(|entry| Arc::clone(entry.value())))
    }

    async fn put_metadata(&self, scope: &ScriptScope, metadata: ScriptMetadata) -> Result<()> {
        self.metadata.insert(
            (scope.clone(), metadata.script_id.clone()),
            Arc::new(metadata),
        );
        Ok(())
    }

    async fn remove_metadata(
        &self,
        scope: &ScriptScope,
        script_id: &str,
    ) -> Result<Option<Arc<ScriptMetadata>>> {
        Ok(self
            .metadata
            .remove(&(scope.clone(), script_id.to_string()))
            .map(|(_, metadata)| metadata))
    }

    async fn get_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Option<Arc<ScriptVersion>>> {
        Ok(self
            .versions
            .get(&(scope.clone(), script_id.to_string(), version_id.to_string()))
            .map(|entry| Arc::clone(entry.value())))
    }

    async fn put_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version: ScriptVersion,
    ) -> Result<()> {
        self.versions.insert(
            (
                scope.clone(),
                script_id.to_string(),
                version.version_id.clone(),
            ),
            Arc::new(version),
        );
        Ok(())
    }

    async fn remove_version(
        &self,
        scope: &ScriptScope,
        script_id: &str,
        version_id: &str,
    ) -> Result<Option<Arc<ScriptVersion>>> {
        Ok(self
            .versions
            .remove(&(scope.clone(), script_id.to_string(), version_id.to_string()))
            .map(|(_, version)| version))
    }

    async fn remove_versions(&self, scope: &ScriptScope, script_id: &str) -> Result<usize> {
        let mut removed = 0;
        self.versions.retain(|(s, id, _), _| {
            let keep = !(s == scope && id == script_id);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
