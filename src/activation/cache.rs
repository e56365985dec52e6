use super::ActivationNotification;
use crate::error::Result;
use crate::lock::{KeyedGuard, LockMap};
use crate::script::{ScriptScope, ScriptStore, TenantScope};
use crate::topology::FunctionIdentifier;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Content of the active version of one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveScript {
    pub script_id: String,
    pub version_id: String,
    pub content: Arc<Vec<u8>>,
}

/// Active script contents held by one running instance
///
/// Notifications only trigger a reload; the version loaded is always the
/// store's current active version, so duplicate, late or out-of-order
/// notifications cannot move the cache backwards. Reloads of one script are
/// serialized, so a slow reload never overwrites a later one. Applying a
/// notification for the version already loaded is a no-op.
pub struct ActiveScriptCache {
    function: FunctionIdentifier,
    store: Arc<ScriptStore>,
    entries: DashMap<(TenantScope, String), ActiveScript>,
    reloading: LockMap<(TenantScope, String)>,
    reloads: AtomicUsize,
}

impl ActiveScriptCache {
    pub fn new(function: FunctionIdentifier, store: Arc<ScriptStore>) -> Self {
        Self {
            function,
            store,
            entries: DashMap::new(),
            reloading: DashMap::new(),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn function(&self) -> FunctionIdentifier {
        self.function
    }

    /// Number of times content was (re)loaded from the store
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Cached entry, without consulting the store
    pub fn cached(&self, scope: &ScriptScope, script_id: &str) -> Option<ActiveScript> {
        self.entries
            .get(&(scope.tenant.clone(), script_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Apply one notification, returning whether the cache changed
    pub async fn apply(&self, notification: &ActivationNotification) -> Result<bool> {
        if notification.function != self.function {
            return Ok(false);
        }
        let scope = notification.scope();
        if let Some(current) = self.cached(&scope, &notification.script_id) {
            if current.version_id == notification.version_id {
                tracing::debug!(
                    "Script {} already at version {}",
                    notification.script_id,
                    notification.version_id
                );
                return Ok(false);
            }
        }
        self.reload(&scope, &notification.script_id).await
    }

    /// Active script content, read from the store on a miss
    pub async fn active(&self, scope: &ScriptScope, script_id: &str) -> Result<Option<ActiveScript>> {
        if let Some(entry) = self.cached(scope, script_id) {
            return Ok(Some(entry));
        }
        self.reload(scope, script_id).await?;
        Ok(self.cached(scope, script_id))
    }

    /// Re-read every cached script from the store
    pub async fn resync(&self) -> Result<usize> {
        let keys: Vec<(TenantScope, String)> =
            self.entries.iter().map(|entry| entry.key().clone()).collect();

        let mut changed = 0;
        for (tenant, script_id) in keys {
            let scope = ScriptScope {
                function: self.function,
                tenant,
            };
            if self.reload(&scope, &script_id).await? {
                changed += 1;
            }
        }
        tracing::info!("Resynchronized {} active scripts ({} changed)", self.function, changed);
        Ok(changed)
    }

    /// Apply notifications from `receiver` until the channel closes
    ///
    /// A lagged receiver has missed notifications and triggers a full
    /// [`resync`](Self::resync).
    pub fn spawn_listener(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<ActivationNotification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(notification) => {
                        if let Err(e) = self.apply(&notification).await {
                            tracing::warn!(
                                "Unable to reload script {}: {}",
                                notification.script_id,
                                e
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            "Missed {} activation notifications for {}, resynchronizing",
                            missed,
                            self.function
                        );
                        if let Err(e) = self.resync().await {
                            tracing::warn!("Unable to resynchronize active scripts: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Activation listener for {} stopped", self.function);
        })
    }

    async fn reload(&self, scope: &ScriptScope, script_id: &str) -> Result<bool> {
        let key = (scope.tenant.clone(), script_id.to_string());
        let _guard = KeyedGuard::acquire(&self.reloading, key.clone()).await;

        let metadata = match self.store.get_metadata(scope, script_id).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return Ok(self.entries.remove(&key).is_some()),
            Err(e) => return Err(e),
        };
        let Some(version_id) = metadata.active_version_id else {
            return Ok(self.entries.remove(&key).is_some());
        };
        if self
            .entries
            .get(&key)
            .is_some_and(|entry| entry.version_id == version_id)
        {
            return Ok(false);
        }

        let version = self.store.get_version(scope, script_id, &version_id).await?;
        self.entries.insert(
            key,
            ActiveScript {
                script_id: script_id.to_string(),
                version_id: version.version_id,
                content: Arc::new(version.content),
            },
        );
        self.reloads.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "Loaded version {} of script {} ({})",
            version_id,
            script_id,
            scope
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationBus;
    use crate::script::{
        InMemoryScriptRepository, ScriptCreateRequest, ScriptMetadata, ScriptRepository,
        ScriptUniqueness, ScriptUpdateRequest, ScriptVersion,
    };
    use crate::testing::wait_until;
    use crate::topology::InMemoryTopology;
    use async_trait::async_trait;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Repository whose reads of one version are slow
    #[derive(Default)]
    struct SlowVersionRepository {
        inner: InMemoryScriptRepository,
        slow_version: Mutex<Option<String>>,
    }

    impl SlowVersionRepository {
        fn delay(&self, version_id: &str) {
            *self
                .slow_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(version_id.to_string());
        }
    }

    #[async_trait]
    impl ScriptRepository for SlowVersionRepository {
        async fn list_metadata(&self, scope: &ScriptScope) -> Result<Vec<Arc<ScriptMetadata>>> {
            self.inner.list_metadata(scope).await
        }

        async fn get_metadata(
            &self,
            scope: &ScriptScope,
            script_id: &str,
        ) -> Result<Option<Arc<ScriptMetadata>>> {
            self.inner.get_metadata(scope, script_id).await
        }

        async fn put_metadata(&self, scope: &ScriptScope, metadata: ScriptMetadata) -> Result<()> {
            self.inner.put_metadata(scope, metadata).await
        }

        async fn remove_metadata(
            &self,
            scope: &ScriptScope,
            script_id: &str,
        ) -> Result<Option<Arc<ScriptMetadata>>> {
            self.inner.remove_metadata(scope, script_id).await
        }

        async fn get_version(
            &self,
            scope: &ScriptScope,
            script_id: &str,
            version_id: &str,
        ) -> Result<Option<Arc<ScriptVersion>>> {
            let slow = self
                .slow_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_deref()
                == Some(version_id);
            if slow {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.get_version(scope, script_id, version_id).await
        }

        async fn put_version(
            &self,
            scope: &ScriptScope,
            script_id: &str,
            version: ScriptVersion,
        ) -> Result<()> {
            self.inner.put_version(scope, script_id, version).await
        }

        async fn remove_version(
            &self,
            scope: &ScriptScope,
            script_id: &str,
            version_id: &str,
        ) -> Result<Option<Arc<ScriptVersion>>> {
            self.inner.remove_version(scope, script_id, version_id).await
        }

        async fn remove_versions(&self, scope: &ScriptScope, script_id: &str) -> Result<usize> {
            self.inner.remove_versions(scope, script_id).await
        }
    }

    async fn setup(bus: &ActivationBus) -> (Arc<ScriptStore>, ScriptScope, String, String, String) {
        setup_with(bus, Arc::new(InMemoryScriptRepository::new())).await
    }

    async fn setup_with(
        bus: &ActivationBus,
        repository: Arc<dyn ScriptRepository>,
    ) -> (Arc<ScriptStore>, ScriptScope, String, String, String) {
        let store = Arc::new(ScriptStore::new(
            repository,
            Arc::new(InMemoryTopology::new()),
            Arc::new(bus.clone()),
            ScriptUniqueness::ByName,
        ));
        let scope = ScriptScope::global(FunctionIdentifier::LabelGeneration);
        let created = store
            .create(&scope, ScriptCreateRequest::new("S", "v1"))
            .await
            .unwrap();
        let v1 = created.versions[0].version_id.clone();
        let v2 = store
            .update(&scope, &created.script_id, &v1, ScriptUpdateRequest::new("v2"))
            .await
            .unwrap()
            .latest_version()
            .unwrap()
            .version_id
            .clone();
        (store, scope, created.script_id, v1, v2)
    }

    #[tokio::test]
    async fn test_repeated_notification_is_noop() {
        let bus = ActivationBus::default();
        let (store, scope, id, _, v2) = setup(&bus).await;
        let cache = ActiveScriptCache::new(FunctionIdentifier::LabelGeneration, Arc::clone(&store));

        store.activate(&scope, &id, &v2).await.unwrap();
        let notification = ActivationNotification::new(&scope, &id, &v2);

        assert!(cache.apply(&notification).await.unwrap());
        assert!(!cache.apply(&notification).await.unwrap());
        assert_eq!(cache.reload_count(), 1);
        let active = cache.cached(&scope, &id).unwrap();
        assert_eq!(active.version_id, v2);
        assert_eq!(active.content.as_slice(), b"v2");
    }

    #[tokio::test]
    async fn test_stale_notification_keeps_current_version() {
        let bus = ActivationBus::default();
        let (store, scope, id, v1, v2) = setup(&bus).await;
        let cache = ActiveScriptCache::new(FunctionIdentifier::LabelGeneration, Arc::clone(&store));

        store.activate(&scope, &id, &v1).await.unwrap();
        store.activate(&scope, &id, &v2).await.unwrap();

        // v1's notification arrives late
        cache
            .apply(&ActivationNotification::new(&scope, &id, &v1))
            .await
            .unwrap();
        assert_eq!(cache.cached(&scope, &id).unwrap().version_id, v2);
    }

    #[tokio::test]
    async fn test_missed_notification_is_read_from_store() {
        let bus = ActivationBus::default();
        let (store, scope, id, _, v2) = setup(&bus).await;
        let cache = ActiveScriptCache::new(FunctionIdentifier::LabelGeneration, Arc::clone(&store));

        assert_eq!(cache.active(&scope, &id).await.unwrap(), None);
        store.activate(&scope, &id, &v2).await.unwrap();
        assert_eq!(cache.active(&scope, &id).await.unwrap().unwrap().version_id, v2);

        store.delete(&scope, &id).await.unwrap();
        assert_eq!(cache.resync().await.unwrap(), 1);
        assert!(cache.cached(&scope, &id).is_none());
    }

    #[tokio::test]
    async fn test_listener_applies_broadcasts() {
        let bus = ActivationBus::default();
        let (store, scope, id, _, v2) = setup(&bus).await;
        let cache = Arc::new(ActiveScriptCache::new(
            FunctionIdentifier::LabelGeneration,
            Arc::clone(&store),
        ));
        let listener = Arc::clone(&cache)
            .spawn_listener(bus.subscribe(FunctionIdentifier::LabelGeneration));

        store.activate(&scope, &id, &v2).await.unwrap();
        assert!(wait_until(|| cache.cached(&scope, &id).is_some()).await);
        assert_eq!(cache.cached(&scope, &id).unwrap().version_id, v2);

        drop(bus);
        drop(store);
        listener.abort();
    }

    #[tokio::test]
    async fn test_lagged_listener_resyncs() {
        let bus = ActivationBus::new(1);
        let (store, scope, id, v1, v2) = setup(&bus).await;
        let cache = Arc::new(ActiveScriptCache::new(
            FunctionIdentifier::LabelGeneration,
            Arc::clone(&store),
        ));
        let receiver = bus.subscribe(FunctionIdentifier::LabelGeneration);

        store.activate(&scope, &id, &v1).await.unwrap();
        cache.active(&scope, &id).await.unwrap();

        // Overflow the one-slot channel before the listener runs
        store.activate(&scope, &id, &v2).await.unwrap();
        store.activate(&scope, &id, &v1).await.unwrap();
        store.activate(&scope, &id, &v2).await.unwrap();

        let listener = Arc::clone(&cache).spawn_listener(receiver);
        assert!(wait_until(|| cache
            .cached(&scope, &id)
            .is_some_and(|active| active.version_id == v2))
        .await);
        listener.abort();
    }

    #[tokio::test]
    async fn test_slow_reload_does_not_overwrite_newer_version() {
        let bus = ActivationBus::default();
        let repository = Arc::new(SlowVersionRepository::default());
        let (store, scope, id, v1, v2) = setup_with(&bus, repository.clone()).await;
        store.activate(&scope, &id, &v1).await.unwrap();
        repository.delay(&v1);
        let cache = Arc::new(ActiveScriptCache::new(
            FunctionIdentifier::LabelGeneration,
            Arc::clone(&store),
        ));

        let reader = {
            let cache = Arc::clone(&cache);
            let scope = scope.clone();
            let id = id.clone();
            tokio::spawn(async move { cache.active(&scope, &id).await })
        };
        // The reader is still loading v1's content
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.activate(&scope, &id, &v2).await.unwrap();
        cache
            .apply(&ActivationNotification::new(&scope, &id, &v2))
            .await
            .unwrap();
        reader.await.unwrap().unwrap();

        assert_eq!(cache.cached(&scope, &id).unwrap().version_id, v2);
        assert_eq!(cache.cached(&scope, &id).unwrap().content.as_slice(), b"v2");
    }
}
