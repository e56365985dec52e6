//! Service Module
//!
//! A service instance drives its sub-resources through its own composite
//! steps and, unless its function is global, hosts one engine per tenant.
//!
//! ```text
//! Initialize:  resources (declared order) → engines (tenant order)
//! Start:       resources (declared order) → engines (tenant order)
//! Stop:        engines (reverse) → resources (reverse)      best-effort
//! Terminate:   engines (reverse) → resources (reverse)      best-effort
//! ```

mod engine;
mod multitenant;

pub use engine::{EngineFactory, EnginePolicy, EngineState, TenantEngine};
pub use multitenant::{Service, ServiceBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConductorError;
    use crate::lifecycle::{LifecycleComponent, LifecycleOperation, LifecycleStatus, ProgressMonitor};
    use crate::testing::{FakeEngineFactory, OperationLog, RecordingComponent};
    use crate::topology::{FunctionIdentifier, InMemoryTopology, TenantRef};
    use std::sync::Arc;

    fn topology_with(tokens: &[&str]) -> Arc<InMemoryTopology> {
        let topology = InMemoryTopology::new();
        for token in tokens {
            topology.register_tenant(TenantRef::new(*token, *token, *token));
        }
        Arc::new(topology)
    }

    async fn boot(service: &Service) -> crate::lifecycle::Result<()> {
        let monitor = ProgressMonitor::single("Boot", "test");
        service.initialize(&monitor).await?;
        service.start(&monitor).await
    }

    #[tokio::test]
    async fn test_resources_then_engines_and_reverse_teardown() {
        let log = OperationLog::default();
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .resource(Arc::new(RecordingComponent::with_log("grpc", log.clone())), true)
            .resource(Arc::new(RecordingComponent::with_log("cache", log.clone())), true)
            .engine_factory(Arc::new(FakeEngineFactory::with_log(log.clone())))
            .topology(topology_with(&["acme", "globex"]))
            .build();

        boot(&service).await.unwrap();
        assert_eq!(service.status(), LifecycleStatus::Started);

        let monitor = ProgressMonitor::single("Shutdown", "test");
        service.stop(&monitor).await.unwrap();
        service.terminate(&monitor).await.unwrap();

        assert_eq!(
            log.entries(),
            vec![
                "Initialize grpc",
                "Initialize cache",
                "Initialize engine-acme",
                "Initialize engine-globex",
                "Start grpc",
                "Start cache",
                "Start engine-acme",
                "Start engine-globex",
                "Stop engine-globex",
                "Stop engine-acme",
                "Stop cache",
                "Stop grpc",
                "Terminate engine-globex",
                "Terminate engine-acme",
                "Terminate cache",
                "Terminate grpc",
            ]
        );
        assert_eq!(service.engines().len(), 2);
        assert!(service
            .engines()
            .iter()
            .all(|engine| engine.status() == LifecycleStatus::Terminated));
    }

    #[tokio::test]
    async fn test_engine_failure_is_optional_by_default() {
        let factory = FakeEngineFactory::default().failing_for("acme", LifecycleOperation::Start);
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .resource(Arc::new(RecordingComponent::new("grpc")), true)
            .engine_factory(Arc::new(factory))
            .topology(topology_with(&["acme", "globex"]))
            .build();

        boot(&service).await.unwrap();
        assert_eq!(service.status(), LifecycleStatus::Started);

        let states = service.engine_states();
        assert_eq!(states[0].tenant_token, "acme");
        assert_eq!(states[0].status, LifecycleStatus::Error);
        assert!(states[0].last_error.is_some());
        assert_eq!(states[1].status, LifecycleStatus::Started);
    }

    #[tokio::test]
    async fn test_required_engine_policy_blocks_service() {
        let factory = FakeEngineFactory::default().failing_for("acme", LifecycleOperation::Start);
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .engine_factory(Arc::new(factory))
            .topology(topology_with(&["acme", "globex"]))
            .engine_policy(EnginePolicy::required())
            .build();

        assert!(boot(&service).await.is_err());
        assert_eq!(service.status(), LifecycleStatus::Error);
        // globex sorts after acme and never started
        assert_eq!(
            service.engine("globex").unwrap().status(),
            LifecycleStatus::Initialized
        );
    }

    #[test]
    fn test_builder_takes_configured_policy() {
        let config = crate::config::RuntimeConfig {
            engine_policy: EnginePolicy::required(),
            ..Default::default()
        };
        let service =
            ServiceBuilder::from_config(FunctionIdentifier::LabelGeneration, &config).build();
        assert!(service.engine_policy().required);
    }

    #[tokio::test]
    async fn test_required_resource_failure_fails_service() {
        let service = Service::builder(FunctionIdentifier::DeviceManagement)
            .resource(
                Arc::new(RecordingComponent::failing_on(
                    "grpc",
                    LifecycleOperation::Initialize,
                )),
                true,
            )
            .build();

        let monitor = ProgressMonitor::single("Boot", "test");
        assert!(service.initialize(&monitor).await.is_err());
        assert_eq!(service.status(), LifecycleStatus::Error);
        service.terminate(&monitor).await.unwrap();
        assert_eq!(service.status(), LifecycleStatus::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_after_failed_start_stops_started_children() {
        let log = OperationLog::default();
        let transport = Arc::new(RecordingComponent::with_log("transport", log.clone()));
        let cache = Arc::new(RecordingComponent::failing_with_log(
            "cache",
            LifecycleOperation::Start,
            log.clone(),
        ));
        let service = Service::builder(FunctionIdentifier::DeviceManagement)
            .resource(transport.clone(), true)
            .resource(cache.clone(), true)
            .build();

        assert!(boot(&service).await.is_err());
        assert_eq!(service.status(), LifecycleStatus::Error);
        assert_eq!(transport.status(), LifecycleStatus::Started);

        let monitor = ProgressMonitor::single("Shutdown", "test");
        service.terminate(&monitor).await.unwrap();

        assert_eq!(service.status(), LifecycleStatus::Terminated);
        assert_eq!(transport.status(), LifecycleStatus::Terminated);
        assert_eq!(cache.status(), LifecycleStatus::Terminated);
        let entries = log.entries();
        assert_eq!(
            &entries[entries.len() - 3..],
            ["Stop transport", "Terminate cache", "Terminate transport"]
        );
    }

    #[tokio::test]
    async fn test_tenant_added_while_stopped_starts_with_service() {
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .engine_factory(Arc::new(FakeEngineFactory::default()))
            .build();
        boot(&service).await.unwrap();
        let monitor = ProgressMonitor::single("Restart", "test");
        service.stop(&monitor).await.unwrap();

        let engine = service
            .add_tenant(&TenantRef::new("t-9", "initech", "Initech"))
            .await
            .ok()
            .unwrap();
        assert_eq!(engine.status(), LifecycleStatus::Initialized);

        service.start(&monitor).await.unwrap();
        assert_eq!(engine.status(), LifecycleStatus::Started);
    }

    #[tokio::test]
    async fn test_tenant_rejected_after_terminate() {
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .engine_factory(Arc::new(FakeEngineFactory::default()))
            .build();
        boot(&service).await.unwrap();
        let monitor = ProgressMonitor::single("Shutdown", "test");
        service.stop(&monitor).await.unwrap();
        service.terminate(&monitor).await.unwrap();

        let err = service
            .add_tenant(&TenantRef::new("t-9", "initech", "Initech"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConductorError::Conflict(_)));
        assert!(service.engines().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_remove_tenant_at_runtime() {
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .engine_factory(Arc::new(FakeEngineFactory::default()))
            .topology(topology_with(&[]))
            .build();
        boot(&service).await.unwrap();

        let tenant = TenantRef::new("t-9", "initech", "Initech");
        let engine = service.add_tenant(&tenant).await.unwrap();
        assert_eq!(engine.status(), LifecycleStatus::Started);
        assert_eq!(
            engine.core().parent_name().as_deref(),
            Some("label-generation")
        );

        let err = service.add_tenant(&tenant).await.err().unwrap();
        assert!(matches!(err, ConductorError::Conflict(_)));

        let removed = service.remove_tenant("t-9").await.unwrap();
        assert_eq!(removed.status(), LifecycleStatus::Terminated);
        assert!(service.engine("t-9").is_none());
        assert!(service.remove_tenant("t-9").await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_runtime_engine_is_not_kept() {
        let factory =
            FakeEngineFactory::default().failing_for("initech", LifecycleOperation::Initialize);
        let service = Service::builder(FunctionIdentifier::LabelGeneration)
            .engine_factory(Arc::new(factory))
            .build();
        boot(&service).await.unwrap();

        let tenant = TenantRef::new("t-9", "initech", "Initech");
        assert!(service.add_tenant(&tenant).await.is_err());
        assert!(service.engines().is_empty());
    }

    #[tokio::test]
    async fn test_global_service_hosts_no_engines() {
        let service = Service::builder(FunctionIdentifier::TenantManagement)
            .engine_factory(Arc::new(FakeEngineFactory::default()))
            .topology(topology_with(&["acme"]))
            .build();
        boot(&service).await.unwrap();

        assert!(service.engines().is_empty());
        let err = service
            .add_tenant(&TenantRef::new("t-1", "acme", "Acme"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConductorError::InvalidRequest(_)));
    }
}
