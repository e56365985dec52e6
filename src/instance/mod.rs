//! Instance Management
//!
//! Operator-facing entry point for one instance. Functions are addressed by
//! their identifier path (`label-generation`) and tenants by token, as an
//! outer HTTP layer would receive them; both are validated before any
//! channel is leased or any script is touched.
//!
//! Configuration calls lease a management channel to the target function
//! for the duration of the call. Script calls go straight to the
//! [`ScriptStore`].

use crate::channel::LeaseManager;
use crate::configuration::{ConfigurationModel, ConfigurationParser, ElementContent};
use crate::error::{ConductorError, IdentifierKind, Result};
use crate::script::{
    ScriptCreateRequest, ScriptMetadata, ScriptScope, ScriptStore, ScriptUpdateRequest,
    ScriptVersion,
};
use crate::topology::{FunctionIdentifier, TenantRef, TopologyResolver};
use std::sync::Arc;

pub struct InstanceManagement {
    leases: LeaseManager,
    topology: Arc<dyn TopologyResolver>,
    parser: Arc<dyn ConfigurationParser>,
    scripts: Arc<ScriptStore>,
}

impl InstanceManagement {
    pub fn new(
        leases: LeaseManager,
        topology: Arc<dyn TopologyResolver>,
        parser: Arc<dyn ConfigurationParser>,
        scripts: Arc<ScriptStore>,
    ) -> Self {
        Self {
            leases,
            topology,
            parser,
            scripts,
        }
    }

    pub fn scripts(&self) -> &Arc<ScriptStore> {
        &self.scripts
    }

    /// Configuration model reported by a running instance of `identifier`
    pub async fn configuration_model(&self, identifier: &str) -> Result<ConfigurationModel> {
        let function = FunctionIdentifier::from_path(identifier)?;
        self.model_of(function).await
    }

    pub async fn global_configuration(&self, identifier: &str) -> Result<ElementContent> {
        let function = FunctionIdentifier::from_path(identifier)?;
        let model = self.model_of(function).await?;
        let document = self
            .topology
            .global_configuration(function)
            .await?
            .ok_or_else(|| ConductorError::not_found("Global configuration", function))?;
        self.parser.parse(&document, &model)
    }

    pub async fn update_global_configuration(
        &self,
        identifier: &str,
        content: &ElementContent,
    ) -> Result<ElementContent> {
        let function = FunctionIdentifier::from_path(identifier)?;
        let model = self.model_of(function).await?;
        let document = self.parser.serialize(content, &model)?;
        self.topology
            .update_global_configuration(function, document)
            .await?;
        tracing::info!("Updated global configuration of {}", function);
        Ok(content.clone())
    }

    pub async fn tenant_engine_configuration(
        &self,
        identifier: &str,
        tenant_token: &str,
    ) -> Result<ElementContent> {
        let function = FunctionIdentifier::from_path(identifier)?;
        let tenant = self.tenant(tenant_token).await?;
        let model = self.model_of(function).await?;
        let document = self
            .topology
            .tenant_engine_configuration(function, &tenant)
            .await?
            .ok_or_else(|| {
                ConductorError::not_found("Tenant engine", format!("{}/{}", function, tenant.token))
            })?;
        self.parser.parse(&document, &model)
    }

    pub async fn update_tenant_engine_configuration(
        &self,
        identifier: &str,
        tenant_token: &str,
        content: &ElementContent,
    ) -> Result<ElementContent> {
        let function = FunctionIdentifier::from_path(identifier)?;
        let tenant = self.tenant(tenant_token).await?;
        let model = self.model_of(function).await?;
        let document = self.parser.serialize(content, &model)?;
        self.topology
            .update_tenant_engine_configuration(function, &tenant, document)
            .await?;
        tracing::info!(
            "Updated {} engine configuration of tenant {}",
            function,
            tenant.token
        );
        Ok(content.clone())
    }

    pub async fn list_scripts(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
    ) -> Result<Vec<ScriptMetadata>> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.list(&scope).await
    }

    pub async fn script_metadata(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
    ) -> Result<ScriptMetadata> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.get_metadata(&scope, script_id).await
    }

    pub async fn script_content(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
    ) -> Result<Vec<u8>> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.get_content(&scope, script_id, version_id).await
    }

    pub async fn script_version(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptVersion> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.get_version(&scope, script_id, version_id).await
    }

    pub async fn create_script(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        request: ScriptCreateRequest,
    ) -> Result<ScriptMetadata> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.create(&scope, request).await
    }

    pub async fn update_script(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
        request: ScriptUpdateRequest,
    ) -> Result<ScriptMetadata> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts
            .update(&scope, script_id, version_id, request)
            .await
    }

    pub async fn clone_script(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
        comment: Option<String>,
    ) -> Result<ScriptVersion> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts
            .clone_version(&scope, script_id, version_id, comment)
            .await
    }

    pub async fn activate_script(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptMetadata> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.activate(&scope, script_id, version_id).await
    }

    pub async fn delete_script(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
    ) -> Result<ScriptMetadata> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts.delete(&scope, script_id).await
    }

    pub async fn delete_script_version(
        &self,
        identifier: &str,
        tenant_token: Option<&str>,
        script_id: &str,
        version_id: &str,
    ) -> Result<ScriptVersion> {
        let scope = self.scope(identifier, tenant_token).await?;
        self.scripts
            .delete_version(&scope, script_id, version_id)
            .await
    }

    async fn model_of(&self, function: FunctionIdentifier) -> Result<ConfigurationModel> {
        self.leases
            .with_lease(function, |channel| async move {
                channel.configuration_model().await
            })
            .await
    }

    async fn tenant(&self, token: &str) -> Result<TenantRef> {
        self.topology
            .resolve_tenant(token)
            .await?
            .ok_or_else(|| ConductorError::invalid_identifier(IdentifierKind::TenantToken, token))
    }

    async fn scope(&self, identifier: &str, tenant_token: Option<&str>) -> Result<ScriptScope> {
        let function = FunctionIdentifier::from_path(identifier)?;
        self.scripts.resolve_scope(function, tenant_token).await
    }
}
