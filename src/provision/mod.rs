//! Database provisioner: turns a tenant registration into a working,
//! migrated, seeded database. The workflow is an ordered step machine with
//! an asymmetric rollback policy: the registry row is the commit point,
//! a migration failure is fatal, and everything after migrations is
//! best-effort enrichment that never blocks tenant creation.

pub mod rotation;

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::{AdminError, DatabaseAdmin};
use crate::config::AppConfig;
use crate::naming::{database_name, is_valid_slug};
use crate::registry::{NewTenant, RegistryError, Tenant, TenantRegistry, TenantStatus};
use crate::seed::{
    BusinessProfile, DefaultCredentials, LocationInput, SeedOptions, TenantSeeder,
};
use crate::storage::{AssetKind, AssetStore};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Database create failed for {name}: {source}")]
    DatabaseCreateFailed { name: String, source: AdminError },

    #[error("Migration failed for {name}: {source}")]
    MigrationFailed { name: String, source: AdminError },

    #[error("Database generation already exists: {0}")]
    GenerationExists(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Named steps of the provisioning workflow, in execution order. The last
/// completed step is persisted on the registry row so a crashed run can be
/// resumed by `setup_tenant_db` instead of replayed blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionStep {
    RegistryRow,
    CreateDatabase,
    Migrate,
    SchemaSync,
    Seed,
    AssetNamespace,
    Branding,
    BusinessProfile,
    ExportTemplate,
    InitialLocation,
    Done,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::RegistryRow => "registry_row",
            ProvisionStep::CreateDatabase => "create_database",
            ProvisionStep::Migrate => "migrate",
            ProvisionStep::SchemaSync => "schema_sync",
            ProvisionStep::Seed => "seed",
            ProvisionStep::AssetNamespace => "asset_namespace",
            ProvisionStep::Branding => "branding",
            ProvisionStep::BusinessProfile => "business_profile",
            ProvisionStep::ExportTemplate => "export_template",
            ProvisionStep::InitialLocation => "initial_location",
            ProvisionStep::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            ProvisionStep::RegistryRow,
            ProvisionStep::CreateDatabase,
            ProvisionStep::Migrate,
            ProvisionStep::SchemaSync,
            ProvisionStep::Seed,
            ProvisionStep::AssetNamespace,
            ProvisionStep::Branding,
            ProvisionStep::BusinessProfile,
            ProvisionStep::ExportTemplate,
            ProvisionStep::InitialLocation,
            ProvisionStep::Done,
        ]
        .into_iter()
        .find(|step| step.as_str() == s)
    }
}

#[derive(Debug, Clone)]
pub struct BrandingAsset {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub kind: AssetKind,
}

/// Optional enrichment inputs for steps 7-10. All of them are best-effort.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub branding: Vec<BrandingAsset>,
    pub business_profile: Option<BusinessProfile>,
    pub initial_location: Option<LocationInput>,
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub slug: String,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub agency_id: Option<Uuid>,
    /// Database generation year; defaults to the current year.
    pub year: Option<i32>,
    pub enrichment: Enrichment,
}

/// Outcome of a successful provisioning run. Absent optional ids signal
/// partial enrichment failure, which callers may ignore.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    pub tenant: Tenant,
    pub credentials: DefaultCredentials,
    pub export_template_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

pub struct Provisioner {
    config: Arc<AppConfig>,
    registry: Arc<dyn TenantRegistry>,
    admin: Arc<dyn DatabaseAdmin>,
    seeder: Arc<dyn TenantSeeder>,
    assets: Arc<dyn AssetStore>,
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

impl Provisioner {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<dyn TenantRegistry>,
        admin: Arc<dyn DatabaseAdmin>,
        seeder: Arc<dyn TenantSeeder>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            config,
            registry,
            admin,
            seeder,
            assets,
        }
    }

    /// End-to-end provisioning of a new tenant. The registry insert is the
    /// commit point; a `Conflict` from it means the tenant may already
    /// exist and callers should consider `setup_tenant_db` instead.
    pub async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisioningResult, ProvisionError> {
        if !is_valid_slug(&request.slug) {
            return Err(ProvisionError::InvalidSlug(request.slug));
        }

        let year = request.year.unwrap_or_else(current_year);
        let db_name = database_name(&request.slug, year);

        let tenant = self
            .registry
            .create(NewTenant {
                name: request.name.clone(),
                slug: request.slug.clone(),
                subdomain: request.subdomain.clone(),
                custom_domain: request.custom_domain.clone(),
                agency_id: request.agency_id,
                db_name,
            })
            .await?;
        self.mark(&tenant, ProvisionStep::RegistryRow).await?;

        let result = self
            .run_setup(&tenant, &request.enrichment, ProvisionStep::RegistryRow)
            .await?;

        self.audit(
            "tenant.provisioned",
            &result.tenant.slug,
            json!({ "database": result.tenant.current_db }),
        )
        .await;
        Ok(result)
    }

    /// Idempotent re-provision of an existing registry row, resuming from
    /// the persisted last-completed step.
    pub async fn setup_tenant_db(&self, slug: &str) -> Result<ProvisioningResult, ProvisionError> {
        let tenant = Tenant::require(self.registry.as_ref(), slug).await?;

        let resume_after = tenant
            .setup_step
            .as_deref()
            .and_then(ProvisionStep::parse)
            .unwrap_or(ProvisionStep::RegistryRow);

        if resume_after == ProvisionStep::Done {
            info!("Tenant '{}' is already fully provisioned", slug);
            return Ok(ProvisioningResult {
                tenant,
                credentials: DefaultCredentials::from_config(&self.config.seed),
                export_template_id: None,
                location_id: None,
            });
        }

        info!(
            "Resuming setup for tenant '{}' after step '{}'",
            slug,
            resume_after.as_str()
        );
        let result = self
            .run_setup(&tenant, &Enrichment::default(), resume_after)
            .await?;

        self.audit(
            "tenant.setup_resumed",
            slug,
            json!({ "resumed_after": resume_after.as_str() }),
        )
        .await;
        Ok(result)
    }

    /// Steps 2-11, skipping everything at or before `resume_after`.
    async fn run_setup(
        &self,
        tenant: &Tenant,
        enrichment: &Enrichment,
        resume_after: ProvisionStep,
    ) -> Result<ProvisioningResult, ProvisionError> {
        let db_name = tenant.current_db.clone();
        let url = self.config.tenant_url(&db_name);
        let run = |step: ProvisionStep| step > resume_after;

        // Step 2: physical create. "Already exists" counts as success.
        if run(ProvisionStep::CreateDatabase) {
            self.admin.create_database(&db_name).await.map_err(|source| {
                ProvisionError::DatabaseCreateFailed {
                    name: db_name.clone(),
                    source,
                }
            })?;
            self.mark(tenant, ProvisionStep::CreateDatabase).await?;
        }

        // Step 3: migrations. The only step whose failure poisons the
        // tenant: flag the row, drop the fresh database, propagate.
        if run(ProvisionStep::Migrate) {
            if let Err(source) = self.admin.run_migrations(&url).await {
                // The database is dropped below, so a later resume has to
                // redo the physical create: rewind the persisted step to
                // the registry row.
                self.registry
                    .set_setup_state(tenant.id, Some(ProvisionStep::RegistryRow.as_str()), true)
                    .await?;
                self.registry
                    .set_status(tenant.id, TenantStatus::SetupFailed)
                    .await?;
                if let Err(drop_err) = self.admin.drop_database(&db_name).await {
                    warn!(
                        "Could not drop {} after failed migration: {}",
                        db_name, drop_err
                    );
                }
                return Err(ProvisionError::MigrationFailed {
                    name: db_name,
                    source,
                });
            }
            self.mark(tenant, ProvisionStep::Migrate).await?;
            if tenant.status == TenantStatus::SetupFailed {
                self.registry.set_status(tenant.id, TenantStatus::Active).await?;
            }
        }

        // Steps 4-10: best-effort enrichment, each failure logged and
        // swallowed on its own.
        if run(ProvisionStep::SchemaSync) {
            if let Err(e) = self.admin.run_schema_sync(&url).await {
                warn!("Schema sync failed for {}: {}", db_name, e);
            }
            self.mark(tenant, ProvisionStep::SchemaSync).await?;
        }

        if run(ProvisionStep::Seed) {
            let options = SeedOptions {
                company_name: Some(tenant.name.clone()),
            };
            if let Err(e) = self.seeder.run_seed(&url, &tenant.slug, &options).await {
                warn!("Baseline seed failed for {}: {}", db_name, e);
            }
            self.mark(tenant, ProvisionStep::Seed).await?;
        }

        if run(ProvisionStep::AssetNamespace) {
            if let Err(e) = self.assets.create_namespace(&tenant.slug).await {
                warn!("Asset namespace creation failed for '{}': {}", tenant.slug, e);
            }
            self.mark(tenant, ProvisionStep::AssetNamespace).await?;
        }

        if run(ProvisionStep::Branding) {
            for asset in &enrichment.branding {
                if let Err(e) = self
                    .assets
                    .write_asset(&tenant.slug, &asset.file_name, &asset.bytes, asset.kind)
                    .await
                {
                    warn!(
                        "Branding upload '{}' failed for '{}': {}",
                        asset.file_name, tenant.slug, e
                    );
                }
            }
            self.mark(tenant, ProvisionStep::Branding).await?;
        }

        if run(ProvisionStep::BusinessProfile) {
            if let Some(profile) = &enrichment.business_profile {
                if let Err(e) = self.seeder.apply_business_profile(&url, profile).await {
                    warn!("Business profile update failed for {}: {}", db_name, e);
                }
            }
            self.mark(tenant, ProvisionStep::BusinessProfile).await?;
        }

        let mut export_template_id = None;
        if run(ProvisionStep::ExportTemplate) {
            match self.seeder.create_export_template(&url, &tenant.name).await {
                Ok(id) => export_template_id = Some(id),
                Err(e) => warn!("Export template creation failed for {}: {}", db_name, e),
            }
            self.mark(tenant, ProvisionStep::ExportTemplate).await?;
        }

        let mut location_id = None;
        if run(ProvisionStep::InitialLocation) {
            if let Some(location) = &enrichment.initial_location {
                match self.seeder.create_initial_location(&url, location).await {
                    Ok(id) => location_id = Some(id),
                    Err(e) => warn!("Initial location creation failed for {}: {}", db_name, e),
                }
            }
            self.mark(tenant, ProvisionStep::InitialLocation).await?;
        }

        self.mark(tenant, ProvisionStep::Done).await?;

        // Re-read the row so the caller sees the final setup state.
        let tenant = Tenant::require(self.registry.as_ref(), &tenant.slug).await?;
        Ok(ProvisioningResult {
            tenant,
            credentials: DefaultCredentials::from_config(&self.config.seed),
            export_template_id,
            location_id,
        })
    }

    async fn mark(&self, tenant: &Tenant, step: ProvisionStep) -> Result<(), ProvisionError> {
        self.registry
            .set_setup_state(tenant.id, Some(step.as_str()), false)
            .await?;
        Ok(())
    }

    async fn audit(&self, event: &str, slug: &str, detail: serde_json::Value) {
        if let Err(e) = self.registry.record_audit(event, slug, detail).await {
            warn!("Audit write failed for {} ({}): {}", slug, event, e);
        }
    }
}
