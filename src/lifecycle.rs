//! Cross-tenant lifecycle operations that sit next to provisioning:
//! hard deletion, soft deactivation, cross-tenant user search, and the
//! idempotent super-admin sync.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::{AdminError, DatabaseAdmin};
use crate::config::{AppConfig, SeedConfig};
use crate::registry::{
    RegistryError, Tenant, TenantFilter, TenantRegistry, TenantStatus, TenantUpdate,
};
use crate::router::{ConnectionRouter, Connector, PgConnector, RoutingError};
use crate::seed::{upsert_super_admin, SeedError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Database drop failed for {name}: {source}")]
    DropFailed { name: String, source: AdminError },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// One user row from a tenant database.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoundUser {
    pub tenant_slug: String,
    pub database: String,
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<String>,
}

/// Per-tenant user operations, generic over the router's handle type so the
/// cross-tenant sweeps can run against in-memory fakes.
#[async_trait]
pub trait UserStore<H>: Send + Sync {
    async fn search(&self, handle: &H, query: &str) -> Result<Vec<UserRow>, SeedError>;
    async fn upsert_super_admin(&self, handle: &H, seed: &SeedConfig) -> Result<(), SeedError>;
}

pub struct PgUserStore;

#[async_trait]
impl UserStore<PgPool> for PgUserStore {
    async fn search(&self, pool: &PgPool, query: &str) -> Result<Vec<UserRow>, SeedError> {
        let rows: Vec<(Uuid, String, Option<String>)> = sqlx::query_as(
            "SELECT id, username, email FROM users WHERE email = $1 OR username = $1",
        )
        .bind(query)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username, email)| UserRow { id, username, email })
            .collect())
    }

    async fn upsert_super_admin(&self, pool: &PgPool, seed: &SeedConfig) -> Result<(), SeedError> {
        upsert_super_admin(pool, seed).await
    }
}

pub struct Lifecycle<C: Connector = PgConnector, U: UserStore<C::Handle> = PgUserStore> {
    config: Arc<AppConfig>,
    registry: Arc<dyn TenantRegistry>,
    admin: Arc<dyn DatabaseAdmin>,
    router: Arc<ConnectionRouter<C>>,
    users: Arc<U>,
}

impl<C: Connector, U: UserStore<C::Handle>> Lifecycle<C, U> {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<dyn TenantRegistry>,
        admin: Arc<dyn DatabaseAdmin>,
        router: Arc<ConnectionRouter<C>>,
        users: Arc<U>,
    ) -> Self {
        Self {
            config,
            registry,
            admin,
            router,
            users,
        }
    }

    /// Hard delete: drop every database generation (evicting any cached
    /// handle first), then delete the registry row. A failed drop aborts so
    /// no generation is silently orphaned.
    pub async fn delete_tenant(&self, slug: &str) -> Result<Tenant, LifecycleError> {
        let tenant = Tenant::require(self.registry.as_ref(), slug).await?;

        for db in &tenant.all_databases {
            let url = self.config.tenant_url(db);
            self.router.clear(Some(&url)).await;
            self.admin
                .drop_database(db)
                .await
                .map_err(|source| LifecycleError::DropFailed {
                    name: db.clone(),
                    source,
                })?;
        }

        self.registry.delete(tenant.id).await?;
        info!(
            "Deleted tenant '{}' and {} database generation(s)",
            slug,
            tenant.all_databases.len()
        );

        self.audit(
            "tenant.deleted",
            slug,
            json!({ "databases": tenant.all_databases }),
        )
        .await;
        Ok(tenant)
    }

    /// Soft delete: flip the status to inactive so routing refuses the
    /// tenant. The registry row and every database generation stay intact,
    /// and a later status update can bring the tenant back.
    pub async fn deactivate_tenant(&self, slug: &str) -> Result<Tenant, LifecycleError> {
        let tenant = Tenant::require(self.registry.as_ref(), slug).await?;

        let updated = self
            .registry
            .update(
                tenant.id,
                TenantUpdate {
                    status: Some(TenantStatus::Inactive),
                    ..Default::default()
                },
            )
            .await?;
        info!("Deactivated tenant '{}'", slug);

        self.audit("tenant.deactivated", slug, json!({})).await;
        Ok(updated)
    }

    /// Search every active tenant's current database for a user by email or
    /// username. A tenant whose database cannot be queried is skipped with a
    /// warning; the search still covers the rest.
    pub async fn find_user(&self, query: &str) -> Result<Vec<FoundUser>, LifecycleError> {
        let (tenants, _) = self.active_tenants().await?;
        let mut found = Vec::new();

        for tenant in tenants {
            let url = self.config.tenant_url(&tenant.current_db);
            let handle = match self.router.get(&url).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Skipping tenant '{}' in user search: {}", tenant.slug, e);
                    continue;
                }
            };

            match self.users.search(&handle, query).await {
                Ok(rows) => {
                    for row in rows {
                        found.push(FoundUser {
                            tenant_slug: tenant.slug.clone(),
                            database: tenant.current_db.clone(),
                            id: row.id,
                            username: row.username,
                            email: row.email,
                        });
                    }
                }
                Err(e) => warn!("User search failed in '{}': {}", tenant.slug, e),
            }
        }

        Ok(found)
    }

    /// Upsert the fixed privileged account into every active tenant's
    /// current database. Idempotent; per-tenant failures are collected
    /// rather than aborting the sweep.
    pub async fn sync_super_admin(&self) -> Result<SyncReport, LifecycleError> {
        let (tenants, _) = self.active_tenants().await?;
        let mut report = SyncReport::default();

        for tenant in tenants {
            let url = self.config.tenant_url(&tenant.current_db);
            let outcome = match self.router.get(&url).await {
                Ok(handle) => {
                    self.users
                        .upsert_super_admin(&handle, &self.config.seed)
                        .await
                }
                Err(e) => Err(SeedError::Failed(e.to_string())),
            };

            match outcome {
                Ok(()) => report.synced.push(tenant.slug),
                Err(e) => {
                    warn!("Super-admin sync failed for '{}': {}", tenant.slug, e);
                    report.failed.push(tenant.slug);
                }
            }
        }

        Ok(report)
    }

    async fn active_tenants(&self) -> Result<(Vec<Tenant>, i64), RegistryError> {
        self.registry
            .list(
                TenantFilter {
                    status: Some(TenantStatus::Active),
                    ..Default::default()
                },
                1,
                u32::MAX,
            )
            .await
    }

    async fn audit(&self, event: &str, slug: &str, detail: serde_json::Value) {
        if let Err(e) = self.registry.record_audit(event, slug, detail).await {
            warn!("Audit write failed for {} ({}): {}", slug, event, e);
        }
    }
}
