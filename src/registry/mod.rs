pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use pg::PgRegistry;

/// Errors from the tenant registry. `Conflict` signals a uniqueness
/// violation and must be treated by callers as "may already exist", not as
/// an unconditional hard failure. `Unavailable` is fatal to any dependent
/// workflow.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Registry conflict: {0}")]
    Conflict(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                RegistryError::Conflict(db.message().to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                RegistryError::Unavailable(err.to_string())
            }
            _ => RegistryError::Sqlx(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Inactive,
    SetupFailed,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
            TenantStatus::SetupFailed => "setup_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TenantStatus::Active),
            "inactive" => Some(TenantStatus::Inactive),
            "setup_failed" => Some(TenantStatus::SetupFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry row: one customer organization and its database routing
/// metadata. `current_db` is always an element of `all_databases`;
/// `all_databases` only grows and is never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub agency_id: Option<Uuid>,
    pub status: TenantStatus,
    pub current_db: String,
    pub all_databases: Vec<String>,
    /// Legacy mirror of `current_db`, kept in sync on every rotation.
    pub db_name: String,
    pub setup_failed: bool,
    /// Last completed provisioning step, persisted so a crashed run can be
    /// resumed by `setup-tenant-db`.
    pub setup_step: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub agency_id: Option<Uuid>,
    pub db_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub status: Option<TenantStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct TenantFilter {
    pub agency_id: Option<Uuid>,
    pub status: Option<TenantStatus>,
}

/// Durable catalog of tenants, distinct from each tenant's own data.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn create(&self, new: NewTenant) -> Result<Tenant, RegistryError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RegistryError>;
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RegistryError>;
    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, RegistryError>;

    /// Paged listing; returns the page plus the unfiltered-by-paging total.
    async fn list(
        &self,
        filter: TenantFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Tenant>, i64), RegistryError>;

    async fn update(&self, id: Uuid, fields: TenantUpdate) -> Result<Tenant, RegistryError>;

    /// Atomically append a database generation and make it current
    /// (also mirrors the legacy `db_name` column). Single-row write.
    async fn append_database(&self, id: Uuid, new_db: &str) -> Result<Tenant, RegistryError>;

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> Result<(), RegistryError>;

    /// Persist provisioning progress: last completed step and failure flag.
    async fn set_setup_state(
        &self,
        id: Uuid,
        step: Option<&str>,
        failed: bool,
    ) -> Result<(), RegistryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError>;

    /// Config-gated audit trail write; a no-op when auditing is disabled.
    async fn record_audit(
        &self,
        event: &str,
        slug: &str,
        detail: serde_json::Value,
    ) -> Result<(), RegistryError>;
}

impl Tenant {
    /// Look up a tenant by slug, failing with `NotFound` when absent.
    pub async fn require(
        registry: &dyn TenantRegistry,
        slug: &str,
    ) -> Result<Tenant, RegistryError> {
        registry
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| RegistryError::NotFound(slug.to_string()))
    }
}
