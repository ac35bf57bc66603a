use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::config::{AppConfig, AuditConfig};

use super::{
    NewTenant, RegistryError, Tenant, TenantFilter, TenantRegistry, TenantStatus, TenantUpdate,
};

const TENANT_COLUMNS: &str = "id, slug, name, subdomain, custom_domain, agency_id, status, \
     current_db, all_databases, db_name, setup_failed, setup_step, created_at, updated_at";

impl<'r> FromRow<'r, PgRow> for Tenant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = TenantStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown tenant status '{}'", status).into(),
        })?;

        Ok(Tenant {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            subdomain: row.try_get("subdomain")?,
            custom_domain: row.try_get("custom_domain")?,
            agency_id: row.try_get("agency_id")?,
            status,
            current_db: row.try_get("current_db")?,
            all_databases: row.try_get("all_databases")?,
            db_name: row.try_get("db_name")?,
            setup_failed: row.try_get("setup_failed")?,
            setup_step: row.try_get("setup_step")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Postgres-backed tenant registry.
pub struct PgRegistry {
    pool: PgPool,
    audit: AuditConfig,
}

impl PgRegistry {
    /// Connect to the registry database and make sure its schema exists.
    pub async fn connect(config: &AppConfig) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.registry.database_url)
            .await?;

        let registry = Self {
            pool,
            audit: config.audit.clone(),
        };
        registry.ensure_schema().await?;
        Ok(registry)
    }

    pub fn with_pool(pool: PgPool, audit: AuditConfig) -> Self {
        Self { pool, audit }
    }

    /// Idempotent schema bootstrap for the registry database.
    async fn ensure_schema(&self) -> Result<(), RegistryError> {
        let stmts = [
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                subdomain TEXT UNIQUE,
                custom_domain TEXT UNIQUE,
                agency_id UUID,
                status TEXT NOT NULL DEFAULT 'active',
                current_db TEXT NOT NULL,
                all_databases TEXT[] NOT NULL,
                db_name TEXT NOT NULL,
                setup_failed BOOLEAN NOT NULL DEFAULT FALSE,
                setup_step TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                event TEXT NOT NULL,
                tenant_slug TEXT NOT NULL,
                detail JSONB NOT NULL DEFAULT '{}'::jsonb,
                at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        ];

        for stmt in stmts {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TenantRegistry for PgRegistry {
    async fn create(&self, new: NewTenant) -> Result<Tenant, RegistryError> {
        let sql = format!(
            "INSERT INTO tenants (slug, name, subdomain, custom_domain, agency_id, \
             status, current_db, all_databases, db_name) \
             VALUES ($1, $2, $3, $4, $5, 'active', $6, ARRAY[$6], $6) \
             RETURNING {TENANT_COLUMNS}"
        );

        let tenant: Tenant = sqlx::query_as(&sql)
            .bind(&new.slug)
            .bind(&new.name)
            .bind(&new.subdomain)
            .bind(&new.custom_domain)
            .bind(new.agency_id)
            .bind(&new.db_name)
            .fetch_one(&self.pool)
            .await?;

        info!("Registered tenant '{}' with database {}", tenant.slug, tenant.current_db);
        Ok(tenant)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RegistryError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE slug = $1");
        Ok(sqlx::query_as(&sql).bind(slug).fetch_optional(&self.pool).await?)
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RegistryError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE subdomain = $1");
        Ok(sqlx::query_as(&sql).bind(subdomain).fetch_optional(&self.pool).await?)
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, RegistryError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE custom_domain = $1");
        Ok(sqlx::query_as(&sql).bind(domain).fetch_optional(&self.pool).await?)
    }

    async fn list(
        &self,
        filter: TenantFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Tenant>, i64), RegistryError> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE ($1::uuid IS NULL OR agency_id = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let tenants: Vec<Tenant> = sqlx::query_as(&sql)
            .bind(filter.agency_id)
            .bind(&status)
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tenants \
             WHERE ($1::uuid IS NULL OR agency_id = $1) \
               AND ($2::text IS NULL OR status = $2)",
        )
        .bind(filter.agency_id)
        .bind(&status)
        .fetch_one(&self.pool)
        .await?;

        Ok((tenants, total.0))
    }

    async fn update(&self, id: Uuid, fields: TenantUpdate) -> Result<Tenant, RegistryError> {
        let status = fields.status.map(|s| s.as_str().to_string());
        let sql = format!(
            "UPDATE tenants SET \
                name = COALESCE($2, name), \
                subdomain = COALESCE($3, subdomain), \
                custom_domain = COALESCE($4, custom_domain), \
                status = COALESCE($5, status), \
                updated_at = now() \
             WHERE id = $1 RETURNING {TENANT_COLUMNS}"
        );

        sqlx::query_as(&sql)
            .bind(id)
            .bind(&fields.name)
            .bind(&fields.subdomain)
            .bind(&fields.custom_domain)
            .bind(&status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn append_database(&self, id: Uuid, new_db: &str) -> Result<Tenant, RegistryError> {
        // Single-row atomic write: append the generation, make it current,
        // and mirror the legacy db_name column.
        let sql = format!(
            "UPDATE tenants SET \
                all_databases = array_append(all_databases, $2), \
                current_db = $2, \
                db_name = $2, \
                updated_at = now() \
             WHERE id = $1 RETURNING {TENANT_COLUMNS}"
        );

        sqlx::query_as(&sql)
            .bind(id)
            .bind(new_db)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> Result<(), RegistryError> {
        sqlx::query("UPDATE tenants SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_setup_state(
        &self,
        id: Uuid,
        step: Option<&str>,
        failed: bool,
    ) -> Result<(), RegistryError> {
        sqlx::query(
            "UPDATE tenants SET setup_step = $2, setup_failed = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(step)
        .bind(failed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_audit(
        &self,
        event: &str,
        slug: &str,
        detail: serde_json::Value,
    ) -> Result<(), RegistryError> {
        if !self.audit.enabled {
            return Ok(());
        }

        sqlx::query("INSERT INTO audit_log (event, tenant_slug, detail) VALUES ($1, $2, $3)")
            .bind(event)
            .bind(slug)
            .bind(detail)
            .execute(&self.pool)
            .await?;

        // Opportunistic retention pruning keeps the table bounded without a
        // separate scheduler.
        sqlx::query("DELETE FROM audit_log WHERE at < now() - make_interval(days => $1)")
            .bind(i32::try_from(self.audit.retention_days).unwrap_or(i32::MAX))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
