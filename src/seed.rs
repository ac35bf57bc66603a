//! Baseline seeding and post-migration enrichment of tenant databases:
//! roles, default users, the default company record, export template and
//! initial location.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::SeedConfig;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Seed failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// The fixed credential set written into every fresh tenant database.
/// Shared, well-known defaults are a known weakness; they can be
/// overridden per environment through the SEED_* variables.
#[derive(Debug, Clone, Serialize)]
pub struct DefaultCredentials {
    pub super_admin: Credential,
    pub tenant_admin: Credential,
    pub default_user: Credential,
}

impl DefaultCredentials {
    pub fn from_config(seed: &SeedConfig) -> Self {
        Self {
            super_admin: Credential {
                username: seed.super_admin_username.clone(),
                password: seed.super_admin_password.clone(),
            },
            tenant_admin: Credential {
                username: "admin".to_string(),
                password: seed.tenant_admin_password.clone(),
            },
            default_user: Credential {
                username: "user".to_string(),
                password: seed.default_user_password.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeedOptions {
    /// Name for the seeded default company record; falls back to the slug.
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BusinessProfile {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LocationInput {
    pub name: String,
    pub address: Option<String>,
}

/// External collaborator contract for post-migration tenant enrichment.
/// Every method targets one tenant database by connection URL.
#[async_trait]
pub trait TenantSeeder: Send + Sync {
    async fn run_seed(
        &self,
        url: &str,
        slug: &str,
        options: &SeedOptions,
    ) -> Result<(), SeedError>;

    async fn apply_business_profile(
        &self,
        url: &str,
        profile: &BusinessProfile,
    ) -> Result<(), SeedError>;

    async fn create_export_template(
        &self,
        url: &str,
        tenant_name: &str,
    ) -> Result<Uuid, SeedError>;

    async fn create_initial_location(
        &self,
        url: &str,
        location: &LocationInput,
    ) -> Result<Uuid, SeedError>;
}

pub struct SqlSeeder {
    seed: SeedConfig,
}

impl SqlSeeder {
    pub fn new(seed: SeedConfig) -> Self {
        Self { seed }
    }

    async fn pool(url: &str) -> Result<PgPool, SeedError> {
        Ok(PgPoolOptions::new().max_connections(2).connect(url).await?)
    }
}

#[async_trait]
impl TenantSeeder for SqlSeeder {
    async fn run_seed(
        &self,
        url: &str,
        slug: &str,
        options: &SeedOptions,
    ) -> Result<(), SeedError> {
        let pool = Self::pool(url).await?;

        sqlx::query(
            "INSERT INTO roles (name, description) VALUES \
                ('super_admin', 'Platform operator'), \
                ('admin', 'Tenant administrator'), \
                ('user', 'Standard user') \
             ON CONFLICT (name) DO NOTHING",
        )
        .execute(&pool)
        .await?;

        let users = [
            (self.seed.super_admin_username.as_str(), self.seed.super_admin_password.as_str(), "super_admin"),
            ("admin", self.seed.tenant_admin_password.as_str(), "admin"),
            ("user", self.seed.default_user_password.as_str(), "user"),
        ];
        for (username, password, role) in users {
            sqlx::query(
                "INSERT INTO users (username, password_hash, role_id) \
                 SELECT $1, $2, id FROM roles WHERE name = $3 \
                 ON CONFLICT (username) DO NOTHING",
            )
            .bind(username)
            .bind(hash_password(password))
            .bind(role)
            .execute(&pool)
            .await?;
        }

        let company_name = options.company_name.clone().unwrap_or_else(|| slug.to_string());
        sqlx::query(
            "INSERT INTO companies (name) SELECT $1 \
             WHERE NOT EXISTS (SELECT 1 FROM companies)",
        )
        .bind(&company_name)
        .execute(&pool)
        .await?;

        pool.close().await;
        info!("Seeded baseline roles and users for tenant '{}'", slug);
        Ok(())
    }

    async fn apply_business_profile(
        &self,
        url: &str,
        profile: &BusinessProfile,
    ) -> Result<(), SeedError> {
        let pool = Self::pool(url).await?;

        sqlx::query(
            "UPDATE companies SET \
                address = COALESCE($1, address), \
                phone = COALESCE($2, phone), \
                email = COALESCE($3, email), \
                tax_id = COALESCE($4, tax_id), \
                updated_at = now() \
             WHERE id = (SELECT id FROM companies ORDER BY created_at LIMIT 1)",
        )
        .bind(&profile.address)
        .bind(&profile.phone)
        .bind(&profile.email)
        .bind(&profile.tax_id)
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    async fn create_export_template(
        &self,
        url: &str,
        tenant_name: &str,
    ) -> Result<Uuid, SeedError> {
        let pool = Self::pool(url).await?;

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO export_templates (name, is_default) VALUES ($1, TRUE) RETURNING id",
        )
        .bind(format!("{} default", tenant_name))
        .fetch_one(&pool)
        .await?;

        pool.close().await;
        Ok(id)
    }

    async fn create_initial_location(
        &self,
        url: &str,
        location: &LocationInput,
    ) -> Result<Uuid, SeedError> {
        let pool = Self::pool(url).await?;

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO locations (company_id, name, address, is_default) \
             SELECT id, $1, $2, TRUE FROM companies ORDER BY created_at LIMIT 1 \
             RETURNING id",
        )
        .bind(&location.name)
        .bind(&location.address)
        .fetch_one(&pool)
        .await?;

        pool.close().await;
        Ok(id)
    }
}

/// Idempotent upsert of the fixed privileged account into one tenant
/// database; reused across every active tenant by `sync-super-admin`.
pub async fn upsert_super_admin(pool: &PgPool, seed: &SeedConfig) -> Result<(), SeedError> {
    sqlx::query(
        "INSERT INTO users (username, password_hash, role_id) \
         SELECT $1, $2, (SELECT id FROM roles WHERE name = 'super_admin') \
         ON CONFLICT (username) DO UPDATE SET \
            password_hash = EXCLUDED.password_hash, \
            is_active = TRUE, \
            updated_at = now()",
    )
    .bind(&seed.super_admin_username)
    .bind(hash_password(&seed.super_admin_password))
    .execute(pool)
    .await?;
    Ok(())
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_hex() {
        let a = hash_password("windos#Admin1");
        let b = hash_password("windos#Admin1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_password("other"));
    }

    #[test]
    fn credentials_come_from_config() {
        let seed = SeedConfig {
            super_admin_username: "root_op".to_string(),
            super_admin_password: "s3cret".to_string(),
            tenant_admin_password: "adm1n".to_string(),
            default_user_password: "us3r".to_string(),
        };
        let creds = DefaultCredentials::from_config(&seed);
        assert_eq!(creds.super_admin.username, "root_op");
        assert_eq!(creds.tenant_admin.username, "admin");
        assert_eq!(creds.default_user.password, "us3r");
    }
}
