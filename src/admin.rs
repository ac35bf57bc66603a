//! Administrative database operations behind a narrow trait so tenant-
//! controlled slugs never reach an interpolated command line. Identifiers
//! are validated and quoted; everything else is bound as a parameter.

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::naming::{is_valid_db_name, quote_identifier};

/// Tenant-database schema, embedded at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Invalid database name: {0}")]
    InvalidName(String),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Administrative operation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDatabaseOutcome {
    Created,
    /// The database was already there; create is idempotent.
    AlreadyExists,
}

/// External collaborator contract for the physical database server.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn create_database(&self, name: &str) -> Result<CreateDatabaseOutcome, AdminError>;
    async fn drop_database(&self, name: &str) -> Result<(), AdminError>;
    async fn run_migrations(&self, url: &str) -> Result<(), AdminError>;
    /// Best-effort drift repair for schemas migrations might miss.
    async fn run_schema_sync(&self, url: &str) -> Result<(), AdminError>;
}

/// Postgres implementation over a shared administrative connection.
pub struct PgDatabaseAdmin {
    admin_pool: PgPool,
}

impl PgDatabaseAdmin {
    pub fn new(admin_pool: PgPool) -> Self {
        Self { admin_pool }
    }

    pub fn connect(admin_url: &str) -> Result<Self, AdminError> {
        let admin_pool = PgPoolOptions::new().max_connections(2).connect_lazy(admin_url)?;
        Ok(Self { admin_pool })
    }

    fn check_name(name: &str) -> Result<(), AdminError> {
        if is_valid_db_name(name) {
            Ok(())
        } else {
            Err(AdminError::InvalidName(name.to_string()))
        }
    }

    async fn tenant_pool(url: &str) -> Result<PgPool, AdminError> {
        Ok(PgPoolOptions::new().max_connections(2).connect(url).await?)
    }
}

#[async_trait]
impl DatabaseAdmin for PgDatabaseAdmin {
    async fn create_database(&self, name: &str) -> Result<CreateDatabaseOutcome, AdminError> {
        Self::check_name(name)?;

        let sql = format!("CREATE DATABASE {}", quote_identifier(name));
        match sqlx::query(&sql).execute(&self.admin_pool).await {
            Ok(_) => {
                info!("Created database {}", name);
                Ok(CreateDatabaseOutcome::Created)
            }
            // 42P04: duplicate_database
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("42P04") => {
                info!("Database {} already exists", name);
                Ok(CreateDatabaseOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        Self::check_name(name)?;

        let sql = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
        sqlx::query(&sql).execute(&self.admin_pool).await?;
        info!("Dropped database {}", name);
        Ok(())
    }

    async fn run_migrations(&self, url: &str) -> Result<(), AdminError> {
        let pool = Self::tenant_pool(url).await?;
        let result = MIGRATOR.run(&pool).await;
        pool.close().await;
        result?;
        Ok(())
    }

    async fn run_schema_sync(&self, url: &str) -> Result<(), AdminError> {
        let pool = Self::tenant_pool(url).await?;

        // Idempotent repairs for drift the versioned migrations can miss on
        // databases created before a column was added.
        let stmts = [
            "ALTER TABLE users ADD COLUMN IF NOT EXISTS last_login_at TIMESTAMPTZ",
            "ALTER TABLE users ADD COLUMN IF NOT EXISTS must_change_password BOOLEAN NOT NULL DEFAULT FALSE",
            "ALTER TABLE companies ADD COLUMN IF NOT EXISTS logo_path TEXT",
            "ALTER TABLE export_templates ADD COLUMN IF NOT EXISTS is_default BOOLEAN NOT NULL DEFAULT FALSE",
        ];

        let mut result = Ok(());
        for stmt in stmts {
            if let Err(e) = sqlx::query(stmt).execute(&pool).await {
                warn!("Schema sync statement failed: {}", e);
                result = Err(e.into());
                break;
            }
        }

        pool.close().await;
        result
    }
}
