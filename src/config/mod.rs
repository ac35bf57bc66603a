use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Startup configuration failures. Always fatal: the process refuses to
/// start with an incomplete environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub database: DatabaseConfig,
    pub routing: RoutingConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub seed: SeedConfig,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Connection string for the registry database (tenant catalog).
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Tenant connection-string template containing a `{db}` placeholder.
    pub url_template: String,
    /// Administrative connection string (CREATE/DROP DATABASE target).
    pub admin_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub production_domain: String,
    pub staging_domain: String,
    pub tenant_path_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local { root: String },
    S3 { bucket: String, region: String, prefix: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub retention_days: u32,
}

/// Credentials written into every freshly provisioned tenant database.
/// The defaults are shared across tenants; override them per environment
/// with the SEED_* variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub super_admin_username: String,
    pub super_admin_password: String,
    pub tenant_admin_password: String,
    pub default_user_password: String,
}

impl AppConfig {
    /// Build the configuration from the environment, once, at process start.
    /// Components receive it by reference; nothing re-reads the environment
    /// after this returns.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url_template = required("TENANT_DATABASE_URL")?;
        if !url_template.contains("{db}") {
            return Err(ConfigError::InvalidVar {
                var: "TENANT_DATABASE_URL",
                reason: "must contain a {db} placeholder".to_string(),
            });
        }

        Ok(Self {
            registry: RegistryConfig {
                database_url: required("REGISTRY_DATABASE_URL")?,
            },
            database: DatabaseConfig {
                url_template,
                admin_url: required("ADMIN_DATABASE_URL")?,
            },
            routing: RoutingConfig {
                production_domain: optional("PRODUCTION_DOMAIN", "onwindos.com"),
                staging_domain: optional("STAGING_DOMAIN", "staging.onwindos.com"),
                tenant_path_prefix: optional("TENANT_PATH_PREFIX", "/tenant"),
            },
            storage: StorageConfig::from_env()?,
            audit: AuditConfig {
                enabled: parse_or("AUDIT_LOG_ENABLED", false)?,
                retention_days: retention_days()?,
            },
            seed: SeedConfig {
                super_admin_username: optional("SEED_SUPER_ADMIN_USERNAME", "windos_root"),
                super_admin_password: optional("SEED_SUPER_ADMIN_PASSWORD", "windos#Root1"),
                tenant_admin_password: optional("SEED_TENANT_ADMIN_PASSWORD", "windos#Admin1"),
                default_user_password: optional("SEED_DEFAULT_USER_PASSWORD", "windos#User1"),
            },
            port: parse_or("PORT", 3000)?,
        })
    }

    /// Expand the tenant URL template for a concrete database name.
    pub fn tenant_url(&self, database_name: &str) -> String {
        self.database.url_template.replace("{db}", database_name)
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        match optional("STORAGE_BACKEND", "local").as_str() {
            "local" => Ok(StorageConfig::Local {
                root: optional("STORAGE_LOCAL_ROOT", "./storage"),
            }),
            "s3" => Ok(StorageConfig::S3 {
                bucket: required("STORAGE_S3_BUCKET")?,
                region: required("STORAGE_S3_REGION")?,
                prefix: optional("STORAGE_S3_PREFIX", ""),
            }),
            other => Err(ConfigError::InvalidVar {
                var: "STORAGE_BACKEND",
                reason: format!("unknown backend '{}', expected 'local' or 's3'", other),
            }),
        }
    }
}

// The retention window is bound into a signed `make_interval` day count, so
// values past i32::MAX are rejected up front instead of wrapping negative.
fn retention_days() -> Result<u32, ConfigError> {
    let days: u32 = parse_or("AUDIT_LOG_RETENTION_DAYS", 365)?;
    if i32::try_from(days).is_err() {
        return Err(ConfigError::InvalidVar {
            var: "AUDIT_LOG_RETENTION_DAYS",
            reason: format!("{} exceeds the maximum supported day count", days),
        });
    }
    Ok(days)
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn optional(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidVar {
            var,
            reason: format!("could not parse '{}'", v),
        }),
        Err(_) => Ok(default),
    }
}
