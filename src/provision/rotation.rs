//! Yearly rotation: add a new database generation to an existing tenant.
//! The previous generation is left running and reachable; it is not
//! migrated forward, merged, or archived.

use serde_json::json;
use tracing::{info, warn};

use crate::naming::database_name;
use crate::registry::Tenant;

use super::{current_year, ProvisionError, Provisioner};

impl Provisioner {
    /// Provision next year's database generation for `slug` and atomically
    /// make it current. Defaults to `current year + 1` when no year is
    /// given. Rejected before any side effect if the computed generation
    /// already exists.
    pub async fn rotate(&self, slug: &str, year: Option<i32>) -> Result<Tenant, ProvisionError> {
        let tenant = Tenant::require(self.registry.as_ref(), slug).await?;

        let year = year.unwrap_or_else(|| current_year() + 1);
        let new_db = database_name(slug, year);
        if tenant.all_databases.contains(&new_db) {
            return Err(ProvisionError::GenerationExists(new_db));
        }

        self.admin.create_database(&new_db).await.map_err(|source| {
            ProvisionError::DatabaseCreateFailed {
                name: new_db.clone(),
                source,
            }
        })?;

        let url = self.config.tenant_url(&new_db);
        if let Err(source) = self.admin.run_migrations(&url).await {
            // Abort leaves the registry and the previous generation
            // untouched; only the half-built database goes away.
            if let Err(drop_err) = self.admin.drop_database(&new_db).await {
                warn!("Could not drop {} after failed rotation: {}", new_db, drop_err);
            }
            return Err(ProvisionError::MigrationFailed {
                name: new_db,
                source,
            });
        }

        let updated = self.registry.append_database(tenant.id, &new_db).await?;
        info!(
            "Rotated tenant '{}' to {} ({} generations)",
            slug,
            new_db,
            updated.all_databases.len()
        );

        self.audit(
            "tenant.rotated",
            slug,
            json!({ "database": new_db, "year": year }),
        )
        .await;
        Ok(updated)
    }
}
