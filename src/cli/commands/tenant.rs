use serde_json::json;

use crate::cli::utils::{output_success, print_tenant_table, tenant_json};
use crate::cli::{AppContext, Commands, OutputFormat};
use crate::provision::{Enrichment, ProvisionError, ProvisionRequest};
use crate::registry::{RegistryError, TenantFilter, TenantStatus};

pub async fn handle(
    command: Commands,
    ctx: AppContext,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::CreateTenant {
            name,
            slug,
            subdomain,
            custom_domain,
            agency_id,
            year,
        } => {
            let request = ProvisionRequest {
                name,
                slug: slug.clone(),
                subdomain,
                custom_domain,
                agency_id,
                year,
                enrichment: Enrichment::default(),
            };

            let result = match ctx.provisioner.provision(request).await {
                Ok(result) => result,
                Err(ProvisionError::Registry(RegistryError::Conflict(msg))) => {
                    return Err(anyhow::anyhow!(
                        "Tenant '{}' may already exist ({}). \
                         Use 'setup-tenant-db {}' to re-provision it.",
                        slug,
                        msg,
                        slug
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            output_success(
                &output_format,
                &format!(
                    "Tenant '{}' provisioned with database {}",
                    result.tenant.slug, result.tenant.current_db
                ),
                Some(json!({
                    "tenant": tenant_json(&result.tenant),
                    "credentials": result.credentials,
                    "export_template_id": result.export_template_id,
                    "location_id": result.location_id,
                })),
            )
        }

        Commands::DeleteTenant { slug } => {
            let tenant = ctx.lifecycle.delete_tenant(&slug).await?;
            output_success(
                &output_format,
                &format!(
                    "Tenant '{}' deleted ({} database generation(s) dropped)",
                    slug,
                    tenant.all_databases.len()
                ),
                Some(json!({ "databases": tenant.all_databases })),
            )
        }

        Commands::DeactivateTenant { slug } => {
            let tenant = ctx.lifecycle.deactivate_tenant(&slug).await?;
            output_success(
                &output_format,
                &format!("Tenant '{}' deactivated", slug),
                Some(json!({ "tenant": tenant_json(&tenant) })),
            )
        }

        Commands::RotateYear { slug, year } => {
            let tenant = ctx.provisioner.rotate(&slug, year).await?;
            output_success(
                &output_format,
                &format!("Tenant '{}' rotated to {}", slug, tenant.current_db),
                Some(json!({ "tenant": tenant_json(&tenant) })),
            )
        }

        Commands::SetupTenantDb { slug } => {
            let result = ctx.provisioner.setup_tenant_db(&slug).await?;
            output_success(
                &output_format,
                &format!(
                    "Tenant '{}' database {} is set up",
                    slug, result.tenant.current_db
                ),
                Some(json!({ "tenant": tenant_json(&result.tenant) })),
            )
        }

        Commands::ListTenants {
            status,
            agency_id,
            page,
            page_size,
        } => {
            let status = match status.as_deref() {
                Some(s) => Some(
                    TenantStatus::parse(s)
                        .ok_or_else(|| anyhow::anyhow!("Unknown status '{}'", s))?,
                ),
                None => None,
            };

            let (tenants, total) = ctx
                .registry
                .list(TenantFilter { agency_id, status }, page, page_size)
                .await?;

            match output_format {
                OutputFormat::Json => {
                    let items: Vec<_> = tenants.iter().map(tenant_json).collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "tenants": items,
                            "total": total,
                            "page": page,
                        }))?
                    );
                }
                OutputFormat::Text => {
                    if tenants.is_empty() {
                        println!("No tenants found");
                    } else {
                        print_tenant_table(&tenants, total);
                    }
                }
            }
            Ok(())
        }

        Commands::FindUser { query } => {
            let found = ctx.lifecycle.find_user(&query).await?;

            match output_format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "users": found }))?
                    );
                }
                OutputFormat::Text => {
                    if found.is_empty() {
                        println!("No user matched '{}'", query);
                    } else {
                        for user in &found {
                            println!(
                                "{:<20} {:<24} {} <{}>",
                                user.tenant_slug,
                                user.database,
                                user.username,
                                user.email.as_deref().unwrap_or("-")
                            );
                        }
                    }
                }
            }
            Ok(())
        }

        Commands::SyncSuperAdmin => {
            let report = ctx.lifecycle.sync_super_admin().await?;
            output_success(
                &output_format,
                &format!(
                    "Super admin synced to {} tenant(s), {} failed",
                    report.synced.len(),
                    report.failed.len()
                ),
                Some(json!({ "synced": report.synced, "failed": report.failed })),
            )
        }

        Commands::Serve => unreachable!("serve is dispatched separately"),
    }
}
