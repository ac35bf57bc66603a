use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::registry::Tenant;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let Some(Value::Object(extra)) = data {
                response.as_object_mut().unwrap().extend(extra);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

pub fn tenant_json(tenant: &Tenant) -> Value {
    json!({
        "id": tenant.id,
        "slug": tenant.slug,
        "name": tenant.name,
        "subdomain": tenant.subdomain,
        "custom_domain": tenant.custom_domain,
        "agency_id": tenant.agency_id,
        "status": tenant.status,
        "current_db": tenant.current_db,
        "all_databases": tenant.all_databases,
        "setup_failed": tenant.setup_failed,
        "setup_step": tenant.setup_step,
        "created_at": tenant.created_at,
    })
}

pub fn print_tenant_table(tenants: &[Tenant], total: i64) {
    println!(
        "{:<20} {:<25} {:<14} {:<24} {}",
        "SLUG", "NAME", "STATUS", "CURRENT DB", "GENERATIONS"
    );
    println!("{}", "-".repeat(96));
    for tenant in tenants {
        println!(
            "{:<20} {:<25} {:<14} {:<24} {}",
            tenant.slug,
            tenant.name,
            tenant.status.as_str(),
            tenant.current_db,
            tenant.all_databases.len()
        );
    }
    println!("({} of {} total)", tenants.len(), total);
}
