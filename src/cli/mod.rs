pub mod commands;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::lifecycle::Lifecycle;
use crate::provision::Provisioner;
use crate::registry::TenantRegistry;
use crate::resolver::TenantResolver;
use crate::router::{ConnectionRouter, PgConnector};

/// Wired-up services shared by every command.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub registry: Arc<dyn TenantRegistry>,
    pub provisioner: Arc<Provisioner>,
    pub lifecycle: Arc<Lifecycle>,
    pub router: Arc<ConnectionRouter<PgConnector>>,
    pub resolver: Arc<TenantResolver>,
}

#[derive(Parser)]
#[command(name = "windos-tenancy")]
#[command(about = "Tenant lifecycle and database provisioning for the Windos platform")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Register a tenant and provision its database")]
    CreateTenant {
        #[arg(help = "Display name")]
        name: String,
        #[arg(help = "Immutable tenant slug")]
        slug: String,
        #[arg(long)]
        subdomain: Option<String>,
        #[arg(long)]
        custom_domain: Option<String>,
        #[arg(long)]
        agency_id: Option<Uuid>,
        #[arg(long, help = "Database generation year (defaults to current year)")]
        year: Option<i32>,
    },

    #[command(about = "Hard-delete a tenant: drop every generation, remove the row")]
    DeleteTenant {
        slug: String,
    },

    #[command(about = "Mark a tenant inactive without touching its databases")]
    DeactivateTenant {
        slug: String,
    },

    #[command(about = "Provision next year's database generation")]
    RotateYear {
        slug: String,
        #[arg(long, help = "Generation year (defaults to current year + 1)")]
        year: Option<i32>,
    },

    #[command(about = "Idempotently (re-)provision an existing tenant's database")]
    SetupTenantDb {
        slug: String,
    },

    #[command(about = "List registered tenants")]
    ListTenants {
        #[arg(long, help = "Filter by status: active, inactive, setup_failed")]
        status: Option<String>,
        #[arg(long)]
        agency_id: Option<Uuid>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
    },

    #[command(about = "Search every active tenant for a user by email or username")]
    FindUser {
        query: String,
    },

    #[command(about = "Upsert the super-admin account into every active tenant")]
    SyncSuperAdmin,

    #[command(about = "Run the HTTP service")]
    Serve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli, ctx: AppContext) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve => commands::server::handle(ctx).await,
        command => commands::tenant::handle(command, ctx, output_format).await,
    }
}
