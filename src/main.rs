use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use windos_tenancy::admin::PgDatabaseAdmin;
use windos_tenancy::cli::{self, AppContext, Cli};
use windos_tenancy::config::AppConfig;
use windos_tenancy::lifecycle::{Lifecycle, PgUserStore};
use windos_tenancy::provision::Provisioner;
use windos_tenancy::registry::{PgRegistry, TenantRegistry};
use windos_tenancy::resolver::TenantResolver;
use windos_tenancy::router::{ConnectionRouter, PgConnector};
use windos_tenancy::seed::SqlSeeder;
use windos_tenancy::storage::build_asset_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up REGISTRY_DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Configuration is read from the environment exactly once, here, and
    // passed into every component.
    let config = Arc::new(AppConfig::from_env()?);

    let registry: Arc<dyn TenantRegistry> = Arc::new(PgRegistry::connect(&config).await?);
    let admin = Arc::new(PgDatabaseAdmin::connect(&config.database.admin_url)?);
    let seeder = Arc::new(SqlSeeder::new(config.seed.clone()));
    let assets = build_asset_store(&config.storage)?;
    let router = Arc::new(ConnectionRouter::new(PgConnector));
    let resolver = Arc::new(TenantResolver::new(&config.routing));

    let provisioner = Arc::new(Provisioner::new(
        config.clone(),
        registry.clone(),
        admin.clone(),
        seeder,
        assets,
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        config.clone(),
        registry.clone(),
        admin,
        router.clone(),
        Arc::new(PgUserStore),
    ));

    let ctx = AppContext {
        config,
        registry,
        provisioner,
        lifecycle,
        router,
        resolver,
    };

    cli::run(cli, ctx).await
}
