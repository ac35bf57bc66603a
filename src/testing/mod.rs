//! In-memory fakes for exercising provisioning and rotation workflows
//! without a database server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::admin::{AdminError, CreateDatabaseOutcome, DatabaseAdmin};
use crate::config::{
    AppConfig, AuditConfig, DatabaseConfig, RegistryConfig, RoutingConfig, SeedConfig,
    StorageConfig,
};
use crate::lifecycle::{UserRow, UserStore};
use crate::provision::Provisioner;
use crate::registry::{
    NewTenant, RegistryError, Tenant, TenantFilter, TenantRegistry, TenantStatus, TenantUpdate,
};
use crate::router::{Connector, RoutingError};
use crate::seed::{BusinessProfile, LocationInput, SeedError, SeedOptions, TenantSeeder};
use crate::storage::{AssetKind, AssetStore, StorageError};

pub fn test_config() -> AppConfig {
    AppConfig {
        registry: RegistryConfig {
            database_url: "postgres://test@localhost/windos_registry".to_string(),
        },
        database: DatabaseConfig {
            url_template: "postgres://test@localhost/{db}".to_string(),
            admin_url: "postgres://test@localhost/postgres".to_string(),
        },
        routing: RoutingConfig {
            production_domain: "onwindos.com".to_string(),
            staging_domain: "staging.onwindos.com".to_string(),
            tenant_path_prefix: "/tenant".to_string(),
        },
        storage: StorageConfig::Local {
            root: "./storage".to_string(),
        },
        audit: AuditConfig {
            enabled: true,
            retention_days: 30,
        },
        seed: SeedConfig {
            super_admin_username: "windos_root".to_string(),
            super_admin_password: "windos#Root1".to_string(),
            tenant_admin_password: "windos#Admin1".to_string(),
            default_user_password: "windos#User1".to_string(),
        },
        port: 0,
    }
}

/// Registry backed by a mutex-guarded map. Mirrors the uniqueness and
/// append-only semantics of the Postgres implementation.
#[derive(Default)]
pub struct MemoryRegistry {
    tenants: Mutex<HashMap<Uuid, Tenant>>,
    pub audits: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slug: &str) -> Option<Tenant> {
        self.tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.slug == slug)
            .cloned()
    }

    pub fn insert(&self, tenant: Tenant) {
        self.tenants.lock().unwrap().insert(tenant.id, tenant);
    }

    fn with_tenant<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Tenant) -> R,
    ) -> Result<R, RegistryError> {
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(f(tenant))
    }
}

#[async_trait]
impl TenantRegistry for MemoryRegistry {
    async fn create(&self, new: NewTenant) -> Result<Tenant, RegistryError> {
        let mut tenants = self.tenants.lock().unwrap();

        let clash = tenants.values().any(|t| {
            t.slug == new.slug
                || (new.subdomain.is_some() && t.subdomain == new.subdomain)
                || (new.custom_domain.is_some() && t.custom_domain == new.custom_domain)
        });
        if clash {
            return Err(RegistryError::Conflict(format!(
                "tenant '{}' violates a uniqueness constraint",
                new.slug
            )));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            slug: new.slug,
            name: new.name,
            subdomain: new.subdomain,
            custom_domain: new.custom_domain,
            agency_id: new.agency_id,
            status: TenantStatus::Active,
            current_db: new.db_name.clone(),
            all_databases: vec![new.db_name.clone()],
            db_name: new.db_name,
            setup_failed: false,
            setup_step: None,
            created_at: now,
            updated_at: now,
        };
        tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, RegistryError> {
        Ok(self.get(slug))
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, RegistryError> {
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.subdomain.as_deref() == Some(subdomain))
            .cloned())
    }

    async fn find_by_custom_domain(&self, domain: &str) -> Result<Option<Tenant>, RegistryError> {
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.custom_domain.as_deref() == Some(domain))
            .cloned())
    }

    async fn list(
        &self,
        filter: TenantFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Tenant>, i64), RegistryError> {
        let tenants = self.tenants.lock().unwrap();
        let mut matched: Vec<Tenant> = tenants
            .values()
            .filter(|t| filter.agency_id.map_or(true, |a| t.agency_id == Some(a)))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as i64;
        let start = ((page.max(1) - 1) * page_size) as usize;
        let page: Vec<Tenant> = matched
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, id: Uuid, fields: TenantUpdate) -> Result<Tenant, RegistryError> {
        self.with_tenant(id, |t| {
            if let Some(name) = fields.name {
                t.name = name;
            }
            if let Some(subdomain) = fields.subdomain {
                t.subdomain = Some(subdomain);
            }
            if let Some(custom_domain) = fields.custom_domain {
                t.custom_domain = Some(custom_domain);
            }
            if let Some(status) = fields.status {
                t.status = status;
            }
            t.updated_at = Utc::now();
            t.clone()
        })
    }

    async fn append_database(&self, id: Uuid, new_db: &str) -> Result<Tenant, RegistryError> {
        self.with_tenant(id, |t| {
            t.all_databases.push(new_db.to_string());
            t.current_db = new_db.to_string();
            t.db_name = new_db.to_string();
            t.updated_at = Utc::now();
            t.clone()
        })
    }

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> Result<(), RegistryError> {
        self.with_tenant(id, |t| t.status = status)
    }

    async fn set_setup_state(
        &self,
        id: Uuid,
        step: Option<&str>,
        failed: bool,
    ) -> Result<(), RegistryError> {
        self.with_tenant(id, |t| {
            t.setup_step = step.map(str::to_string);
            t.setup_failed = failed;
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        self.tenants.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn record_audit(
        &self,
        event: &str,
        slug: &str,
        detail: serde_json::Value,
    ) -> Result<(), RegistryError> {
        self.audits
            .lock()
            .unwrap()
            .push((event.to_string(), slug.to_string(), detail));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailAt {
    Create,
    Migrate,
    SchemaSync,
    Drop,
}

#[derive(Default)]
struct AdminState {
    created: Vec<String>,
    dropped: Vec<String>,
    migrated: usize,
    existing: HashSet<String>,
    failures: HashSet<FailAt>,
}

/// Scriptable administrative collaborator: records every call and fails on
/// command at a chosen operation.
#[derive(Default)]
pub struct FakeAdmin {
    state: Mutex<AdminState>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, op: FailAt) {
        self.state.lock().unwrap().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn mark_existing(&self, name: &str) {
        self.state.lock().unwrap().existing.insert(name.to_string());
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.state.lock().unwrap().dropped.clone()
    }

    pub fn migrated_count(&self) -> usize {
        self.state.lock().unwrap().migrated
    }
}

#[async_trait]
impl DatabaseAdmin for FakeAdmin {
    async fn create_database(&self, name: &str) -> Result<CreateDatabaseOutcome, AdminError> {
        let mut state = self.state.lock().unwrap();
        if state.failures.contains(&FailAt::Create) {
            return Err(AdminError::Failed("scripted create failure".to_string()));
        }
        if state.existing.contains(name) {
            return Ok(CreateDatabaseOutcome::AlreadyExists);
        }
        state.existing.insert(name.to_string());
        state.created.push(name.to_string());
        Ok(CreateDatabaseOutcome::Created)
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        let mut state = self.state.lock().unwrap();
        if state.failures.contains(&FailAt::Drop) {
            return Err(AdminError::Failed("scripted drop failure".to_string()));
        }
        state.existing.remove(name);
        state.dropped.push(name.to_string());
        Ok(())
    }

    async fn run_migrations(&self, _url: &str) -> Result<(), AdminError> {
        let mut state = self.state.lock().unwrap();
        if state.failures.contains(&FailAt::Migrate) {
            return Err(AdminError::Failed("scripted migration failure".to_string()));
        }
        state.migrated += 1;
        Ok(())
    }

    async fn run_schema_sync(&self, _url: &str) -> Result<(), AdminError> {
        if self.state.lock().unwrap().failures.contains(&FailAt::SchemaSync) {
            return Err(AdminError::Failed("scripted schema sync failure".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct SeederState {
    seeded: Vec<String>,
    profiles: usize,
    fail: bool,
}

#[derive(Default)]
pub struct FakeSeeder {
    state: Mutex<SeederState>,
}

impl FakeSeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self) {
        self.state.lock().unwrap().fail = true;
    }

    pub fn seeded(&self) -> Vec<String> {
        self.state.lock().unwrap().seeded.clone()
    }

    pub fn profiles_applied(&self) -> usize {
        self.state.lock().unwrap().profiles
    }

    fn check(&self) -> Result<(), SeedError> {
        if self.state.lock().unwrap().fail {
            Err(SeedError::Failed("scripted seed failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TenantSeeder for FakeSeeder {
    async fn run_seed(
        &self,
        _url: &str,
        slug: &str,
        _options: &SeedOptions,
    ) -> Result<(), SeedError> {
        self.check()?;
        self.state.lock().unwrap().seeded.push(slug.to_string());
        Ok(())
    }

    async fn apply_business_profile(
        &self,
        _url: &str,
        _profile: &BusinessProfile,
    ) -> Result<(), SeedError> {
        self.check()?;
        self.state.lock().unwrap().profiles += 1;
        Ok(())
    }

    async fn create_export_template(
        &self,
        _url: &str,
        _tenant_name: &str,
    ) -> Result<Uuid, SeedError> {
        self.check()?;
        Ok(Uuid::new_v4())
    }

    async fn create_initial_location(
        &self,
        _url: &str,
        _location: &LocationInput,
    ) -> Result<Uuid, SeedError> {
        self.check()?;
        Ok(Uuid::new_v4())
    }
}

#[derive(Default)]
struct AssetsState {
    namespaces: Vec<String>,
    written: Vec<String>,
    fail: bool,
}

#[derive(Default)]
pub struct FakeAssets {
    state: Mutex<AssetsState>,
}

impl FakeAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self) {
        self.state.lock().unwrap().fail = true;
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.clone()
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.state.lock().unwrap().fail {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted storage failure",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn create_namespace(&self, slug: &str) -> Result<(), StorageError> {
        self.check()?;
        self.state.lock().unwrap().namespaces.push(slug.to_string());
        Ok(())
    }

    async fn write_asset(
        &self,
        slug: &str,
        file_name: &str,
        _bytes: &[u8],
        kind: AssetKind,
    ) -> Result<String, StorageError> {
        self.check()?;
        let path = format!("{}/{}_{}", slug, kind.as_str(), file_name);
        self.state.lock().unwrap().written.push(path.clone());
        Ok(path)
    }
}

/// Connector whose handle is just the connection string, for routing tests
/// that never touch a database server.
pub struct StringConnector;

#[async_trait]
impl Connector for StringConnector {
    type Handle = Arc<String>;

    async fn connect(&self, url: &str) -> Result<Arc<String>, RoutingError> {
        Ok(Arc::new(url.to_string()))
    }

    async fn disconnect(&self, _handle: Arc<String>) {}
}

#[derive(Default)]
struct UserStoreState {
    users: HashMap<String, Vec<UserRow>>,
    failing: HashSet<String>,
    upserted: Vec<String>,
}

/// User store keyed by connection string, scriptable to fail per tenant.
#[derive(Default)]
pub struct FakeUserStore {
    state: Mutex<UserStoreState>,
}

impl FakeUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, url: &str, username: &str, email: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .users
            .entry(url.to_string())
            .or_default()
            .push(UserRow {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: email.map(str::to_string),
            });
    }

    pub fn fail_for(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_string());
    }

    pub fn upserted(&self) -> Vec<String> {
        self.state.lock().unwrap().upserted.clone()
    }
}

#[async_trait]
impl UserStore<Arc<String>> for FakeUserStore {
    async fn search(&self, handle: &Arc<String>, query: &str) -> Result<Vec<UserRow>, SeedError> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(handle.as_str()) {
            return Err(SeedError::Failed("scripted user store failure".to_string()));
        }
        Ok(state
            .users
            .get(handle.as_str())
            .map(|rows| {
                rows.iter()
                    .filter(|u| u.username == query || u.email.as_deref() == Some(query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_super_admin(
        &self,
        handle: &Arc<String>,
        _seed: &SeedConfig,
    ) -> Result<(), SeedError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(handle.as_str()) {
            return Err(SeedError::Failed("scripted sync failure".to_string()));
        }
        state.upserted.push(handle.to_string());
        Ok(())
    }
}

/// Fully wired fake environment for workflow tests.
pub struct TestHarness {
    pub config: Arc<AppConfig>,
    pub registry: Arc<MemoryRegistry>,
    pub admin: Arc<FakeAdmin>,
    pub seeder: Arc<FakeSeeder>,
    pub assets: Arc<FakeAssets>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            config: Arc::new(test_config()),
            registry: Arc::new(MemoryRegistry::new()),
            admin: Arc::new(FakeAdmin::new()),
            seeder: Arc::new(FakeSeeder::new()),
            assets: Arc::new(FakeAssets::new()),
        }
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(
            self.config.clone(),
            self.registry.clone(),
            self.admin.clone(),
            self.seeder.clone(),
            self.assets.clone(),
        )
    }
}
