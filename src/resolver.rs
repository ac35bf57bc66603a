//! Tenant resolution: pure mapping from request host/path to a tenant slug.
//! Callers chain the subdomain and path strategies; both returning `None`
//! means "no tenant context".

use crate::config::RoutingConfig;

/// Subdomain labels that never identify a tenant.
const RESERVED_LABELS: &[&str] = &["www", "admin", "api"];

#[derive(Debug, Clone)]
pub struct TenantResolver {
    production_domain: String,
    staging_domain: String,
    path_prefix: String,
}

impl TenantResolver {
    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            production_domain: routing.production_domain.clone(),
            staging_domain: routing.staging_domain.clone(),
            path_prefix: routing.tenant_path_prefix.clone(),
        }
    }

    /// Extract a slug from the leftmost label of a host under one of the
    /// configured routing domains. Reserved labels resolve to `None`.
    pub fn from_subdomain(&self, host: &str) -> Option<String> {
        let host = host.split(':').next().unwrap_or(host);

        let label = self
            .subdomain_label(host, &self.staging_domain)
            .or_else(|| self.subdomain_label(host, &self.production_domain))?;

        if label.is_empty() || RESERVED_LABELS.contains(&label) {
            return None;
        }
        Some(label.to_string())
    }

    fn subdomain_label<'a>(&self, host: &'a str, domain: &str) -> Option<&'a str> {
        let prefix = host.strip_suffix(domain)?.strip_suffix('.')?;
        // Leftmost label only; deeper labels belong to the tenant's own use.
        Some(prefix.split('.').next().unwrap_or(prefix))
    }

    /// Extract a slug from the first path segment after the configured
    /// tenant prefix, e.g. `/tenant/acme/dashboard` -> `acme`.
    pub fn from_path(&self, pathname: &str) -> Option<String> {
        let rest = pathname.strip_prefix(&self.path_prefix)?;
        let rest = rest.strip_prefix('/')?;

        let segment = rest.split('/').next().unwrap_or("");
        if segment.is_empty() {
            return None;
        }
        Some(segment.to_string())
    }

    /// Chain both strategies: subdomain first, then path.
    pub fn resolve(&self, host: &str, pathname: &str) -> Option<String> {
        self.from_subdomain(host).or_else(|| self.from_path(pathname))
    }
}
