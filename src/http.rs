//! Thin HTTP surface: a health endpoint and the tenant-context middleware
//! that resolves the inbound host/path to a tenant, validates it against
//! the registry, and hands downstream handlers a live connection pool.

use std::sync::Arc;

use axum::extract::{Extension, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::registry::{RegistryError, Tenant, TenantFilter, TenantRegistry, TenantStatus};
use crate::resolver::TenantResolver;
use crate::router::{ConnectionRouter, PgConnector};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<dyn TenantRegistry>,
    pub router: Arc<ConnectionRouter<PgConnector>>,
    pub resolver: Arc<TenantResolver>,
}

/// Validated tenant for the current request, injected by middleware.
#[derive(Clone)]
pub struct TenantContext(pub Tenant);

/// Live pool for the tenant's current database, injected by middleware.
#[derive(Clone)]
pub struct TenantPool(pub PgPool);

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Forbidden(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::NotFound(m)
            | ApiError::Forbidden(m)
            | ApiError::ServiceUnavailable(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": true, "message": self.message() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(m) => ApiError::NotFound(m),
            RegistryError::Unavailable(_) => {
                ApiError::ServiceUnavailable("Registry temporarily unavailable".to_string())
            }
            other => {
                warn!("Registry error: {}", other);
                ApiError::Internal("An error occurred while processing your request".to_string())
            }
        }
    }
}

/// Resolve the request's tenant (subdomain, then path, then custom domain),
/// check it is active, and inject `TenantContext` + `TenantPool`.
pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let path = request.uri().path().to_string();

    let tenant = match state.resolver.resolve(&host, &path) {
        Some(slug) => state.registry.find_by_slug(&slug).await?,
        None => {
            let bare_host = host.split(':').next().unwrap_or("");
            state.registry.find_by_custom_domain(bare_host).await?
        }
    };

    let tenant = tenant.ok_or_else(|| {
        ApiError::NotFound(format!("No tenant context for host '{}'", host))
    })?;
    if tenant.status != TenantStatus::Active {
        return Err(ApiError::Forbidden(format!(
            "Tenant '{}' is not active",
            tenant.slug
        )));
    }

    let url = state.config.tenant_url(&tenant.current_db);
    let pool = state.router.get(&url).await.map_err(|e| {
        warn!("No pool for tenant '{}': {}", tenant.slug, e);
        ApiError::ServiceUnavailable("Tenant database unavailable".to_string())
    })?;

    request.extensions_mut().insert(TenantContext(tenant));
    request.extensions_mut().insert(TenantPool(pool));
    Ok(next.run(request).await)
}

pub fn app(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route("/api/context", get(context))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            tenant_context_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(tenant_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind_addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Windos tenancy service listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.registry.list(TenantFilter::default(), 1, 1).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "registry": "ok" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "registry unavailable",
                "data": { "status": "degraded", "timestamp": now, "registry_error": e.to_string() }
            })),
        ),
    }
}

/// Echo of the resolved tenant context, mostly useful for routing checks.
async fn context(Extension(tenant): Extension<TenantContext>) -> Json<Value> {
    let tenant = tenant.0;
    Json(json!({
        "success": true,
        "data": {
            "slug": tenant.slug,
            "name": tenant.name,
            "status": tenant.status,
            "current_db": tenant.current_db,
            "generations": tenant.all_databases.len(),
        }
    }))
}
