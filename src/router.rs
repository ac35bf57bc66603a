//! Connection router: hands request handlers a live handle for a given
//! connection string, caching handles by the exact string. A tenant's
//! rotation produces a new string and therefore a fresh cache entry; the old
//! generation's handle stays cached and usable for historical reads.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Malformed connection string: {0}")]
    MalformedUrl(String),

    #[error("Connection failed: {0}")]
    Connect(String),
}

/// Constructs and tears down live handles for the router. The seam exists so
/// tests can route without a database server.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self, url: &str) -> Result<Self::Handle, RoutingError>;
    async fn disconnect(&self, handle: Self::Handle);
}

/// Injectable get-or-create cache of live handles keyed by connection
/// string. No TTL or background eviction; entries leave only via `clear`.
pub struct ConnectionRouter<C: Connector> {
    connector: C,
    handles: RwLock<HashMap<String, C::Handle>>,
}

impl<C: Connector> ConnectionRouter<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `url`, constructing and inserting one on
    /// first access. The second cache check and the construction both happen
    /// under the write lock, so two concurrent first accesses for the same
    /// string cannot each build a handle.
    pub async fn get(&self, url: &str) -> Result<C::Handle, RoutingError> {
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(url) {
                return Ok(handle.clone());
            }
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(url) {
            return Ok(handle.clone());
        }

        let handle = self.connector.connect(url).await?;
        handles.insert(url.to_string(), handle.clone());
        info!("Opened connection handle for {}", redact(url));
        Ok(handle)
    }

    /// Disconnect and evict one entry, or every entry when `url` is `None`.
    pub async fn clear(&self, url: Option<&str>) {
        let mut handles = self.handles.write().await;
        match url {
            Some(url) => {
                if let Some(handle) = handles.remove(url) {
                    self.connector.disconnect(handle).await;
                    info!("Evicted connection handle for {}", redact(url));
                }
            }
            None => {
                for (url, handle) in handles.drain() {
                    self.connector.disconnect(handle).await;
                    info!("Evicted connection handle for {}", redact(&url));
                }
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }
}

/// Strip credentials before a connection string reaches the logs.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}

/// Production connector: lazy Postgres pools, opened on first query.
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self, url: &str) -> Result<PgPool, RoutingError> {
        let parsed =
            url::Url::parse(url).map_err(|e| RoutingError::MalformedUrl(e.to_string()))?;
        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(RoutingError::MalformedUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        PgPoolOptions::new()
            .connect_lazy(url)
            .map_err(|e| RoutingError::Connect(e.to_string()))
    }

    async fn disconnect(&self, handle: PgPool) {
        handle.close().await;
    }
}
