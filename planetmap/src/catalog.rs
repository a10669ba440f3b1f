//! Source catalog: resolving map servers into named sources.
//!
//! Servers are resolved once, in the background, when the catalog is
//! spawned. Callers await [`SourceCatalog::ready`] and then look sources up
//! synchronously by name.
//!
//! # Example
//!
//! ```ignore
//! let server = WmsServer::from_config(&config, client)?;
//! let catalog = SourceCatalog::spawn(vec![Arc::new(server)]);
//! catalog.ready().await?;
//! let source = catalog.default_source()?;
//! ```

use crate::config::{ConfigFile, LayerSettings, WmsSettings};
use crate::source::{HttpClient, MapSource, WmsLayer, WmsSource};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors resolving or querying the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("no map server reachable: {0}")]
    Unreachable(String),

    #[error("no default map source available")]
    NoDefaultSource,

    #[error("source catalog is not ready yet")]
    NotReady,

    #[error("unknown map source: {0}")]
    UnknownSource(String),
}

/// A server offering map sources.
pub trait MapServer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Resolves the sources this server offers.
    fn load_sources(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn MapSource>>, CatalogError>>;

    /// Name of the source to use when none is named.
    fn default_source(&self) -> Option<&str> {
        None
    }
}

// =============================================================================
// WMS server
// =============================================================================

/// A WMS endpoint whose layers come from configuration.
pub struct WmsServer<C> {
    endpoint: String,
    version: String,
    layers: Vec<LayerSettings>,
    default_layer: Option<String>,
    client: Arc<C>,
}

impl<C: HttpClient + 'static> WmsServer<C> {
    pub fn new(settings: &WmsSettings, endpoint: impl Into<String>, layers: Vec<LayerSettings>, client: Arc<C>) -> Self {
        Self {
            endpoint: endpoint.into(),
            version: settings.version.clone(),
            layers,
            default_layer: settings.default_layer.clone(),
            client,
        }
    }

    /// Builds the server configured in `config`, if a WMS URL is set.
    pub fn from_config(config: &ConfigFile, client: Arc<C>) -> Option<Self> {
        let endpoint = config.wms.url.clone()?;
        Some(Self::new(&config.wms, endpoint, config.layers.clone(), client))
    }

    fn source(&self, layer: &LayerSettings) -> WmsSource<C> {
        let wms_layer = WmsLayer {
            layers: layer.layers.clone(),
            format: layer.format.clone(),
            styles: layer.styles.clone(),
            version: self.version.clone(),
            shape: layer.shape,
            nudge: layer.nudge,
        };
        WmsSource::new(
            layer.name.as_str(),
            self.endpoint.clone(),
            wms_layer,
            Arc::clone(&self.client),
        )
    }
}

impl<C: HttpClient + 'static> MapServer for WmsServer<C> {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn load_sources(&self) -> BoxFuture<'_, Result<Vec<Arc<dyn MapSource>>, CatalogError>> {
        Box::pin(async move {
            reqwest::Url::parse(&self.endpoint)
                .map_err(|e| CatalogError::Unreachable(format!("{}: {}", self.endpoint, e)))?;

            let sources = self
                .layers
                .iter()
                .map(|layer| Arc::new(self.source(layer)) as Arc<dyn MapSource>)
                .collect();
            Ok(sources)
        })
    }

    fn default_source(&self) -> Option<&str> {
        self.default_layer.as_deref()
    }
}

// =============================================================================
// Catalog
// =============================================================================

struct Sources {
    by_name: HashMap<String, Arc<dyn MapSource>>,
    order: Vec<Arc<dyn MapSource>>,
    default: Option<Arc<dyn MapSource>>,
}

#[derive(Clone)]
enum CatalogState {
    Loading,
    Ready(Arc<Sources>),
    Failed(CatalogError),
}

/// Named map sources resolved from a set of servers.
#[derive(Clone)]
pub struct SourceCatalog {
    state: watch::Receiver<CatalogState>,
}

impl SourceCatalog {
    /// Starts resolving `servers` in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(servers: Vec<Arc<dyn MapServer>>) -> Self {
        let (tx, rx) = watch::channel(CatalogState::Loading);
        tokio::spawn(async move {
            let state = resolve(&servers).await;
            let _ = tx.send(state);
        });
        Self { state: rx }
    }

    /// A catalog that is ready at once. The first source is the default.
    pub fn from_sources(sources: Vec<Arc<dyn MapSource>>) -> Self {
        let default = sources.first().cloned();
        let (_, rx) = watch::channel(CatalogState::Ready(Arc::new(index(sources, default))));
        Self { state: rx }
    }

    /// Waits until the servers are resolved.
    pub async fn ready(&self) -> Result<(), CatalogError> {
        let mut state = self.state.clone();
        let state = state
            .wait_for(|s| !matches!(s, CatalogState::Loading))
            .await
            .map_err(|_| CatalogError::Unreachable("catalog resolution stopped".to_string()))?;
        match &*state {
            CatalogState::Failed(e) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), CatalogState::Ready(_))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MapSource>, CatalogError> {
        self.sources_ref()?
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownSource(name.to_string()))
    }

    pub fn default_source(&self) -> Result<Arc<dyn MapSource>, CatalogError> {
        self.sources_ref()?.default.clone().ok_or(CatalogError::NoDefaultSource)
    }

    /// All sources, in resolution order.
    pub fn sources(&self) -> Result<Vec<Arc<dyn MapSource>>, CatalogError> {
        Ok(self.sources_ref()?.order.clone())
    }

    fn sources_ref(&self) -> Result<Arc<Sources>, CatalogError> {
        match &*self.state.borrow() {
            CatalogState::Loading => Err(CatalogError::NotReady),
            CatalogState::Ready(sources) => Ok(Arc::clone(sources)),
            CatalogState::Failed(e) => Err(e.clone()),
        }
    }
}

fn index(sources: Vec<Arc<dyn MapSource>>, default: Option<Arc<dyn MapSource>>) -> Sources {
    let mut by_name = HashMap::new();
    let mut order = Vec::with_capacity(sources.len());
    for source in sources {
        let name = source.id().as_str().to_string();
        if by_name.contains_key(&name) {
            warn!(source = %name, "Duplicate map source ignored");
            continue;
        }
        by_name.insert(name, Arc::clone(&source));
        order.push(source);
    }
    Sources {
        by_name,
        order,
        default,
    }
}

async fn resolve(servers: &[Arc<dyn MapServer>]) -> CatalogState {
    let mut sources: Vec<Arc<dyn MapSource>> = Vec::new();
    let mut failures = Vec::new();
    let mut preferred = None;

    for server in servers {
        match server.load_sources().await {
            Ok(loaded) => {
                debug!(server = server.name(), count = loaded.len(), "Server resolved");
                if preferred.is_none() {
                    preferred = server.default_source().map(str::to_string);
                }
                sources.extend(loaded);
            }
            Err(e) => {
                warn!(server = server.name(), error = %e, "Map server unavailable");
                failures.push(e.to_string());
            }
        }
    }

    if sources.is_empty() && !failures.is_empty() {
        return CatalogState::Failed(CatalogError::Unreachable(failures.join("; ")));
    }

    let default = match &preferred {
        Some(name) => sources.iter().find(|s| s.id().as_str() == name).cloned(),
        None => sources.first().cloned(),
    };
    if default.is_none() {
        warn!(preferred = ?preferred, "No default map source");
    }
    info!(count = sources.len(), "Source catalog ready");
    CatalogState::Ready(Arc::new(index(sources, default)))
}
