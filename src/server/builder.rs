//! ServerBuilder for fluent API to build HTTP servers

use super::host::NestedHost;
use super::router::build_router;
use crate::config::NestedConfig;
use crate::core::auth::{AccessChecker, AllowAll, PolicyTable};
use crate::core::service::RelationalStore;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers exposing nested relation routes
///
/// # Example
///
/// ```ignore
/// let config = NestedConfig::default_config();
/// let app = ServerBuilder::new()
///     .with_store(InMemoryStore::new(&config))
///     .with_config(config)
///     .build()?;
/// ```
pub struct ServerBuilder {
    configs: Vec<NestedConfig>,
    store: Option<Arc<dyn RelationalStore>>,
    access: Option<Arc<dyn AccessChecker>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            store: None,
            access: None,
            custom_routes: Vec::new(),
        }
    }

    /// Add a configuration, merged with the ones added before
    pub fn with_config(mut self, config: NestedConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Load and add a YAML configuration file
    pub fn with_config_file(self, path: &str) -> Result<Self> {
        let config = NestedConfig::from_yaml_file(path)?;
        Ok(self.with_config(config))
    }

    /// Set the relational store (required)
    pub fn with_store(mut self, store: impl RelationalStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a shared relational store (required)
    pub fn with_shared_store(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the access checker
    ///
    /// Without one, the `access` section of the configuration is used, and
    /// every action is allowed when that section is empty.
    pub fn with_access_checker(mut self, checker: impl AccessChecker + 'static) -> Self {
        self.access = Some(Arc::new(checker));
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are matched before the nested routes and must not set
    /// a fallback.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the host holding the resolved routing state
    pub fn build_host(mut self) -> Result<NestedHost> {
        let config = NestedConfig::merge(std::mem::take(&mut self.configs));

        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow::anyhow!("RelationalStore is required. Call .with_store()"))?;

        let access: Arc<dyn AccessChecker> = match self.access.take() {
            Some(checker) => checker,
            None if !config.access.is_empty() => Arc::new(PolicyTable::from_config(&config.access)),
            None => Arc::new(AllowAll),
        };

        NestedHost::from_builder_components(config, store, access)
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        Ok(build_router(host, custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// Handles SIGTERM and SIGINT (Ctrl+C).
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
