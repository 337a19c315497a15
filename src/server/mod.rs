//! HTTP service
//!
//! The listener comes up before provisioning so liveness answers while the
//! artifact downloads. Query-serving handles are installed once the index is
//! in place; until then every data endpoint reports "not ready".

mod routes;

pub use routes::*;

use crate::config::{Config, QueryConfig};
use crate::embed::OllamaEmbedder;
use crate::error::Result;
use crate::lifecycle::Readiness;
use crate::meta::MetaDb;
use crate::provision::Provisioner;
use crate::search::HybridSearcher;
use crate::stats::StatsAggregator;
use crate::store::{QdrantStore, VectorStore};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Long-lived handles shared by every request once the index is loaded
pub struct Services {
    pub searcher: HybridSearcher,
    pub stats: StatsAggregator,
    pub meta: MetaDb,
    pub store: Arc<dyn VectorStore>,
}

impl Services {
    /// Open the vector store, metadata database and embedding client
    pub async fn open(config: &Config) -> Result<Self> {
        let timeout = config.query.call_timeout();
        let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::connect(config)?);
        let meta = MetaDb::open(&config.index.state_db_path()).await?;
        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding, timeout)?);

        let searcher = HybridSearcher::new(embedder, Arc::clone(&store), timeout);
        let stats = StatsAggregator::new(
            meta.clone(),
            Arc::clone(&store),
            config.index.dir.clone(),
            config.embedding.model.clone(),
            timeout,
        );

        Ok(Self {
            searcher,
            stats,
            meta,
            store,
        })
    }
}

/// Router state
#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<Readiness>,
    services: Arc<OnceLock<Services>>,
    pub query: QueryConfig,
}

impl AppState {
    pub fn new(query: QueryConfig) -> Self {
        Self {
            readiness: Arc::new(Readiness::new()),
            services: Arc::new(OnceLock::new()),
            query,
        }
    }

    /// Install the query-serving handles; only the first call takes effect
    pub fn install(&self, services: Services) -> bool {
        self.services.set(services).is_ok()
    }

    /// Handles, once provisioning has succeeded and they are installed
    pub fn services(&self) -> Option<&Services> {
        if !self.readiness.is_ready() {
            return None;
        }
        self.services.get()
    }
}

/// Provision the index, then open and install the serving handles
pub async fn start(config: &Config, state: &AppState) -> Result<()> {
    let outcome = Provisioner::new(config).run(&state.readiness).await?;
    info!("Provisioning finished: {:?}", outcome);

    let services = Services::open(config).await?;
    match services.store.collection_exists().await {
        Ok(true) => info!("Collection '{}' verified", services.store.collection()),
        Ok(false) => warn!(
            "Collection '{}' not found, queries will fail until it exists",
            services.store.collection()
        ),
        Err(e) => warn!("Could not verify collection: {}", e),
    }

    state.install(services);
    Ok(())
}

/// Bind, provision in the background, and serve until Ctrl-C or SIGTERM
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config.query.clone());
    let app = router(state.clone()).layer(TraceLayer::new_for_http());

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    let startup_state = state.clone();
    tokio::spawn(async move {
        match start(&config, &startup_state).await {
            Ok(()) => info!("Service ready"),
            Err(e) => error!("Startup failed, service will not be ready: {}", e),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
