//! HTTP façade over the envelope codec and the sealed site-data store.

mod error;
mod handler;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post},
    Router,
};
use sitevault_core::{envelope::Codec, storage::RecordStore};
use sitevault_site::{SealedStore, SiteDataService};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use error::ApiError;

/// Shared handler state: the process-wide codec and the site-data service.
#[derive(Clone)]
pub struct AppState {
    codec: Arc<Codec>,
    site: SiteDataService<dyn RecordStore>,
}

impl AppState {
    pub fn new(codec: Arc<Codec>, store: Arc<dyn RecordStore>) -> Self {
        let sealed = SealedStore::new(Arc::clone(&codec), store);
        Self {
            codec,
            site: SiteDataService::new(sealed),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handler::index))
        .route("/health", get(handler::health))
        .route("/encrypt", post(handler::encrypt))
        .route("/decrypt", post(handler::decrypt))
        .route(
            "/site-data",
            post(handler::store_site_data).get(handler::list_site_data),
        )
        .route(
            "/site-data/{data_id}",
            get(handler::retrieve_site_data).delete(handler::delete_site_data),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sitevault api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
