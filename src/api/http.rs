use axum::{
    extract::{Host, Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::future::IntoFuture;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::stream::subscribe;
use crate::config::ApiConfig;
use crate::error::IndexerError;
use crate::logging::LogContext;
use crate::models::Transaction;
use crate::state::IndexState;

/// Progress marker rendered before the first block is applied
pub const NO_BLOCK: &str = "-1";

/// Response structure for the root endpoint
#[derive(Debug, Serialize)]
pub struct CurrentBlockResponse {
    pub block: String,
    pub addresses: String,
}

#[derive(Debug, Serialize)]
pub struct AddressEntry {
    pub address: String,
    /// Link to the address's transaction history
    pub transactions: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AddressesResponse {
    pub addresses: Vec<AddressEntry>,
}

#[derive(Debug, Serialize)]
pub struct TransactionLinks {
    pub addresses: String,
    pub subscribe: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub links: TransactionLinks,
    pub transactions: Vec<Transaction>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub index: IndexState,
    /// Ends open event streams when the server shuts down
    pub shutdown: CancellationToken,
    /// Used for links when the request carries no Host header
    pub default_host: String,
}

impl AppState {
    fn host(&self, host: Option<Host>) -> String {
        host.map(|Host(host)| host)
            .unwrap_or_else(|| self.default_host.clone())
    }
}

/// Build the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_current_block))
        .route("/addresses", get(get_addresses))
        .route("/addresses/:address", get(get_transactions))
        .route("/addresses/:address/subscribe", get(subscribe))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// HTTP gateway server
pub struct ApiServer {
    state: IndexState,
    config: ApiConfig,
}

impl ApiServer {
    pub fn new(state: IndexState, config: ApiConfig) -> Self {
        Self { state, config }
    }

    /// Serve until `shutdown` fires, then drain open connections for at
    /// most `shutdown_timeout_seconds`
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), IndexerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| IndexerError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| IndexerError::Server(e.to_string()))?;

        LogContext::new("gateway", "serve")
            .with_metadata("address", serde_json::json!(local_addr.to_string()))
            .info(&format!("HTTP gateway listening on {}", local_addr));

        let app = create_router(AppState {
            index: self.state,
            shutdown: shutdown.clone(),
            default_host: local_addr.to_string(),
        });

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        let drain_limit = self.config.shutdown_timeout();
        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(drain_limit).await;
        };

        tokio::select! {
            result = &mut server => {
                result.map_err(|e| IndexerError::Server(format!("Server error: {}", e)))?;
                log::info!("HTTP gateway stopped");
            }
            _ = deadline => {
                log::warn!(
                    "HTTP gateway did not drain within {}s, closing remaining connections",
                    drain_limit.as_secs()
                );
            }
        }

        Ok(())
    }
}

/// GET / - latest applied block and a link to the address list
pub async fn get_current_block(
    State(state): State<AppState>,
    host: Option<Host>,
) -> Json<CurrentBlockResponse> {
    let host = state.host(host);
    let block = state
        .index
        .current_block()
        .map(|height| height.to_string())
        .unwrap_or_else(|| NO_BLOCK.to_string());

    Json(CurrentBlockResponse {
        block,
        addresses: format!("http://{}/addresses", host),
    })
}

/// GET /addresses - every known address, busiest first
pub async fn get_addresses(
    State(state): State<AppState>,
    host: Option<Host>,
) -> Json<AddressesResponse> {
    let host = state.host(host);
    let addresses = state
        .index
        .addresses()
        .into_iter()
        .map(|summary| AddressEntry {
            transactions: format!("http://{}/addresses/{}", host, summary.address),
            address: summary.address,
            count: summary.count,
        })
        .collect();

    Json(AddressesResponse { addresses })
}

/// GET /addresses/:address - transaction history of one address.
/// Unknown addresses yield an empty list.
pub async fn get_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    host: Option<Host>,
) -> Json<TransactionsResponse> {
    let host = state.host(host);

    Json(TransactionsResponse {
        links: TransactionLinks {
            addresses: format!("http://{}/addresses", host),
            subscribe: format!("http://{}/addresses/{}/subscribe", host, address),
        },
        transactions: state.index.transactions(&address),
    })
}
