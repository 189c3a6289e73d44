pub mod api;
pub mod appresult;
pub mod config;
pub mod cors;
pub mod res;
pub mod rooms;
pub mod sanitize;
pub mod store;

use std::sync::Arc;

use axum::{Router, extract::FromRef};
use tower_http::trace::TraceLayer;

pub use appresult::{AppError, AppResult};
use config::Config;
use rooms::SignalingRelay;
use store::SharedStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SharedStore,
    pub relay: Arc<SignalingRelay>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        let relay = SignalingRelay::new(store.clone(), config.relay());
        Self {
            store,
            relay: Arc::new(relay),
            config: Arc::new(config),
        }
    }
}

/// The full HTTP surface: room socket, REST API, 404 fallback, CORS.
pub fn app(state: AppState) -> Router {
    let cors = cors::layer(&state.config.allowed_origins);

    Router::new()
        .merge(rooms::router())
        .nest("/api", api::router())
        .fallback(api::not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
