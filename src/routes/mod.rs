//! HTTP API gateway: merges every route module into one router.

use std::sync::Arc;

use axum::Router;

use crate::bridge::BridgeQueue;
use crate::broker::BrokerConnector;
use crate::ingest::{Payload, Recorder};
use crate::store::{ProductStore, ReadingStore};

mod health;
mod products;
mod readings;
mod self_test;
mod status;
mod tags;

// ---

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub products: Arc<dyn ProductStore>,
    pub readings: Arc<dyn ReadingStore>,
    pub recorder: Recorder,
    pub broker: BrokerConnector,
    pub queue: Arc<BridgeQueue<Payload>>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(products::router())
        .merge(tags::router())
        .merge(self_test::router())
        .merge(status::router())
        .merge(health::router())
        .with_state(state)
}
