//! Reading ingestion: classification and persistence of telemetry.
//!
//! [`Recorder`] is the one place a reading is classified and written; the
//! broker path ([`IngestWorker`]) and the manual `POST /readings` route both go
//! through it. [`IngestWorker`] drains the bridge queue one payload at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::BridgeQueue;
use crate::classify::classify;
use crate::models::{Reading, ReadingSource};
use crate::normalize::{self, Telemetry};
use crate::store::{ProductStore, ReadingStore, StoreResult};

/// Decoded telemetry object as carried by the bridge queue.
pub type Payload = Map<String, Value>;

// ---

/// Looks up the product for a reading, classifies it and stores it.
#[derive(Clone)]
pub struct Recorder {
    products: Arc<dyn ProductStore>,
    readings: Arc<dyn ReadingStore>,
}

impl Recorder {
    // ---
    pub fn new(products: Arc<dyn ProductStore>, readings: Arc<dyn ReadingStore>) -> Self {
        Self { products, readings }
    }

    /// Classify and persist one reading.
    ///
    /// The state is computed here from the current product range and is never
    /// taken from the caller.
    pub async fn record(
        &self,
        telemetry: Telemetry,
        source: ReadingSource,
    ) -> StoreResult<Reading> {
        // ---
        let product = self.products.find_by_tag(&telemetry.tag_id).await?;
        let state = classify(telemetry.temperature, product.as_ref());

        let reading = Reading {
            id: Uuid::new_v4(),
            tag_id: telemetry.tag_id,
            timestamp: telemetry.timestamp.unwrap_or_else(Utc::now),
            temperature: telemetry.temperature.value(),
            state,
            source,
        };

        self.readings.insert(&reading).await?;
        Ok(reading)
    }
}

// ---

/// Single consumer of the bridge queue.
pub struct IngestWorker {
    queue: Arc<BridgeQueue<Payload>>,
    recorder: Recorder,
    poll_timeout: Duration,
}

impl IngestWorker {
    // ---
    pub fn new(queue: Arc<BridgeQueue<Payload>>, recorder: Recorder, poll_timeout: Duration) -> Self {
        Self {
            queue,
            recorder,
            poll_timeout,
        }
    }

    /// Run the worker on the current runtime until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        // ---
        info!(
            "Ingestion worker started (poll timeout {:?})",
            self.poll_timeout
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = tokio::time::timeout(self.poll_timeout, self.queue.pop()) => {
                    match next {
                        Ok(payload) => self.process(payload).await,
                        // Idle; go around so cancellation is observed.
                        Err(_) => continue,
                    }
                }
            }
        }

        if !self.queue.is_empty() {
            warn!(
                "Ingestion worker stopping with {} payloads still queued",
                self.queue.len()
            );
        }
        info!("Ingestion worker stopped");
    }

    /// Handle one payload. Failures are logged; the worker always continues.
    async fn process(&self, payload: Payload) {
        // ---
        let telemetry = match normalize::normalize(&payload) {
            Ok(t) => t,
            Err(e) => {
                let raw = Value::Object(payload);
                warn!("Discarding payload: {} - Raw: {}", e, raw);
                return;
            }
        };

        let tag_id = telemetry.tag_id.clone();
        debug!("Processing reading for tag {}", tag_id);

        match self.recorder.record(telemetry, ReadingSource::Broker).await {
            Ok(reading) => info!(
                "Stored reading {} for tag {}: {} ({:?})",
                reading.id, reading.tag_id, reading.state, reading.temperature
            ),
            Err(e) => error!("Failed to store reading for tag {}: {}", tag_id, e),
        }
    }
}
