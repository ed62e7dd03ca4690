//! Oracle relay
//!
//! Stands in for the external oracle network. On every tick the relay takes
//! the requests queued on the [`QueuedOracleTransport`], asks an
//! [`ObservationSource`] for the measured rainfall and forwards each answer
//! to the engine. Requests without an observation yet are retried on the
//! next tick; requests the engine no longer considers pending are dropped.

use async_trait::async_trait;
use rainpool_common::ports::{QueuedOracleTransport, RiskDataRequest};
use rainpool_common::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;

/// Measured rainfall for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Aggregated precipitation, fixed-point
    pub prec_actual: u64,
    /// Rainy days; the risk window length when unset
    #[serde(default)]
    pub days: Option<u32>,
}

/// Where the relay gets rainfall measurements from
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// `Ok(None)` when no measurement is available yet
    async fn observe(&self, request: &RiskDataRequest) -> anyhow::Result<Option<Observation>>;
}

/// Fixed observations keyed by place
#[derive(Debug, Clone, Default)]
pub struct StaticObservationSource {
    by_place: HashMap<String, Observation>,
}

impl StaticObservationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, place: impl Into<String>, observation: Observation) -> Self {
        self.by_place.insert(place.into(), observation);
        self
    }

    /// Parse a `{"place": {"prec_actual": .., "days": ..}}` document
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let by_place: HashMap<String, Observation> = serde_json::from_str(json)?;
        Ok(Self { by_place })
    }
}

#[async_trait]
impl ObservationSource for StaticObservationSource {
    async fn observe(&self, request: &RiskDataRequest) -> anyhow::Result<Option<Observation>> {
        Ok(self.by_place.get(&request.place).copied())
    }
}

pub struct OracleRelay<S> {
    transport: Arc<QueuedOracleTransport>,
    source: S,
    engine: EngineHandle,
    interval: Duration,
    waiting: Vec<(RequestId, RiskDataRequest)>,
}

impl<S: ObservationSource> OracleRelay<S> {
    pub fn new(
        transport: Arc<QueuedOracleTransport>,
        source: S,
        engine: EngineHandle,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            source,
            engine,
            interval,
            waiting: Vec::new(),
        }
    }

    /// Requests taken from the transport but not yet answered
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// Answer every request that has an observation
    ///
    /// Returns how many responses the engine accepted.
    pub async fn drain_once(&mut self) -> anyhow::Result<usize> {
        self.waiting.extend(self.transport.take_pending());

        let mut accepted = 0;
        let mut still_waiting = Vec::new();
        for (request_id, request) in std::mem::take(&mut self.waiting) {
            if !self.engine.is_request_pending(request_id).await? {
                debug!(%request_id, "request cancelled or answered, dropping");
                continue;
            }
            match self.source.observe(&request).await {
                Ok(Some(observation)) => {
                    let ok = self
                        .engine
                        .fulfill(request_id, observation.prec_actual, observation.days)
                        .await?;
                    if ok {
                        accepted += 1;
                    } else {
                        // Cancelled, superseded or out of range; the engine logged why
                        debug!(%request_id, "response not accepted, dropping request");
                    }
                }
                Ok(None) => still_waiting.push((request_id, request)),
                Err(e) => {
                    warn!(%request_id, place = %request.place, error = %e, "observation lookup failed");
                    still_waiting.push((request_id, request));
                }
            }
        }
        self.waiting = still_waiting;
        Ok(accepted)
    }

    /// Poll until `shutdown` flips to true or the engine stops
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_ms = self.interval.as_millis() as u64, "Oracle relay started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(0) => {}
                        Ok(accepted) => info!(accepted, "oracle responses delivered"),
                        Err(e) => {
                            warn!(error = %e, "engine unavailable, relay stopping");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(waiting = self.waiting.len(), "Oracle relay stopped");
    }
}
