//! Oracle transport
//!
//! The engine submits rainfall data requests and receives responses as
//! separate calls. Transport authentication is the transport's concern.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::OracleError;
use crate::types::ids::{RequestId, RiskId};

/// Payload of a rainfall data request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDataRequest {
    pub risk_id: RiskId,
    pub place: String,
    pub lat: i64,
    pub long: i64,
    pub start: i64,
    pub end: i64,
}

/// Outbound side of the oracle network
pub trait OracleTransport: Send + Sync {
    /// Submit a request; returns the id the response will carry
    fn submit_request(&self, request: &RiskDataRequest) -> Result<RequestId, OracleError>;

    /// Withdraw a pending request
    fn cancel(&self, request_id: RequestId) -> Result<(), OracleError>;
}

#[derive(Debug, Default)]
struct Queue {
    next_id: u64,
    pending: BTreeMap<RequestId, RiskDataRequest>,
}

/// In-memory transport that queues requests for a relay to answer
///
/// Request ids start at 0.
#[derive(Debug, Default)]
pub struct QueuedOracleTransport {
    queue: Mutex<Queue>,
}

impl QueuedOracleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet answered or cancelled
    pub fn pending(&self) -> Vec<(RequestId, RiskDataRequest)> {
        self.queue
            .lock()
            .pending
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    /// Remove and return all pending requests
    pub fn take_pending(&self) -> Vec<(RequestId, RiskDataRequest)> {
        let mut queue = self.queue.lock();
        std::mem::take(&mut queue.pending).into_iter().collect()
    }
}

impl OracleTransport for QueuedOracleTransport {
    fn submit_request(&self, request: &RiskDataRequest) -> Result<RequestId, OracleError> {
        let mut queue = self.queue.lock();
        let request_id = RequestId(queue.next_id);
        queue.next_id += 1;
        queue.pending.insert(request_id, request.clone());
        debug!(%request_id, risk_id = %request.risk_id, "oracle request queued");
        Ok(request_id)
    }

    fn cancel(&self, request_id: RequestId) -> Result<(), OracleError> {
        // Cancelling an already delivered request is a no-op at the transport
        self.queue.lock().pending.remove(&request_id);
        Ok(())
    }
}
