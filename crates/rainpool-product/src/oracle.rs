//! Oracle coordination
//!
//! Tracks every rainfall data request issued for a risk. A risk has at most
//! one pending request: triggering again supersedes the pending one, and a
//! request that was cancelled or superseded can no longer be fulfilled.
//! Once a valid response is recorded the risk's observation is final.

use rainpool_common::ports::{OracleTransport, RiskDataRequest};
use rainpool_common::{OracleError, RequestId, RiskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::risk::{OracleStatus, Risk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Triggered,
    Cancelled,
    Responded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub request_id: RequestId,
    pub risk_id: RiskId,
    pub state: RequestState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Why an oracle response was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownRequest,
    NotPending(RequestState),
    OutOfRange { value: u64, max: u64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownRequest => write!(f, "unknown request"),
            Rejection::NotPending(state) => write!(f, "request is {:?}", state),
            Rejection::OutOfRange { value, max } => {
                write!(f, "precipitation {} above maximum {}", value, max)
            }
        }
    }
}

pub struct OracleCoordinator {
    requests: BTreeMap<RequestId, OracleRequest>,
    transport: Arc<dyn OracleTransport>,
    max_precipitation: u64,
}

impl OracleCoordinator {
    pub fn new(transport: Arc<dyn OracleTransport>, max_precipitation: u64) -> Self {
        Self {
            requests: BTreeMap::new(),
            transport,
            max_precipitation,
        }
    }

    /// Request rainfall data for `risk`
    ///
    /// Returns the new request id and, if a pending request was superseded,
    /// its id.
    pub fn trigger(
        &mut self,
        risk: &mut Risk,
        now: i64,
    ) -> Result<(RequestId, Option<RequestId>), OracleError> {
        if risk.oracle_status() == OracleStatus::Responded {
            return Err(OracleError::AlreadyTriggered(risk.id));
        }

        let request = RiskDataRequest {
            risk_id: risk.id,
            place: risk.place.clone(),
            lat: risk.lat,
            long: risk.long,
            start: risk.start,
            end: risk.end,
        };
        let request_id = self.transport.submit_request(&request)?;

        let superseded = self.pending_for(risk);
        if let Some(previous) = superseded {
            self.mark(previous, RequestState::Cancelled, now);
            if let Err(e) = self.transport.cancel(previous) {
                warn!(%previous, error = %e, "transport cancel of superseded request failed");
            }
        }

        self.requests.insert(
            request_id,
            OracleRequest {
                request_id,
                risk_id: risk.id,
                state: RequestState::Triggered,
                created_at: now,
                updated_at: now,
            },
        );
        risk.request_triggered = true;
        risk.request_id = Some(request_id);
        risk.updated_at = now;
        Ok((request_id, superseded))
    }

    /// Cancel the pending request of `risk`
    pub fn cancel(&mut self, risk: &Risk, now: i64) -> Result<RequestId, OracleError> {
        let request_id = self
            .pending_for(risk)
            .ok_or(OracleError::NotTriggered(risk.id))?;
        self.transport.cancel(request_id)?;
        self.mark(request_id, RequestState::Cancelled, now);
        Ok(request_id)
    }

    /// Check an incoming response without applying it
    pub fn check_response(&self, request_id: RequestId, value: u64) -> Result<RiskId, Rejection> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or(Rejection::UnknownRequest)?;
        if request.state != RequestState::Triggered {
            return Err(Rejection::NotPending(request.state));
        }
        if value > self.max_precipitation {
            return Err(Rejection::OutOfRange {
                value,
                max: self.max_precipitation,
            });
        }
        Ok(request.risk_id)
    }

    /// Record an accepted response on `risk`
    ///
    /// Callers run [`check_response`](Self::check_response) first.
    pub fn apply_response(
        &mut self,
        request_id: RequestId,
        risk: &mut Risk,
        value: u64,
        days: u32,
        now: i64,
    ) {
        self.mark(request_id, RequestState::Responded, now);
        risk.prec_actual = value;
        risk.prec_days_actual = days;
        risk.response_at = Some(now);
        risk.updated_at = now;
        debug!(%request_id, risk_id = %risk.id, value, days, "oracle response applied");
    }

    pub fn request(&self, request_id: RequestId) -> Option<&OracleRequest> {
        self.requests.get(&request_id)
    }

    pub fn max_precipitation(&self) -> u64 {
        self.max_precipitation
    }

    fn pending_for(&self, risk: &Risk) -> Option<RequestId> {
        risk.request_id.filter(|id| {
            self.requests
                .get(id)
                .is_some_and(|r| r.state == RequestState::Triggered)
        })
    }

    fn mark(&mut self, request_id: RequestId, state: RequestState, now: i64) {
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.state = state;
            request.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::RainfallIndex;
    use rainpool_common::ports::QueuedOracleTransport;

    fn risk() -> Risk {
        Risk {
            id: RiskId::derive("10001.saopaulo", 100, 200),
            place: "10001.saopaulo".to_string(),
            lat: 0,
            long: 0,
            start: 100,
            end: 200,
            trigger: 100_000,
            exit: 1_000_000,
            prec_hist: 500,
            prec_days: 2,
            index: RainfallIndex::Excess,
            request_triggered: false,
            request_id: None,
            response_at: None,
            prec_actual: 0,
            prec_days_actual: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn coordinator() -> (OracleCoordinator, Arc<QueuedOracleTransport>) {
        let transport = Arc::new(QueuedOracleTransport::new());
        (OracleCoordinator::new(transport.clone(), 10_000), transport)
    }

    #[test]
    fn test_trigger_then_respond() {
        let (mut oracle, transport) = coordinator();
        let mut risk = risk();

        let (id, superseded) = oracle.trigger(&mut risk, 10).unwrap();
        assert_eq!(id, RequestId(0));
        assert_eq!(superseded, None);
        assert_eq!(risk.oracle_status(), OracleStatus::Triggered);
        assert_eq!(transport.pending().len(), 1);

        assert_eq!(oracle.check_response(id, 600), Ok(risk.id));
        oracle.apply_response(id, &mut risk, 600, 2, 20);
        assert_eq!(risk.oracle_status(), OracleStatus::Responded);
        assert_eq!(risk.response_at, Some(20));

        assert_eq!(
            oracle.trigger(&mut risk, 30),
            Err(OracleError::AlreadyTriggered(risk.id))
        );
        assert_eq!(
            oracle.check_response(id, 600),
            Err(Rejection::NotPending(RequestState::Responded))
        );
    }

    #[test]
    fn test_out_of_range_keeps_request_pending() {
        let (mut oracle, _) = coordinator();
        let mut risk = risk();
        let (id, _) = oracle.trigger(&mut risk, 10).unwrap();

        assert_eq!(
            oracle.check_response(id, 10_001),
            Err(Rejection::OutOfRange {
                value: 10_001,
                max: 10_000
            })
        );
        assert_eq!(oracle.request(id).unwrap().state, RequestState::Triggered);
        assert_eq!(risk.response_at, None);
    }

    #[test]
    fn test_retrigger_supersedes() {
        let (mut oracle, transport) = coordinator();
        let mut risk = risk();
        let (first, _) = oracle.trigger(&mut risk, 10).unwrap();
        let (second, superseded) = oracle.trigger(&mut risk, 11).unwrap();

        assert_eq!(second, RequestId(1));
        assert_eq!(superseded, Some(first));
        assert_eq!(risk.request_id, Some(second));
        assert_eq!(oracle.request(first).unwrap().state, RequestState::Cancelled);
        assert_eq!(
            transport.pending().into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![second]
        );
        assert!(oracle.check_response(first, 100).is_err());
    }

    #[test]
    fn test_cancel() {
        let (mut oracle, _) = coordinator();
        let mut risk = risk();
        assert_eq!(oracle.cancel(&risk, 5), Err(OracleError::NotTriggered(risk.id)));

        let (id, _) = oracle.trigger(&mut risk, 10).unwrap();
        assert_eq!(oracle.cancel(&risk, 12), Ok(id));
        assert_eq!(oracle.cancel(&risk, 13), Err(OracleError::NotTriggered(risk.id)));
        assert_eq!(
            oracle.check_response(id, 100),
            Err(Rejection::NotPending(RequestState::Cancelled))
        );
        // the risk keeps its triggered flag until a new request is answered
        assert_eq!(risk.oracle_status(), OracleStatus::Triggered);
    }

    #[test]
    fn test_unknown_request() {
        let (oracle, _) = coordinator();
        assert_eq!(
            oracle.check_response(RequestId(42), 1),
            Err(Rejection::UnknownRequest)
        );
    }
}
