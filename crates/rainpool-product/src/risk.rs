//! Rain risks
//!
//! A risk is a place plus a time window plus payout terms. Its id is derived
//! from `(place, start, end)`, so the same window can only be insured once.
//! Once any application references a risk its terms are frozen.

use rainpool_common::{
    Amount, RequestId, RiskError, RiskId, PERCENTAGE_MULTIPLIER, SECONDS_PER_DAY,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::payout::{Precipitation, RainfallIndex, Thresholds};

/// Risk creation input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSpec {
    pub place: String,
    /// Unix seconds
    pub start: i64,
    pub end: i64,
    /// Scaled by `COORDINATES_MULTIPLIER`
    pub lat: i64,
    pub long: i64,
    /// Scaled by `PERCENTAGE_MULTIPLIER`
    pub trigger: u64,
    pub exit: u64,
    /// Historical precipitation, scaled by `PRECIPITATION_MULTIPLIER`
    pub prec_hist: u64,
    pub prec_days: u32,
    #[serde(default)]
    pub index: RainfallIndex,
}

/// New payout terms for an unreferenced risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAdjustment {
    pub trigger: u64,
    pub exit: u64,
    pub prec_hist: u64,
    pub prec_days: u32,
}

/// Where a risk stands with the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleStatus {
    NotTriggered,
    Triggered,
    Responded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub id: RiskId,
    pub place: String,
    pub lat: i64,
    pub long: i64,
    pub start: i64,
    pub end: i64,
    pub trigger: u64,
    pub exit: u64,
    pub prec_hist: u64,
    pub prec_days: u32,
    pub index: RainfallIndex,

    // oracle
    pub request_triggered: bool,
    pub request_id: Option<RequestId>,
    pub response_at: Option<i64>,
    pub prec_actual: u64,
    pub prec_days_actual: u32,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Risk {
    /// Window length in seconds
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Whole days covered by the window
    pub fn duration_days(&self) -> u32 {
        u32::try_from(self.duration() / SECONDS_PER_DAY).unwrap_or(u32::MAX)
    }

    pub fn oracle_status(&self) -> OracleStatus {
        if self.response_at.is_some() {
            OracleStatus::Responded
        } else if self.request_triggered {
            OracleStatus::Triggered
        } else {
            OracleStatus::NotTriggered
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            trigger: self.trigger,
            exit: self.exit,
        }
    }

    pub fn historical(&self) -> Precipitation {
        Precipitation {
            amount: self.prec_hist,
            days: self.prec_days,
        }
    }

    /// The oracle observation, once one was accepted
    pub fn observed(&self) -> Option<Precipitation> {
        self.response_at.map(|_| Precipitation {
            amount: self.prec_actual,
            days: self.prec_days_actual,
        })
    }
}

/// Registry of all risks, in creation order
#[derive(Debug, Default)]
pub struct RiskRegistry {
    risks: BTreeMap<RiskId, Risk>,
    order: Vec<RiskId>,
    min_duration: i64,
    max_duration: i64,
}

impl RiskRegistry {
    pub fn new(min_duration: i64, max_duration: i64) -> Self {
        Self {
            risks: BTreeMap::new(),
            order: Vec::new(),
            min_duration,
            max_duration,
        }
    }

    /// Validate and store a new risk
    ///
    /// Checks run in a fixed order so the first failing rule is reported:
    /// place, uniqueness, thresholds, window, historical data.
    pub fn create(&mut self, spec: RiskSpec, now: i64) -> Result<RiskId, RiskError> {
        if spec.place.is_empty() {
            return Err(RiskError::PlaceMissing);
        }
        let id = RiskId::derive(&spec.place, spec.start, spec.end);
        if self.risks.contains_key(&id) {
            return Err(RiskError::AlreadyExists(id));
        }
        validate_thresholds(spec.trigger, spec.exit)?;
        self.validate_window(spec.start, spec.end, now)?;
        validate_historical(spec.prec_hist, spec.prec_days)?;

        self.risks.insert(
            id,
            Risk {
                id,
                place: spec.place,
                lat: spec.lat,
                long: spec.long,
                start: spec.start,
                end: spec.end,
                trigger: spec.trigger,
                exit: spec.exit,
                prec_hist: spec.prec_hist,
                prec_days: spec.prec_days,
                index: spec.index,
                request_triggered: false,
                request_id: None,
                response_at: None,
                prec_actual: 0,
                prec_days_actual: 0,
                created_at: now,
                updated_at: now,
            },
        );
        self.order.push(id);
        Ok(id)
    }

    /// Replace the payout terms of a risk no application references yet
    pub fn adjust(
        &mut self,
        id: RiskId,
        adjustment: RiskAdjustment,
        referencing_policies: usize,
        now: i64,
    ) -> Result<(), RiskError> {
        if !self.risks.contains_key(&id) {
            return Err(RiskError::NotFound(id));
        }
        if referencing_policies > 0 {
            return Err(RiskError::WithPoliciesNotAdjustable {
                risk_id: id,
                policies: referencing_policies,
            });
        }
        validate_thresholds(adjustment.trigger, adjustment.exit)?;
        validate_historical(adjustment.prec_hist, adjustment.prec_days)?;

        let risk = self.get_mut(id)?;
        risk.trigger = adjustment.trigger;
        risk.exit = adjustment.exit;
        risk.prec_hist = adjustment.prec_hist;
        risk.prec_days = adjustment.prec_days;
        risk.updated_at = now;
        Ok(())
    }

    pub fn get(&self, id: RiskId) -> Result<&Risk, RiskError> {
        self.risks.get(&id).ok_or(RiskError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: RiskId) -> Result<&mut Risk, RiskError> {
        self.risks.get_mut(&id).ok_or(RiskError::NotFound(id))
    }

    /// Number of risks
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Risk id at creation index
    pub fn id_at(&self, idx: usize) -> Option<RiskId> {
        self.order.get(idx).copied()
    }

    fn validate_window(&self, start: i64, end: i64, now: i64) -> Result<(), RiskError> {
        if start <= now {
            return Err(RiskError::StartDateInvalid);
        }
        if end <= start {
            return Err(RiskError::EndDateInvalid);
        }
        let duration = end - start;
        if duration < self.min_duration {
            return Err(RiskError::DurationTooShort {
                duration,
                min: self.min_duration,
            });
        }
        if duration > self.max_duration {
            return Err(RiskError::DurationTooLong {
                duration,
                max: self.max_duration,
            });
        }
        Ok(())
    }
}

fn validate_thresholds(trigger: u64, exit: u64) -> Result<(), RiskError> {
    if trigger > PERCENTAGE_MULTIPLIER {
        return Err(RiskError::TriggerTooLarge {
            trigger,
            max: PERCENTAGE_MULTIPLIER,
        });
    }
    if exit <= trigger {
        return Err(RiskError::ExitNotLargerThanTrigger { trigger, exit });
    }
    Ok(())
}

fn validate_historical(prec_hist: Amount, prec_days: u32) -> Result<(), RiskError> {
    if prec_hist == 0 {
        return Err(RiskError::HistoricalPrecipitationInvalid);
    }
    if prec_days == 0 {
        return Err(RiskError::HistoricalDaysInvalid);
    }
    Ok(())
}
