//! Status state machine for the NATS resource
//!
//! The status is only ever changed through the named transitions below. Each
//! transition states its post-condition on the overall state and on the
//! tracked conditions, so a status can be reasoned about without knowing
//! which code path produced it.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{condition_reasons, condition_types, Condition, ConditionStatus, NatsState};
use crate::RECOMMENDED_ZONE_COUNT;

/// Observed status of a NATS resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NatsStatus {
    #[serde(default)]
    state: NatsState,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    #[serde(default)]
    availability_zones_used: usize,
}

/// Verdict of the availability-zone spread check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ZoneSpread {
    /// The cluster is too small for zone spread to matter
    NotApplicable,
    /// Pods run in at least the recommended number of zones
    Spread {
        /// Number of distinct zones in use
        zones: usize,
    },
    /// Pods run in fewer zones than recommended
    Insufficient {
        /// Number of distinct zones in use
        zones: usize,
    },
}

impl NatsStatus {
    /// Current overall state
    pub fn state(&self) -> NatsState {
        self.state
    }

    /// All tracked conditions
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Client URL of the NATS service, set once it is ready
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Number of distinct availability zones used by the NATS pods
    pub fn availability_zones_used(&self) -> usize {
        self.availability_zones_used
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Start a reconcile pass: Processing, both tracked conditions False/Processing
    pub fn initialize(&mut self) {
        self.state = NatsState::Processing;
        self.update_condition(
            condition_types::STATEFUL_SET,
            ConditionStatus::False,
            condition_reasons::PROCESSING,
            "",
        );
        self.update_condition(
            condition_types::AVAILABLE,
            ConditionStatus::False,
            condition_reasons::PROCESSING,
            "",
        );
    }

    /// Resources are applied but the StatefulSet has not converged yet
    pub fn set_waiting(&mut self) {
        self.state = NatsState::Processing;
        self.update_condition(
            condition_types::STATEFUL_SET,
            ConditionStatus::False,
            condition_reasons::STATEFUL_SET_PENDING,
            "Waiting",
        );
        self.update_condition(
            condition_types::AVAILABLE,
            ConditionStatus::False,
            condition_reasons::DEPLOYING,
            "",
        );
    }

    /// The StatefulSet converged and NATS is deployed
    pub fn set_ready(&mut self) {
        self.state = NatsState::Ready;
        self.update_condition(
            condition_types::STATEFUL_SET,
            ConditionStatus::True,
            condition_reasons::STATEFUL_SET_AVAILABLE,
            "StatefulSet is ready!",
        );
        self.update_condition(
            condition_types::AVAILABLE,
            ConditionStatus::True,
            condition_reasons::DEPLOYED,
            "NATS is deployed!",
        );
    }

    /// A pass failed; the message carries the causing error
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.state = NatsState::Error;
        self.update_condition(
            condition_types::STATEFUL_SET,
            ConditionStatus::False,
            condition_reasons::SYNC_FAIL_ERROR,
            "",
        );
        self.update_condition(
            condition_types::AVAILABLE,
            ConditionStatus::False,
            condition_reasons::PROCESSING_ERROR,
            message,
        );
    }

    /// The resource identity is not the allowed one
    pub fn set_forbidden(&mut self, message: impl Into<String>) {
        self.state = NatsState::Error;
        self.update_condition(
            condition_types::STATEFUL_SET,
            ConditionStatus::False,
            condition_reasons::FORBIDDEN,
            "",
        );
        self.update_condition(
            condition_types::AVAILABLE,
            ConditionStatus::False,
            condition_reasons::FORBIDDEN,
            message,
        );
    }

    /// Deletion is in progress; conditions are left as they are
    pub fn set_deleting(&mut self) {
        self.state = NatsState::Deleting;
    }

    /// Deployed with a non-fatal problem; conditions are left as they are
    pub fn set_warning(&mut self) {
        self.state = NatsState::Warning;
    }

    /// Record the outcome of the availability-zone check
    ///
    /// Insufficient spread moves the resource to Warning.
    pub fn record_zone_spread(&mut self, spread: &ZoneSpread) {
        match spread {
            ZoneSpread::NotApplicable => {
                self.availability_zones_used = 0;
                self.update_condition(
                    condition_types::AVAILABILITY_ZONES,
                    ConditionStatus::False,
                    condition_reasons::NOT_CONFIGURED,
                    "NATS is not configured to run in cluster mode (i.e. spec.cluster.size < 3).",
                );
            }
            ZoneSpread::Spread { zones } => {
                self.availability_zones_used = *zones;
                self.update_condition(
                    condition_types::AVAILABILITY_ZONES,
                    ConditionStatus::True,
                    condition_reasons::DEPLOYED,
                    "NATS is deployed in different availability zones.",
                );
            }
            ZoneSpread::Insufficient { zones } => {
                self.availability_zones_used = *zones;
                self.update_condition(
                    condition_types::AVAILABILITY_ZONES,
                    ConditionStatus::False,
                    condition_reasons::NOT_CONFIGURED,
                    format!(
                        "NATS is not deployed in different availability zones (recommended: {}, current: {}).",
                        RECOMMENDED_ZONE_COUNT, zones
                    ),
                );
                self.set_warning();
            }
        }
    }

    /// Zone information could not be determined; the state is left untouched
    pub fn record_zone_lookup_failure(&mut self, message: impl Into<String>) {
        self.update_condition(
            condition_types::AVAILABILITY_ZONES,
            ConditionStatus::False,
            condition_reasons::PROCESSING_ERROR,
            message,
        );
    }

    /// Publish the client URL
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    /// Withdraw the client URL until the StatefulSet is ready again
    pub fn clear_url(&mut self) {
        self.url = None;
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Find a condition by type
    pub fn find_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or update the condition of the given type
    ///
    /// `lastTransitionTime` only moves when the status value changes.
    pub fn update_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = Utc::now();
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
            }
            None => self
                .conditions
                .push(Condition::new(type_, status, reason, message)),
        }
    }

    /// Compare two statuses for the purpose of skipping redundant writes
    ///
    /// State, URL and zone count must match, and conditions must match per
    /// type on status, reason and message. Timestamps and order are ignored.
    pub fn is_equal(&self, other: &NatsStatus) -> bool {
        if self.state != other.state
            || self.url != other.url
            || self.availability_zones_used != other.availability_zones_used
            || self.conditions.len() != other.conditions.len()
        {
            return false;
        }
        let covers = |a: &NatsStatus, b: &NatsStatus| {
            a.conditions.iter().all(|mine| {
                b.find_condition(&mine.type_)
                    .is_some_and(|theirs| mine.same_observation(theirs))
            })
        };
        covers(self, other) && covers(other, self)
    }
}
