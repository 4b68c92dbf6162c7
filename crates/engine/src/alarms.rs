// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The alarm engine: rule evaluation over polled readings, the
//! `(source, key)` occurrence state machine, acknowledgement, and the
//! restart-safe active snapshot.
//!
//! `set_state` runs read-decide-append under the store's commit lock, so
//! one transition produces exactly one event row; the broadcast fires
//! only after the commit, and only on a transition.

use crate::hub::{BroadcastHub, Channel};
use serde_json::{json, Map, Value};
use sg_core::clock::epoch_ms_to_rfc3339;
use sg_core::{
    AlarmEventRecord, AlarmOccurrence, AlarmSource, AlarmState, Clock, ConfigTree, DataPointId,
    Event, RuleId,
};
use sg_storage::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Errors from alarm operations
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("alarm occurrence not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A numeric reading fed by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericReading {
    pub datapoint_id: DataPointId,
    pub label: String,
    pub value: f64,
}

/// Everything `set_state` needs to know about one observation.
#[derive(Debug, Clone)]
pub struct SetStateParams {
    pub source: AlarmSource,
    pub key: String,
    pub new_state: AlarmState,
    pub severity: String,
    pub message: String,
    pub ts_ms: u64,
    pub datapoint_id: Option<DataPointId>,
    pub rule_id: Option<RuleId>,
    pub external_rule_id: Option<String>,
    pub value: Option<f64>,
    pub warning_threshold: Option<f64>,
    pub alarm_threshold: Option<f64>,
    pub meta: Map<String, Value>,
}

/// Result of a `set_state` call.
#[derive(Debug, Clone)]
pub struct SetStateOutcome {
    pub occurrence: AlarmOccurrence,
    pub created: bool,
    pub transitioned: bool,
}

/// An externally reported alarm observation (trusted HMI clients).
#[derive(Debug, Clone)]
pub struct CreateAlarmRequest {
    pub external_id: String,
    pub state: AlarmState,
    pub severity: String,
    pub message: String,
    pub datapoint_id: Option<DataPointId>,
    pub value: Option<f64>,
    pub meta: Map<String, Value>,
}

/// How a caller names the occurrence to acknowledge.
#[derive(Debug, Clone)]
pub enum AckTarget {
    Occurrence(u64),
    Event(u64),
    Key { source: AlarmSource, key: String },
}

/// Filters for the alarm event history.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub source: Option<AlarmSource>,
    pub key: Option<String>,
    pub occurrence_id: Option<u64>,
    pub datapoint_id: Option<DataPointId>,
    pub since_ms: Option<u64>,
    pub until_ms: Option<u64>,
    pub limit: usize,
}

impl HistoryQuery {
    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            100
        } else {
            self.limit.min(1000)
        }
    }
}

/// Central alarm state manager.
pub struct AlarmEngine<C: Clock> {
    store: Arc<Store>,
    config: Arc<ConfigTree>,
    hub: Arc<BroadcastHub>,
    clock: C,
}

impl<C: Clock> AlarmEngine<C> {
    pub fn new(store: Arc<Store>, config: Arc<ConfigTree>, hub: Arc<BroadcastHub>, clock: C) -> Self {
        Self { store, config, hub, clock }
    }

    /// Evaluate every enabled rule touched by a batch of readings.
    pub fn process_readings(&self, plc_name: &str, readings: &[NumericReading]) {
        let now = self.clock.epoch_ms();
        for reading in readings {
            let Some(dp) = self.config.datapoint(reading.datapoint_id) else {
                continue;
            };
            let path = self.config.owner_path(dp);
            for rule in self.config.rules_for(reading.datapoint_id) {
                let evaluation = rule.evaluate(reading.value, now);

                let mut meta = Map::new();
                meta.insert("plc".into(), json!(plc_name));
                if let Some(container) = path.container {
                    meta.insert("container".into(), json!(container.name));
                }
                if let Some(equipment) = path.equipment {
                    meta.insert("equipment".into(), json!(equipment.name));
                }
                meta.insert("label".into(), json!(reading.label));
                meta.insert("comparison".into(), json!(rule.comparison));

                let params = SetStateParams {
                    source: rule.source.alarm_source(),
                    key: rule.occurrence_key(),
                    new_state: evaluation.state,
                    severity: rule.severity.clone(),
                    message: evaluation.message,
                    ts_ms: now,
                    datapoint_id: Some(reading.datapoint_id),
                    rule_id: Some(rule.id),
                    external_rule_id: rule.external_id.clone(),
                    value: Some(reading.value),
                    warning_threshold: rule.warning_threshold,
                    alarm_threshold: rule.alarm_threshold,
                    meta,
                };
                if let Err(e) = self.set_state(params) {
                    tracing::error!(
                        rule_id = %rule.id,
                        datapoint_id = %reading.datapoint_id,
                        error = %e,
                        "alarm set_state failed"
                    );
                }
            }
        }
    }

    /// Ingest an externally evaluated alarm state (`CreateAlarm`).
    pub fn create_alarm(&self, request: CreateAlarmRequest) -> Result<SetStateOutcome, AlarmError> {
        let message = if request.message.is_empty() {
            format!("frontend rule {} -> {}", request.external_id, request.state)
        } else {
            request.message
        };
        self.set_state(SetStateParams {
            source: AlarmSource::FrontendRule,
            key: format!("frontend:{}", request.external_id),
            new_state: request.state,
            severity: request.severity,
            message,
            ts_ms: self.clock.epoch_ms(),
            datapoint_id: request.datapoint_id,
            rule_id: None,
            external_rule_id: Some(request.external_id),
            value: request.value,
            warning_threshold: None,
            alarm_threshold: None,
            meta: request.meta,
        })
    }

    /// Upsert the occurrence for `(source, key)` and record a transition
    /// event when the state changed. Broadcasts only on transition.
    pub fn set_state(&self, params: SetStateParams) -> Result<SetStateOutcome, AlarmError> {
        let key = if params.key.trim().is_empty() {
            sg_core::make_stable_key(params.source, &params.message)
        } else {
            params.key.clone()
        };

        let outcome = self.store.transact(|state| {
            let existing = state.occurrence_by_key(params.source, &key).cloned();
            let created = existing.is_none();
            let mut occ = existing.unwrap_or_else(|| AlarmOccurrence {
                id: state.peek_occurrence_id(),
                source: params.source,
                key: key.clone(),
                datapoint_id: params.datapoint_id,
                rule_id: params.rule_id,
                external_rule_id: params.external_rule_id.clone(),
                state: AlarmState::Ok,
                severity: params.severity.clone(),
                message: params.message.clone(),
                value: params.value,
                warning_threshold: params.warning_threshold,
                alarm_threshold: params.alarm_threshold,
                first_seen_ms: params.ts_ms,
                last_seen_ms: params.ts_ms,
                cleared_at_ms: None,
                is_active: false,
                acknowledged: false,
                acknowledged_at_ms: None,
                acknowledged_by_user_id: None,
                acknowledged_by_client_ip: None,
                meta: Map::new(),
            });

            let prev_state = occ.state;

            // Always refresh "last seen" and the descriptive fields
            occ.last_seen_ms = params.ts_ms;
            if !params.severity.is_empty() {
                occ.severity = params.severity.clone();
            }
            if !params.message.is_empty() {
                occ.message = params.message.clone();
            }
            occ.value = params.value;
            occ.warning_threshold = params.warning_threshold;
            occ.alarm_threshold = params.alarm_threshold;
            if params.datapoint_id.is_some() {
                occ.datapoint_id = params.datapoint_id;
            }
            if params.rule_id.is_some() {
                occ.rule_id = params.rule_id;
            }
            if params.external_rule_id.is_some() {
                occ.external_rule_id = params.external_rule_id.clone();
            }
            for (k, v) in &params.meta {
                occ.meta.insert(k.clone(), v.clone());
            }

            let transitioned = prev_state != params.new_state;
            let mut events = Vec::with_capacity(2);

            if transitioned {
                occ.state = params.new_state;
                occ.is_active = params.new_state.is_active();
                occ.cleared_at_ms =
                    if params.new_state == AlarmState::Ok { Some(params.ts_ms) } else { None };

                // Escalation to ALARM clears acknowledgement
                if prev_state != AlarmState::Alarm && params.new_state == AlarmState::Alarm {
                    occ.acknowledged = false;
                    occ.acknowledged_at_ms = None;
                    occ.acknowledged_by_user_id = None;
                    occ.acknowledged_by_client_ip = None;
                }

                events.push(Event::AlarmEventAppended {
                    event: AlarmEventRecord {
                        id: state.peek_alarm_event_id(),
                        occurrence_id: occ.id,
                        ts_ms: params.ts_ms,
                        source: params.source,
                        key: key.clone(),
                        datapoint_id: occ.datapoint_id,
                        rule_id: occ.rule_id,
                        external_rule_id: occ.external_rule_id.clone(),
                        prev_state,
                        new_state: params.new_state,
                        severity: occ.severity.clone(),
                        message: occ.message.clone(),
                        value: params.value,
                        meta: params.meta.clone(),
                    },
                });
            }

            events.insert(0, Event::AlarmOccurrenceUpserted { occurrence: occ.clone() });
            (events, SetStateOutcome { occurrence: occ, created, transitioned })
        })?;

        if outcome.transitioned {
            let payload = self.alarm_payload(&outcome.occurrence);
            self.hub.broadcast(Channel::Alarms, &payload);
            tracing::info!(
                source = %outcome.occurrence.source,
                key = %outcome.occurrence.key,
                state = %outcome.occurrence.state,
                "alarm transition"
            );
        }
        Ok(outcome)
    }

    /// Set or clear acknowledgement. Writes no event row; raises
    /// `NotFound` when the target does not resolve.
    pub fn acknowledge(
        &self,
        target: AckTarget,
        acknowledged: bool,
        user_id: Option<u32>,
        client_ip: Option<&str>,
        note: Option<&str>,
    ) -> Result<AlarmOccurrence, AlarmError> {
        let now = self.clock.epoch_ms();
        self.store.transact(|state| {
            let occurrence_id = match &target {
                AckTarget::Occurrence(id) => Some(*id),
                AckTarget::Event(event_id) => {
                    state.alarm_events.get(event_id).map(|e| e.occurrence_id)
                }
                AckTarget::Key { source, key } => {
                    state.occurrence_by_key(*source, key).map(|o| o.id)
                }
            };
            let Some(mut occ) =
                occurrence_id.and_then(|id| state.occurrences.get(&id).cloned())
            else {
                return (vec![], Err(AlarmError::NotFound));
            };

            let already = occ.acknowledged == acknowledged && note.is_none();
            if already {
                return (vec![], Ok(occ));
            }

            occ.acknowledged = acknowledged;
            occ.acknowledged_at_ms = acknowledged.then_some(now);
            occ.acknowledged_by_user_id = if acknowledged { user_id } else { None };
            occ.acknowledged_by_client_ip =
                if acknowledged { client_ip.map(str::to_string) } else { None };
            if let Some(note) = note {
                occ.meta.insert("ack_note".into(), json!(note));
            }

            (vec![Event::AlarmOccurrenceUpserted { occurrence: occ.clone() }], Ok(occ))
        })?
    }

    /// Active occurrences decorated with display context, newest first.
    /// Delivered to subscribers at connect time.
    pub fn active_snapshot(&self) -> Vec<Value> {
        let state = self.store.read();
        state.active_occurrences().into_iter().map(|occ| self.occurrence_row(occ)).collect()
    }

    /// Query the immutable transition history, newest first.
    pub fn query_history(&self, query: &HistoryQuery) -> Vec<AlarmEventRecord> {
        let state = self.store.read();
        state
            .alarm_events
            .values()
            .rev()
            .filter(|e| query.source.is_none_or(|s| e.source == s))
            .filter(|e| query.key.as_deref().is_none_or(|k| e.key == k))
            .filter(|e| query.occurrence_id.is_none_or(|id| e.occurrence_id == id))
            .filter(|e| query.datapoint_id.is_none_or(|dp| e.datapoint_id == Some(dp)))
            .filter(|e| query.since_ms.is_none_or(|since| e.ts_ms >= since))
            .filter(|e| query.until_ms.is_none_or(|until| e.ts_ms <= until))
            .take(query.effective_limit())
            .cloned()
            .collect()
    }

    pub fn occurrence(&self, id: u64) -> Option<AlarmOccurrence> {
        self.store.read().occurrences.get(&id).cloned()
    }

    fn occurrence_row(&self, occ: &AlarmOccurrence) -> Value {
        let context = alarm_context(&self.config, occ.datapoint_id, &occ.meta);
        json!({
            "occurrence_id": occ.id,
            "source": occ.source,
            "key": occ.key,
            "datapoint_id": occ.datapoint_id,
            "datapoint_label": context.datapoint_label,
            "plc_name": context.plc_name,
            "container_name": context.container_name,
            "equipment_name": context.equipment_name,
            "rule_id": occ.rule_id,
            "external_rule_id": occ.external_rule_id,
            "state": occ.state,
            "severity": occ.severity,
            "message": occ.message,
            "value": occ.value,
            "warning_threshold": occ.warning_threshold,
            "alarm_threshold": occ.alarm_threshold,
            "first_seen": epoch_ms_to_rfc3339(occ.first_seen_ms),
            "last_seen": epoch_ms_to_rfc3339(occ.last_seen_ms),
            "acknowledged": occ.acknowledged,
            "acknowledged_at": occ.acknowledged_at_ms.map(epoch_ms_to_rfc3339),
        })
    }

    /// The `alarm_state` wire payload for one occurrence.
    pub fn alarm_payload(&self, occ: &AlarmOccurrence) -> Value {
        let context = alarm_context(&self.config, occ.datapoint_id, &occ.meta);
        json!({
            "type": "alarm_state",
            "ts": epoch_ms_to_rfc3339(occ.last_seen_ms),
            "source": occ.source,
            "key": occ.key,
            "occurrence_id": occ.id,
            "state": occ.state,
            "severity": occ.severity,
            "value": occ.value,
            "warning_threshold": occ.warning_threshold,
            "alarm_threshold": occ.alarm_threshold,
            "message": occ.message,
            "plc_name": context.plc_name,
            "container_name": context.container_name,
            "equipment_name": context.equipment_name,
            "datapoint_label": context.datapoint_label,
            "datapoint_id": occ.datapoint_id,
            "rule_id": occ.rule_id,
        })
    }
}

/// Display context for an occurrence: explicit meta wins, the
/// configuration tree fills the rest.
struct AlarmContext {
    plc_name: Option<String>,
    container_name: Option<String>,
    equipment_name: Option<String>,
    datapoint_label: Option<String>,
}

fn alarm_context(
    config: &ConfigTree,
    datapoint_id: Option<DataPointId>,
    meta: &Map<String, Value>,
) -> AlarmContext {
    let from_meta = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);
    let mut context = AlarmContext {
        plc_name: from_meta("plc"),
        container_name: from_meta("container"),
        equipment_name: from_meta("equipment"),
        datapoint_label: from_meta("label"),
    };

    let Some(dp) = datapoint_id.and_then(|id| config.datapoint(id)) else {
        return context;
    };
    context.datapoint_label.get_or_insert_with(|| dp.label.clone());
    let path = config.owner_path(dp);
    if context.plc_name.is_none() {
        context.plc_name = path.plc.map(|p| p.name.clone());
    }
    if context.container_name.is_none() {
        context.container_name = path.container.map(|c| c.name.clone());
    }
    if context.equipment_name.is_none() {
        context.equipment_name = path.equipment.map(|e| e.name.clone());
    }
    context
}

#[cfg(test)]
#[path = "alarms_tests.rs"]
mod tests;
