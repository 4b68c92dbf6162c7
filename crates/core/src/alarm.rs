// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alarm rules, threshold evaluation, and the occurrence/event records.
//!
//! Rules are configuration; occurrences and events are runtime state owned
//! by the alarm engine. An occurrence is the authoritative row for one
//! `(source, key)`; events are the immutable transition log.

use crate::clock::epoch_ms_to_utc;
use crate::config::{DataPointId, RuleId};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// State of one alarm occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmState {
    Ok,
    Warning,
    Alarm,
}

crate::simple_display! {
    AlarmState {
        Ok => "OK",
        Warning => "WARNING",
        Alarm => "ALARM",
    }
}

impl AlarmState {
    pub fn is_active(self) -> bool {
        matches!(self, AlarmState::Warning | AlarmState::Alarm)
    }
}

/// Where an occurrence originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmSource {
    Plc,
    BackendRule,
    FrontendRule,
}

crate::simple_display! {
    AlarmSource {
        Plc => "plc",
        BackendRule => "backend_rule",
        FrontendRule => "frontend_rule",
    }
}

/// Which side authored a rule definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Backend,
    Frontend,
}

impl RuleSource {
    /// The occurrence source rules of this origin report under.
    pub fn alarm_source(self) -> AlarmSource {
        match self {
            RuleSource::Backend => AlarmSource::BackendRule,
            RuleSource::Frontend => AlarmSource::FrontendRule,
        }
    }
}

/// Threshold comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    OutsideRange,
    InsideRange,
}

crate::simple_display! {
    Comparison {
        Above => "above",
        Below => "below",
        OutsideRange => "outside_range",
        InsideRange => "inside_range",
    }
}

/// Daily active window for a rule, in a named timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
}

impl Schedule {
    /// Whether the schedule window contains `now`.
    ///
    /// An unresolvable timezone makes the window inactive (the rule
    /// evaluates OK) rather than alarming on bad configuration.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let tz: chrono_tz::Tz = match self.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => return false,
        };
        let local = now.with_timezone(&tz).time();
        if self.start_time <= self.end_time {
            self.start_time <= local && local <= self.end_time
        } else {
            // Window wraps midnight
            local >= self.start_time || local <= self.end_time
        }
    }
}

/// One alarm rule attached to a datapoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: RuleId,
    pub datapoint_id: DataPointId,
    pub name: String,
    #[serde(default = "default_rule_source")]
    pub source: RuleSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_severity")]
    pub severity: String,
    pub comparison: Comparison,
    #[serde(default)]
    pub warning_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

fn default_rule_source() -> RuleSource {
    RuleSource::Backend
}

fn default_true() -> bool {
    true
}

fn default_severity() -> String {
    "info".to_string()
}

impl AlarmRule {
    /// Stable occurrence key for this rule.
    pub fn occurrence_key(&self) -> String {
        let src = self.source.alarm_source();
        match &self.external_id {
            Some(ext) => format!("{src}:{ext}"),
            None => format!("{src}:{}", self.id),
        }
    }

    /// Structural validation, applied at configuration load. Evaluation
    /// treats anything that slips through as OK instead.
    pub fn validate(&self) -> Result<(), String> {
        match self.comparison {
            Comparison::Above => {
                let alarm = self.alarm_threshold.ok_or("alarm_threshold is required")?;
                if self.warning_enabled {
                    let warning = self
                        .warning_threshold
                        .ok_or("warning_threshold is required when warning is enabled")?;
                    if warning >= alarm {
                        return Err(format!(
                            "warning threshold {warning} must be below alarm threshold {alarm}"
                        ));
                    }
                }
            }
            Comparison::Below => {
                let alarm = self.alarm_threshold.ok_or("alarm_threshold is required")?;
                if self.warning_enabled {
                    let warning = self
                        .warning_threshold
                        .ok_or("warning_threshold is required when warning is enabled")?;
                    if warning <= alarm {
                        return Err(format!(
                            "warning threshold {warning} must be above alarm threshold {alarm}"
                        ));
                    }
                }
            }
            Comparison::OutsideRange => {
                let (low, high) = self.alarm_range().ok_or("alarm_low/alarm_high are required")?;
                if low > high {
                    return Err(format!("alarm range [{low}, {high}] is inverted"));
                }
                if self.warning_enabled {
                    let (wlow, whigh) =
                        self.warning_range().ok_or("warning_low/warning_high are required")?;
                    if wlow > whigh {
                        return Err(format!("warning range [{wlow}, {whigh}] is inverted"));
                    }
                    if wlow < low || whigh > high {
                        return Err("warning range must lie inside the alarm range".to_string());
                    }
                }
            }
            Comparison::InsideRange => {
                let (low, high) = self.alarm_range().ok_or("alarm_low/alarm_high are required")?;
                if low > high {
                    return Err(format!("alarm range [{low}, {high}] is inverted"));
                }
                if self.warning_enabled {
                    let (wlow, whigh) =
                        self.warning_range().ok_or("warning_low/warning_high are required")?;
                    if wlow > whigh {
                        return Err(format!("warning range [{wlow}, {whigh}] is inverted"));
                    }
                    if wlow > low || whigh < high {
                        return Err("warning range must enclose the alarm range".to_string());
                    }
                }
            }
        }
        if let Some(schedule) = &self.schedule {
            if schedule.timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(format!("unknown timezone '{}'", schedule.timezone));
            }
        }
        Ok(())
    }

    fn alarm_range(&self) -> Option<(f64, f64)> {
        Some((self.alarm_low?, self.alarm_high?))
    }

    fn warning_range(&self) -> Option<(f64, f64)> {
        Some((self.warning_low?, self.warning_high?))
    }

    /// Evaluate this rule against a reading taken at `ts_ms`.
    ///
    /// Schedule gating happens first: outside the window the rule is
    /// effectively muted and evaluates OK regardless of value.
    pub fn evaluate(&self, value: f64, ts_ms: u64) -> Evaluation {
        if let Some(schedule) = &self.schedule {
            if !schedule.contains(epoch_ms_to_utc(ts_ms)) {
                return Evaluation {
                    state: AlarmState::Ok,
                    message: format!("rule {} outside schedule window", self.name),
                };
            }
        }
        self.evaluate_thresholds(value)
    }

    fn evaluate_thresholds(&self, value: f64) -> Evaluation {
        let ok = |message: String| Evaluation { state: AlarmState::Ok, message };

        match self.comparison {
            Comparison::Above => {
                let Some(alarm) = self.alarm_threshold else {
                    return ok(format!("rule {} has no alarm threshold", self.name));
                };
                if value >= alarm {
                    return Evaluation {
                        state: AlarmState::Alarm,
                        message: format!("value {value} >= alarm threshold {alarm}"),
                    };
                }
                if self.warning_enabled {
                    if let Some(warning) = self.warning_threshold {
                        if value >= warning {
                            return Evaluation {
                                state: AlarmState::Warning,
                                message: format!("value {value} >= warning threshold {warning}"),
                            };
                        }
                    }
                }
                ok(format!("value {value} below thresholds"))
            }
            Comparison::Below => {
                let Some(alarm) = self.alarm_threshold else {
                    return ok(format!("rule {} has no alarm threshold", self.name));
                };
                if value <= alarm {
                    return Evaluation {
                        state: AlarmState::Alarm,
                        message: format!("value {value} <= alarm threshold {alarm}"),
                    };
                }
                if self.warning_enabled {
                    if let Some(warning) = self.warning_threshold {
                        if value <= warning {
                            return Evaluation {
                                state: AlarmState::Warning,
                                message: format!("value {value} <= warning threshold {warning}"),
                            };
                        }
                    }
                }
                ok(format!("value {value} above thresholds"))
            }
            Comparison::OutsideRange => {
                let Some((low, high)) = self.alarm_range() else {
                    return ok(format!("rule {} has no alarm range", self.name));
                };
                if value < low || value > high {
                    return Evaluation {
                        state: AlarmState::Alarm,
                        message: format!("value {value} outside alarm range [{low}, {high}]"),
                    };
                }
                if self.warning_enabled {
                    if let Some((wlow, whigh)) = self.warning_range() {
                        if value < wlow || value > whigh {
                            return Evaluation {
                                state: AlarmState::Warning,
                                message: format!(
                                    "value {value} outside warning range [{wlow}, {whigh}]"
                                ),
                            };
                        }
                    }
                }
                ok(format!("value {value} within range"))
            }
            Comparison::InsideRange => {
                let Some((low, high)) = self.alarm_range() else {
                    return ok(format!("rule {} has no alarm range", self.name));
                };
                if value >= low && value <= high {
                    return Evaluation {
                        state: AlarmState::Alarm,
                        message: format!("value {value} inside alarm range [{low}, {high}]"),
                    };
                }
                if self.warning_enabled {
                    if let Some((wlow, whigh)) = self.warning_range() {
                        if value >= wlow && value <= whigh {
                            return Evaluation {
                                state: AlarmState::Warning,
                                message: format!(
                                    "value {value} inside warning range [{wlow}, {whigh}]"
                                ),
                            };
                        }
                    }
                }
                ok(format!("value {value} outside range"))
            }
        }
    }
}

/// Outcome of a rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: AlarmState,
    pub message: String,
}

/// Create a stable key for sources that don't provide a natural dedupe key.
pub fn make_stable_key(source: AlarmSource, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The authoritative row for one `(source, key)` alarm.
///
/// Owned by the alarm engine: only `set_state` and `acknowledge` mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmOccurrence {
    pub id: u64,
    pub source: AlarmSource,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoint_id: Option<DataPointId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_rule_id: Option<String>,
    pub state: AlarmState,
    pub severity: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_threshold: Option<f64>,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_at_ms: Option<u64>,
    pub is_active: bool,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by_user_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by_client_ip: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// Immutable record of a single state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEventRecord {
    pub id: u64,
    pub occurrence_id: u64,
    pub ts_ms: u64,
    pub source: AlarmSource,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoint_id: Option<DataPointId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_rule_id: Option<String>,
    pub prev_state: AlarmState,
    pub new_state: AlarmState,
    pub severity: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[cfg(test)]
#[path = "alarm_tests.rs"]
mod tests;
