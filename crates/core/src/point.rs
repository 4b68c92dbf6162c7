// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decoded datapoint values.
//!
//! Snapshot leaves are a tagged union over the three datapoint shapes.
//! INTEGER is one unsigned register; REAL is two registers combined
//! big-endian into an IEEE-754 float (with optional linear rescale and
//! multiplier); DIGITAL is one register exploded into a 16-bit map.

use crate::config::{DataPoint, DataPointId, ScaleRange};
use crate::scan::TagSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One bit of a DIGITAL reading, annotated with its configured label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: bool,
}

/// The value part of a snapshot leaf, tagged by datapoint type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PointValue {
    #[serde(rename = "INTEGER")]
    Integer { value: u16 },
    #[serde(rename = "REAL")]
    Real { raw_value: f64, scaled_value: f64 },
    #[serde(rename = "DIGITAL")]
    Digital { bits: IndexMap<u8, BitReading> },
}

impl PointValue {
    /// The numeric value fed to the alarm engine, if this shape has one.
    ///
    /// REAL reports its scaled value, INTEGER its register value; DIGITAL
    /// readings carry no single number and are skipped.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            PointValue::Integer { value } => Some(f64::from(*value)),
            PointValue::Real { scaled_value, .. } => Some(*scaled_value),
            PointValue::Digital { .. } => None,
        }
    }
}

/// A snapshot leaf: the decoded value plus identity for downstream
/// consumers (the id disambiguates equal labels on sibling owners).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointReading {
    pub id: DataPointId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Configured 4xxxx reference of the underlying register.
    pub register_address: u32,
    #[serde(flatten)]
    pub value: PointValue,
}

/// Combine two registers big-endian into an IEEE-754 32-bit float.
pub fn combine_f32(high: u16, low: u16) -> f32 {
    f32::from_bits((u32::from(high) << 16) | u32::from(low))
}

/// Linear rescale from the raw span to the engineering span.
pub fn rescale(raw: f64, scale: &ScaleRange) -> f64 {
    let raw_span = scale.raw_full - scale.raw_zero;
    if raw_span == 0.0 {
        return raw;
    }
    (raw - scale.raw_zero) / raw_span * (scale.eng_full - scale.eng_zero) + scale.eng_zero
}

/// Decode one tag from the words read for its block.
///
/// `words` must cover exactly `spec.length` registers starting at
/// `spec.read_offset`; returns `None` when the read came back short.
pub fn decode_tag(spec: &TagSpec, dp: &DataPoint, words: &[u16]) -> Option<PointValue> {
    match spec.point_type {
        crate::config::PointType::Integer => {
            let value = *words.first()?;
            Some(PointValue::Integer { value })
        }
        crate::config::PointType::Real => {
            let high = *words.first()?;
            let low = *words.get(1)?;
            let raw = f64::from(combine_f32(high, low));
            let scaled = match &dp.scale {
                Some(scale) => rescale(raw, scale),
                None => raw,
            };
            Some(PointValue::Real { raw_value: raw, scaled_value: scaled * dp.multiplier })
        }
        crate::config::PointType::Digital => {
            let word = *words.first()?;
            let mut bits = IndexMap::with_capacity(16);
            for bit in 0u8..16 {
                bits.insert(
                    bit,
                    BitReading {
                        label: dp.bit_label(bit).map(str::to_string),
                        value: word & (1 << bit) != 0,
                    },
                );
            }
            Some(PointValue::Digital { bits })
        }
    }
}

#[cfg(test)]
#[path = "point_tests.rs"]
mod tests;
