//! Metric model
//!
//! A [`Metric`] is one named telemetry value, either a monotonically
//! accumulating [`MetricKind::Counter`] or a point-in-time
//! [`MetricKind::Gauge`]. Every storage backend applies the same merge rule
//! through [`Metric::merge`]:
//!
//! - Counter deltas accumulate (`stored.delta += incoming.delta`)
//! - Gauge values are replaced (`stored.value = incoming.value`)

use crate::domain::errors::{InvalidReason, MetricError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Id-keyed set of metrics, the unit moved by checkpoints and batch transport.
pub type Collection = HashMap<String, Metric>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = InvalidReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(InvalidReason::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    /// A lookup key with no payload, as accepted by `MetricStorage::get`.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
            hash: None,
        }
    }

    /// Fresh zero-valued entry that an incoming metric is merged into.
    pub fn zero(id: impl Into<String>, kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::counter(id, 0),
            MetricKind::Gauge => Self::gauge(id, 0.0),
        }
    }

    /// Build a metric from the legacy `/update/{kind}/{id}/{value}` path form.
    pub fn parse(kind: &str, id: &str, raw_value: &str) -> Result<Self, InvalidReason> {
        let kind = MetricKind::from_str(kind)?;
        if id.is_empty() {
            return Err(InvalidReason::MissingId);
        }
        match kind {
            MetricKind::Counter => raw_value
                .parse::<i64>()
                .map(|delta| Self::counter(id, delta))
                .map_err(|_| InvalidReason::BadValue(raw_value.to_string())),
            MetricKind::Gauge => raw_value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|value| Self::gauge(id, value))
                .ok_or_else(|| InvalidReason::BadValue(raw_value.to_string())),
        }
    }

    /// Checks id and payload; a metric failing this never reaches storage.
    pub fn validate(&self) -> Result<(), InvalidReason> {
        self.validate_query()?;
        let has_payload = match self.kind {
            MetricKind::Counter => self.delta.is_some(),
            MetricKind::Gauge => self.value.is_some(),
        };
        if !has_payload {
            return Err(InvalidReason::MissingValue { kind: self.kind });
        }
        Ok(())
    }

    /// Checks only what a lookup needs: a non-empty id.
    pub fn validate_query(&self) -> Result<(), InvalidReason> {
        if self.id.is_empty() {
            return Err(InvalidReason::MissingId);
        }
        Ok(())
    }

    /// Apply the merge rule of `incoming` onto `self`.
    ///
    /// An id is expected to keep one kind for its lifetime; if the kinds
    /// differ anyway the incoming metric replaces the stored one.
    pub fn merge(&mut self, incoming: &Metric) {
        if self.kind != incoming.kind {
            self.kind = incoming.kind;
            self.delta = incoming.delta;
            self.value = incoming.value;
        } else {
            match self.kind {
                MetricKind::Counter => {
                    let stored = self.delta.unwrap_or(0);
                    self.delta = Some(stored.saturating_add(incoming.delta.unwrap_or(0)));
                }
                MetricKind::Gauge => {
                    if incoming.value.is_some() {
                        self.value = incoming.value;
                    }
                }
            }
        }
        // A stored tag no longer covers the merged payload.
        self.hash = None;
    }

    /// Signing input: `{id}:{kind}:{delta}` or `{id}:{kind}:{value}` with six decimals.
    pub fn canonical(&self) -> String {
        match self.kind {
            MetricKind::Counter => {
                format!("{}:{}:{}", self.id, self.kind, self.delta.unwrap_or(0))
            }
            MetricKind::Gauge => {
                format!("{}:{}:{:.6}", self.id, self.kind, self.value.unwrap_or(0.0))
            }
        }
    }

    /// The bare value as served by `GET /value/{kind}/{id}`.
    pub fn value_string(&self) -> String {
        match self.kind {
            MetricKind::Counter => self.delta.unwrap_or(0).to_string(),
            MetricKind::Gauge => self.value.unwrap_or(0.0).to_string(),
        }
    }
}

/// Loosely-typed wire form of a metric.
///
/// Decoding into this first lets the transports tell an unknown type apart
/// from a missing id or value instead of failing with a generic parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl RawMetric {
    /// Resolve the kind and check id only, for lookups.
    pub fn into_query(self) -> Result<Metric, InvalidReason> {
        if self.id.is_empty() {
            return Err(InvalidReason::MissingId);
        }
        let kind = MetricKind::from_str(&self.kind)?;
        Ok(Metric {
            id: self.id,
            kind,
            delta: self.delta,
            value: self.value,
            hash: self.hash,
        })
    }
}

impl TryFrom<RawMetric> for Metric {
    type Error = InvalidReason;

    fn try_from(raw: RawMetric) -> Result<Self, Self::Error> {
        let metric = raw.into_query()?;
        metric.validate()?;
        Ok(metric)
    }
}

impl From<Metric> for RawMetric {
    fn from(metric: Metric) -> Self {
        Self {
            id: metric.id,
            kind: metric.kind.to_string(),
            delta: metric.delta,
            value: metric.value,
            hash: metric.hash,
        }
    }
}

/// Collapse a list of metrics into a collection, merging same-id entries.
pub fn collect_merged(metrics: impl IntoIterator<Item = Metric>) -> Collection {
    let mut collection = Collection::new();
    for metric in metrics {
        match collection.get_mut(&metric.id) {
            Some(existing) => existing.merge(&metric),
            None => {
                collection.insert(metric.id.clone(), metric);
            }
        }
    }
    collection
}

/// Validate every metric of a batch, reporting the first offender.
pub fn validate_all<'a>(metrics: impl IntoIterator<Item = &'a Metric>) -> Result<(), MetricError> {
    for metric in metrics {
        metric.validate()?;
    }
    Ok(())
}
