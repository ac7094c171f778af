//! Per-month risk multipliers applied to simulated removal.

use std::collections::BTreeMap;

use erw_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scaling of monthly removal, resolved per month index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RiskMultiplierSource {
    /// Same multiplier every month.
    Scalar(f64),
    /// Month `t` uses element `t`; months past the end reuse the last element.
    /// An empty sequence means no scaling.
    Sequence(Vec<f64>),
    /// Month `t` uses its key if present, else `default`, else `1.0`.
    Keyed {
        /// Explicit per-month multipliers.
        by_month: BTreeMap<u32, f64>,
        /// Fallback for months without a key.
        default: Option<f64>,
    },
}

impl RiskMultiplierSource {
    /// Multiplier for month `t` (0-based).
    pub fn multiplier(&self, t: usize) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Sequence(values) => match values.last() {
                None => 1.0,
                Some(last) => values.get(t).copied().unwrap_or(*last),
            },
            Self::Keyed { by_month, default } => u32::try_from(t)
                .ok()
                .and_then(|k| by_month.get(&k).copied())
                .or(*default)
                .unwrap_or(1.0),
        }
    }

    /// Translate a stored risk-profile `parameters` object.
    ///
    /// A non-null `multipliers` member is used when present, otherwise the whole object. A number
    /// becomes [`Scalar`](Self::Scalar), an array [`Sequence`](Self::Sequence) and an object
    /// [`Keyed`](Self::Keyed) (decimal month keys plus `"default"`; any other key is
    /// ignored). `null` means no scaling.
    pub fn from_profile_json(parameters: &Value) -> Result<Option<Self>> {
        let source = match parameters {
            Value::Object(map) => {
                map.get("multipliers").filter(|v| !v.is_null()).unwrap_or(parameters)
            }
            other => other,
        };

        match source {
            Value::Null => Ok(None),
            Value::Number(_) => Ok(Some(Self::Scalar(as_multiplier(source, "multiplier")?))),
            Value::Array(items) => {
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| as_multiplier(v, &format!("multipliers[{i}]")))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Self::Sequence(values)))
            }
            Value::Object(map) => {
                let mut by_month = BTreeMap::new();
                let mut default = None;
                for (key, value) in map {
                    if key == "default" {
                        default = Some(as_multiplier(value, "default")?);
                    } else if let Some(month) = month_key(key) {
                        by_month.insert(month, as_multiplier(value, key)?);
                    } else {
                        log::warn!("ignoring risk multiplier key {key:?}");
                    }
                }
                Ok(Some(Self::Keyed { by_month, default }))
            }
            other => Err(Error::Validation(format!(
                "risk multipliers must be a number, array or object, got {other}"
            ))),
        }
    }
}

/// Canonical decimal month index ("0", "12"; not "012" or "+1").
fn month_key(key: &str) -> Option<u32> {
    let month: u32 = key.parse().ok()?;
    (month.to_string() == key).then_some(month)
}

fn as_multiplier(value: &Value, name: &str) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            Error::Validation(format!("risk multiplier {name} must be a number, got {value}"))
        })
}

/// Stored risk profiles keyed by id, holding the raw `parameters` JSON of each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskProfiles {
    profiles: BTreeMap<String, Value>,
}

impl RiskProfiles {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, id: impl Into<String>, parameters: Value) {
        self.profiles.insert(id.into(), parameters);
    }

    /// Number of stored profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is stored.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Raw parameters of profile `id`.
    pub fn get(&self, id: &str) -> Result<&Value> {
        self.profiles.get(id).ok_or_else(|| Error::UnknownRiskProfile(id.to_string()))
    }

    /// Look up and translate profile `id`.
    pub fn resolve(&self, id: &str) -> Result<Option<RiskMultiplierSource>> {
        RiskMultiplierSource::from_profile_json(self.get(id)?)
    }
}
