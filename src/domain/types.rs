//! Shared types for the RFID dashboard

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Timestamp exactly as the reader sent it - never reinterpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeStamp {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeStamp::Number(n) => write!(f, "{}", n),
            TimeStamp::Text(s) => f.write_str(s),
        }
    }
}

/// One observed tag event
///
/// Integer fields accept JSON numbers or decimal strings; the simulated
/// FX9600 reports every field as a string. A non-string `epc` is kept in
/// its JSON text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRead {
    #[serde(deserialize_with = "lenient_string")]
    pub epc: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub antenna_port: i64,
    /// Signal strength in dBm
    #[serde(deserialize_with = "lenient_i64")]
    pub peak_rssi: i64,
    #[serde(deserialize_with = "lenient_u64")]
    pub seen_count: u64,
    #[serde(deserialize_with = "lenient_i64")]
    pub channel_index: i64,
    pub time_stamp: TimeStamp,
}

struct LenientIntVisitor;

impl<'de> Visitor<'de> for LenientIntVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an integer or a decimal string")
    }

    fn visit_i64<E>(self, value: i64) -> Result<i64, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_u64<E>(self, value: u64) -> Result<i64, E>
    where
        E: de::Error,
    {
        i64::try_from(value).map_err(|_| E::custom(format!("integer {} out of range", value)))
    }

    fn visit_str<E>(self, value: &str) -> Result<i64, E>
    where
        E: de::Error,
    {
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientIntVisitor)
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserializer.deserialize_any(LenientIntVisitor)?;
    u64::try_from(value).map_err(|_| de::Error::custom(format!("seen count {} is negative", value)))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Err(de::Error::invalid_type(de::Unexpected::Unit, &"an EPC")),
        other => Ok(other.to_string()),
    }
}

/// Simulation lifecycle as observed by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which delivery paths the engine should use for emitted payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub use_stream_source: bool,
    pub use_webhook: bool,
    pub webhook_url: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { use_stream_source: true, use_webhook: false, webhook_url: None }
    }
}

impl SourceConfig {
    pub fn any_source(&self) -> bool {
        self.use_stream_source || self.use_webhook
    }

    /// Webhook target to forward at start time, if webhooks are on
    pub fn effective_webhook_url(&self) -> Option<&str> {
        if self.use_webhook {
            self.webhook_url.as_deref()
        } else {
            None
        }
    }
}

/// Emission parameters: reads per cycle and seconds between cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub tag_count: u32,
    pub interval_seconds: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self { tag_count: 5, interval_seconds: 1.0 }
    }
}

impl SimulationParams {
    /// Returns the reason the parameters are unusable, if any
    pub fn validate(&self) -> Result<(), String> {
        if self.tag_count == 0 {
            return Err("tag count must be a positive integer".to_string());
        }
        if !self.interval_seconds.is_finite() || self.interval_seconds <= 0.0 {
            return Err(format!("interval must be a positive number of seconds, got {}", self.interval_seconds));
        }
        Ok(())
    }
}
