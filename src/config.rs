//! Construction options (§6) as a deserializable configuration document.
//!
//! Grounded on the teacher's `app::config::from_str`, which dispatches on a
//! leading `{` to choose JSON vs. YAML, and on its
//! `#[serde(deny_unknown_fields, rename_all = "camelCase")]` convention for
//! every config struct, so unknown keys are rejected at construction rather
//! than silently ignored.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::balancer::Strategy;
use crate::error::{Error, Result};
use crate::target::Target;

fn default_port() -> u16 {
    1080
}

fn default_address() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_bind() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_heartbeat() -> HeartbeatConfig {
    HeartbeatConfig::Single(300_000.0)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SocketTransferConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default)]
    pub strategy: Strategy,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_heartbeat")]
    pub heartbeat: HeartbeatConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TargetConfig {
    pub id: u16,
    pub weight: Option<u32>,
}

impl From<&TargetConfig> for Target {
    fn from(c: &TargetConfig) -> Target {
        match c.weight {
            Some(w) => Target::with_weight(c.id, w),
            None => Target::new(c.id),
        }
    }
}

/// A positive number, or a non-empty sequence of positive numbers
/// (milliseconds), interpreted as a one-shot-prefix-then-periodic-tail
/// heartbeat schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeartbeatConfig {
    Single(f64),
    Schedule(Vec<f64>),
}

impl HeartbeatConfig {
    /// Validates and flattens into a non-empty schedule. The validator's
    /// literal threshold (5) is applied to the raw numeric value regardless
    /// of unit — the spec preserves this as a deliberate quirk rather than
    /// silently normalizing milliseconds to seconds.
    pub fn into_schedule(self) -> Result<Vec<f64>> {
        let values = match self {
            HeartbeatConfig::Single(v) => vec![v],
            HeartbeatConfig::Schedule(vs) => vs,
        };
        if values.is_empty() {
            return Err(Error::HeartbeatInvalid(0.0));
        }
        for v in &values {
            if !v.is_finite() || *v < 5.0 {
                return Err(Error::HeartbeatInvalid(*v));
            }
        }
        Ok(values)
    }
}

impl SocketTransferConfig {
    pub fn targets(&self) -> Vec<Target> {
        self.targets.iter().map(Target::from).collect()
    }
}

/// Parses a JSON-or-YAML configuration document, matching the reference's
/// `app::config::from_str` dispatch on a leading `{`.
pub fn from_str(text: &str) -> Result<SocketTransferConfig> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    } else {
        serde_yaml::from_str(trimmed).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_yaml() {
        let yaml = "
port: 1080
targets:
  - id: 1081
  - id: 1082
    weight: 3
";
        let cfg = from_str(yaml).unwrap();
        assert_eq!(cfg.port, 1080);
        assert_eq!(cfg.targets.len(), 2);
    }

    #[test]
    fn parse_simple_json() {
        let json = r#"{"targets": [{"id": 1081}, {"id": 1082, "weight": 2}]}"#;
        let cfg = from_str(json).unwrap();
        assert_eq!(cfg.port, 1080);
        assert_eq!(cfg.targets.len(), 2);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = "
targets: []
bogus: true
";
        assert!(from_str(yaml).is_err());
    }

    #[test]
    fn heartbeat_schedule_rejects_sub_threshold_entry() {
        let schedule = HeartbeatConfig::Schedule(vec![1000.0, 4.0]);
        assert!(matches!(schedule.into_schedule(), Err(Error::HeartbeatInvalid(_))));
    }

    #[test]
    fn heartbeat_single_value_becomes_one_element_schedule() {
        let schedule = HeartbeatConfig::Single(300_000.0).into_schedule().unwrap();
        assert_eq!(schedule, vec![300_000.0]);
    }
}
