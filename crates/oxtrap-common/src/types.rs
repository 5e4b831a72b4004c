use crate::oid::Oid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use oxtrap_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Warning);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a rule's command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Integer => write!(f, "integer"),
        }
    }
}

/// A value produced by a rule's command, already coerced to the rule's
/// declared [`ValueType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrapValue {
    Integer(i64),
    Text(String),
}

impl TrapValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TrapValue::Integer(v) => Some(*v),
            TrapValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for TrapValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrapValue::Integer(v) => write!(f, "{v}"),
            TrapValue::Text(s) => f.write_str(s),
        }
    }
}

/// Warning/critical limits of an integer rule. `critical` is normally
/// `>= warning` but nothing enforces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub warning: Option<f64>,
    #[serde(default)]
    pub critical: Option<f64>,
}

fn default_receiver_port() -> u16 {
    162
}

/// A trap destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub id: String,
    pub host: String,
    #[serde(default = "default_receiver_port")]
    pub port: u16,
    pub community: String,
}

impl Receiver {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A periodically evaluated shell check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// Suffix appended to the configured OID root.
    pub oid: Oid,
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub command: String,
    /// Poll interval in seconds.
    pub interval: u64,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
    pub receivers: Vec<String>,
}

/// One notification, built per rule cycle and dropped after delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapPayload {
    pub oid: Oid,
    pub value: TrapValue,
    pub severity: Option<Severity>,
    pub timestamp: DateTime<Utc>,
}

impl TrapPayload {
    pub fn new(oid: Oid, value: TrapValue, severity: Option<Severity>) -> Self {
        Self {
            oid,
            value,
            severity,
            timestamp: Utc::now(),
        }
    }
}
