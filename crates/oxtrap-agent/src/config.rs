use anyhow::Context;
use oxtrap_common::types::{Receiver, Rule, ValueType};
use oxtrap_common::Oid;
use oxtrap_notify::pdu::severity_oid;
use serde::Deserialize;
use std::collections::HashSet;

/// Fatal configuration problems. Any of these stops the process before a
/// single rule is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Config: missing oid_root")]
    MissingOidRoot,

    #[error("Config: invalid oid_root '{root}': {reason}")]
    InvalidOidRoot { root: String, reason: String },

    #[error("Config: no receivers configured")]
    NoReceivers,

    #[error("Config: no rules configured")]
    NoRules,

    #[error("Config: duplicate receiver id '{0}'")]
    DuplicateReceiver(String),

    #[error("Config: duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("Config: rule '{0}' must have an interval greater than zero")]
    ZeroInterval(String),

    #[error("Config: rule '{rule}' uses OID {oid}, which carries the severity of rule '{owner}'")]
    SeverityOidCollision {
        rule: String,
        owner: String,
        oid: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrapConfig {
    /// Root OID every rule suffix is appended to (e.g. `1.3.6.1.4.1.12345`).
    #[serde(default, alias = "oidRoot")]
    pub oid_root: Option<String>,
    #[serde(default)]
    pub receivers: Vec<Receiver>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl TrapConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed root OID.
    pub fn root_oid(&self) -> Result<Oid, ConfigError> {
        let raw = self
            .oid_root
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingOidRoot)?;

        let root: Oid = raw.parse().map_err(|e: oxtrap_common::oid::OidParseError| {
            ConfigError::InvalidOidRoot {
                root: raw.to_string(),
                reason: e.to_string(),
            }
        })?;

        let arcs = root.arcs();
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return Err(ConfigError::InvalidOidRoot {
                root: raw.to_string(),
                reason: "not a valid object identifier prefix".to_string(),
            });
        }
        Ok(root)
    }

    pub fn validate(&self) -> Result<Oid, ConfigError> {
        let root = self.root_oid()?;

        if self.receivers.is_empty() {
            return Err(ConfigError::NoReceivers);
        }
        if self.rules.is_empty() {
            return Err(ConfigError::NoRules);
        }

        let mut seen = HashSet::new();
        for receiver in &self.receivers {
            if !seen.insert(receiver.id.as_str()) {
                return Err(ConfigError::DuplicateReceiver(receiver.id.clone()));
            }
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
            if rule.interval == 0 {
                return Err(ConfigError::ZeroInterval(rule.id.clone()));
            }
        }

        // Only integer rules with thresholds emit a severity varbind.
        for owner in self
            .rules
            .iter()
            .filter(|r| r.value_type == ValueType::Integer && r.thresholds.is_some())
        {
            let severity = severity_oid(&owner.oid);
            if let Some(rule) = self.rules.iter().find(|r| r.oid == severity) {
                return Err(ConfigError::SeverityOidCollision {
                    rule: rule.id.clone(),
                    owner: owner.id.clone(),
                    oid: severity.to_string(),
                });
            }
        }

        Ok(root)
    }

    /// `(rule id, receiver id)` pairs naming a receiver that is not
    /// configured. These are reported at send time, not rejected here.
    pub fn dangling_receivers(&self) -> Vec<(&str, &str)> {
        let known: HashSet<&str> = self.receivers.iter().map(|r| r.id.as_str()).collect();
        let known = &known;
        self.rules
            .iter()
            .flat_map(move |rule| {
                rule.receivers
                    .iter()
                    .filter(move |id| !known.contains(id.as_str()))
                    .map(move |id| (rule.id.as_str(), id.as_str()))
            })
            .collect()
    }
}
