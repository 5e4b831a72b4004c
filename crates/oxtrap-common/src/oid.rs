use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OidParseError {
    #[error("OID is empty")]
    Empty,
    #[error("invalid OID arc '{arc}' in '{oid}'")]
    InvalidArc { oid: String, arc: String },
}

/// A dotted-decimal object identifier such as `1.3.6.1.4.1.12345`.
///
/// A single leading dot is tolerated (`.1.3.6`), empty arcs elsewhere are not.
///
/// # Examples
///
/// ```
/// use oxtrap_common::Oid;
///
/// let root: Oid = "1.3.6.1.4.1.12345".parse().unwrap();
/// let full = root.join(&"1.1".parse().unwrap());
/// assert_eq!(full.to_string(), "1.3.6.1.4.1.12345.1.1");
/// assert_eq!(full.child(2).to_string(), "1.3.6.1.4.1.12345.1.1.2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    arcs: Vec<u32>,
}

impl Oid {
    pub fn from_arcs(arcs: Vec<u32>) -> Self {
        Self { arcs }
    }

    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Appends every arc of `suffix` to this identifier.
    pub fn join(&self, suffix: &Oid) -> Oid {
        let mut arcs = Vec::with_capacity(self.arcs.len() + suffix.arcs.len());
        arcs.extend_from_slice(&self.arcs);
        arcs.extend_from_slice(&suffix.arcs);
        Oid { arcs }
    }

    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(OidParseError::Empty);
        }

        let arcs = body
            .split('.')
            .map(|arc| {
                arc.parse::<u32>().map_err(|_| OidParseError::InvalidArc {
                    oid: s.to_string(),
                    arc: arc.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Oid { arcs })
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.arcs {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
