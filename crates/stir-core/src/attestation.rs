//! SHAKEN attestation levels

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::StirError;

/// Attestation asserted by the signing carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationLevel {
    /// "A": carrier knows the subscriber and their right to the number
    #[serde(rename = "A")]
    Full,
    /// "B": carrier knows the subscriber but not the number
    #[serde(rename = "B")]
    Partial,
    /// "C": call entered the network through a gateway
    #[serde(rename = "C")]
    Gateway,
}

impl AttestationLevel {
    /// Comparison weight: Full=3, Partial=2, Gateway=1
    pub fn weight(self) -> u8 {
        match self {
            AttestationLevel::Full => 3,
            AttestationLevel::Partial => 2,
            AttestationLevel::Gateway => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttestationLevel::Full => "A",
            AttestationLevel::Partial => "B",
            AttestationLevel::Gateway => "C",
        }
    }

    /// Whether this level meets `required`
    pub fn is_sufficient(self, required: AttestationLevel) -> bool {
        self.weight() >= required.weight()
    }

    /// Pick the level a call earns from what the originating network knows
    pub fn determine(subscriber_known: bool, number_control: bool, external_origin: bool) -> Self {
        if external_origin {
            return AttestationLevel::Gateway;
        }
        match (subscriber_known, number_control) {
            (true, true) => AttestationLevel::Full,
            (true, false) => AttestationLevel::Partial,
            _ => AttestationLevel::Gateway,
        }
    }
}

impl PartialOrd for AttestationLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttestationLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight().cmp(&other.weight())
    }
}

impl fmt::Display for AttestationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttestationLevel {
    type Err = StirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(AttestationLevel::Full),
            "B" => Ok(AttestationLevel::Partial),
            "C" => Ok(AttestationLevel::Gateway),
            other => Err(StirError::InvalidAttestation(other.to_string())),
        }
    }
}

/// Configured attestation: a fixed level or `auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttestationSetting {
    #[serde(rename = "A")]
    Full,
    #[serde(rename = "B")]
    Partial,
    #[serde(rename = "C")]
    Gateway,
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl AttestationSetting {
    /// Concrete level; `auto` signs and requires Full
    pub fn resolve(self) -> AttestationLevel {
        match self {
            AttestationSetting::Full | AttestationSetting::Auto => AttestationLevel::Full,
            AttestationSetting::Partial => AttestationLevel::Partial,
            AttestationSetting::Gateway => AttestationLevel::Gateway,
        }
    }
}

impl FromStr for AttestationSetting {
    type Err = StirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(AttestationSetting::Auto);
        }
        Ok(match s.parse::<AttestationLevel>()? {
            AttestationLevel::Full => AttestationSetting::Full,
            AttestationLevel::Partial => AttestationSetting::Partial,
            AttestationLevel::Gateway => AttestationSetting::Gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_weight() {
        assert!(AttestationLevel::Full > AttestationLevel::Partial);
        assert!(AttestationLevel::Partial > AttestationLevel::Gateway);
        assert!(AttestationLevel::Full.is_sufficient(AttestationLevel::Partial));
        assert!(AttestationLevel::Partial.is_sufficient(AttestationLevel::Partial));
        assert!(!AttestationLevel::Gateway.is_sufficient(AttestationLevel::Partial));
    }

    #[test]
    fn test_determine() {
        assert_eq!(AttestationLevel::determine(true, true, false), AttestationLevel::Full);
        assert_eq!(AttestationLevel::determine(true, false, false), AttestationLevel::Partial);
        assert_eq!(AttestationLevel::determine(false, false, true), AttestationLevel::Gateway);
        assert_eq!(AttestationLevel::determine(true, true, true), AttestationLevel::Gateway);
        assert_eq!(AttestationLevel::determine(false, true, false), AttestationLevel::Gateway);
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!("a".parse::<AttestationSetting>().unwrap(), AttestationSetting::Full);
        assert_eq!("C".parse::<AttestationSetting>().unwrap(), AttestationSetting::Gateway);
        assert_eq!("auto".parse::<AttestationSetting>().unwrap().resolve(), AttestationLevel::Full);
        assert!("D".parse::<AttestationSetting>().is_err());
    }

    #[test]
    fn test_serde_uses_letters() {
        assert_eq!(serde_json::to_string(&AttestationLevel::Partial).unwrap(), "\"B\"");
        let level: AttestationLevel = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(level, AttestationLevel::Gateway);
    }
}
