//! Tag encapsulation and failure policy enumerations.
//!
//! Only the semantic role of each value is fixed here. Which members a given
//! controller accepts is published by the driver's capabilities.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the hook tag is carried in redirected traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagEncapsulationType {
    /// 802.1Q VLAN tag.
    Vlan,
    /// VXLAN network identifier.
    Vxlan,
    /// MPLS label.
    Mpls,
    /// Network Service Header (service path / service index).
    Nsh,
}

impl TagEncapsulationType {
    /// All known encapsulation types.
    pub const ALL: [TagEncapsulationType; 4] = [
        TagEncapsulationType::Vlan,
        TagEncapsulationType::Vxlan,
        TagEncapsulationType::Mpls,
        TagEncapsulationType::Nsh,
    ];

    /// Largest tag value the encapsulation header can carry.
    pub const fn max_tag(&self) -> u64 {
        match self {
            TagEncapsulationType::Vlan => 4094,
            TagEncapsulationType::Vxlan => (1 << 24) - 1,
            TagEncapsulationType::Mpls => (1 << 20) - 1,
            TagEncapsulationType::Nsh => (1 << 24) - 1,
        }
    }
}

impl fmt::Display for TagEncapsulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagEncapsulationType::Vlan => "VLAN",
            TagEncapsulationType::Vxlan => "VXLAN",
            TagEncapsulationType::Mpls => "MPLS",
            TagEncapsulationType::Nsh => "NSH",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TagEncapsulationType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VLAN" => Ok(TagEncapsulationType::Vlan),
            "VXLAN" => Ok(TagEncapsulationType::Vxlan),
            "MPLS" => Ok(TagEncapsulationType::Mpls),
            "NSH" => Ok(TagEncapsulationType::Nsh),
            _ => Err(ParseError::InvalidEncapsulation(s.to_string())),
        }
    }
}

/// Behavior when the inspection device is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailurePolicyType {
    /// Pass traffic uninspected.
    #[default]
    FailOpen,
    /// Drop traffic.
    FailClosed,
}

impl FailurePolicyType {
    /// Returns true if traffic keeps flowing when the device is down.
    pub const fn passes_traffic(&self) -> bool {
        matches!(self, FailurePolicyType::FailOpen)
    }
}

impl fmt::Display for FailurePolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicyType::FailOpen => write!(f, "FAIL_OPEN"),
            FailurePolicyType::FailClosed => write!(f, "FAIL_CLOSED"),
        }
    }
}

impl FromStr for FailurePolicyType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FAIL_OPEN" | "OPEN" => Ok(FailurePolicyType::FailOpen),
            "FAIL_CLOSED" | "FAIL_CLOSE" | "CLOSED" => Ok(FailurePolicyType::FailClosed),
            _ => Err(ParseError::InvalidFailurePolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encapsulation_parse() {
        assert_eq!("vxlan".parse(), Ok(TagEncapsulationType::Vxlan));
        assert_eq!("VLAN".parse(), Ok(TagEncapsulationType::Vlan));
        assert!("gre".parse::<TagEncapsulationType>().is_err());
    }

    #[test]
    fn test_encapsulation_tag_limits() {
        assert_eq!(TagEncapsulationType::Vlan.max_tag(), 4094);
        assert_eq!(TagEncapsulationType::Vxlan.max_tag(), 16_777_215);
        assert_eq!(TagEncapsulationType::Mpls.max_tag(), 1_048_575);
    }

    #[test]
    fn test_failure_policy_parse_and_display() {
        assert_eq!("fail-open".parse(), Ok(FailurePolicyType::FailOpen));
        assert_eq!("FAIL_CLOSE".parse(), Ok(FailurePolicyType::FailClosed));
        assert_eq!(FailurePolicyType::FailClosed.to_string(), "FAIL_CLOSED");
        assert!(!FailurePolicyType::FailClosed.passes_traffic());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TagEncapsulationType::Vxlan).unwrap();
        assert_eq!(json, "\"VXLAN\"");
        let policy: FailurePolicyType = serde_json::from_str("\"FAIL_OPEN\"").unwrap();
        assert_eq!(policy, FailurePolicyType::FailOpen);
    }
}
