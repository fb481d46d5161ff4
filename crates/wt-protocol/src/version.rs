//! Protocol versioning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol version as `major.minor`.
///
/// Clients and daemon interoperate when their major versions match;
/// minor bumps only add optional fields or message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidFormat(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v: ProtocolVersion = "1.3".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(1, 3));
        assert!("1".parse::<ProtocolVersion>().is_err());
        assert!("1.0.0".parse::<ProtocolVersion>().is_err());
        assert!("one.two".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_version_compatibility() {
        assert!(ProtocolVersion::new(1, 0).is_compatible_with(&ProtocolVersion::new(1, 4)));
        assert!(!ProtocolVersion::new(2, 0).is_compatible_with(&ProtocolVersion::CURRENT));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::new(1, 2).to_string(), "1.2");
    }
}
