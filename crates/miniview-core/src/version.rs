#![forbid(unsafe_code)]

//! Dotted host protocol versions.
//!
//! Host SDK versions are reported as dotted numeric strings (`"6.9"`,
//! `"8.0"`, `"10.2"`). Comparison is component-wise and numeric, never
//! lexicographic: `"10.0" > "8.2"` and `"7.10" > "7.9"`. Missing trailing
//! components compare as zero, so `"8"` equals `"8.0.0"`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed dotted version.
#[derive(Debug, Clone)]
pub struct HostVersion {
    parts: Vec<u32>,
}

/// Why a version string failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    /// The string was empty or whitespace.
    Empty,
    /// A dot-separated component was not a decimal number.
    InvalidComponent { component: String },
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty version string"),
            Self::InvalidComponent { component } => {
                write!(f, "invalid version component: {component:?}")
            }
        }
    }
}

impl std::error::Error for VersionParseError {}

impl HostVersion {
    /// Build a version from explicit components.
    #[must_use]
    pub fn new(parts: impl Into<Vec<u32>>) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    /// Numeric components as parsed.
    #[must_use]
    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    /// Major component (`0` when absent).
    #[must_use]
    pub fn major(&self) -> u32 {
        self.component(0)
    }

    /// Whether `self >= min`.
    #[must_use]
    pub fn is_at_least(&self, min: &HostVersion) -> bool {
        self >= min
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for HostVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let parts = trimmed
            .split('.')
            .map(|component| {
                component
                    .parse::<u32>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        component: component.to_owned(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl Ord for HostVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| self.component(idx).cmp(&other.component(idx)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HostVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HostVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HostVersion {}

#[cfg(feature = "serde")]
impl serde::Serialize for HostVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for HostVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> HostVersion {
        s.parse().unwrap()
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert!(v("10.0") > v("8.2"));
        assert!(v("7.10") > v("7.9"));
        assert!(v("9.0") > v("8.0"));
        assert!(v("7.0") < v("8.0"));
    }

    #[test]
    fn missing_components_are_zero() {
        assert_eq!(v("8"), v("8.0"));
        assert_eq!(v("8.0.0"), v("8"));
        assert!(v("8.0.1") > v("8"));
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(v(" 8.1 "), v("8.1"));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<HostVersion>(), Err(VersionParseError::Empty));
        assert_eq!("   ".parse::<HostVersion>(), Err(VersionParseError::Empty));
        assert_eq!(
            "8.x".parse::<HostVersion>(),
            Err(VersionParseError::InvalidComponent {
                component: "x".into()
            })
        );
        assert!("8..0".parse::<HostVersion>().is_err());
        assert!("-1".parse::<HostVersion>().is_err());
    }

    #[test]
    fn display_round_trips_components() {
        assert_eq!(v("10.2.3").to_string(), "10.2.3");
        assert_eq!(HostVersion::new(vec![8, 0]).to_string(), "8.0");
    }

    #[test]
    fn is_at_least_is_inclusive() {
        let min = v("8.0");
        assert!(v("8.0").is_at_least(&min));
        assert!(v("8").is_at_least(&min));
        assert!(!v("7.99").is_at_least(&min));
    }

    #[test]
    fn major_defaults_to_zero() {
        assert_eq!(HostVersion::new(Vec::new()).major(), 0);
        assert_eq!(v("9.1").major(), 9);
    }
}
