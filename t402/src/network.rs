//! Blockchain network identification for t402 payment routing.
//!
//! - [`Network`] - A CAIP-2 compliant network identifier (e.g., `eip155:8453`)
//! - [`NetworkPattern`] - Pattern matching for networks (exact or namespace wildcard)

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 compliant blockchain network identifier.
///
/// Networks uniquely identify blockchains across different ecosystems.
/// The format is `namespace:reference` where:
///
/// - `namespace` identifies the blockchain family (e.g., `eip155`, `solana`)
/// - `reference` identifies the specific chain within that family
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:8453"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Network {
    namespace: String,
    reference: String,
}

impl Network {
    /// Creates a new network identifier from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Returns the namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Consumes the network and returns its (namespace, reference) components.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.namespace, self.reference)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<Network> for String {
    fn from(value: Network) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid network identifier string.
///
/// A valid network identifier must be in the format `namespace:reference`
/// where both components are non-empty.
#[derive(Debug, thiserror::Error)]
#[error("Invalid network identifier format {0}")]
pub struct NetworkFormatError(String);

impl FromStr for Network {
    type Err = NetworkFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| NetworkFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(NetworkFormatError(s.into()));
        }
        Ok(Self {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for Network {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern for matching network identifiers.
///
/// - **Exact**: matches a specific network (e.g., `eip155:8453`)
/// - **Wildcard**: matches any network within a namespace (e.g., `eip155:*`)
///
/// # Serialization
///
/// Patterns serialize to human-readable strings:
/// - Exact: `"eip155:8453"`
/// - Wildcard: `"eip155:*"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkPattern {
    /// Matches exactly one specific network.
    Exact {
        /// The namespace of the network.
        namespace: String,
        /// The reference of the network.
        reference: String,
    },
    /// Matches any network within the specified namespace.
    Wildcard {
        /// The namespace to match (e.g., `eip155`, `solana`).
        namespace: String,
    },
}

impl NetworkPattern {
    /// Creates an exact pattern that matches only the specified network.
    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates a wildcard pattern that matches any network in the given namespace.
    pub fn wildcard<S: Into<String>>(namespace: S) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    /// Checks if a [`Network`] matches this pattern.
    ///
    /// - `Exact` matches only if both namespace and reference are equal
    /// - `Wildcard` matches any network with the same namespace
    #[must_use]
    pub fn matches(&self, network: &Network) -> bool {
        match self {
            Self::Exact {
                namespace,
                reference,
            } => network.namespace == *namespace && network.reference == *reference,
            Self::Wildcard { namespace } => network.namespace == *namespace,
        }
    }

    /// Returns the namespace of this pattern.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Exact { namespace, .. } | Self::Wildcard { namespace } => namespace,
        }
    }
}

impl fmt::Display for NetworkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact {
                namespace,
                reference,
            } => write!(f, "{namespace}:{reference}"),
            Self::Wildcard { namespace } => write!(f, "{namespace}:*"),
        }
    }
}

impl FromStr for NetworkPattern {
    type Err = NetworkFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s
            .split_once(':')
            .ok_or_else(|| NetworkFormatError(s.into()))?;
        if namespace.is_empty() || rest.is_empty() {
            return Err(NetworkFormatError(s.into()));
        }
        if rest == "*" {
            return Ok(Self::wildcard(namespace));
        }
        Ok(Self::exact(namespace, rest))
    }
}

impl Serialize for NetworkPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NetworkPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl From<Network> for NetworkPattern {
    fn from(network: Network) -> Self {
        let (namespace, reference) = network.into_parts();
        Self::exact(namespace, reference)
    }
}
