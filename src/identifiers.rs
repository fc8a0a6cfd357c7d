//! Strongly-typed string newtypes for proposal identifiers, addresses and networks.
//!
//! All types implement `From<&str>`, `From<String>`, and `Into<String>` and
//! serialize/deserialize as plain strings.
//!
//! ```ignore
//! use creator_proposals::{Address, ProposalId};
//!
//! let creator: Address = "0xAbC".into();
//! let id: ProposalId = "0xplugin_0x1".into();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to generate string wrapper newtypes with consistent implementations.
///
/// Each generated type:
/// - Trims whitespace from input values
/// - Implements `From<&str>`, `From<String>`, `Into<String>`
/// - Implements `Display` for string formatting
/// - Serializes/deserializes as a plain string
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new value from any string-like input.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

string_id_type!(
    ProposalId,
    "Opaque proposal identifier, unique only within one plugin and network."
);

string_id_type!(
    Address,
    "Contract or account address (e.g. a plugin or a proposal creator)."
);

string_id_type!(
    Network,
    "Network name the plugin is deployed on (e.g. \"ethereum\", \"sepolia\")."
);

impl Address {
    /// Lowercased form; the indexer stores addresses lowercased and compares case-sensitively.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_id_trims_whitespace() {
        let id: ProposalId = "  0xp_0x1  ".into();
        assert_eq!(id.as_str(), "0xp_0x1");
    }

    #[test]
    fn address_lowercases_for_indexer() {
        let addr = Address::new("0xAbCDef");
        assert_eq!(addr.to_lowercase(), "0xabcdef");
        assert_eq!(addr.as_str(), "0xAbCDef");
    }

    #[test]
    fn empty_check() {
        assert!(Network::new("   ").is_empty());
        assert!(!Network::new("sepolia").is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ProposalId::new("m1")).unwrap();
        assert_eq!(json, "\"m1\"");
        let addr: Address = serde_json::from_str("\"0xC\"").unwrap();
        assert_eq!(addr.as_str(), "0xC");
    }
}
