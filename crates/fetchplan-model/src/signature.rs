//! Query signatures
//!
//! A query signature identifies the exact semantic query that produced a
//! cache slice. Structured signatures are JSON objects of the form
//! `{"c": "<core>", "x": {"<context key>": "<definition hash>"}}`; any other
//! string is treated as opaque and compared verbatim.
//!
//! Matching is subset-aware: a cached slice recorded with more context keys
//! than the query still serves the query, provided the core identity matches
//! and every key the query fixes carries the same definition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StructuredWire {
    c: String,
    #[serde(default)]
    x: BTreeMap<String, String>,
}

/// Parsed query signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySignature {
    /// Core identity plus per-context-key definition hashes
    Structured {
        /// Core query identity
        core: String,
        /// Context key to definition hash
        contexts: BTreeMap<String, String>,
    },
    /// Anything that is not a structured signature
    Opaque(String),
}

impl QuerySignature {
    /// Parse a signature string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(wire) = serde_json::from_str::<StructuredWire>(trimmed) {
                return Self::Structured {
                    core: wire.c,
                    contexts: wire.x,
                };
            }
        }
        Self::Opaque(trimmed.to_string())
    }

    /// Whether a slice signed with `self` may serve a query signed with `query`
    #[must_use]
    pub fn serves(&self, query: &QuerySignature) -> bool {
        match (self, query) {
            (
                Self::Structured {
                    core: cache_core,
                    contexts: cache_ctx,
                },
                Self::Structured {
                    core: query_core,
                    contexts: query_ctx,
                },
            ) => {
                cache_core == query_core
                    && query_ctx
                        .iter()
                        .all(|(k, v)| cache_ctx.get(k).is_some_and(|cv| cv == v))
            }
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => false,
        }
    }

    /// Canonical text form, stable across runs
    ///
    /// Structured signatures re-serialize with sorted keys; opaque ones are
    /// returned trimmed.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Structured { core, contexts } => {
                let wire = StructuredWire {
                    c: core.clone(),
                    x: contexts.clone(),
                };
                serde_json::to_string(&wire).unwrap_or_else(|_| core.clone())
            }
            Self::Opaque(raw) => raw.clone(),
        }
    }
}

/// Whether a cached signature may serve a query signature
#[must_use]
pub fn signatures_compatible(cached: &str, query: &str) -> bool {
    QuerySignature::parse(cached).serves(&QuerySignature::parse(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_signatures_compare_verbatim() {
        assert!(signatures_compatible("abc", "abc"));
        assert!(signatures_compatible(" abc ", "abc"));
        assert!(!signatures_compatible("abc", "abd"));
    }

    #[test]
    fn structured_superset_serves_subset() {
        let cached = r#"{"c":"core1","x":{"channel":"h1","device":"h2"}}"#;
        let query = r#"{"c":"core1","x":{"channel":"h1"}}"#;
        assert!(signatures_compatible(cached, query));
        assert!(!signatures_compatible(query, cached));
    }

    #[test]
    fn structured_mismatch_rejected() {
        let cached = r#"{"c":"core1","x":{"channel":"h1"}}"#;
        assert!(!signatures_compatible(cached, r#"{"c":"core2","x":{}}"#));
        assert!(!signatures_compatible(
            cached,
            r#"{"c":"core1","x":{"channel":"h9"}}"#
        ));
        assert!(!signatures_compatible(cached, "core1"));
    }

    #[test]
    fn canonical_form_sorts_keys() {
        let sig = QuerySignature::parse(r#"{"x":{"b":"2","a":"1"},"c":"core"}"#);
        assert_eq!(sig.canonical(), r#"{"c":"core","x":{"a":"1","b":"2"}}"#);
    }
}
