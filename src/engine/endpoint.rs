//! Endpoint locators accepted by `connect`.
//!
//! - `mem://` or `memory` - in-memory engine
//! - `indxdb://<name>` - named browser-persistent store
//! - `<scheme>://<rest>` - anything else, left to the connector to accept or reject

use std::fmt;

use crate::protocol::AdapterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointKind {
    Memory,
    IndxDb { name: String },
    Other { scheme: String, path: String },
}

/// A parsed endpoint, keeping the string it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    kind: EndpointKind,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, AdapterError> {
        let trimmed = raw.trim();
        let invalid = |reason: &str| AdapterError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("endpoint is empty"));
        }
        if trimmed == "memory" {
            return Ok(Self::new(trimmed, EndpointKind::Memory));
        }

        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme (expected e.g. mem://)"))?;

        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("malformed scheme"));
        }

        let kind = match scheme.to_ascii_lowercase().as_str() {
            "mem" | "memory" => EndpointKind::Memory,
            "indxdb" => {
                let name = rest.trim_end_matches('/');
                if name.is_empty() {
                    return Err(invalid("indxdb endpoint requires a database name"));
                }
                EndpointKind::IndxDb {
                    name: name.to_string(),
                }
            }
            other => EndpointKind::Other {
                scheme: other.to_string(),
                path: rest.to_string(),
            },
        };
        Ok(Self::new(trimmed, kind))
    }

    fn new(raw: &str, kind: EndpointKind) -> Self {
        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    pub fn kind(&self) -> &EndpointKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Scheme name as used in error messages.
    pub fn scheme(&self) -> &str {
        match &self.kind {
            EndpointKind::Memory => "mem",
            EndpointKind::IndxDb { .. } => "indxdb",
            EndpointKind::Other { scheme, .. } => scheme,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
