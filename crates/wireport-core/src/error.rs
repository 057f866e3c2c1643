//! Error types for reconciliation, key handling and configuration.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::client::ClientError;

/// Boxed error produced by a caller-supplied transform.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for reconciler operations.
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

/// Errors that can occur while parsing or constructing key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// The all-zero value is the unset sentinel, never a real key.
    #[error("all-zero key is not a valid secret")]
    ZeroKey,
}

/// Kind of canonical entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A tunnel interface.
    Interface,
    /// A peer of a tunnel interface.
    Peer,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interface => write!(f, "interface"),
            Self::Peer => write!(f, "peer"),
        }
    }
}

/// Errors surfaced by the reconciler.
///
/// Every variant names the entity it concerns and, where a kernel call
/// failed, which subsystem rejected it. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The entity is absent in its authoritative subsystem.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Which kind of entity was looked up.
        kind: EntityKind,
        /// The entity identifier.
        id: String,
    },

    /// An identifier failed syntactic validation; no kernel call was made.
    #[error("invalid {kind} identifier {id:?}: {reason}")]
    InvalidIdentifier {
        /// Which kind of entity the identifier names.
        kind: EntityKind,
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The tunnel and link subsystems disagree about an interface.
    #[error("interface {interface}: link state could not be merged: {source}")]
    Merge {
        /// The interface identifier.
        interface: String,
        /// The link client failure.
        #[source]
        source: ClientError,
    },

    /// Listing tunnel devices failed.
    #[error("tunnel device enumeration failed: {source}")]
    Enumeration {
        /// The tunnel client failure.
        #[source]
        source: ClientError,
    },

    /// Reading a tunnel device failed for a reason other than absence.
    #[error("interface {interface}: tunnel query failed: {source}")]
    TunnelQuery {
        /// The interface identifier.
        interface: String,
        /// The tunnel client failure.
        #[source]
        source: ClientError,
    },

    /// Creating an entity on first save failed.
    #[error("failed to create {kind} {id}: {source}")]
    Create {
        /// Which kind of entity was being created.
        kind: EntityKind,
        /// The entity identifier.
        id: String,
        /// The create call failure, or the failure of the re-read after it.
        #[source]
        source: BoxError,
    },

    /// A link-level write failed.
    #[error("interface {interface}: link update failed: {source}")]
    LinkUpdate {
        /// The interface identifier.
        interface: String,
        /// The link client failure.
        #[source]
        source: ClientError,
    },

    /// A tunnel-level write failed.
    #[error("{kind} {id}: tunnel update failed: {source}")]
    TunnelUpdate {
        /// Which kind of entity was being written.
        kind: EntityKind,
        /// The entity identifier.
        id: String,
        /// The tunnel client failure.
        #[source]
        source: ClientError,
    },

    /// A transform produced an interface without a private key.
    #[error("interface {interface}: private key required to push configuration")]
    MissingPrivateKey {
        /// The interface identifier.
        interface: String,
    },

    /// The caller-supplied transform failed.
    #[error("transform of {kind} {id} failed: {source}")]
    Transform {
        /// Which kind of entity was transformed.
        kind: EntityKind,
        /// The entity identifier.
        id: String,
        /// The transform's own error, unchanged.
        #[source]
        source: BoxError,
    },
}

impl ReconcileError {
    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a `NotFound` error for the given entity kind.
    pub fn is_not_found_for(&self, wanted: EntityKind) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == wanted)
    }

    pub(crate) fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }

    pub(crate) fn invalid(kind: EntityKind, id: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier { kind, id: id.to_string(), reason: reason.into() }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for the expected schema.
    #[error("invalid TOML: {0}")]
    Parse(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity() {
        let err = ReconcileError::not_found(EntityKind::Interface, "wg0");
        assert_eq!(err.to_string(), "interface wg0 not found");
        assert!(err.is_not_found());
        assert!(err.is_not_found_for(EntityKind::Interface));
        assert!(!err.is_not_found_for(EntityKind::Peer));
    }

    #[test]
    fn link_update_carries_source() {
        use std::error::Error as _;

        let err = ReconcileError::LinkUpdate {
            interface: "wg0".to_string(),
            source: ClientError::Kernel("operation not permitted".to_string()),
        };
        assert!(err.to_string().contains("link update failed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn transform_error_is_preserved_verbatim() {
        use std::error::Error as _;

        let inner: BoxError = "port out of range".into();
        let err = ReconcileError::Transform {
            kind: EntityKind::Peer,
            id: "abc".to_string(),
            source: inner,
        };
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "port out of range");
    }

    #[test]
    fn key_error_display() {
        assert_eq!(
            KeyError::InvalidKeyLength(16).to_string(),
            "invalid key length: expected 32, got 16"
        );
    }
}
