//! CLI error types.

use thiserror::Error;
use wireport_core::{ClientError, ConfigError, ReconcileError};

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A kernel client could not be opened.
    #[error("kernel client error: {0}")]
    Client(#[from] ClientError),

    /// The reconciler rejected the operation.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// The binary was built without kernel support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireport_core::EntityKind;

    #[test]
    fn reconcile_errors_display_unwrapped() {
        let err = CliError::from(ReconcileError::NotFound { kind: EntityKind::Interface, id: "wg0".into() });
        assert_eq!(err.to_string(), "interface wg0 not found");
    }

    #[test]
    fn io_error_display() {
        let err = CliError::from(std::io::Error::other("broken pipe"));
        assert_eq!(err.to_string(), "IO error: broken pipe");
    }
}
