//! Key generation commands.
//!
//! These never touch the kernel.

use std::io::Write;

use wireport_core::{PresharedKey, PrivateKey};

use crate::error::CliError;
use crate::output::{GeneratedKeys, GeneratedPresharedKey, OutputFormat};

/// Handler for `genkey` and `genpsk`.
#[derive(Debug, Default)]
pub struct KeyCommand;

impl KeyCommand {
    /// Creates a new key command handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates and prints a private key with its public key.
    ///
    /// # Errors
    ///
    /// Returns error if output fails.
    pub fn genkey<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let private = PrivateKey::generate();
        let keys = GeneratedKeys { public_key: private.public_key().to_base64(), private_key: private.to_base64() };
        format.write(out, &keys)
    }

    /// Generates and prints a preshared key.
    ///
    /// # Errors
    ///
    /// Returns error if output fails.
    pub fn genpsk<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let psk = GeneratedPresharedKey { preshared_key: PresharedKey::generate().to_base64() };
        format.write(out, &psk)
    }
}
