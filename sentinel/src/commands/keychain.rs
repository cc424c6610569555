//! `sentinel keychain`: inspect and use the agent key pair.

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::keychain::EncryptedPayload;

#[derive(Subcommand)]
pub enum KeychainCommand {
    /// Print the agent public key (compressed, hex)
    PublicKey,
    /// Sign a message and print the DER signature (hex)
    Sign {
        /// Message to sign
        message: String,
    },
    /// Encrypt a message to this agent's key and print the payload as JSON
    Encrypt {
        /// Plaintext to encrypt
        plaintext: String,
    },
    /// Decrypt a payload produced by `encrypt`
    Decrypt {
        /// IV-prefixed ciphertext (hex)
        #[arg(long)]
        encrypted: String,
        /// Ephemeral public key of the payload (hex)
        #[arg(long)]
        ephemeral_public_key: String,
    },
}

/// Run a keychain subcommand.
///
/// # Errors
///
/// Returns an error if the key file cannot be loaded or the operation fails.
pub fn run(app: &AppContext, cmd: KeychainCommand) -> Result<()> {
    let keychain = app.keychain()?;
    match cmd {
        KeychainCommand::PublicKey => println!("{}", keychain.public_key()),
        KeychainCommand::Sign { message } => println!("{}", keychain.sign(&message)?),
        KeychainCommand::Encrypt { plaintext } => {
            let payload = keychain.encrypt(&plaintext)?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        KeychainCommand::Decrypt {
            encrypted,
            ephemeral_public_key,
        } => {
            let payload = EncryptedPayload {
                encrypted,
                ephemeral_public_key,
            };
            println!("{}", keychain.decrypt(&payload)?);
        }
    }
    Ok(())
}
