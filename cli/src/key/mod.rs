mod key_delegate;
mod key_generate;
mod key_publickey;
mod key_sign;

use {crate::prelude::*, chrono::Utc};

#[derive(Subcommand)]
pub(crate) enum KeyCommand {
    /// Generate a new master keypair; the private half is stored read-only.
    Generate {
        /// Where to store the private key. Never overwritten.
        keyfile: PathBuf,
    },
    /// Delegate signing authority from a master key to a fresh sub key.
    Delegate {
        /// Lifetime of the delegation; supports calendar units (1D, 2W, 1M).
        #[arg(short = 'e', long = "expire", default_value = "1D")]
        expire: String,
        /// Master private key file.
        masterkeyfile: PathBuf,
        /// Where to store the sub key and its delegation. Never overwritten.
        delegationfile: PathBuf,
    },
    /// Print the public key for a key file, plus delegation details when
    /// present.
    Publickey {
        keyfile: PathBuf,
    },
    /// Sign a message (or stdin) with a delegation key.
    Sign {
        delegationfile: PathBuf,
        /// Message to sign; stdin is signed when absent.
        message: Option<String>,
    },
}

pub(crate) fn handle(command: KeyCommand) -> Result<(), CliError> {
    match command {
        KeyCommand::Generate { keyfile } => key_generate::key_generate(&keyfile),
        KeyCommand::Delegate {
            expire,
            masterkeyfile,
            delegationfile,
        } => key_delegate::key_delegate(&expire, &masterkeyfile, &delegationfile),
        KeyCommand::Publickey { keyfile } => key_publickey::key_publickey(&keyfile),
        KeyCommand::Sign {
            delegationfile,
            message,
        } => key_sign::key_sign(&delegationfile, message.as_deref()),
    }
}

/// Who generated a key, stamped into the key file header.
pub(crate) fn identity() -> String {
    let username = std::env::var("USER").unwrap_or_default();
    let hostname = keywarden_sdk::acl::hostname().unwrap_or_default();
    format!(
        "(generated at '{}' by '{username}'@'{hostname}')",
        Utc::now().format(TIME_FORMAT)
    )
}
