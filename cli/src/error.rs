use {
    crate::{display::*, prelude::*},
    thiserror::Error,
};

/// Custom error definitions for the keywarden CLI. Takes care of displaying
/// a pretty summary in the console.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("{error}{separator}\n{0}", error = "IO Error".red().bold(), separator = separator())]
    Io(#[from] std::io::Error),
    #[error("{error}{separator}\n{0}", error = "Key Error".red().bold(), separator = separator())]
    Key(#[from] keywarden_sdk::keyfile::KeyFileError),
    #[error("{error}{separator}\n{0}", error = "Model Error".red().bold(), separator = separator())]
    Model(#[from] keywarden_sdk::model::PersistError),
    #[error("{error}{separator}\n{0}", error = "Error".red().bold(), separator = separator())]
    Any(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::Any(e)
    }
}
