pub(crate) use {
    crate::{
        cli_conf::{load_admin_conf, ADMIN_CONF_PATH},
        error::CliError,
        success,
    },
    anyhow::{anyhow, Result as AnyResult},
    clap::{Parser, Subcommand},
    colored::Colorize,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Time format used when talking to the operator.
pub(crate) const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
