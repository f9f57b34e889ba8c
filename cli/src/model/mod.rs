mod model_compile;
mod model_init;
mod model_update;

use crate::prelude::*;

#[derive(Subcommand)]
pub(crate) enum ModelCommand {
    /// Compile the YAML model and regenerate the signed record tree.
    Compile {
        /// Path to the admin configuration file.
        #[arg(short = 'c', long = "config", default_value = ADMIN_CONF_PATH)]
        config: PathBuf,
    },
    /// Regenerate the record tree from the compiled model cache, picking up
    /// rotated user keys without revalidating the model.
    Update {
        /// Path to the admin configuration file.
        #[arg(short = 'c', long = "config", default_value = ADMIN_CONF_PATH)]
        config: PathBuf,
    },
    /// Write an example admin configuration.
    Init {
        /// Where to write the configuration file.
        path: PathBuf,
    },
}

pub(crate) fn handle(command: ModelCommand) -> Result<(), CliError> {
    match command {
        ModelCommand::Compile { config } => model_compile::model_compile(&config),
        ModelCommand::Update { config } => model_update::model_update(&config),
        ModelCommand::Init { path } => model_init::model_init(&path),
    }
}

/// Surface operator warnings en bloc on stderr.
pub(crate) fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("{}", warnings.join("\n"));
    eprintln!();
}
