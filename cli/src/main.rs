//! Keywarden admin CLI: model compilation and key management.

mod cli_conf;
mod display;
mod error;
mod key;
mod model;
mod prelude;

use crate::prelude::*;

/// Administrative tooling for the keywarden SSH access-control plane.
#[derive(Parser)]
#[command(name = "keywarden", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operate on the access model.
    #[command(subcommand)]
    Model(model::ModelCommand),
    /// Manage master and delegation keys.
    #[command(subcommand)]
    Key(key::KeyCommand),
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Model(command) => model::handle(command),
        Command::Key(command) => key::handle(command),
    };
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
