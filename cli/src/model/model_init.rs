use {crate::cli_conf::write_example_conf, crate::prelude::*};

/// Write an example admin configuration to `path`.
pub(crate) fn model_init(path: &Path) -> Result<(), CliError> {
    write_example_conf(path)?;
    success!("example configuration written to {}", path.display());
    Ok(())
}
