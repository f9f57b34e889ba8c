use {super::print_warnings, crate::prelude::*, keywarden_sdk::model::SystemNow};

/// Compile the model and store the signed record tree.
pub(crate) fn model_compile(config: &Path) -> Result<(), CliError> {
    let persistence = load_admin_conf(config)?;
    let warnings = persistence.compile_and_store(&SystemNow)?;
    print_warnings(&warnings);
    success!("model compiled and record tree updated");
    Ok(())
}
