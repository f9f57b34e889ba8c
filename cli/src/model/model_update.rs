use {super::print_warnings, crate::prelude::*, keywarden_sdk::model::SystemNow};

/// Regenerate the record tree from the cached rows only.
pub(crate) fn model_update(config: &Path) -> Result<(), CliError> {
    let persistence = load_admin_conf(config)?;
    let warnings = persistence.update(&SystemNow)?;
    print_warnings(&warnings);
    success!("record tree updated from cache");
    Ok(())
}
