use {crate::prelude::*, keywarden_sdk::model::Persistence};

/// Where to find the admin config file.
pub(crate) const ADMIN_CONF_PATH: &str = "/etc/keywarden/admin.toml";

/// Load the admin configuration: the persistence paths, as TOML.
pub(crate) fn load_admin_conf(path: &Path) -> AnyResult<Persistence> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Write an example admin configuration for the operator to fill in. Never
/// overwrites an existing file.
pub(crate) fn write_example_conf(path: &Path) -> AnyResult<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    let contents = toml::to_string_pretty(&Persistence::example())?;
    std::fs::write(path, contents)?;
    Ok(())
}
