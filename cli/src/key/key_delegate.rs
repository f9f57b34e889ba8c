use {
    crate::prelude::*,
    chrono::Utc,
    data_encoding::BASE32,
    ed25519_dalek::SigningKey,
    keywarden_sdk::{delegation::DelegatedKey, duration, keyfile},
    rand::rngs::OsRng,
};

/// Generate a sub keypair, bind it to the master key until now plus
/// `expire`, and store both halves of the delegation.
pub(crate) fn key_delegate(
    expire: &str,
    master_file: &Path,
    delegation_file: &Path,
) -> Result<(), CliError> {
    let lifetime = duration::parse(expire)
        .map_err(|e| anyhow!("cannot parse duration '{expire}': {e}"))?;
    let master = keyfile::read_private_key(master_file)?;

    let sub = SigningKey::generate(&mut OsRng);
    let until = Utc::now() + lifetime;
    let delegated = DelegatedKey::delegate(&master, &sub.verifying_key(), Some(until));
    keyfile::write_key_file(
        delegation_file,
        &format!("Delegated key until {}", until.format(TIME_FORMAT)),
        &[&sub.to_keypair_bytes(), delegated.as_bytes()],
    )?;
    println!("# Public key");
    println!("{}", BASE32.encode(&sub.verifying_key().to_bytes()));
    Ok(())
}
