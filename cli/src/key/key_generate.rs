use {
    super::identity,
    crate::prelude::*,
    data_encoding::BASE32,
    ed25519_dalek::SigningKey,
    keywarden_sdk::keyfile,
    rand::rngs::OsRng,
};

/// Generate a master keypair and print the public half.
pub(crate) fn key_generate(keyfile_path: &Path) -> Result<(), CliError> {
    let key = SigningKey::generate(&mut OsRng);
    keyfile::write_key_file(
        keyfile_path,
        &format!("Private key {}", identity()),
        &[&key.to_keypair_bytes()],
    )?;
    println!("# Public key");
    println!("{}", BASE32.encode(&key.verifying_key().to_bytes()));
    Ok(())
}
