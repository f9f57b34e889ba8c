use {
    crate::prelude::*,
    data_encoding::BASE32,
    keywarden_sdk::keyfile,
};

/// Print the public key stored in a key file. Delegation files additionally
/// report who delegated and until when.
pub(crate) fn key_publickey(keyfile_path: &Path) -> Result<(), CliError> {
    let lines = keyfile::read_payload_lines(keyfile_path)?;
    match lines.len() {
        1 => {
            let key = keyfile::read_private_key(keyfile_path)?;
            println!("# Public key");
            println!("{}", BASE32.encode(&key.verifying_key().to_bytes()));
        }
        2 => {
            let (key, delegated) = keyfile::read_key_file(keyfile_path)?;
            let (master, _, until) = delegated
                .contents()
                .map_err(|e| anyhow!("cannot read delegation: {e}"))?;
            println!("# Public key");
            println!("{}", BASE32.encode(&key.verifying_key().to_bytes()));
            match until {
                Some(t) => println!("# Delegated until '{}' by:", t.format(TIME_FORMAT)),
                None => println!("# Delegated indefinitely by:"),
            }
            println!("{}", BASE32.encode(&master.to_bytes()));
        }
        _ => return Err(anyhow!("unknown key file format").into()),
    }
    Ok(())
}
