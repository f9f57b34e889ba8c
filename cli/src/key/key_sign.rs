use {
    crate::prelude::*,
    keywarden_sdk::keyfile,
    std::io::{self, Read as _},
};

/// Sign a message (or stdin) with a delegation key and print the signature.
/// With an inline message the output is `sig_b64:message`, the shape of a
/// record line.
pub(crate) fn key_sign(delegation_file: &Path, message: Option<&str>) -> Result<(), CliError> {
    let (private, delegated) = keyfile::read_key_file(delegation_file)?;
    let msg: Vec<u8> = match message {
        Some(message) => message.as_bytes().to_vec(),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    let signature = delegated.sign(&private, &msg);
    match message {
        Some(message) => println!("{}:{message}", signature.to_base64()),
        None => println!("{}", signature.to_base64()),
    }
    Ok(())
}
