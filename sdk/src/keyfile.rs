//! Reading and writing trusted key files.
//!
//! A key file is ASCII: `#`-prefixed comment lines followed by base32-encoded
//! payload lines. A delegation key file carries two payloads, the 64-byte
//! ed25519 keypair and the 168-byte delegated key; a master key file carries
//! only the keypair. Files are created read-only and are never overwritten.

use {
    crate::delegation::{DelegatedKey, DELEGATED_KEY_LENGTH},
    data_encoding::BASE32,
    ed25519_dalek::{SigningKey, KEYPAIR_LENGTH},
    std::{
        fs::{self, OpenOptions},
        io::{self, Write as _},
        os::unix::fs::OpenOptionsExt as _,
        path::Path,
    },
    thiserror::Error,
    zeroize::Zeroize as _,
};

/// Errors raised while reading or writing key files.
#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("cannot decode key file: {0}")]
    Decode(String),
    /// The embedded sub public key does not belong to the private key.
    #[error("key file corrupted")]
    Corrupted,
    #[error("unexpected key file format")]
    Format,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read payload lines from a key file, skipping comments and decoding base32.
pub fn read_payload_lines(path: &Path) -> Result<Vec<Vec<u8>>, KeyFileError> {
    let contents = fs::read_to_string(path)?;
    let mut payloads = Vec::with_capacity(3);
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let decoded = BASE32
            .decode(line.as_bytes())
            .map_err(|e| KeyFileError::Decode(e.to_string()))?;
        payloads.push(decoded);
    }
    Ok(payloads)
}

/// Write `payloads` base32-encoded to a fresh read-only file, preceded by a
/// `#` header line. Existing files are never overwritten.
pub fn write_key_file(
    path: &Path,
    header: &str,
    payloads: &[&[u8]],
) -> Result<(), KeyFileError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o400)
        .open(path)?;
    writeln!(file, "# {header}")?;
    for payload in payloads {
        writeln!(file, "{}", BASE32.encode(payload))?;
    }
    Ok(())
}

fn signing_key_from_payload(mut payload: Vec<u8>) -> Result<SigningKey, KeyFileError> {
    let result = <[u8; KEYPAIR_LENGTH]>::try_from(payload.as_slice())
        .map_err(|_| KeyFileError::Format)
        .and_then(|bytes| {
            SigningKey::from_keypair_bytes(&bytes).map_err(|_| KeyFileError::Corrupted)
        });
    payload.zeroize();
    result
}

/// Read a master key file: one payload line holding the 64-byte keypair.
pub fn read_private_key(path: &Path) -> Result<SigningKey, KeyFileError> {
    let mut lines = read_payload_lines(path)?;
    if lines.len() != 1 {
        return Err(KeyFileError::Format);
    }
    signing_key_from_payload(lines.remove(0))
}

/// Read a delegation key file: the 64-byte keypair followed by the 168-byte
/// delegated key. The delegation must verify, and its embedded sub public
/// key must be the public half of the private key.
pub fn read_key_file(path: &Path) -> Result<(SigningKey, DelegatedKey), KeyFileError> {
    let mut lines = read_payload_lines(path)?;
    if lines.len() != 2 {
        return Err(KeyFileError::Format);
    }
    let delegated_payload = lines.remove(1);
    let private = signing_key_from_payload(lines.remove(0))?;

    if delegated_payload.len() != DELEGATED_KEY_LENGTH {
        return Err(KeyFileError::Format);
    }
    let delegated =
        DelegatedKey::from_bytes(&delegated_payload).map_err(|_| KeyFileError::Format)?;
    let (_, sub, _) = delegated
        .contents()
        .map_err(|_| KeyFileError::Corrupted)?;
    if sub != private.verifying_key() {
        return Err(KeyFileError::Corrupted);
    }
    Ok((private, delegated))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        chrono::{Duration, Utc},
        rand::rngs::OsRng,
        std::os::unix::fs::MetadataExt as _,
        tempfile::TempDir,
    };

    fn delegation_file(dir: &TempDir, name: &str) -> (std::path::PathBuf, SigningKey) {
        let master = SigningKey::generate(&mut OsRng);
        let sub = SigningKey::generate(&mut OsRng);
        let until = Utc::now() + Duration::hours(1);
        let delegated = DelegatedKey::delegate(&master, &sub.verifying_key(), Some(until));
        let path = dir.path().join(name);
        write_key_file(
            &path,
            "Delegated key",
            &[&sub.to_keypair_bytes(), delegated.as_bytes()],
        )
        .expect("write key file");
        (path, sub)
    }

    #[test]
    fn roundtrip_delegation_file() {
        let dir = TempDir::new().expect("tempdir");
        let (path, sub) = delegation_file(&dir, "delegation");
        let (private, delegated) = read_key_file(&path).expect("read key file");
        assert_eq!(private.to_bytes(), sub.to_bytes());
        assert_eq!(
            delegated.keys().expect("delegation verifies").1,
            sub.verifying_key()
        );
    }

    #[test]
    fn file_is_created_read_only_and_never_overwritten() {
        let dir = TempDir::new().expect("tempdir");
        let (path, _) = delegation_file(&dir, "delegation");
        let mode = fs::metadata(&path).expect("stat").mode() & 0o777;
        assert_eq!(mode, 0o400);
        assert_matches!(
            write_key_file(&path, "again", &[b"anything"]),
            Err(KeyFileError::Io(_))
        );
    }

    #[test]
    fn comments_are_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("key");
        let master = SigningKey::generate(&mut OsRng);
        write_key_file(&path, "Private key", &[&master.to_keypair_bytes()])
            .expect("write key file");
        let read = read_private_key(&path).expect("read back");
        assert_eq!(read.to_bytes(), master.to_bytes());
    }

    #[test]
    fn mismatched_delegation_is_corrupted() {
        let dir = TempDir::new().expect("tempdir");
        let master = SigningKey::generate(&mut OsRng);
        let sub = SigningKey::generate(&mut OsRng);
        let stranger = SigningKey::generate(&mut OsRng);
        // Delegation for a different sub key than the stored private key.
        let delegated = DelegatedKey::delegate(&master, &sub.verifying_key(), None);
        let path = dir.path().join("key");
        write_key_file(
            &path,
            "Delegated key",
            &[&stranger.to_keypair_bytes(), delegated.as_bytes()],
        )
        .expect("write key file");
        assert_matches!(read_key_file(&path), Err(KeyFileError::Corrupted));
    }

    #[test]
    fn wrong_line_count_is_format_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("key");
        let master = SigningKey::generate(&mut OsRng);
        write_key_file(&path, "Private key", &[&master.to_keypair_bytes()])
            .expect("write key file");
        assert_matches!(read_key_file(&path), Err(KeyFileError::Format));
    }
}
