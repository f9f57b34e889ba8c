//! Host-side resolution of signed authorization records.
//!
//! The agent asks one question per login: which authorized-keys lines apply
//! to `(host, user, key fingerprint)`. [`RemoteAcl`] answers it against the
//! published record tree over HTTP; [`AuthorizedFile`] answers it against a
//! trusted local file. Both verify every record's delegated signature
//! against the master public key and silently skip anything that fails a
//! sub-check.

mod local;
mod remote;

pub use {
    local::{find_entry_in_file, AuthorizedFile, ROLLOVER_EXTENSION},
    remote::RemoteAcl,
};

use {
    crate::{delegation::DelegatedSignature, fileperm::PermissionError},
    chrono::{DateTime, NaiveDateTime, TimeZone, Utc},
    regex::Regex,
    std::io,
    thiserror::Error,
};

/// Errors raised during record resolution.
#[derive(Debug, Error)]
pub enum AclError {
    /// No matching record exists. This is an authoritative answer, not a
    /// failure; the agent exits cleanly and `sshd` denies access.
    #[error("not found")]
    NotFound,
    /// The remote backend is unreachable or erroring in a way that permits
    /// consulting the local file.
    #[error("fallback to local file")]
    Fallback,
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

const EXPIRE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Sentinel deep in the past: records whose expiry does not parse are
/// dropped rather than accepted.
fn kill_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1911, 1, 3, 0, 0, 0)
        .single()
        .expect("constant is valid")
}

/// The local hostname, as reported by the kernel.
pub fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not utf-8"))
}

/// Strip the `SHA256:` prefix sshd puts in front of `%f` fingerprints.
pub(crate) fn normalize_fingerprint(fingerprint: &str) -> &str {
    fingerprint
        .strip_prefix("SHA256:")
        .unwrap_or(fingerprint)
}

/// One parsed record payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AclEntry {
    pub hostname: String,
    pub user: String,
    pub key_hash: String,
    pub not_after: Option<DateTime<Utc>>,
    pub authorized_key: String,
}

impl AclEntry {
    /// Parse `<host>:<user>:<keyhash>:<notafter>:<authorized_keys...>`. The
    /// final field may itself contain colons and is joined as-is.
    pub fn parse_payload(payload: &str) -> Option<Self> {
        let fields: Vec<&str> = payload.split(':').collect();
        if fields.len() < 5 {
            return None;
        }
        if fields[0].is_empty() || fields[1].is_empty() || fields[2].is_empty() {
            return None;
        }
        let authorized_key = fields[4..].join(":");
        if authorized_key.is_empty() {
            return None;
        }
        Some(Self {
            hostname: fields[0].to_string(),
            user: fields[1].to_string(),
            key_hash: fields[2].to_string(),
            not_after: parse_expire(fields[3]),
            authorized_key,
        })
    }

    /// Match against a query. The host field may be a literal, `*`, or a
    /// glob where `*` covers one DNS label; expired entries never match.
    pub fn matches(&self, host: &str, user: &str, fingerprint: &str) -> bool {
        if self.hostname != "*" && self.hostname != host {
            let Ok(re) = Regex::new(&host_regex(&self.hostname)) else {
                return false;
            };
            if !re.is_match(host) {
                return false;
            }
        }
        if self.user != user {
            return false;
        }
        if let Some(not_after) = self.not_after {
            if not_after < Utc::now() {
                return false;
            }
        }
        if self.key_hash.is_empty() || fingerprint.is_empty() {
            return false;
        }
        self.key_hash == fingerprint
    }
}

fn parse_expire(field: &str) -> Option<DateTime<Utc>> {
    if field.is_empty() {
        return None;
    }
    match NaiveDateTime::parse_from_str(field, EXPIRE_TIME_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => Some(kill_time()),
    }
}

/// Translate a record's host glob into an anchored regex: `*` matches any
/// run of non-dot characters.
fn host_regex(pattern: &str) -> String {
    format!(
        "^{}$",
        pattern.replace('.', "\\.").replace('*', "[^.]*")
    )
}

/// Verify one `sig_b64:payload` record line against the master key and parse
/// its payload. Blank lines, comments and anything failing a sub-check
/// yield `None`.
pub(crate) fn verify_line(line: &str, master: &[u8; 32]) -> Option<AclEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (sig_b64, payload) = line.split_once(':')?;
    if sig_b64.is_empty() || payload.is_empty() {
        return None;
    }
    let signature = DelegatedSignature::from_base64(sig_b64).ok()?;
    signature.verify(master, payload.as_bytes())?;
    AclEntry::parse_payload(payload)
}
