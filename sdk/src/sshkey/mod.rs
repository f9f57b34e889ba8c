//! Parsing of `authorized_keys` lines.
//!
//! A line is optional space-separated options followed by
//! `<type> <base64 blob>` and an optional comment. The parser enforces the
//! OpenSSH option grammar, lifts the `expiry-time` option into a typed
//! expiry, and computes the SHA-256 fingerprint used as the lookup key
//! throughout the access-control plane.

mod options;

pub use options::{
    expire_time_to_string,
    parse_expire_time,
    KeyOption,
    OptionValue,
    Options,
    EXPIRY_TIME_OPTION,
};

use {
    base64::{
        engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
        Engine as _,
    },
    chrono::{DateTime, Utc},
    options::verify_option,
    sha2::{Digest as _, Sha256},
    thiserror::Error,
};

/// Errors raised while parsing keys and options.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("no key found")]
    NoKey,
    #[error("missing quote")]
    MissingQuote,
    #[error("trailing garbage")]
    Garbage,
    #[error("inconsistent key type")]
    InconsistentType,
    #[error("invalid key encoding")]
    Encoding,
    #[error("option has wrong format")]
    OptionFormat,
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("invalid expiry-time format")]
    ExpiryFormat,
}

/// Key types accepted on authorized-keys lines.
const KEY_TYPES: &[&str] = &[
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "ssh-ed25519",
    "ssh-dss",
    "ssh-rsa",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

fn is_key_type(token: &str) -> bool {
    KEY_TYPES.contains(&token)
}

/// An SSH public key: the declared type and the raw wire blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key_type: String,
    blob: Vec<u8>,
}

impl PublicKey {
    /// Decode from the declared type and base64 wire blob of an
    /// authorized-keys line. The type string embedded in the blob must match
    /// the declared one.
    pub fn from_base64(declared_type: &str, b64: &str) -> Result<Self, KeyParseError> {
        let blob = STANDARD.decode(b64).map_err(|_| KeyParseError::Encoding)?;
        let embedded = wire_key_type(&blob).ok_or(KeyParseError::Encoding)?;
        if embedded != declared_type {
            return Err(KeyParseError::InconsistentType);
        }
        Ok(Self {
            key_type: declared_type.to_string(),
            blob,
        })
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Render as `<type> <base64>`, the authorized-keys form without options
    /// or comment.
    pub fn to_authorized_key(&self) -> String {
        format!("{} {}", self.key_type, STANDARD.encode(&self.blob))
    }

    /// Unpadded standard base64 of the SHA-256 digest over the wire blob.
    pub fn fingerprint(&self) -> String {
        STANDARD_NO_PAD.encode(Sha256::digest(&self.blob))
    }
}

/// Read the length-prefixed type string at the start of an SSH wire blob.
fn wire_key_type(blob: &[u8]) -> Option<&str> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let raw = blob.get(4..4 + len)?;
    std::str::from_utf8(raw).ok()
}

/// An annotated SSH key from an authorized-keys line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    pub options: Options,
    pub key: PublicKey,
    pub comment: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
    pub fingerprint: String,
}

impl Key {
    /// Apply `action_options` (the authoritative set) to this key's own
    /// options and render the resulting authorized-keys line. The comment is
    /// dropped.
    pub fn apply_to_string(&self, action_options: &Options) -> String {
        let opts = action_options.apply(&self.options).to_string();
        let key = self.key.to_authorized_key();
        if opts.is_empty() {
            key
        } else {
            format!("{opts} {key}")
        }
    }
}

/// Parse a single authorized-keys line into a [`Key`].
pub fn parse_key(s: &str) -> Result<Key, KeyParseError> {
    let chars: Vec<char> = s.chars().collect();
    let mut q = trim_left(&chars);
    let mut opts = Options::new();
    let mut not_after = None;

    loop {
        let token: String = q
            .iter()
            .take_while(|c| !c.is_whitespace())
            .collect();
        if is_key_type(&token) {
            let rest: String = q.iter().collect();
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() < 2 {
                return Err(KeyParseError::NoKey);
            }
            if fields.len() > 3 {
                return Err(KeyParseError::Garbage);
            }
            let key = PublicKey::from_base64(fields[0], fields[1])?;
            let fingerprint = key.fingerprint();
            return Ok(Key {
                options: opts,
                comment: fields.get(2).map(|c| c.to_string()),
                not_after,
                fingerprint,
                key,
            });
        }

        match parse_option(q)? {
            ParsedOption::End { .. } => return Err(KeyParseError::NoKey),
            ParsedOption::Next { rem, name, value } => {
                let value = verify_option(
                    &name,
                    value.as_ref().map(|(v, quoted)| (v.as_str(), *quoted)),
                )?;
                match value {
                    OptionValue::ExpiryTime(t) => not_after = Some(t),
                    value => opts.push(KeyOption { name, value }),
                }
                q = trim_left(rem);
            }
        }
    }
}

/// Parse a bare option string, as found in an action's `Options` field. It
/// does not fail on a missing key.
pub fn parse_options(s: &str) -> Result<Options, KeyParseError> {
    let chars: Vec<char> = s.chars().collect();
    let mut q = trim_left(&chars);
    let mut opts = Options::new();

    loop {
        let parsed = parse_option(q)?;
        let (rem, name, value, done) = match parsed {
            ParsedOption::Next { rem, name, value } => (rem, name, value, false),
            ParsedOption::End { name } => (&[][..], name, None, true),
        };
        if !name.is_empty() {
            let value = verify_option(
                &name,
                value.as_ref().map(|(v, quoted)| (v.as_str(), *quoted)),
            )?;
            opts.push(KeyOption { name, value });
        }
        if done {
            return Ok(opts);
        }
        q = trim_left(rem);
    }
}

enum ParsedOption<'a> {
    /// An option followed by more input.
    Next {
        rem: &'a [char],
        name: String,
        value: Option<(String, bool)>,
    },
    /// The input ended; `name` holds whatever trailing run was left.
    End { name: String },
}

fn parse_option(s: &[char]) -> Result<ParsedOption<'_>, KeyParseError> {
    for (i, &r) in s.iter().enumerate() {
        if r.is_whitespace() {
            return Ok(ParsedOption::Next {
                rem: &s[i + 1..],
                name: s[..i].iter().collect(),
                value: None,
            });
        }
        if r == '=' && i < s.len() - 1 {
            let (rem, value, quoted) = parse_value(&s[i + 1..])?;
            return Ok(ParsedOption::Next {
                rem,
                name: s[..i].iter().collect(),
                value: Some((value, quoted)),
            });
        }
    }
    Ok(ParsedOption::End {
        name: s.iter().collect(),
    })
}

fn parse_value(s: &[char]) -> Result<(&[char], String, bool), KeyParseError> {
    if s.is_empty() {
        return Ok((s, String::new(), false));
    }
    let quote_char = s[0];
    let quoted = quote_char == '"' || quote_char == '\'';
    let mut escaped = false;
    for i in 1..s.len() {
        let r = s[i];
        if !quoted {
            if r.is_whitespace() {
                return Ok((&s[i..], s[..i].iter().collect(), false));
            }
        } else {
            if escaped {
                escaped = false;
                continue;
            }
            if r == '\\' {
                escaped = true;
                continue;
            }
            if r == quote_char {
                return Ok((&s[i + 1..], s[1..i].iter().collect(), true));
            }
        }
    }
    if quoted {
        return Err(KeyParseError::MissingQuote);
    }
    Ok((&[], s.iter().collect(), false))
}

fn trim_left(s: &[char]) -> &[char] {
    let start = s
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(s.len());
    &s[start..]
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, chrono::TimeZone};

    // A real nistp256 key; its fingerprint is pinned below.
    const TEST_KEY: &str = "ecdsa-sha2-nistp256 AAAAE2VjZHNhLXNoYTItbmlzdHAyNTYAAAAIbmlzdHAyNTYAAABBBJcOEAu5+f9pPqRM6rZWbWUsh/uV8lWpXjYSwy1QrvtuyyJTYtVJkVxl+Kry0UC/SaqYayt9jnEXaBEZLXLeS2w=";
    const TEST_FINGERPRINT: &str = "RFqtJf2QzWNTc1nh8A1q7giSaFoZSurk5q5uZp91MPM";

    /// Build a syntactically valid ssh-ed25519 authorized-keys blob.
    fn ed25519_blob() -> String {
        let mut blob = Vec::new();
        blob.extend_from_slice(&11u32.to_be_bytes());
        blob.extend_from_slice(b"ssh-ed25519");
        blob.extend_from_slice(&32u32.to_be_bytes());
        blob.extend_from_slice(&[7u8; 32]);
        STANDARD.encode(blob)
    }

    #[test]
    fn parse_bare_key() {
        let key = parse_key(TEST_KEY).expect("must parse");
        assert_eq!(key.key.key_type(), "ecdsa-sha2-nistp256");
        assert_eq!(key.fingerprint, TEST_FINGERPRINT);
        assert!(key.options.is_empty());
        assert_eq!(key.comment, None);
        assert_eq!(key.not_after, None);
    }

    #[test]
    fn parse_key_with_comment() {
        let line = format!("{TEST_KEY} alice@example.com");
        let key = parse_key(&line).expect("must parse");
        assert_eq!(key.comment.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn parse_key_with_options() {
        let line = format!("no-pty command=\"/bin/true\" {TEST_KEY}");
        let key = parse_key(&line).expect("must parse");
        assert_eq!(key.options.len(), 2);
        assert_eq!(key.options.to_string(), "no-pty command=\"/bin/true\"");
    }

    #[test]
    fn parse_key_lifts_expiry_time() {
        let line = format!("expiry-time=\"20210923\" no-pty {TEST_KEY}");
        let key = parse_key(&line).expect("must parse");
        assert_eq!(
            key.not_after,
            Some(Utc.with_ymd_and_hms(2021, 9, 23, 0, 0, 0).unwrap())
        );
        // expiry-time never survives as an option.
        assert_eq!(key.options.to_string(), "no-pty");
    }

    #[test]
    fn parse_key_trailing_garbage() {
        let line = format!("{TEST_KEY} comment extra");
        assert_eq!(parse_key(&line), Err(KeyParseError::Garbage));
    }

    #[test]
    fn parse_key_inconsistent_type() {
        let line = format!("ssh-rsa {}", ed25519_blob());
        assert_eq!(parse_key(&line), Err(KeyParseError::InconsistentType));
    }

    #[test]
    fn parse_key_consistent_wire_type() {
        let line = format!("ssh-ed25519 {}", ed25519_blob());
        let key = parse_key(&line).expect("must parse");
        assert_eq!(key.key.key_type(), "ssh-ed25519");
    }

    #[test]
    fn parse_key_unknown_option() {
        let line = format!("bogus-option {TEST_KEY}");
        assert_matches!(parse_key(&line), Err(KeyParseError::UnknownOption(_)));
    }

    #[test]
    fn parse_key_missing_quote() {
        let line = format!("command=\"/bin/true {TEST_KEY}");
        assert_eq!(parse_key(&line), Err(KeyParseError::MissingQuote));
    }

    #[test]
    fn parse_key_without_key_is_an_error() {
        assert_eq!(parse_key("no-pty restrict"), Err(KeyParseError::NoKey));
        assert_eq!(parse_key(""), Err(KeyParseError::NoKey));
    }

    #[test]
    fn parse_options_string() {
        let opts = parse_options("no-pty command=\"/usr/bin/backup\"").expect("must parse");
        assert_eq!(opts.to_string(), "no-pty command=\"/usr/bin/backup\"");
    }

    #[test]
    fn parse_options_empty() {
        let opts = parse_options("").expect("must parse");
        assert!(opts.is_empty());
    }

    #[test]
    fn parse_options_rejects_unknown() {
        assert_matches!(
            parse_options("no-pty frobnicate"),
            Err(KeyParseError::UnknownOption(_))
        );
    }

    #[test]
    fn quoted_value_keeps_escapes() {
        let line = format!("command=\"echo \\\"hi\\\"\" {TEST_KEY}");
        let key = parse_key(&line).expect("must parse");
        assert_eq!(key.options.to_string(), "command=\"echo \\\"hi\\\"\"");
    }

    #[test]
    fn apply_to_string_drops_self_granted_options() {
        // A user tries to smuggle port forwarding and an expiry through their
        // key; the action only concedes no-pty.
        let line = format!(
            "permitopen=\"127.0.0.1:8080\" expiry-time=\"20210923\" {TEST_KEY}"
        );
        let key = parse_key(&line).expect("must parse");
        let action_opts = parse_options("no-pty").expect("must parse");
        let rendered = key.apply_to_string(&action_opts);
        assert_eq!(rendered, format!("no-pty {TEST_KEY}"));
        assert!(!rendered.contains("permitopen"));
        assert!(!rendered.contains("expiry-time"));
    }

    #[test]
    fn apply_to_string_without_options() {
        let key = parse_key(TEST_KEY).expect("must parse");
        assert_eq!(key.apply_to_string(&Options::new()), TEST_KEY);
    }

    #[test]
    fn fingerprint_is_unpadded_base64_sha256() {
        let key = parse_key(TEST_KEY).expect("must parse");
        assert!(!key.fingerprint.contains('='));
        assert_eq!(key.fingerprint.len(), 43);
    }
}
