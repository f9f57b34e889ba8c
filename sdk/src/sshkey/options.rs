//! Authorized-keys options: the recognized option set, parsed values and the
//! filter algebra that applies an action's options to a user key.

use {
    super::KeyParseError,
    chrono::{DateTime, NaiveDate, NaiveDateTime, Utc},
    std::{collections::HashSet, fmt},
};

// The canonical OpenSSH option sets.
const FLAG_OPTIONS: &[&str] = &[
    "agent-forwarding",
    "cert-authority",
    "no-agent-forwarding",
    "no-port-forwarding",
    "no-pty",
    "no-user-rc",
    "no-X11-forwarding",
    "port-forwarding",
    "pty",
    "no-touch-required",
    "verify-required",
    "restrict",
    "user-rc",
    "X11-forwarding",
];

const STRING_OPTIONS: &[&str] = &[
    "permitlisten",
    "permitopen",
    "principals",
    "command",
    "environment",
    "from",
    "tunnel",
];

/// The distinguished option carrying a key expiry; it is lifted into
/// [`super::Key::not_after`] instead of surviving as an option.
pub const EXPIRY_TIME_OPTION: &str = "expiry-time";

// Negating flags and the positive options they cancel.
const NEGATIONS: &[(&str, &str)] = &[
    ("no-agent-forwarding", "agent-forwarding"),
    ("no-pty", "pty"),
    ("no-port-forwarding", "port-forwarding"),
    ("no-user-rc", "user-rc"),
    ("no-X11-forwarding", "X11-forwarding"),
];

// Options a key may never grant itself; always stripped before the
// intersection with the action's option set.
const SELF_GRANT_OPTIONS: &[&str] = &["permitopen", "permitlisten"];

/// The value an option can take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    Flag(bool),
    StringVal(String),
    ExpiryTime(DateTime<Utc>),
}

/// A single authorized-keys option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyOption {
    pub name: String,
    pub value: OptionValue,
}

/// An ordered list of authorized-keys options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options(Vec<KeyOption>);

impl Options {
    pub fn new() -> Self {
        Self(Vec::with_capacity(10))
    }

    pub fn push(&mut self, option: KeyOption) {
        self.0.push(option);
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyOption> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Apply these options (the authoritative set, typically from an action)
    /// to `from_key` (options a user attached to their own key):
    ///
    /// - every negation here removes its positive counterpart from the key,
    /// - the key cannot self-grant `permitopen`/`permitlisten`,
    /// - only key options still present in the filtered set survive,
    /// - all of these options are appended afterwards.
    pub fn apply(&self, from_key: &Options) -> Options {
        let mut allowed: HashSet<&str> =
            from_key.0.iter().map(|o| o.name.as_str()).collect();
        for option in &self.0 {
            for (negation, positive) in NEGATIONS {
                if option.name == *negation {
                    allowed.remove(positive);
                }
            }
        }

        let mut ret = Vec::with_capacity(from_key.0.len() + self.0.len());
        for option in &from_key.0 {
            if SELF_GRANT_OPTIONS.contains(&option.name.as_str()) {
                continue;
            }
            if allowed.contains(option.name.as_str()) {
                ret.push(option.clone());
            }
        }
        ret.extend(self.0.iter().cloned());
        Options(ret)
    }
}

impl fmt::Display for Options {
    /// Render as an authorized-keys option prefix: flags bare, string
    /// options quoted. Expiry values are never rendered.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for option in &self.0 {
            let rendered = match &option.value {
                OptionValue::Flag(_) => option.name.clone(),
                OptionValue::StringVal(v) => format!("{}=\"{}\"", option.name, v),
                OptionValue::ExpiryTime(_) => continue,
            };
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{rendered}")?;
            first = false;
        }
        Ok(())
    }
}

/// Classify and validate a parsed `name[=value]` pair against the known
/// option grammar.
pub(super) fn verify_option(
    name: &str,
    value: Option<(&str, bool)>,
) -> Result<OptionValue, KeyParseError> {
    if FLAG_OPTIONS.contains(&name) {
        if value.is_some() {
            return Err(KeyParseError::OptionFormat);
        }
        return Ok(OptionValue::Flag(true));
    }
    if STRING_OPTIONS.contains(&name) {
        return match value {
            Some((v, true)) => Ok(OptionValue::StringVal(v.to_string())),
            _ => Err(KeyParseError::OptionFormat),
        };
    }
    if name == EXPIRY_TIME_OPTION {
        let Some((v, _)) = value else {
            return Err(KeyParseError::OptionFormat);
        };
        return Ok(OptionValue::ExpiryTime(parse_expire_time(v)?));
    }
    Err(KeyParseError::UnknownOption(name.to_string()))
}

const EXPIRE_FORMAT_SHORT: &str = "%Y%m%d"; // YYYYMMDD
const EXPIRE_FORMAT_TIME: &str = "%Y%m%d%H%M"; // YYYYMMDDHHMM
const EXPIRE_FORMAT_TIME_LONG: &str = "%Y%m%d%H%M%S"; // YYYYMMDDHHMMSS
const EXPIRE_FORMAT_ISO: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an `expiry-time` value in one of the four accepted formats.
pub fn parse_expire_time(s: &str) -> Result<DateTime<Utc>, KeyParseError> {
    let naive = match s.len() {
        8 => NaiveDate::parse_from_str(s, EXPIRE_FORMAT_SHORT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        12 => NaiveDateTime::parse_from_str(s, EXPIRE_FORMAT_TIME).ok(),
        14 => NaiveDateTime::parse_from_str(s, EXPIRE_FORMAT_TIME_LONG).ok(),
        _ if s.contains([':', '-']) => {
            NaiveDateTime::parse_from_str(s, EXPIRE_FORMAT_ISO).ok()
        }
        _ => None,
    };
    naive
        .map(|n| n.and_utc())
        .ok_or(KeyParseError::ExpiryFormat)
}

/// Format an optional expiry as `YYYYMMDDHHMMSS`, empty when absent.
pub fn expire_time_to_string(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.format(EXPIRE_FORMAT_TIME_LONG).to_string(),
        None => String::new(),
    }
}
