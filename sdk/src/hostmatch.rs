//! Wildcard matching for hostnames.
//!
//! The only wildcard is `*`, which matches any run of characters except `.`
//! (including the empty run). Matching is greedy with no backtracking: a
//! wildcard consumes everything up to the next dot, so `*` covers exactly one
//! DNS label.

#[derive(Clone, Debug, PartialEq, Eq)]
enum Matcher {
    Literal(String),
    Wildcard,
}

/// A compiled hostname pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern(Vec<Matcher>);

impl Pattern {
    /// Compile a pattern string into a sequence of literal and wildcard
    /// matchers. Adjacent wildcards are idempotent.
    pub fn compile(pattern: &str) -> Self {
        let mut matchers = Vec::with_capacity(3);
        let mut rem = pattern;
        while !rem.is_empty() {
            if let Some(tail) = rem.strip_prefix('*') {
                matchers.push(Matcher::Wildcard);
                rem = tail;
                continue;
            }
            let end = rem.find('*').unwrap_or(rem.len());
            matchers.push(Matcher::Literal(rem[..end].to_string()));
            rem = &rem[end..];
        }
        Self(matchers)
    }

    /// Match `s` against the compiled pattern. The pattern matches iff all
    /// matchers succeed and the input is fully consumed.
    pub fn matches(&self, s: &str) -> bool {
        let mut rem = s;
        for matcher in &self.0 {
            match matcher {
                Matcher::Wildcard => {
                    let end = rem.find('.').unwrap_or(rem.len());
                    rem = &rem[end..];
                }
                Matcher::Literal(lit) => {
                    let Some(tail) = rem.strip_prefix(lit.as_str()) else {
                        return false;
                    };
                    rem = tail;
                }
            }
        }
        rem.is_empty()
    }
}
