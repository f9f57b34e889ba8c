//! Compilation of the validated model into access rows.

use {
    super::{ServerMatch, SystemAcl},
    crate::{
        hostmatch::Pattern,
        sshkey::{self, KeyParseError, Options},
    },
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// One compiled access description: this user may reach this system account
/// on this server. Rows are what the model cache persists.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ConfigRow {
    /// The name of the server.
    pub server: String,
    /// The organization user with access.
    pub user: String,
    /// The account on the system.
    pub system_user: String,
    /// Whether keys for this row are deployed to the server proactively.
    pub push: bool,
    /// Enforced expiration of authenticated keys; zero means unconstrained.
    #[serde(with = "expire_secs")]
    pub expire: Duration,
    /// Raw authorized-keys option string for this grant.
    pub options: String,
}

impl ConfigRow {
    /// Re-derive the parsed options; they are never persisted.
    pub fn parsed_options(&self) -> Result<Options, KeyParseError> {
        sshkey::parse_options(&self.options)
    }
}

mod expire_secs {
    use {
        chrono::Duration,
        serde::{Deserialize as _, Deserializer, Serializer},
    };

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

/// The smaller of two durations, where zero means "unconstrained" and only
/// wins when both sides are zero.
fn min_expire_no_zero(a: Duration, b: Duration) -> Duration {
    if !a.is_zero() && !b.is_zero() {
        return a.min(b);
    }
    if !a.is_zero() {
        a
    } else {
        b
    }
}

impl SystemAcl {
    /// Compile the model into rows, filtering users whose `NotAfter` has
    /// passed. Returns the rows and operator warnings (non-fatal findings,
    /// currently server patterns that match nothing).
    pub fn compile(&self) -> (Vec<ConfigRow>, Vec<String>) {
        self.compile_at(Utc::now())
    }

    pub fn compile_at(&self, now: DateTime<Utc>) -> (Vec<ConfigRow>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut matched: BTreeMap<ServerMatch, Vec<String>> = BTreeMap::new();

        // Resolve each server pattern once, warning about dead patterns.
        for (role, patterns) in &self.roles {
            for pattern in patterns.keys() {
                let servers = matched.entry(pattern.clone()).or_insert_with(|| {
                    let compiled = Pattern::compile(pattern);
                    self.servers
                        .keys()
                        .filter(|server| compiled.matches(server))
                        .cloned()
                        .collect()
                });
                if servers.is_empty() {
                    warnings.push(format!(
                        "role '{role}', pattern '{pattern}' does not match any servers"
                    ));
                }
            }
        }

        let mut rows = Vec::with_capacity(10);
        for (user_name, user) in &self.users {
            if let Some(not_after) = user.not_after {
                if not_after < now {
                    continue;
                }
            }
            for role_name in &user.roles {
                let Some(patterns) = self.roles.get(role_name) else {
                    continue;
                };
                for (pattern, action_names) in patterns {
                    for action_name in action_names {
                        let Some(action) = self.actions.get(action_name) else {
                            continue;
                        };
                        for server in &matched[pattern.as_str()] {
                            let allowed = self.servers[server.as_str()]
                                .iter()
                                .any(|a| a == action_name);
                            if !allowed {
                                continue;
                            }
                            rows.push(ConfigRow {
                                server: server.clone(),
                                user: user_name.clone(),
                                system_user: action.system_user.clone(),
                                push: action.push,
                                expire: min_expire_no_zero(action.expire, user.expire),
                                options: action.options.clone(),
                            });
                        }
                    }
                }
            }
        }
        (rows, warnings)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::model::tests::MODEL, chrono::TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn compile(model: &str) -> (Vec<ConfigRow>, Vec<String>) {
        SystemAcl::from_yaml(model)
            .expect("model must validate")
            .compile_at(now())
    }

    #[test]
    fn rows_cover_matching_servers_only() {
        let (rows, warnings) = compile(MODEL);
        assert!(warnings.is_empty(), "{warnings:?}");

        // Johann (MasterAdmin, *.node.com) reaches both servers but Mail
        // Admin only where the server declares it; Kyrill reaches alpha only.
        let mut expected: Vec<(&str, &str, &str)> = vec![
            ("alpha.node.com", "Johann", "mysql"),
            ("beta.node.com", "Johann", "mysql"),
            ("beta.node.com", "Johann", "postmaster"),
            ("alpha.node.com", "Kyrill", "mysql"),
        ];
        let mut actual: Vec<(&str, &str, &str)> = rows
            .iter()
            .map(|r| (r.server.as_str(), r.user.as_str(), r.system_user.as_str()))
            .collect();
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn rows_never_reference_undeclared_actions() {
        let (rows, _) = compile(MODEL);
        // alpha.node.com never declares Mail Admin, so postmaster must not
        // appear there.
        assert!(!rows
            .iter()
            .any(|r| r.server == "alpha.node.com" && r.system_user == "postmaster"));
    }

    #[test]
    fn expired_user_is_dropped() {
        let model = MODEL.replace(
            "  Kyrill:\n",
            "  Kyrill:\n    NotAfter: \"20190101\"\n",
        );
        let (rows, _) = compile(&model);
        assert!(!rows.iter().any(|r| r.user == "Kyrill"));
        assert!(rows.iter().any(|r| r.user == "Johann"));
    }

    #[test]
    fn removing_a_user_removes_exactly_their_rows() {
        let (all_rows, _) = compile(MODEL);
        let without = MODEL.replace(
            "  Kyrill:\n    Expire: 1Y\n    Roles: [Database Admin]\n",
            "",
        );
        let (remaining, _) = compile(&without);
        let expected: Vec<_> = all_rows
            .iter()
            .filter(|r| r.user != "Kyrill")
            .cloned()
            .collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn dead_pattern_warns_and_produces_no_rows() {
        let model = MODEL.replace("\"*.node.com\"", "\"*.other.org\"");
        let (rows, warnings) = compile(&model);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("*.other.org"));
        assert!(!rows.iter().any(|r| r.user == "Johann"));
    }

    #[test]
    fn expire_is_minimum_of_non_zero() {
        // Action expire 3d, user expire 1Y: the action wins.
        let (rows, _) = compile(MODEL);
        let row = rows.iter().find(|r| r.user == "Johann").expect("row");
        assert_eq!(row.expire, Duration::days(3));

        // Remove the action expire; the user expire remains.
        let model = MODEL.replace("    Expire: 3d\n    Push: true\n    Options: no-pty\n", "    Push: true\n    Options: no-pty\n");
        let (rows, _) = compile(&model);
        let row = rows
            .iter()
            .find(|r| r.user == "Johann" && r.system_user == "mysql")
            .expect("row");
        assert!(row.expire > Duration::days(360));
    }

    #[test]
    fn min_expire_treats_zero_as_unconstrained() {
        let zero = Duration::zero();
        assert_eq!(min_expire_no_zero(zero, zero), zero);
        assert_eq!(
            min_expire_no_zero(zero, Duration::hours(1)),
            Duration::hours(1)
        );
        assert_eq!(
            min_expire_no_zero(Duration::hours(2), zero),
            Duration::hours(2)
        );
        assert_eq!(
            min_expire_no_zero(Duration::hours(2), Duration::hours(1)),
            Duration::hours(1)
        );
    }

    #[test]
    fn rows_roundtrip_through_json() {
        let (rows, _) = compile(MODEL);
        let json = serde_json::to_string_pretty(&rows).expect("serialize");
        let parsed: Vec<ConfigRow> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, rows);
    }
}
