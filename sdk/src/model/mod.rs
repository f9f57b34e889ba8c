//! The declarative access model.
//!
//! Administrators describe servers, actions, users and roles in a YAML file.
//! Deserialization is two-stage: [`raw`] mirrors the YAML schema exactly,
//! and the conversion to [`SystemAcl`] runs all validation, so no checks
//! hide inside deserializers. The validated model compiles into
//! [`ConfigRow`]s which the persistence layer turns into signed record
//! files.

mod cleaner;
mod compile;
mod filestore;
mod persist;

pub use {
    compile::ConfigRow,
    persist::{LastAuth, Persistence, PersistError, SystemNow},
};

use {
    crate::{
        duration::{self, DurationParseError},
        sshkey::{self, KeyParseError},
    },
    chrono::{DateTime, Duration, Utc},
    std::collections::BTreeMap,
    thiserror::Error,
};

/// The name of a server. FQDN.
pub type ServerName = String;
/// The name of an available action.
pub type ActionName = String;
/// A user/person within the organization.
pub type UserName = String;
/// A role referring to a collection of available actions.
pub type RoleName = String;
/// A glob pattern matching one or more servers.
pub type ServerMatch = String;

/// Errors raised while validating a raw model.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server '{server}' references unknown action '{action}'")]
    UnknownServerAction { server: String, action: String },
    #[error("user '{user}' references unknown role '{role}'")]
    UnknownRole { user: String, role: String },
    #[error("role '{role}', pattern '{pattern}' references unknown action '{action}'")]
    UnknownRoleAction {
        role: String,
        pattern: String,
        action: String,
    },
    #[error("action '{action}' contains duplicate system user '{user}'")]
    DuplicateSystemUser { action: String, user: String },
    #[error("illegal character in name '{0}'")]
    IllegalName(String),
    #[error("action '{action}' options: {source}")]
    BadOptions {
        action: String,
        source: KeyParseError,
    },
    #[error("'{name}' expire: {source}")]
    BadExpire {
        name: String,
        source: DurationParseError,
    },
    #[error("user '{user}': invalid NotAfter date")]
    BadNotAfter { user: String },
}

/// A grant of access to a system account with enforced expiry and options.
#[derive(Clone, Debug)]
pub struct Action {
    /// The system account to which access is granted.
    pub system_user: String,
    /// Enforced expiration of authenticated keys; zero means unconstrained.
    pub expire: Duration,
    /// Whether keys for this action are deployed to servers proactively.
    pub push: bool,
    /// Raw authorized-keys option string, validated at model load.
    pub options: String,
}

/// An organization user.
#[derive(Clone, Debug)]
pub struct User {
    /// The user may not authenticate at all after this date.
    pub not_after: Option<DateTime<Utc>>,
    /// Enforced expiration of the user's keys; zero means unconstrained.
    pub expire: Duration,
    pub roles: Vec<RoleName>,
}

/// The validated model from which permission rows are generated.
#[derive(Clone, Debug, Default)]
pub struct SystemAcl {
    /// Actions available per server.
    pub servers: BTreeMap<ServerName, Vec<ActionName>>,
    pub actions: BTreeMap<ActionName, Action>,
    pub users: BTreeMap<UserName, User>,
    /// Per role: a server pattern mapped to the actions it unlocks there.
    pub roles: BTreeMap<RoleName, BTreeMap<ServerMatch, Vec<ActionName>>>,
}

fn valid_name(name: &str) -> bool {
    !name.contains(['/', '\\', ':'])
}

impl TryFrom<raw::SystemAclFile> for SystemAcl {
    type Error = ValidationError;

    fn try_from(file: raw::SystemAclFile) -> Result<Self, Self::Error> {
        let mut actions = BTreeMap::new();
        let mut seen_system_users = BTreeMap::new();
        for (name, action) in file.actions {
            if !valid_name(&action.user) {
                return Err(ValidationError::IllegalName(action.user));
            }
            if seen_system_users.insert(action.user.clone(), name.clone()).is_some() {
                return Err(ValidationError::DuplicateSystemUser {
                    action: name,
                    user: action.user,
                });
            }
            sshkey::parse_options(&action.options).map_err(|source| {
                ValidationError::BadOptions {
                    action: name.clone(),
                    source,
                }
            })?;
            let expire = duration::parse(&action.expire).map_err(|source| {
                ValidationError::BadExpire {
                    name: name.clone(),
                    source,
                }
            })?;
            actions.insert(
                name,
                Action {
                    system_user: action.user,
                    expire,
                    push: action.push,
                    options: action.options,
                },
            );
        }

        let mut servers = BTreeMap::new();
        for (name, server_actions) in file.servers {
            if !valid_name(&name) {
                return Err(ValidationError::IllegalName(name));
            }
            for action in &server_actions {
                if !actions.contains_key(action) {
                    return Err(ValidationError::UnknownServerAction {
                        server: name,
                        action: action.clone(),
                    });
                }
            }
            servers.insert(name, server_actions);
        }

        let roles: BTreeMap<RoleName, BTreeMap<ServerMatch, Vec<ActionName>>> = file.roles;
        for (role, patterns) in &roles {
            for (pattern, role_actions) in patterns {
                for action in role_actions {
                    if !actions.contains_key(action) {
                        return Err(ValidationError::UnknownRoleAction {
                            role: role.clone(),
                            pattern: pattern.clone(),
                            action: action.clone(),
                        });
                    }
                }
            }
        }

        let mut users = BTreeMap::new();
        for (name, user) in file.users {
            if !valid_name(&name) {
                return Err(ValidationError::IllegalName(name));
            }
            for role in &user.roles {
                if !roles.contains_key(role) {
                    return Err(ValidationError::UnknownRole {
                        user: name,
                        role: role.clone(),
                    });
                }
            }
            let expire = duration::parse(&user.expire).map_err(|source| {
                ValidationError::BadExpire {
                    name: name.clone(),
                    source,
                }
            })?;
            let not_after = match &user.not_after {
                None => None,
                Some(value) => Some(sshkey::parse_expire_time(value).map_err(|_| {
                    ValidationError::BadNotAfter { user: name.clone() }
                })?),
            };
            users.insert(
                name,
                User {
                    not_after,
                    expire,
                    roles: user.roles,
                },
            );
        }

        Ok(Self {
            servers,
            actions,
            users,
            roles,
        })
    }
}

impl SystemAcl {
    /// Parse and validate a model from its YAML source.
    pub fn from_yaml(source: &str) -> Result<Self, ModelError> {
        let file: raw::SystemAclFile = serde_yaml::from_str(source)?;
        Ok(Self::try_from(file)?)
    }
}

/// Errors raised while loading a model from YAML.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot parse model: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The raw YAML schema, deserialized verbatim before validation.
pub mod raw {
    use {serde::Deserialize, std::collections::BTreeMap};

    #[derive(Clone, Debug, Default, Deserialize)]
    pub struct SystemAclFile {
        #[serde(rename = "Servers", default)]
        pub servers: BTreeMap<String, Vec<String>>,
        #[serde(rename = "Actions", default)]
        pub actions: BTreeMap<String, ActionFile>,
        #[serde(rename = "Users", default)]
        pub users: BTreeMap<String, UserFile>,
        #[serde(rename = "Roles", default)]
        pub roles: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    }

    #[derive(Clone, Debug, Deserialize)]
    pub struct ActionFile {
        #[serde(rename = "User")]
        pub user: String,
        #[serde(rename = "Expire", default)]
        pub expire: String,
        #[serde(rename = "Push", default)]
        pub push: bool,
        #[serde(rename = "Options", default)]
        pub options: String,
    }

    #[derive(Clone, Debug, Deserialize)]
    pub struct UserFile {
        #[serde(rename = "NotAfter", default)]
        pub not_after: Option<String>,
        #[serde(rename = "Expire", default)]
        pub expire: String,
        #[serde(rename = "Roles", default)]
        pub roles: Vec<String>,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    pub(crate) const MODEL: &str = r#"
Servers:
  alpha.node.com:
    - Database Admin
  beta.node.com:
    - Database Admin
    - Mail Admin
Actions:
  Database Admin:
    User: mysql
    Expire: 3d
    Push: true
    Options: no-pty
  Mail Admin:
    User: postmaster
    Expire: 3d
    Push: true
Roles:
  MasterAdmin:
    "*.node.com":
      - Database Admin
      - Mail Admin
  Database Admin:
    "alpha.node.com":
      - Database Admin
Users:
  Johann:
    Expire: 1Y
    Roles: [MasterAdmin]
  Kyrill:
    Expire: 1Y
    Roles: [Database Admin]
"#;

    #[test]
    fn valid_model_parses() {
        let acl = SystemAcl::from_yaml(MODEL).expect("model must validate");
        assert_eq!(acl.servers.len(), 2);
        assert_eq!(acl.actions.len(), 2);
        assert_eq!(acl.users.len(), 2);
        assert_eq!(acl.roles.len(), 2);
        assert_eq!(acl.actions["Database Admin"].system_user, "mysql");
    }

    #[test]
    fn unknown_action_on_server() {
        let model = MODEL.replace("    - Mail Admin\n", "    - Backup Admin\n");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(
                ValidationError::UnknownServerAction { .. }
            ))
        );
    }

    #[test]
    fn unknown_role_on_user() {
        let model = MODEL.replace("Roles: [MasterAdmin]", "Roles: [Ghost]");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(ValidationError::UnknownRole { .. }))
        );
    }

    #[test]
    fn duplicate_system_user() {
        let model = MODEL.replace("User: postmaster", "User: mysql");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(
                ValidationError::DuplicateSystemUser { .. }
            ))
        );
    }

    #[test]
    fn illegal_character_in_system_user() {
        let model = MODEL.replace("User: postmaster", "User: post:master");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(ValidationError::IllegalName(_)))
        );
    }

    #[test]
    fn invalid_action_options() {
        let model = MODEL.replace("Options: no-pty", "Options: frobnicate");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(ValidationError::BadOptions { .. }))
        );
    }

    #[test]
    fn invalid_expire() {
        let model = MODEL.replace("Expire: 1Y\n    Roles: [MasterAdmin]", "Expire: 1bogus\n    Roles: [MasterAdmin]");
        assert_matches!(
            SystemAcl::from_yaml(&model),
            Err(ModelError::Validation(ValidationError::BadExpire { .. }))
        );
    }

    #[test]
    fn user_not_after_is_parsed() {
        let model = MODEL.replace(
            "  Kyrill:\n",
            "  Kyrill:\n    NotAfter: \"20190101\"\n",
        );
        let acl = SystemAcl::from_yaml(&model).expect("model must validate");
        assert!(acl.users["Kyrill"].not_after.is_some());
    }
}
