//! The model persistence layer: compiling the model and fanning the signed
//! records out over the output tree.
//!
//! Every record line is `base64(delegated signature) ":" payload`, where the
//! payload is `<server>:<system user>:<fingerprint>:<expire>:<authorized
//! keys line>`. Each key gets a single-line per-key file for fingerprint
//! lookups, and each server accumulates its bundle file.

use {
    super::{filestore, filestore::FileData, ConfigRow, ModelError, SystemAcl},
    crate::{
        keyfile::{self, KeyFileError},
        sshkey::{self, expire_time_to_string, Key},
        PER_HOST_PATH,
        PER_KEY_PATH,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fs::{self, OpenOptions},
        io::{self, Write as _},
        os::unix::fs::OpenOptionsExt as _,
        path::{Path, PathBuf},
    },
    thiserror::Error,
};

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("cannot parse model cache: {0}")]
    Cache(#[from] serde_json::Error),
    #[error("cannot read signing key: {0}")]
    Key(#[from] KeyFileError),
    #[error("refusing to operate on a short path")]
    ShortPath,
}

/// The expiry basis for emitted records: when did this user last
/// authenticate. The default implementation returns the current time;
/// deployments can plug in an audit-log reader to tie expiry to activity.
pub trait LastAuth {
    fn last_auth(&self, user: &str) -> DateTime<Utc>;
}

/// Wall-clock [`LastAuth`]: every record's expiry counts from now.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemNow;

impl LastAuth for SystemNow {
    fn last_auth(&self, _user: &str) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Paths the persistence layer operates on. The `key/` and `host/` output
/// sub-roots always live directly under `base_dir`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Persistence {
    /// The YAML model.
    pub model_file: PathBuf,
    /// JSON cache of the compiled rows.
    pub model_cache_file: PathBuf,
    /// Directory with one file per user, holding one SSH key per line.
    pub user_dir: PathBuf,
    /// Root of the generated record tree.
    pub base_dir: PathBuf,
    /// Delegation key file used to sign records.
    pub key_file: PathBuf,
}

impl Persistence {
    /// Placeholder configuration, for `--mkconfig`-style generation.
    pub fn example() -> Self {
        Self {
            model_file: PathBuf::from("/path/to/model.yaml"),
            model_cache_file: PathBuf::from("/path/to/model.cache"),
            user_dir: PathBuf::from("/path/to/userdir"),
            base_dir: PathBuf::from("/path/to/basedir"),
            key_file: PathBuf::from("/path/to/delegation.keys"),
        }
    }

    /// Compile the model, cache the rows as JSON and regenerate the record
    /// tree. Returns accumulated operator warnings.
    pub fn compile_and_store(
        &self,
        last_auth: &dyn LastAuth,
    ) -> Result<Vec<String>, PersistError> {
        let source = fs::read_to_string(&self.model_file)?;
        let acl = SystemAcl::from_yaml(&source)?;
        let (rows, warnings) = acl.compile();

        let cache = serde_json::to_vec_pretty(&rows)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.model_cache_file)?;
        file.write_all(&cache)?;

        self.store(&rows, warnings, last_auth)
    }

    /// Regenerate the record tree from the cached rows, without touching the
    /// YAML model. This is the cheap path for picking up rotated user keys.
    pub fn update(&self, last_auth: &dyn LastAuth) -> Result<Vec<String>, PersistError> {
        let cache = fs::read(&self.model_cache_file)?;
        let rows: Vec<ConfigRow> = serde_json::from_slice(&cache)?;
        self.store(&rows, Vec::new(), last_auth)
    }

    fn store(
        &self,
        rows: &[ConfigRow],
        mut warnings: Vec<String>,
        last_auth: &dyn LastAuth,
    ) -> Result<Vec<String>, PersistError> {
        let (emit_warnings, data) = self.gen_lines(rows, last_auth)?;
        warnings.extend(emit_warnings);
        for warning in &warnings {
            log::warn!("{warning}");
        }

        let (written, result) = filestore::store(&data);
        result?;
        filestore::cleanup(
            &self.base_dir,
            &written,
            &[
                self.base_dir.join(PER_KEY_PATH),
                self.base_dir.join(PER_HOST_PATH),
            ],
        )?;
        Ok(warnings)
    }

    fn gen_lines(
        &self,
        rows: &[ConfigRow],
        last_auth: &dyn LastAuth,
    ) -> Result<(Vec<String>, FileData), PersistError> {
        let (signing, delegated) = keyfile::read_key_file(&self.key_file)?;
        let mut warnings = Vec::with_capacity(10);
        let mut cache: BTreeMap<String, Option<Vec<Key>>> = BTreeMap::new();
        let mut data = FileData::new();
        let now = Utc::now();

        for row in rows {
            let row_options = match row.parsed_options() {
                Ok(options) => options,
                Err(e) => {
                    warnings.push(format!(
                        "row '{}' on '{}': invalid options: {e}",
                        row.user, row.server
                    ));
                    continue;
                }
            };
            let keys = user_keys(&mut cache, &self.user_dir, &row.user, &mut warnings);
            for key in keys {
                let expire = record_expiry(row, key, last_auth);
                if let Some(expire) = expire {
                    if expire < now {
                        continue;
                    }
                }
                let payload = format!(
                    "{}:{}:{}:{}:{}",
                    row.server,
                    row.system_user,
                    key.fingerprint,
                    expire_time_to_string(expire),
                    key.apply_to_string(&row_options),
                );
                let line = format!(
                    "{}:{}",
                    delegated.sign(&signing, payload.as_bytes()).to_base64(),
                    payload
                );

                let per_key_path = self
                    .base_dir
                    .join(PER_KEY_PATH)
                    .join(&key.fingerprint)
                    .join(&row.server)
                    .join(&row.system_user);
                let per_host_path = self.base_dir.join(PER_HOST_PATH).join(&row.server);

                // One line per per-key path; the host bundle accumulates.
                data.insert(per_key_path, vec![line.clone()]);
                data.entry(per_host_path).or_default().push(line);
            }
        }
        Ok((warnings, data))
    }
}

/// The record's expiry: the minimum of "last authentication plus the row's
/// expire" and the key's own expiry, each absent when unconstrained.
fn record_expiry(row: &ConfigRow, key: &Key, last_auth: &dyn LastAuth) -> Option<DateTime<Utc>> {
    let mut expire = None;
    if !row.expire.is_zero() {
        expire = Some(last_auth.last_auth(&row.user) + row.expire);
    }
    match (expire, key.not_after) {
        (Some(e), Some(na)) => Some(e.min(na)),
        (Some(e), None) => Some(e),
        (None, na) => na,
    }
}

/// Load a user's keys with per-run memoization. Failures and empty key files
/// warn once; the user then contributes no records.
fn user_keys<'a>(
    cache: &'a mut BTreeMap<String, Option<Vec<Key>>>,
    user_dir: &Path,
    user: &str,
    warnings: &mut Vec<String>,
) -> &'a [Key] {
    let entry = cache.entry(user.to_string()).or_insert_with(|| {
        match load_user_keys(user_dir, user) {
            Ok(keys) => {
                if keys.is_empty() {
                    warnings.push(format!("user '{user}' has no keys"));
                }
                Some(keys)
            }
            Err(e) => {
                warnings.push(format!("failed to get keys for '{user}': {e}"));
                None
            }
        }
    });
    entry.as_deref().unwrap_or(&[])
}

fn load_user_keys(user_dir: &Path, user: &str) -> Result<Vec<Key>, String> {
    let path = user_dir.join(user);
    let contents = fs::read_to_string(&path).map_err(|e| e.to_string())?;
    let mut keys = Vec::with_capacity(10);
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        keys.push(sshkey::parse_key(line).map_err(|e| e.to_string())?);
    }
    Ok(keys)
}
