//! Resolution against the published record tree over HTTP(S).

use {
    super::{normalize_fingerprint, verify_line, AclError},
    crate::{PER_HOST_PATH, PER_KEY_PATH},
    chrono::Utc,
    std::{
        fs::{self, OpenOptions},
        io::Write,
        os::unix::fs::OpenOptionsExt as _,
        path::{Path, PathBuf},
        time::Duration,
    },
};

// Hard total budget per request; login latency is user-visible.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A remote record backend, addressed by the URL the static file server
/// exposes the record tree under.
#[derive(Clone, Debug)]
pub struct RemoteAcl {
    url: String,
    master: [u8; 32],
    token: Option<String>,
    hostname: String,
}

impl RemoteAcl {
    /// `token`, when set, authenticates requests via HTTP Basic with the
    /// hostname as username.
    pub fn new(url: &str, master: [u8; 32], token: Option<String>, hostname: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            master,
            token,
            hostname: hostname.to_string(),
        }
    }

    /// Fetch and print the authorized-keys lines matching `(user,
    /// fingerprint)` on this host. `NotFound` is authoritative; transport
    /// failures become [`AclError::Fallback`] so the caller can consult the
    /// local file.
    pub fn find_entry(
        &self,
        out: &mut dyn Write,
        user: &str,
        fingerprint: &str,
    ) -> Result<(), AclError> {
        let fingerprint = normalize_fingerprint(fingerprint);
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.url, PER_KEY_PATH, fingerprint, self.hostname, user
        );
        let body = self.get(&url)?;
        let mut found = false;
        for line in body.lines() {
            let Some(entry) = verify_line(line, &self.master) else {
                continue;
            };
            if !entry.matches(&self.hostname, user, fingerprint) {
                continue;
            }
            writeln!(out, "{}", entry.authorized_key)?;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(AclError::NotFound)
        }
    }

    /// Download this host's signed bundle and atomically replace `key_file`
    /// with it. Lines that fail verification are dropped; the local
    /// resolver verifies again on use.
    pub fn fetch(&self, key_file: &Path) -> Result<(), AclError> {
        let url = format!("{}/{}/{}", self.url, PER_HOST_PATH, self.hostname);
        let body = self.get(&url)?;
        let kept: Vec<&str> = body
            .lines()
            .filter(|line| verify_line(line, &self.master).is_some())
            .collect();
        if kept.is_empty() {
            return Err(AclError::NotFound);
        }

        let mut temp = key_file.as_os_str().to_os_string();
        temp.push(format!(".dl-{}", Utc::now().timestamp()));
        let temp = PathBuf::from(temp);

        let written = write_bundle(&temp, &kept);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, key_file) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, url: &str) -> Result<String, AclError> {
        log::debug!("fetching {url}");
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(0)
            .tcp_keepalive(None)
            .build()
            .map_err(|_| AclError::Fallback)?;

        let mut request = client
            .get(url)
            .header(reqwest::header::CONNECTION, "close");
        if let Some(token) = &self.token {
            request = request.basic_auth(&self.hostname, Some(token));
        }

        let response = request.send().map_err(|_| AclError::Fallback)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AclError::NotFound);
        }
        if !response.status().is_success() {
            return Err(AclError::Fallback);
        }
        response.text().map_err(|_| AclError::Fallback)
    }
}

fn write_bundle(path: &Path, lines: &[&str]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    file.sync_all()?;
    Ok(())
}
