//! Host-side AuthorizedKeysCommand agent.
//!
//! Called by `sshd` once per login attempt; prints the authorized-keys lines
//! matching `(user, fingerprint)` on this host. The remote backend is
//! consulted first when configured; transport failures fall back to the
//! trusted local file.
//!
//! Exit codes: 0 success (including "no key matched"), 1 usage or
//! configuration errors, 2 unrecoverable backend errors. Matching keys go to
//! stdout, everything else to stderr.

use {
    anyhow::anyhow,
    base64::{engine::general_purpose::STANDARD, Engine as _},
    clap::Parser,
    keywarden_sdk::{
        acl::{self, AclError, RemoteAcl},
        fileperm,
    },
    serde::{Deserialize, Serialize},
    std::{
        fs::File,
        io::{self, Read as _, Write as _},
        path::{Path, PathBuf},
    },
};

const DEFAULT_CONFIG_PATH: &str = "/etc/ssh/keywarden.toml";

#[derive(Parser)]
#[command(
    name = "keywarden-agent",
    version,
    about = "AuthorizedKeysCommand backend for the keywarden access-control plane"
)]
struct Cli {
    /// User name passed by sshd (%u).
    #[arg(short = 'u', long = "user")]
    user: Option<String>,
    /// Key fingerprint passed by sshd (%f).
    #[arg(short = 'f', long = "fingerprint")]
    fingerprint: Option<String>,
    /// Path to the agent configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Print an example configuration and exit.
    #[arg(long)]
    generate: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct AgentConf {
    /// Base URL of the published record tree; empty disables the remote
    /// backend.
    #[serde(default)]
    url: String,
    /// Base64 of the 32-byte master public key.
    master_public_key: String,
    /// HTTP Basic password; the hostname is used as the username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    /// Local authorization file consulted on fallback.
    key_file: PathBuf,
    /// Defaults to the system hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
}

impl AgentConf {
    fn example() -> Self {
        Self {
            url: "https://127.0.0.1:9100".to_string(),
            master_public_key: STANDARD.encode([0u8; 32]),
            token: Some("password for httpauth".to_string()),
            key_file: PathBuf::from("/etc/ssh/keywarden.keys"),
            hostname: None,
        }
    }

    /// Load the configuration; the file is trusted and permission-checked
    /// before parsing.
    fn load(path: &Path) -> anyhow::Result<Self> {
        let mut file = File::open(path)?;
        fileperm::permission_check(&file, path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(toml::from_str(&contents)?)
    }

    fn master_key(&self) -> anyhow::Result<[u8; 32]> {
        let raw = STANDARD.decode(&self.master_public_key)?;
        <[u8; 32]>::try_from(raw.as_slice())
            .map_err(|_| anyhow!("master public key must be 32 bytes"))
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let code = run(&cli);
    // The process exits without unwinding; push buffered matches out first.
    let _ = io::stdout().flush();
    std::process::exit(code);
}

fn run(cli: &Cli) -> i32 {
    if cli.generate {
        let conf = toml::to_string_pretty(&AgentConf::example())
            .expect("example configuration serializes");
        print!("{conf}");
        return 0;
    }

    let (Some(user), Some(fingerprint)) = (cli.user.as_deref(), cli.fingerprint.as_deref())
    else {
        let program = std::env::args()
            .next()
            .unwrap_or_else(|| "keywarden-agent".to_string());
        eprintln!("{program} -u <username> -f <fingerprint> [-c <config>]");
        return 1;
    };

    let conf = match AgentConf::load(&cli.config) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("error reading config file: {e}");
            return 1;
        }
    };
    let master = match conf.master_key() {
        Ok(master) => master,
        Err(e) => {
            eprintln!("invalid master public key: {e}");
            return 1;
        }
    };
    let hostname = match &conf.hostname {
        Some(hostname) => hostname.clone(),
        None => match acl::hostname() {
            Ok(hostname) => hostname,
            Err(e) => {
                eprintln!("cannot determine hostname: {e}");
                return 1;
            }
        },
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !conf.url.is_empty() {
        let remote = RemoteAcl::new(&conf.url, master, conf.token.clone(), &hostname);
        match remote.find_entry(&mut out, user, fingerprint) {
            // NotFound is an authoritative "no": never consult the file.
            Ok(()) | Err(AclError::NotFound) => return 0,
            Err(AclError::Fallback) => {}
            Err(e) => {
                eprintln!("{e}");
                return 2;
            }
        }
    }

    match acl::find_entry_in_file(&conf.key_file, master, &mut out, &hostname, user, fingerprint)
    {
        Ok(()) | Err(AclError::NotFound) => 0,
        Err(e) => {
            eprintln!("{e}");
            2
        }
    }
}
