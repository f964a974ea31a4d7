use std::{fs, net::SocketAddr, path::PathBuf};

use clap::Parser;
use serde::Deserialize;

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

#[derive(Deserialize, Debug, Clone)]
pub struct Listen {
    #[serde(default = "default_listen_addr")]
    pub addr: SocketAddr,
}

impl Default for Listen {
    fn default() -> Self {
        Self { addr: default_listen_addr() }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Tls {
    /// Absent `key`/`cert` means plaintext; present means `main.rs` serves HTTPS via
    /// `axum_server::bind_rustls`. The original required both, we relax that for local/dev
    /// use and expect a reverse proxy to terminate TLS in production instead.
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    /// Parsed but not currently wired to anything: it would configure client-certificate
    /// verification, which nothing in this crate's scope calls for yet.
    #[serde(default)]
    pub cacerts: Vec<PathBuf>,
}

impl Tls {
    pub fn is_enabled(&self) -> bool {
        self.key.is_some() && self.cert.is_some()
    }
}

fn default_max_sessions() -> usize {
    5000
}

#[derive(Deserialize, Debug, Clone)]
pub struct Sessions {
    #[serde(default = "default_max_sessions")]
    pub max_node_sessions: usize,
    #[serde(default = "default_max_sessions")]
    pub max_ui_sessions: usize,
    #[serde(default = "Sessions::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Sessions {
    fn default_queue_capacity() -> usize {
        64
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self {
            max_node_sessions: default_max_sessions(),
            max_ui_sessions: default_max_sessions(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

fn default_max_retries() -> u32 {
    16
}

#[derive(Deserialize, Debug, Clone)]
pub struct Retries {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for Retries {
    fn default() -> Self {
        Self { max_retries: default_max_retries() }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: Listen,
    #[serde(default)]
    pub tls: Tls,
    #[serde(default)]
    pub sessions: Sessions,
    #[serde(default)]
    pub retries: Retries,
    #[serde(default)]
    pub log: Log,
    /// Use a non-cryptographic RNG for UI session ids. Testing only; never set in production.
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Parser, Debug)]
#[command(name = "diagnostics-relay", about = "Diagnostics relay for a blockchain node fleet")]
struct Cli {
    /// Path to a TOML config file; flags below override whatever it sets.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    listen: Option<SocketAddr>,

    #[arg(long)]
    insecure: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let cli = Cli::parse();

        let mut config: Config = match &cli.config {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
                toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(addr) = cli.listen {
            config.listen.addr = addr;
        }
        if cli.insecure {
            config.insecure = true;
        }

        Ok(config)
    }
}
