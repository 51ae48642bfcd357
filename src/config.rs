//! Process configuration: defaults, `.env`, environment variables and flags,
//! resolved once at startup into an immutable value.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use validator::Validate;

/// Redeploy Kubernetes workloads when a registry reports an image push
#[derive(Parser, Debug, Clone, Validate)]
#[command(name = "argoos", version, about, long_about = None)]
pub struct Config {
    /// Listen interface, host:port or :port
    #[arg(long, env = "LISTEN", default_value = ":3000", value_parser = parse_listen)]
    pub listen: SocketAddr,

    /// Server certificate (PEM) to serve HTTPS; requires --server-key
    #[arg(long, env = "SERVER_CERT", requires = "server_key")]
    pub server_cert: Option<PathBuf>,

    /// Server private key (PEM) to serve HTTPS; requires --server-cert
    #[arg(long, env = "SERVER_KEY", requires = "server_cert")]
    pub server_key: Option<PathBuf>,

    /// Token the registry must send in the X-Argoos-Token header. Empty disables authentication.
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Kubernetes API server, scheme://host:port
    #[arg(long = "master", env = "KUBE_MASTER_URL")]
    pub master_url: Option<String>,

    /// Use the service account mounted in the pod to reach the API server
    #[arg(
        long = "incluster",
        env = "INCLUSTER",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub in_cluster: bool,

    /// Skip TLS verification for the Kubernetes API. Off by default; earlier
    /// argoos releases skipped verification unless told otherwise, set this to keep that.
    #[arg(
        long,
        env = "SKIP_SSL_VERIFICATION",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub skip_ssl_verification: bool,

    /// Certificate authority file for the Kubernetes API
    #[arg(long, env = "CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate file (client authentication only)
    #[arg(long, env = "CERT_FILE")]
    pub cert_file: Option<PathBuf>,

    /// Client private key file (client authentication only)
    #[arg(long, env = "KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Be verbose
    #[arg(
        long,
        env = "VERBOSE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub verbose: bool,

    /// Also write daily rolling log files into this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Maximum concurrent rollout patches against the API server
    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = 4)]
    #[validate(range(min = 1, max = 64))]
    pub max_in_flight: usize,

    /// Attempts per rollout patch before it is dropped
    #[arg(long, env = "PATCH_ATTEMPTS", default_value_t = 3)]
    #[validate(range(min = 1, max = 10))]
    pub patch_attempts: u32,

    /// Full workload resync period, in seconds
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 300)]
    #[validate(range(min = 5))]
    pub resync_interval_secs: u64,

    /// Grace period for in-flight rollouts on shutdown, in seconds
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    #[validate(range(min = 1, max = 120))]
    pub drain_timeout_secs: u64,
}

/// Certificate and key for serving the webhook over HTTPS.
#[derive(Debug, Clone)]
pub struct ServerTls {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// How to reach the cluster API.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub master_url: Option<String>,
    pub in_cluster: bool,
    pub skip_ssl_verification: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

/// Rollout controller tuning.
#[derive(Debug, Clone)]
pub struct RolloutSettings {
    pub max_in_flight: usize,
    pub patch_attempts: u32,
    pub resync_interval: Duration,
    pub drain_timeout: Duration,
    /// First backoff step between patch attempts
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            patch_attempts: 3,
            resync_interval: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(10),
            retry_initial_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Read `.env`, environment and command line.
    pub fn load() -> Result<Self> {
        // a missing .env file is fine
        let _ = dotenvy::dotenv();

        let config = Self::parse();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Trimmed shared secret; `None` when authentication is disabled.
    pub fn auth_token(&self) -> Option<String> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// Set only when both certificate and key are given.
    pub fn server_tls(&self) -> Option<ServerTls> {
        match (&self.server_cert, &self.server_key) {
            (Some(cert), Some(key)) => Some(ServerTls {
                cert_file: cert.clone(),
                key_file: key.clone(),
            }),
            _ => None,
        }
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            master_url: self.master_url.clone().filter(|u| !u.trim().is_empty()),
            in_cluster: self.in_cluster,
            skip_ssl_verification: self.skip_ssl_verification,
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
        }
    }

    pub fn rollout_settings(&self) -> RolloutSettings {
        RolloutSettings {
            max_in_flight: self.max_in_flight,
            patch_attempts: self.patch_attempts,
            resync_interval: Duration::from_secs(self.resync_interval_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..Default::default()
        }
    }
}

/// `host:port`, or `:port` for every interface.
fn parse_listen(raw: &str) -> Result<SocketAddr, String> {
    let raw = raw.trim();
    let candidate = match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    };

    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }

    candidate
        .to_socket_addrs()
        .map_err(|e| format!("invalid listen address {raw:?}: {e}"))?
        .next()
        .ok_or_else(|| format!("listen address {raw:?} resolved to nothing"))
}
