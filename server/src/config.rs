use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags actually given on the command line are
/// layered over the file and environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "parley-server", version, about = "parley direct-messaging server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file (default: ./parley.toml)
    #[arg(long, env = "PARLEY_CONFIG")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (message DB, signing key)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Seconds between server pings on each WebSocket
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,

    /// Seconds to wait for a pong before dropping the connection
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,

    /// Seconds allowed for writing one frame to a client socket
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_secs: Option<u64>,

    /// Frames buffered per connection before it is treated as stuck
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_queue_capacity: Option<usize>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    /// Shared HS256 secret for access tokens. Generated under data_dir when unset.
    /// Settable from the file or PARLEY_JWT_SECRET only, never from argv.
    pub jwt_secret: Option<String>,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub outbound_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5002,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            write_timeout_secs: 10,
            outbound_queue_capacity: 64,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    fn figment(cli: Cli) -> Figment {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| Config::default().config);

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PARLEY_"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# parley server configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5002)
# port = 5002

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the message database and token signing key
# data_dir = "./data"

# HS256 secret shared with the service that issues access tokens.
# When unset a random key is generated at <data_dir>/jwt_secret.
# jwt_secret = ""

# ---- Connection liveness ----

# Seconds between server pings (default: 30)
# ping_interval_secs = 30

# Seconds to wait for a pong before the connection is closed (default: 10)
# pong_timeout_secs = 10

# Seconds allowed to write one frame to a client (default: 10)
# write_timeout_secs = 10

# Frames buffered per connection; a full buffer closes the connection (default: 64)
# outbound_queue_capacity = 64
"#
    .to_string()
}
