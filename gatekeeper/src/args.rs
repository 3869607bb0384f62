use std::{borrow::Cow, fmt, io::IsTerminal, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Gatekeeper", version, long_about = concat!("Gatekeeper v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// IP address on which the server will listen for incoming connections.
    /// Default: 127.0.0.1:8000
    #[arg(short, long, env = "GATEKEEPER_LISTEN_ADDRESS", global = true)]
    pub listen_address: Option<SocketAddr>,
    /// Path to the TOML configuration file
    #[arg(
        long,
        short,
        env = "GATEKEEPER_CONFIG_PATH",
        default_value = "./gatekeeper.toml",
        global = true
    )]
    pub config: PathBuf,
    /// Set the logging level.
    #[arg(long = "log", env = "GATEKEEPER_LOG", default_value_t = LogLevel::default(), global = true)]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "GATEKEEPER_LOG_STYLE", default_value_t = LogStyle::default(), global = true)]
    pub log_style: LogStyle,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the gate. This is the default.
    Serve,
    /// Mint a signed token with the configured codec and print it.
    Token {
        /// Claims to sign, as a JSON object. `exp`, `iat` and `jti` are filled in when absent.
        #[arg(long, default_value = "{}")]
        claims: String,
        /// Token lifetime, e.g. `15m` or `1h`. Defaults to `token.ttl`.
        #[arg(long, value_parser = parse_duration)]
        ttl: Option<Duration>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse_std(value).map_err(|e| e.to_string())
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        if !self.config.exists() {
            bail!("Configuration file {} does not exist", self.config.display());
        }

        Config::load(&self.config)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized text, used as the default with TTY output
    Color,
    /// Standard text, used as the default with non-TTY output
    Text,
    /// JSON objects
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stdout().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl AsRef<str> for LogStyle {
    fn as_ref(&self) -> &str {
        match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only log errors
    Error,
    /// Log errors, and warnings
    Warn,
    /// Log errors, warnings, and info messages
    #[default]
    Info,
    /// Also log per-request throttle decisions
    Debug,
    /// Log everything
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let filter_str = match self {
            LogLevel::Off => Cow::Borrowed("off"),
            // Dependencies stay at 'warn'; workspace crates follow the selected level.
            level => Cow::Owned(format!(
                "warn,gatekeeper={level},server={level},rate_limit={level},config={level}"
            )),
        };

        EnvFilter::from_str(&filter_str).expect("These all are valid env filters.")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
