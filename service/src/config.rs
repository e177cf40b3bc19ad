use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use semver::{BuildMetadata, Prerelease, Version};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use utoipa::IntoParams;

type APiVersionList = [&'static str; 1];

const DEFAULT_API_VERSION: &str = "1.0.0-beta1";
// Expand this array to include all valid API versions. Versions that have been
// completely removed should be removed from this list - they're no longer valid.
const API_VERSIONS: APiVersionList = [DEFAULT_API_VERSION];

static X_VERSION: &str = "x-version";

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Header)]
pub struct ApiVersion {
    /// The version of the API to use for a request.
    #[param(rename = "x-version", style = Simple, required, example = "1.0.0-beta1", value_type = String)]
    pub version: Version,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

/// Which side of the sync topology this deployment is.
///
/// Direct mode owns the catalog and serves the event stream straight from
/// the event log; proxy mode mirrors an upstream direct deployment's stream
/// for its own downstream clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerMode {
    Direct,
    Proxy,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ServerModeParseError;

impl FromStr for ServerMode {
    type Err = ServerModeParseError;
    fn from_str(mode: &str) -> Result<ServerMode, Self::Err> {
        match mode.to_lowercase().as_str() {
            "direct" => Ok(ServerMode::Direct),
            "proxy" => Ok(ServerMode::Proxy),
            _ => Err(ServerModeParseError),
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerMode::Direct => write!(f, "direct"),
            ServerMode::Proxy => write!(f, "proxy"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Set the current semantic version of the endpoint API to expose to clients. All
    /// endpoints not contained in the specified version will not be exposed by the router.
    #[arg(short, long, env, default_value = DEFAULT_API_VERSION,
        value_parser = clap::builder::PossibleValuesParser::new(API_VERSIONS)
            .map(|s| s.parse::<String>().unwrap()),
        )]
    pub api_version: Option<String>,

    /// Serving mode: `direct` owns the catalog event stream, `proxy` mirrors
    /// an upstream direct deployment.
    #[arg(
        short,
        long,
        env,
        default_value_t = ServerMode::Direct,
        value_parser = clap::builder::PossibleValuesParser::new(["direct", "proxy"])
            .map(|s| s.parse::<ServerMode>().unwrap()),
    )]
    pub mode: ServerMode,

    /// Event log stream key that catalog change events are appended to.
    #[arg(long, env, default_value = "catalog-events")]
    pub event_stream_key: String,

    /// Base URL of the upstream direct deployment (proxy mode only).
    #[arg(long, env)]
    upstream_base_url: Option<String>,

    /// Bearer token presented to the upstream deployment (proxy mode only).
    #[arg(long, env)]
    upstream_api_token: Option<String>,

    /// Sleep between event-loop poll cycles, in milliseconds.
    #[arg(long, env, default_value_t = 1000)]
    pub sse_poll_interval_millis: u64,

    /// Short block passed to each consumer-group read, in milliseconds.
    #[arg(long, env, default_value_t = 100)]
    pub sse_read_block_millis: u64,

    /// Maximum log entries drained per poll cycle.
    #[arg(long, env, default_value_t = 32)]
    pub sse_read_batch_size: usize,

    /// Seconds between periodic timestamp liveness frames.
    #[arg(long, env, default_value_t = 10)]
    pub sse_message_interval_secs: u64,

    /// Seconds between comment-only heartbeat frames.
    #[arg(long, env, default_value_t = 60)]
    pub sse_heartbeat_interval_secs: u64,

    /// Hard wall-clock cap on any one streaming connection, in seconds.
    #[arg(long, env, default_value_t = 600)]
    pub sse_connection_timeout_secs: u64,

    /// Consecutive downstream write failures that end a session.
    #[arg(long, env, default_value_t = 3)]
    pub sse_write_failure_threshold: u32,

    /// Seconds one frame write may stall before it counts as failed.
    #[arg(long, env, default_value_t = 5)]
    pub sse_write_timeout_secs: u64,

    /// Capacity of the per-session frame channel to the response body.
    #[arg(long, env, default_value_t = 64)]
    pub sse_channel_capacity: usize,

    /// Consumer-group TTL extension applied on each heartbeat, in seconds.
    #[arg(long, env, default_value_t = 1800)]
    pub sse_group_ttl_secs: u64,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn api_version(&self) -> &str {
        self.api_version
            .as_ref()
            .expect("No API version string provided")
    }

    pub fn upstream_base_url(&self) -> Option<String> {
        self.upstream_base_url.clone()
    }

    pub fn upstream_api_token(&self) -> Option<String> {
        self.upstream_api_token.clone()
    }

    pub fn set_upstream(mut self, base_url: String, token: String) -> Self {
        self.upstream_base_url = Some(base_url);
        self.upstream_api_token = Some(token);
        self
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        // This could check an environment variable, or a config field
        self.runtime_env() == RustEnv::Production
    }
}

impl ApiVersion {
    pub fn new(version_str: &'static str) -> Self {
        ApiVersion {
            version: Version::parse(version_str).unwrap_or(Version {
                major: 0,
                minor: 0,
                patch: 1,
                pre: Prerelease::EMPTY,
                build: BuildMetadata::EMPTY,
            }),
        }
    }

    pub fn default_version() -> &'static str {
        DEFAULT_API_VERSION
    }

    pub fn field_name() -> &'static str {
        X_VERSION
    }

    pub fn versions() -> APiVersionList {
        API_VERSIONS
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        ApiVersion {
            version: Version::parse(DEFAULT_API_VERSION).unwrap_or(Version {
                major: 0,
                minor: 0,
                patch: 1,
                pre: Prerelease::EMPTY,
                build: BuildMetadata::EMPTY,
            }),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_mode_parses_case_insensitively() {
        assert_eq!("direct".parse::<ServerMode>(), Ok(ServerMode::Direct));
        assert_eq!("PROXY".parse::<ServerMode>(), Ok(ServerMode::Proxy));
        assert_eq!("mirror".parse::<ServerMode>(), Err(ServerModeParseError));
    }

    #[test]
    fn server_mode_displays_lowercase() {
        assert_eq!(ServerMode::Direct.to_string(), "direct");
        assert_eq!(ServerMode::Proxy.to_string(), "proxy");
    }
}
