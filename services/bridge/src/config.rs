use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The external program that makes the robot speak, with any arguments that
/// precede the per-request ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCommand {
    pub program: String,
    pub leading_args: Vec<String>,
}

impl FromStr for DeviceCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| "device command is empty".to_string())?
            .to_string();
        Ok(Self {
            program,
            leading_args: parts.map(String::from).collect(),
        })
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub robot_address: String,
    /// Language name handed to the device process, e.g. "Arabic".
    pub language: String,
    pub volume: u8,
    pub device_command: DeviceCommand,
    /// Bound on a single device process run.
    pub device_timeout: Duration,
    /// How long a text artifact lives before it is deleted.
    pub artifact_grace: Duration,
    pub artifact_dir: PathBuf,
    pub log_level: Level,
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

pub fn parse_volume(raw: &str) -> Result<u8, ConfigError> {
    raw.parse::<u8>()
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "ROBOT_VOLUME".to_string(),
                format!("'{}' is not a volume between 0 and 100", raw),
            )
        })
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address: SocketAddr = parse_var("BRIDGE_BIND_ADDRESS", "127.0.0.1:8080")?;
        let robot_address =
            std::env::var("ROBOT_ADDRESS").unwrap_or_else(|_| "192.168.100.172".to_string());
        let language = std::env::var("ROBOT_LANGUAGE").unwrap_or_else(|_| "Arabic".to_string());
        let volume = parse_volume(
            &std::env::var("ROBOT_VOLUME").unwrap_or_else(|_| "100".to_string()),
        )?;
        let device_command: DeviceCommand = parse_var("DEVICE_COMMAND", "./run_docker_nao.sh")?;
        let device_timeout = Duration::from_secs(parse_var("DEVICE_TIMEOUT_SECS", "10")?);
        let artifact_grace = Duration::from_secs(parse_var("ARTIFACT_GRACE_SECS", "5")?);
        let artifact_dir = std::env::var("ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        if !artifact_dir.is_dir() {
            return Err(ConfigError::InvalidValue(
                "ARTIFACT_DIR".to_string(),
                format!("'{}' is not a directory", artifact_dir.display()),
            ));
        }

        Ok(Self {
            bind_address,
            robot_address,
            language,
            volume,
            device_command,
            device_timeout,
            artifact_grace,
            artifact_dir,
            log_level,
        })
    }
}
