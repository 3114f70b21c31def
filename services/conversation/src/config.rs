use colloquy_core::{OutputConfig, RetryPolicy, TalkerKind, output::RobotConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where utterances come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerKind {
    Terminal,
    Timer,
}

impl FromStr for ListenerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" => Ok(ListenerKind::Terminal),
            "timer" => Ok(ListenerKind::Timer),
            other => Err(format!("unknown listener '{other}', use 'terminal' or 'timer'")),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub chat_model: String,
    pub request_timeout: Duration,
    pub assistant_name: String,
    pub chat_horizon: i64,
    pub chat_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub filter_horizon: i64,
    pub filter_tokens: u32,
    /// Raw keys, `{name}` placeholders not yet filled in.
    pub filter_keys: Vec<String>,
    pub retry: RetryPolicy,
    pub talker: TalkerKind,
    pub listener: ListenerKind,
    pub listener_prompt: String,
    pub timer_delay: Duration,
    pub timer_message: String,
    pub robot_address: Option<String>,
    pub language: String,
    pub robot_stand: bool,
    pub robot_pacing: Duration,
    pub robot_volume: u8,
    pub bridge_url: String,
    pub terminal_prefix: String,
    pub local_tts_command: Option<String>,
    pub scripts_dir: PathBuf,
    pub script_interpreter: String,
    pub prompts_path: PathBuf,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var_or(name, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_seconds(name: &str, default: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_var(name, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = std::env::var("OPENAI_API_BASE").ok();
        let chat_model = var_or("CHAT_MODEL", "gpt-3.5-turbo");
        let request_timeout = parse_seconds("REQUEST_TIMEOUT_SECS", "30")?;

        let filter_keys = var_or("FILTER_KEYS", "ASSISTANT,BOTH")
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(String::from)
            .collect();

        let retry = RetryPolicy {
            backoff: Duration::from_millis(parse_var("RETRY_BACKOFF_MS", "100")?),
            max_attempts: match std::env::var("RETRY_MAX_ATTEMPTS") {
                Ok(raw) => Some(raw.trim().parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(
                    || {
                        ConfigError::InvalidValue(
                            "RETRY_MAX_ATTEMPTS".to_string(),
                            format!("'{}' is not a positive number", raw),
                        )
                    },
                )?),
                Err(_) => None,
            },
        };

        let robot_volume: u8 = parse_var("ROBOT_VOLUME", "100")?;
        if robot_volume > 100 {
            return Err(ConfigError::InvalidValue(
                "ROBOT_VOLUME".to_string(),
                format!("'{}' is not a volume between 0 and 100", robot_volume),
            ));
        }

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            openai_api_key,
            openai_api_base,
            chat_model,
            request_timeout,
            assistant_name: var_or("ASSISTANT_NAME", "assistant"),
            chat_horizon: parse_var("CHAT_HORIZON", "10")?,
            chat_tokens: parse_var("CHAT_TOKENS", "100")?,
            temperature: parse_var("TEMPERATURE", "0.5")?,
            stream: parse_var("STREAM", "false")?,
            filter_horizon: parse_var("FILTER_HORIZON", "0")?,
            filter_tokens: parse_var("FILTER_TOKENS", "5")?,
            filter_keys,
            retry,
            talker: parse_var("TALKER", "terminal")?,
            listener: parse_var("LISTENER", "terminal")?,
            listener_prompt: var_or("LISTENER_PROMPT", "User: "),
            timer_delay: parse_seconds("TIMER_DELAY_SECS", "5")?,
            timer_message: var_or("TIMER_MESSAGE", " "),
            robot_address: std::env::var("ROBOT_ADDRESS").ok(),
            language: var_or("LANGUAGE", "en"),
            robot_stand: parse_var("ROBOT_STAND", "false")?,
            robot_pacing: parse_seconds("ROBOT_PACING_SECS", "0.03")?,
            robot_volume,
            bridge_url: var_or("BRIDGE_URL", "http://localhost:8080"),
            terminal_prefix: var_or("TERMINAL_PREFIX", "\nAssistant: "),
            local_tts_command: std::env::var("LOCAL_TTS_COMMAND").ok(),
            scripts_dir: PathBuf::from(var_or("SCRIPTS_DIR", "./behaviors")),
            script_interpreter: var_or("SCRIPT_INTERPRETER", "python2.7"),
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "./prompts")),
            log_level,
        })
    }

    /// Settings for the output backends. Robot backends need an address.
    pub fn output_config(&self) -> Result<OutputConfig, ConfigError> {
        let needs_robot = matches!(
            self.talker,
            TalkerKind::Nao | TalkerKind::Choregraphe | TalkerKind::Mock
        );
        let address = match (&self.robot_address, needs_robot) {
            (Some(address), _) => address.clone(),
            (None, false) => RobotConfig::default().address,
            (None, true) => {
                return Err(ConfigError::MissingVar(format!(
                    "ROBOT_ADDRESS must be set for the '{:?}' talker",
                    self.talker
                )));
            }
        };

        Ok(OutputConfig {
            robot: RobotConfig {
                address,
                language: self.language.clone(),
                pacing: self.robot_pacing,
                stand: self.robot_stand,
                volume: self.robot_volume,
                bridge_url: self.bridge_url.clone(),
                ..RobotConfig::default()
            },
            terminal_prefix: self.terminal_prefix.clone(),
            local_tts_command: self.local_tts_command.clone(),
            scripts_dir: self.scripts_dir.clone(),
            script_interpreter: self.script_interpreter.clone(),
        })
    }
}
