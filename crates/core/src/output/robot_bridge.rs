//! Speech on a physical robot, relayed through the bridge server.
//!
//! The bridge is probed once when the talker is built. If it cannot be
//! reached the talker switches to mock mode for the rest of the session:
//! everything it would have sent is logged instead, and callers cannot tell
//! the difference.

use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Control utterances understood by the device-control process.
const LEDS_OFF: &str = "turnoff";
const LEDS_ON: &str = "turnon";
const STANDING_DONE: &str = "e";
const STAND: &str = "stand";
const SIT: &str = "sit";

/// Settings shared by the robot-facing backends.
#[derive(Debug, Clone)]
pub struct RobotConfig {
    /// Network address of the robot.
    pub address: String,
    /// ISO 639-1 language code.
    pub language: String,
    /// How long the robot takes to speak one character.
    pub pacing: Duration,
    /// Stand up at session start and sit down at the end.
    pub stand: bool,
    pub volume: u8,
    /// Where the bridge server listens.
    pub bridge_url: String,
    /// Time given to the robot to finish the connection confirmation.
    pub confirmation_pause: Duration,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            address: "192.168.100.172".to_string(),
            language: "en".to_string(),
            pacing: Duration::from_millis(30),
            stand: false,
            volume: 100,
            bridge_url: "http://localhost:8080".to_string(),
            confirmation_pause: Duration::from_secs(2),
        }
    }
}

/// English name of an ISO 639-1 language code. Unknown codes map to English.
pub fn language_name(code: &str) -> &'static str {
    match code.to_lowercase().as_str() {
        "ar" => "Arabic",
        "fr" => "French",
        "es" => "Spanish",
        "de" => "German",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "zh" => "Chinese",
        "sv" => "Swedish",
        _ => "English",
    }
}

fn confirmation_message(language: &str) -> &'static str {
    match language {
        "ar" => "تم الاتصال بنجاح",
        _ => "Connected successfully",
    }
}

/// Forwards speech to the bridge server, or logs it when in mock mode.
pub struct BridgeTalker {
    http: Client,
    bridge_url: String,
    pacing: Duration,
    standing: bool,
    mock_mode: bool,
    forwarded: usize,
}

impl BridgeTalker {
    /// Probes the bridge and greets through the robot when it answers.
    ///
    /// Never fails: an unreachable bridge puts the talker in mock mode.
    pub async fn connect(config: &RobotConfig) -> Self {
        let language = language_name(&config.language);
        info!(
            address = %config.address,
            language,
            volume = config.volume,
            bridge = %config.bridge_url,
            "Setting up robot connection through bridge"
        );

        let http = Client::new();
        let reachable = match http
            .request(Method::OPTIONS, &config.bridge_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                warn!(status = %response.status(), "Bridge answered the probe with an error");
                false
            }
            Err(e) => {
                warn!(error = %e, "Could not reach bridge server");
                false
            }
        };

        let mut talker = Self {
            http,
            bridge_url: config.bridge_url.clone(),
            pacing: config.pacing,
            standing: config.stand,
            mock_mode: !reachable,
            forwarded: 0,
        };

        if talker.mock_mode {
            warn!(
                "Start the bridge with: bridge {} {} {}",
                config.address, language, config.volume
            );
            warn!("Operating in mock mode, speech will be logged but not sent to the robot");
            return talker;
        }

        info!("Connected to bridge server");
        talker.send(confirmation_message(&config.language)).await;
        tokio::time::sleep(config.confirmation_pause).await;
        if talker.standing {
            talker.send(STAND).await;
        }
        talker
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    /// Number of utterances handed to the bridge, successful or not.
    pub fn forwarded_count(&self) -> usize {
        self.forwarded
    }

    async fn send(&mut self, text: &str) -> bool {
        if self.mock_mode {
            info!(text, "[mock robot]");
            return true;
        }

        self.forwarded += 1;
        match self
            .http
            .post(&self.bridge_url)
            .json(&json!({ "text": text }))
            .timeout(FORWARD_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                error!(status = %response.status(), "Bridge rejected speech");
                false
            }
            Err(e) => {
                error!(error = %e, "Error sending speech to bridge");
                false
            }
        }
    }

    /// Forwards `text`, then waits roughly as long as the robot needs to say
    /// it. After the last chunk the robot signals that it is done.
    pub async fn speak(&mut self, text: &str, last: bool) {
        info!(text, mock = self.mock_mode, "Robot says");
        self.send(text).await;
        if !self.mock_mode {
            let chars = text.trim().chars().count();
            tokio::time::sleep(self.pacing.mul_f64(chars as f64)).await;
        }
        if last {
            self.send(LEDS_OFF).await;
            self.send(LEDS_ON).await;
            if self.standing {
                self.send(STANDING_DONE).await;
            }
        }
    }

    /// Sits the robot down if it was standing.
    pub async fn shutdown(mut self) {
        if self.standing && !self.mock_mode {
            self.send(SIT).await;
        }
    }
}
