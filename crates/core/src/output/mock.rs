use super::robot_bridge::{RobotConfig, language_name};
use std::time::Duration;
use tracing::info;

/// Stands in for a robot: logs what it would say and keeps the robot's pace.
pub struct MockTalker {
    pacing: Duration,
    standing: bool,
    spoken: Vec<String>,
}

impl MockTalker {
    pub fn new(robot: &RobotConfig) -> Self {
        info!(
            address = %robot.address,
            language = language_name(&robot.language),
            volume = robot.volume,
            "[mock robot] connected"
        );
        if robot.stand {
            info!("[mock robot] standing up");
        }
        Self {
            pacing: robot.pacing,
            standing: robot.stand,
            spoken: Vec::new(),
        }
    }

    /// Everything spoken so far, in order.
    pub fn spoken(&self) -> &[String] {
        &self.spoken
    }

    pub async fn speak(&mut self, text: &str, last: bool) {
        info!(text, "[mock robot] says");
        self.spoken.push(text.to_string());
        let chars = text.trim().chars().count();
        tokio::time::sleep(self.pacing.mul_f64(chars as f64)).await;
        if last {
            info!("[mock robot] *winks*");
        }
    }

    pub fn shutdown(self) {
        if self.standing {
            info!("[mock robot] sitting down");
        }
    }
}
