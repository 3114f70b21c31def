use super::robot_bridge::RobotConfig;
use anyhow::Context;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::process::Command;
use tracing::{info, warn};

const HELPER_NAME: &str = "say_text.py";
const STAGED_NAME: &str = "temp_say.py";

/// Reusable helper that speaks its arguments on the robot named by the first.
const HELPER_SCRIPT: &str = r#"#!/usr/bin/env python
# -*- coding: utf-8 -*-
import sys
from naoqi import ALProxy


def main(robot_ip, text):
    try:
        tts = ALProxy("ALTextToSpeech", robot_ip, 9559)
        tts.say(text)
        return True
    except Exception as e:
        print("Error:", e)
        return False


if __name__ == "__main__":
    if len(sys.argv) < 3:
        print("Usage: python say_text.py <robot_ip> <text>")
        sys.exit(1)
    main(sys.argv[1], " ".join(sys.argv[2:]))
"#;

/// Where and how scripts are staged.
#[derive(Debug, Clone)]
pub struct ScriptedConfig {
    pub scripts_dir: PathBuf,
    /// Interpreter for the direct attempt, e.g. `python2.7`.
    pub interpreter: String,
    /// Bound on the direct attempt.
    pub run_timeout: Duration,
}

/// Stages a script per utterance for a separate robot control environment to
/// run, and makes a best-effort attempt to run the helper directly.
pub struct ScriptedTalker {
    address: String,
    pacing: Duration,
    interpreter: String,
    run_timeout: Duration,
    scripts_dir: PathBuf,
    helper_path: PathBuf,
}

impl ScriptedTalker {
    /// Creates the staging directory and writes the helper script into it.
    pub fn new(robot: &RobotConfig, config: &ScriptedConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.scripts_dir).with_context(|| {
            format!(
                "Failed to create scripts directory {}",
                config.scripts_dir.display()
            )
        })?;
        let helper_path = config.scripts_dir.join(HELPER_NAME);
        write_executable(&helper_path, HELPER_SCRIPT)?;

        info!(
            address = %robot.address,
            language = %robot.language,
            volume = robot.volume,
            scripts = %config.scripts_dir.display(),
            "Scripted robot output ready, make sure the control environment is connected to the robot"
        );

        Ok(Self {
            address: robot.address.clone(),
            pacing: robot.pacing,
            interpreter: config.interpreter.clone(),
            run_timeout: config.run_timeout,
            scripts_dir: config.scripts_dir.clone(),
            helper_path,
        })
    }

    pub fn staged_script_path(&self) -> PathBuf {
        self.scripts_dir.join(STAGED_NAME)
    }

    /// Stages `text`, tries the direct route, then waits for the robot to
    /// finish talking. Failures are logged only.
    pub async fn speak(&mut self, text: &str, last: bool) {
        info!(text, "Scripted robot says");

        let staged = self.staged_script_path();
        match write_executable(&staged, &staged_script(text)) {
            Ok(()) => info!(
                script = %staged.display(),
                "Open this script in the robot control environment and run it to make the robot speak"
            ),
            Err(e) => warn!(error = %e, "Failed to stage speech script"),
        }

        let run = Command::new(&self.interpreter)
            .arg(&self.helper_path)
            .arg(&self.address)
            .arg(text)
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(self.run_timeout, run).await {
            Ok(Ok(output)) if !output.status.success() => warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Direct speech command failed"
            ),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Error running direct speech command"),
            Err(_) => warn!(timeout = ?self.run_timeout, "Direct speech command timed out"),
        }

        let chars = text.trim().chars().count();
        tokio::time::sleep(self.pacing.mul_f64(chars as f64)).await;
        if last {
            info!("Scripted robot finished speaking");
        }
    }
}

fn staged_script(text: &str) -> String {
    format!(
        r#"#!/usr/bin/env python
# -*- coding: utf-8 -*-
from naoqi import ALProxy
tts = ALProxy("ALTextToSpeech", "localhost", 9559)
tts.say(u"{}")
"#,
        escape_python(text)
    )
}

fn escape_python(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn write_executable(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    Ok(())
}
