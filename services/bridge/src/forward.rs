//! Fire-and-forget relay of speech to the device-control process.
//!
//! Every accepted text is written to its own uniquely named artifact. Two
//! detached tasks then take over: one runs the device process on the artifact
//! under a timeout, the other deletes the artifact after a grace period. The
//! HTTP handler awaits neither of them.

use crate::config::{Config, DeviceCommand};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::process::Command;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

/// How one run of the device process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    /// Non-zero exit, with the exit code when there is one.
    Failed(Option<i32>),
    TimedOut,
    /// The process could not be started at all.
    NotStarted,
}

/// Hands speech over to the device-control process.
#[derive(Debug)]
pub struct Forwarder {
    device: DeviceCommand,
    robot_address: String,
    language: String,
    volume: u8,
    artifact_dir: PathBuf,
    timeout: Duration,
    grace: Duration,
    dispatched: AtomicU64,
}

impl Forwarder {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.device_command.clone(),
            robot_address: config.robot_address.clone(),
            language: config.language.clone(),
            volume: config.volume,
            artifact_dir: config.artifact_dir.clone(),
            timeout: config.device_timeout,
            grace: config.artifact_grace,
            dispatched: AtomicU64::new(0),
        }
    }

    /// Number of texts handed to the device process since startup.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Writes `text` to a fresh artifact and starts the forwarding and
    /// cleanup tasks. Returns as soon as both are scheduled.
    pub async fn dispatch(&self, text: &str) -> io::Result<PathBuf> {
        let artifact = self
            .artifact_dir
            .join(format!("bridge-speech-{}.txt", Uuid::new_v4()));
        tokio::fs::write(&artifact, text).await?;
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let span = info_span!("forward", artifact = %artifact.display());
        let args = [
            self.robot_address.clone(),
            self.language.clone(),
            self.volume.to_string(),
        ];
        tokio::spawn(
            run_device(self.device.clone(), args, artifact.clone(), self.timeout)
                .instrument(span.clone()),
        );
        tokio::spawn(remove_after(artifact.clone(), self.grace).instrument(span));

        Ok(artifact)
    }
}

/// Runs the device process as `<program> <leading args> <robot address>
/// <language> <volume> <artifact>` and reports how it ended.
pub async fn run_device(
    device: DeviceCommand,
    args: [String; 3],
    artifact: PathBuf,
    timeout: Duration,
) -> ForwardOutcome {
    let run = Command::new(&device.program)
        .args(&device.leading_args)
        .args(&args)
        .arg(&artifact)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) if output.status.success() => {
            debug!("Device process completed successfully");
            ForwardOutcome::Delivered
        }
        Ok(Ok(output)) => {
            error!(
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Device process failed"
            );
            ForwardOutcome::Failed(output.status.code())
        }
        Ok(Err(e)) => {
            error!(program = %device.program, error = %e, "Could not start device process");
            ForwardOutcome::NotStarted
        }
        Err(_) => {
            warn!(timeout = ?timeout, "Device process timed out, speech dropped");
            ForwardOutcome::TimedOut
        }
    }
}

/// Deletes `artifact` once `grace` has passed.
pub async fn remove_after(artifact: PathBuf, grace: Duration) {
    tokio::time::sleep(grace).await;
    remove_artifact(&artifact).await;
}

async fn remove_artifact(artifact: &Path) {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => debug!("Artifact removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(error = %e, "Error cleaning up artifact"),
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use tracing::Level;

    /// A device command that runs `script` under `sh`, with the per-request
    /// arguments available as `$1` to `$4`.
    pub(crate) fn shell_device(script: &str) -> DeviceCommand {
        DeviceCommand {
            program: "sh".to_string(),
            leading_args: vec!["-c".to_string(), script.to_string(), "device".to_string()],
        }
    }

    pub(crate) fn test_config(dir: &Path, device: DeviceCommand) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            robot_address: "10.0.0.7".to_string(),
            language: "English".to_string(),
            volume: 80,
            device_command: device,
            device_timeout: Duration::from_secs(2),
            artifact_grace: Duration::from_secs(60),
            artifact_dir: dir.to_path_buf(),
            log_level: Level::INFO,
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_device_receives_arguments_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let received = dir.path().join("received");
        let script = format!(
            r#"printf '%s %s %s ' "$1" "$2" "$3" > {out}; cat "$4" >> {out}"#,
            out = received.display()
        );
        let forwarder = Forwarder::new(&test_config(dir.path(), shell_device(&script)));

        let artifact = forwarder.dispatch("hello robot").await.unwrap();
        assert_eq!(forwarder.dispatched(), 1);
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "hello robot");

        assert!(wait_for(|| std::fs::read_to_string(&received).is_ok_and(|s| s.ends_with("robot"))).await);
        assert_eq!(
            std::fs::read_to_string(&received).unwrap(),
            "10.0.0.7 English 80 hello robot"
        );
    }

    #[tokio::test]
    async fn test_artifacts_are_unique_and_removed_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), shell_device("true"));
        config.artifact_grace = Duration::from_millis(100);
        let forwarder = Forwarder::new(&config);

        let first = forwarder.dispatch("one").await.unwrap();
        let second = forwarder.dispatch("one").await.unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        assert!(wait_for(|| !first.exists() && !second.exists()).await);
    }

    #[tokio::test]
    async fn test_run_device_reports_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("speech.txt");
        std::fs::write(&artifact, "hi").unwrap();
        let args = || ["10.0.0.7".to_string(), "English".to_string(), "80".to_string()];

        let ok = run_device(shell_device("exit 0"), args(), artifact.clone(), Duration::from_secs(2)).await;
        assert_eq!(ok, ForwardOutcome::Delivered);

        let failed = run_device(
            shell_device("echo 'robot unreachable' >&2; exit 3"),
            args(),
            artifact.clone(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(failed, ForwardOutcome::Failed(Some(3)));

        let missing = DeviceCommand {
            program: "/nonexistent/run_docker_nao.sh".to_string(),
            leading_args: vec![],
        };
        let not_started = run_device(missing, args(), artifact.clone(), Duration::from_secs(2)).await;
        assert_eq!(not_started, ForwardOutcome::NotStarted);
    }

    #[tokio::test]
    async fn test_run_device_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("speech.txt");
        let started = std::time::Instant::now();
        let outcome = run_device(
            shell_device("sleep 5"),
            ["a".to_string(), "b".to_string(), "c".to_string()],
            artifact,
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(outcome, ForwardOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_removing_missing_artifact_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        remove_after(dir.path().join("gone.txt"), Duration::ZERO).await;
    }
}
