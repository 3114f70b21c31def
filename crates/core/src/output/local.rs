use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Speaks through the machine's own speech synthesiser.
///
/// Each utterance runs as its own process. The previous one is awaited before
/// the next is started, so chunks queue up instead of talking over each other.
pub struct LocalTalker {
    program: String,
    args: Vec<String>,
    current: Option<Child>,
}

impl LocalTalker {
    /// Uses `command` (program and leading arguments, whitespace separated)
    /// when given, otherwise `say` on macOS and `espeak -v <language>`
    /// everywhere else.
    pub fn new(language: &str, command: Option<&str>) -> Self {
        let (program, args) = match command.map(str::split_whitespace) {
            Some(mut parts) => match parts.next() {
                Some(program) => (program.to_string(), parts.map(String::from).collect()),
                None => Self::platform_default(language),
            },
            None => Self::platform_default(language),
        };
        debug!(%program, ?args, "Local speech synthesis configured");
        Self {
            program,
            args,
            current: None,
        }
    }

    fn platform_default(language: &str) -> (String, Vec<String>) {
        if cfg!(target_os = "macos") {
            ("say".to_string(), Vec::new())
        } else {
            (
                "espeak".to_string(),
                vec!["-v".to_string(), language.to_string()],
            )
        }
    }

    /// Returns once the utterance has been handed to the synthesiser.
    pub async fn speak(&mut self, text: &str) {
        self.finish().await;

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => self.current = Some(child),
            Err(e) => warn!(program = %self.program, error = %e, "Failed to start speech synthesis"),
        }
    }

    /// Waits for the utterance in progress, if any.
    pub async fn finish(&mut self) {
        if let Some(mut child) = self.current.take() {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(program = %self.program, %status, "Speech synthesis exited with failure")
                }
                Ok(_) => {}
                Err(e) => warn!(program = %self.program, error = %e, "Lost track of speech synthesis"),
            }
        }
    }
}
