use std::{
    io::{BufRead, Write},
    time::Duration,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, Lines},
    sync::mpsc,
};

/// Lines of typed input, from an async reader or from a blocking one drained
/// on its own thread.
pub enum LineSource {
    Reader(Lines<Box<dyn AsyncBufRead + Unpin + Send>>),
    Thread(mpsc::Receiver<std::io::Result<String>>),
}

impl LineSource {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self {
            LineSource::Reader(lines) => lines.next_line().await,
            LineSource::Thread(rx) => rx.recv().await.transpose(),
        }
    }
}

/// Reads `reader` line by line on a dedicated thread. A listener waiting on
/// it can be dropped at any time without stalling runtime shutdown.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> LineSource {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in reader.lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    LineSource::Thread(rx)
}

/// Where utterances come from.
///
/// An empty utterance means nothing was heard and the turn should be skipped.
pub enum Listener {
    /// One line of typed input per utterance.
    Terminal { prompt: String, lines: LineSource },
    /// The same message after a fixed delay, for unattended sessions.
    Timer { delay: Duration, message: String },
}

impl Listener {
    pub fn terminal(prompt: impl Into<String>) -> Self {
        Listener::Terminal {
            prompt: prompt.into(),
            lines: spawn_line_reader(std::io::BufReader::new(std::io::stdin())),
        }
    }

    pub fn from_reader(
        prompt: impl Into<String>,
        reader: impl AsyncBufRead + Unpin + Send + 'static,
    ) -> Self {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Listener::Terminal {
            prompt: prompt.into(),
            lines: LineSource::Reader(reader.lines()),
        }
    }

    pub fn timer(delay: Duration, message: impl Into<String>) -> Self {
        Listener::Timer {
            delay,
            message: message.into(),
        }
    }

    /// Waits for the next utterance. `None` means the input has ended.
    pub async fn listen(&mut self) -> std::io::Result<Option<String>> {
        match self {
            Listener::Terminal { prompt, lines } => {
                let mut stdout = std::io::stdout();
                stdout.write_all(prompt.as_bytes())?;
                stdout.flush()?;
                Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
            }
            Listener::Timer { delay, message } => {
                tokio::time::sleep(*delay).await;
                Ok(Some(message.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminal_reads_lines_until_eof() {
        let input = std::io::Cursor::new(b"hello robot\n\n  how are you  \n".to_vec());
        let mut listener = Listener::from_reader("User: ", input);

        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("hello robot"));
        assert_eq!(listener.listen().await.unwrap().as_deref(), Some(""));
        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("how are you"));
        assert_eq!(listener.listen().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_threaded_reader_yields_lines_until_eof() {
        let input = std::io::Cursor::new(b"first\r\n second \n".to_vec());
        let mut listener = Listener::Terminal {
            prompt: String::new(),
            lines: spawn_line_reader(input),
        };

        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("first"));
        assert_eq!(listener.listen().await.unwrap().as_deref(), Some("second"));
        assert_eq!(listener.listen().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_waiting_on_blocked_input_can_be_abandoned() {
        let (reader, _writer) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut listener = Listener::Terminal {
            prompt: String::new(),
            lines: spawn_line_reader(std::io::BufReader::new(reader)),
        };

        let waited = tokio::time::timeout(Duration::from_millis(50), listener.listen()).await;
        assert!(waited.is_err());
        drop(listener);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_waits_then_yields_message() {
        let mut listener = Listener::timer(Duration::from_secs(3), "tell me something");
        let started = tokio::time::Instant::now();
        assert_eq!(
            listener.listen().await.unwrap().as_deref(),
            Some("tell me something")
        );
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
