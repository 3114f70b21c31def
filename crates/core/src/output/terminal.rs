use std::io::Write;
use tracing::warn;

/// Writes replies to a text sink, by default standard output.
pub struct TerminalTalker {
    prefix: String,
    out: Box<dyn Write + Send>,
}

impl TerminalTalker {
    pub fn new(prefix: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            prefix: prefix.into(),
            out,
        }
    }

    pub fn stdout(prefix: impl Into<String>) -> Self {
        Self::new(prefix, Box::new(std::io::stdout()))
    }

    pub fn speak(&mut self, text: &str, first: bool, last: bool) {
        if let Err(e) = self.write_chunk(text, first, last) {
            warn!(error = %e, "Failed to write reply to terminal");
        }
    }

    fn write_chunk(&mut self, text: &str, first: bool, last: bool) -> std::io::Result<()> {
        if first {
            self.out.write_all(self.prefix.as_bytes())?;
        }
        self.out.write_all(text.as_bytes())?;
        self.out.write_all(if last { b"\n" } else { b" " })?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;

    #[test]
    fn test_prefix_only_before_first_chunk() {
        let out = SharedBuffer::default();
        let mut talker = TerminalTalker::new("\nAssistant: ", Box::new(out.clone()));
        talker.speak("One.", true, false);
        talker.speak("Two.", false, true);
        talker.speak("Again.", true, true);
        assert_eq!(
            out.contents(),
            "\nAssistant: One. Two.\n\nAssistant: Again.\n"
        );
    }
}
