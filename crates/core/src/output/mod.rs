//! Output Backends
//!
//! A [`Talker`] is the single capability the conversation loop speaks
//! through. The concrete backend is picked once, from configuration, when the
//! session starts.

mod local;
mod mock;
mod robot_bridge;
mod robot_scripted;
mod terminal;

pub use local::LocalTalker;
pub use mock::MockTalker;
pub use robot_bridge::{BridgeTalker, RobotConfig, language_name};
pub use robot_scripted::{ScriptedConfig, ScriptedTalker};
pub use terminal::TerminalTalker;

use crate::dialogue::Reply;
use futures::StreamExt;
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkerKind {
    Terminal,
    Speaker,
    Nao,
    Choregraphe,
    Mock,
}

impl FromStr for TalkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terminal" => Ok(TalkerKind::Terminal),
            "speaker" => Ok(TalkerKind::Speaker),
            "nao" => Ok(TalkerKind::Nao),
            "choregraphe" => Ok(TalkerKind::Choregraphe),
            "mock" => Ok(TalkerKind::Mock),
            other => Err(format!(
                "unknown talker '{other}', use 'terminal', 'speaker', 'nao', 'choregraphe' or 'mock'"
            )),
        }
    }
}

/// Everything the backends may need. Each backend reads only its own part.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub robot: RobotConfig,
    /// Printed before the first chunk of every terminal reply.
    pub terminal_prefix: String,
    /// Overrides the local speech synthesis command.
    pub local_tts_command: Option<String>,
    /// Where the scripted backend stages its scripts.
    pub scripts_dir: PathBuf,
    /// Interpreter that runs the staged helper directly.
    pub script_interpreter: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            robot: RobotConfig::default(),
            terminal_prefix: "\nAssistant: ".to_string(),
            local_tts_command: None,
            scripts_dir: PathBuf::from("./behaviors"),
            script_interpreter: "python2.7".to_string(),
        }
    }
}

/// The output capability, over a closed set of backends.
pub enum Talker {
    Terminal(TerminalTalker),
    LocalSynthesis(LocalTalker),
    RobotBridge(BridgeTalker),
    RobotScripted(ScriptedTalker),
    Mock(MockTalker),
}

impl Talker {
    /// Builds the backend named by `kind`. Backends that talk to a device run
    /// their readiness checks here.
    pub async fn connect(kind: TalkerKind, config: &OutputConfig) -> anyhow::Result<Self> {
        let talker = match kind {
            TalkerKind::Terminal => {
                Talker::Terminal(TerminalTalker::stdout(config.terminal_prefix.clone()))
            }
            TalkerKind::Speaker => Talker::LocalSynthesis(LocalTalker::new(
                &config.robot.language,
                config.local_tts_command.as_deref(),
            )),
            TalkerKind::Nao => Talker::RobotBridge(BridgeTalker::connect(&config.robot).await),
            TalkerKind::Choregraphe => Talker::RobotScripted(ScriptedTalker::new(
                &config.robot,
                &ScriptedConfig {
                    scripts_dir: config.scripts_dir.clone(),
                    interpreter: config.script_interpreter.clone(),
                    run_timeout: Duration::from_secs(5),
                },
            )?),
            TalkerKind::Mock => Talker::Mock(MockTalker::new(&config.robot)),
        };
        Ok(talker)
    }

    /// Speaks one chunk of a reply. `first` and `last` mark the chunk's place
    /// in the reply. Delivery problems are logged, never returned.
    pub async fn speak(&mut self, text: &str, first: bool, last: bool) {
        match self {
            Talker::Terminal(t) => t.speak(text, first, last),
            Talker::LocalSynthesis(t) => t.speak(text).await,
            Talker::RobotBridge(t) => t.speak(text, last).await,
            Talker::RobotScripted(t) => t.speak(text, last).await,
            Talker::Mock(t) => t.speak(text, last).await,
        }
    }

    /// Speaks a whole reply. Streamed replies are regrouped into sentences
    /// so that every `speak` call gets complete sentences.
    pub async fn deliver(&mut self, reply: Reply<'_>) {
        match reply {
            Reply::Immediate(text) => {
                if !text.trim().is_empty() {
                    self.speak(&text, true, true).await;
                }
            }
            Reply::Streamed(mut stream) => {
                let mut sentences = SentenceBuffer::default();
                let mut pending: Option<String> = None;
                let mut first = true;

                while let Some(fragment) = stream.next().await {
                    for sentence in sentences.push(&fragment) {
                        if let Some(previous) = pending.replace(sentence) {
                            self.speak(&previous, first, false).await;
                            first = false;
                        }
                    }
                }
                if let Some(rest) = sentences.finish() {
                    if let Some(previous) = pending.replace(rest) {
                        self.speak(&previous, first, false).await;
                        first = false;
                    }
                }
                if let Some(last) = pending {
                    self.speak(&last, first, true).await;
                }
            }
        }
    }

    /// Ends the session on the backend, e.g. returning a robot to rest.
    pub async fn shutdown(self) {
        match self {
            Talker::Terminal(_) | Talker::RobotScripted(_) => {}
            Talker::LocalSynthesis(mut t) => t.finish().await,
            Talker::RobotBridge(t) => t.shutdown().await,
            Talker::Mock(t) => t.shutdown(),
        }
    }
}

/// Collects streamed fragments and hands them out as whole sentences.
#[derive(Debug, Default)]
struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    fn is_boundary(c: char) -> bool {
        matches!(c, '.' | '!' | '?' | '؟' | '\n')
    }

    fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buf.push_str(fragment);
        let mut sentences = Vec::new();
        loop {
            let Some((idx, c)) = self.buf.char_indices().find(|&(_, c)| Self::is_boundary(c))
            else {
                break;
            };
            let end = idx + c.len_utf8();
            let sentence: String = self.buf.drain(..end).collect();
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
        }
        sentences
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Test writer whose contents stay readable after being moved into a talker.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(pub std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[cfg(test)]
impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialogue::{DialogueConfig, DialogueEngine},
        llm_client::{CompletionError, CompletionStream, MockCompletionClient},
    };
    use futures::stream;
    use std::sync::Arc;

    fn mock_talker() -> Talker {
        Talker::Mock(MockTalker::new(&RobotConfig {
            pacing: Duration::ZERO,
            ..RobotConfig::default()
        }))
    }

    fn spoken(talker: &Talker) -> Vec<String> {
        match talker {
            Talker::Mock(t) => t.spoken().to_vec(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_talker_kind_from_str() {
        assert_eq!("NAO".parse::<TalkerKind>(), Ok(TalkerKind::Nao));
        assert_eq!("speaker".parse::<TalkerKind>(), Ok(TalkerKind::Speaker));
        assert!("carrier-pigeon".parse::<TalkerKind>().is_err());
    }

    #[test]
    fn test_sentence_buffer_splits_across_fragments() {
        let mut buffer = SentenceBuffer::default();
        assert!(buffer.push("Hello the").is_empty());
        assert_eq!(buffer.push("re! How are"), vec!["Hello there!"]);
        assert_eq!(buffer.push(" you? Fine. And"), vec!["How are you?", "Fine."]);
        assert_eq!(buffer.finish().as_deref(), Some("And"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_sentence_buffer_handles_arabic_question_mark() {
        let mut buffer = SentenceBuffer::default();
        assert_eq!(buffer.push("كيف حالك؟ بخير"), vec!["كيف حالك؟"]);
        assert_eq!(buffer.finish().as_deref(), Some("بخير"));
    }

    #[tokio::test]
    async fn test_deliver_immediate_speaks_once_or_not_at_all() {
        let mut talker = mock_talker();
        talker.deliver(Reply::Immediate(String::new())).await;
        assert!(spoken(&talker).is_empty());

        talker
            .deliver(Reply::Immediate("Hi. I am Pepper.".to_string()))
            .await;
        assert_eq!(spoken(&talker), vec!["Hi. I am Pepper."]);
    }

    #[tokio::test]
    async fn test_deliver_stream_speaks_sentences_and_marks_ends() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete_stream().returning(|_| {
            let items: Vec<Result<String, CompletionError>> = ["Hel", "lo. How ", "are you", "? Bye"]
                .iter()
                .map(|s| Ok(s.to_string()))
                .collect();
            Ok(Box::pin(stream::iter(items)) as CompletionStream)
        });
        let config = DialogueConfig {
            stream: true,
            ..DialogueConfig::default()
        };
        let mut engine = DialogueEngine::new(config, Arc::new(mock));

        let out = SharedBuffer::default();
        let mut talker = Talker::Terminal(TerminalTalker::new("Bot: ", Box::new(out.clone())));
        talker.deliver(engine.reply("hi").await.unwrap()).await;

        assert_eq!(out.contents(), "Bot: Hello. How are you? Bye\n");
        assert_eq!(
            engine.history().messages()[1].content(),
            "Hello. How are you? Bye"
        );
    }
}
