//! The conversation loop: listen, decide, answer, speak.

use anyhow::Context;
use colloquy_core::{DialogueEngine, Listener, Talker};
use std::future::Future;
use tracing::{error, info};

pub struct Session {
    engine: DialogueEngine,
    listener: Listener,
    talker: Talker,
}

impl Session {
    pub fn new(engine: DialogueEngine, listener: Listener, talker: Talker) -> Self {
        Self {
            engine,
            listener,
            talker,
        }
    }

    pub fn engine(&self) -> &DialogueEngine {
        &self.engine
    }

    pub fn talker(&self) -> &Talker {
        &self.talker
    }

    /// Handles one utterance. Returns `false` once the listener has no more
    /// input.
    pub async fn turn(&mut self) -> anyhow::Result<bool> {
        info!("Listening...");
        let Some(heard) = self.listener.listen().await.context("Failed to read input")? else {
            return Ok(false);
        };
        info!(heard = %heard, "Heard");
        if heard.is_empty() {
            return Ok(true);
        }

        match self.engine.reply(&heard).await {
            Ok(reply) => self.talker.deliver(reply).await,
            Err(e) => error!(
                error = %e,
                malformed = e.is_malformed_response(),
                "No reply this turn"
            ),
        }
        Ok(true)
    }

    /// Runs turns until the input ends or `shutdown` completes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Exiting...");
                    return Ok(());
                }
                more = self.turn() => {
                    if !more? {
                        info!("Input ended. Exiting...");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// A single scripted exchange for checking the setup end to end.
    pub async fn greet(&mut self) {
        match self.engine.reply("hello").await {
            Ok(reply) => {
                let text = reply.into_text().await;
                info!(reply = %text, "Test reply");
            }
            Err(e) => error!(error = %e, "Test reply failed"),
        }
        self.talker.speak("hello", true, true).await;
    }

    /// Ends the session, letting the talker say goodbye to its device.
    pub async fn close(self) {
        self.talker.shutdown().await;
    }
}
