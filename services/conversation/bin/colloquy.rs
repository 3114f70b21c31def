//! Main Entrypoint for the Conversation Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Building the completion client and the dialogue engine.
//! 3. Connecting the configured talker and listener.
//! 4. Running the conversation until input ends or Ctrl+C.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::Parser;
use colloquy::{
    config::{Config, ListenerKind},
    prompts::{dialogue_config, fill_name, load_prompts},
    session::Session,
};
use colloquy_core::{
    DialogueEngine, Listener, Talker, TalkerKind,
    llm_client::{CompletionClient, OpenAICompatibleClient},
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

/// A spoken conversation with a language model.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Load settings from this file instead of `.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Answer a single "hello" and exit.
    #[arg(long)]
    test: bool,
    /// Output backend, overrides TALKER.
    #[arg(long)]
    talker: Option<TalkerKind>,
    /// Input source, overrides LISTENER.
    #[arg(long)]
    listener: Option<ListenerKind>,
}

/// Listens for the `Ctrl+C` signal to end the conversation.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
    }
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(talker) = cli.talker {
        config.talker = talker;
    }
    if let Some(listener) = cli.listener {
        config.listener = listener;
    }
    let output_config = config.output_config()?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 3. Dialogue Engine ---
    let prompts = load_prompts(&config.prompts_path)?;
    let dialogue = dialogue_config(&config, &prompts)?;

    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(base);
    }
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAICompatibleClient::new(
            openai_config,
            config.chat_model.clone(),
            config.request_timeout,
        )
        .context("Failed to build completion client")?,
    );
    let engine = DialogueEngine::new(dialogue, client);

    // --- 4. Talker and Listener ---
    let talker = Talker::connect(config.talker, &output_config).await?;
    let listener = match config.listener {
        ListenerKind::Terminal => {
            Listener::terminal(fill_name(&config.listener_prompt, &config.assistant_name))
        }
        ListenerKind::Timer => Listener::timer(config.timer_delay, config.timer_message.clone()),
    };

    info!(
        model = %config.chat_model,
        talker = ?config.talker,
        listener = ?config.listener,
        stream = config.stream,
        gating = config.filter_horizon > 0,
        "Conversation configured."
    );

    // --- 5. Converse ---
    let mut session = Session::new(engine, listener, talker);
    if cli.test {
        info!("Test mode: saying 'hello' and exiting");
        session.greet().await;
    } else {
        session.run(shutdown_signal()).await?;
    }
    session.close().await;

    info!("Conversation has ended.");
    Ok(())
}
