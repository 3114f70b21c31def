//! Prompt loading and the dialogue settings built from it.

use crate::config::Config;
use anyhow::Context;
use colloquy_core::DialogueConfig;
use std::{collections::HashMap, fs, path::Path};

/// Reads every Markdown file in `prompts_path`, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts from {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content.trim().to_string());
        }
    }
    Ok(prompts)
}

/// Fills `{name}` placeholders with the assistant's name.
pub fn fill_name(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

/// Builds the dialogue settings. The filter prompt is only required when
/// gating is switched on.
pub fn dialogue_config(
    config: &Config,
    prompts: &HashMap<String, String>,
) -> anyhow::Result<DialogueConfig> {
    let name = &config.assistant_name;
    let chat_prompt = prompts
        .get("chat_prompt")
        .context("chat_prompt.md not found in prompts directory")?;

    let gating = config.filter_horizon > 0;
    let filter_prompt = if gating {
        fill_name(
            prompts
                .get("filter_prompt")
                .context("filter_prompt.md not found in prompts directory")?,
            name,
        )
    } else {
        String::new()
    };
    let filter_keys = if gating {
        config.filter_keys.iter().map(|key| fill_name(key, name)).collect()
    } else {
        Vec::new()
    };

    Ok(DialogueConfig {
        chat_prompt: fill_name(chat_prompt, name),
        chat_horizon: config.chat_horizon,
        chat_tokens: config.chat_tokens,
        temperature: config.temperature,
        stream: config.stream,
        filter_prompt,
        filter_horizon: config.filter_horizon,
        filter_tokens: config.filter_tokens,
        filter_keys,
        assistant_name: name.clone(),
        retry: config.retry.clone(),
    })
}
