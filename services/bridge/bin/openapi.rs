//! Writes the bridge's OpenAPI description to disk, for client generation.

use anyhow::Context;
use clap::Parser;
use colloquy_bridge::router::openapi_document;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Where to write the document.
    #[arg(default_value = "openapi.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = openapi_document()
        .to_pretty_json()
        .context("Failed to render OpenAPI document")?;
    std::fs::write(&cli.output, json)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    Ok(())
}
