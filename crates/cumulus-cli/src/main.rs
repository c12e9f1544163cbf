//! Cumulus CLI - inspect and (re)generate file derivatives.
//!
//! Reads DATABASE_URL and friends from the environment (or `.env`).

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use cumulus_cli::{init_tracing, outcome_json, App};
use cumulus_core::Config;
use cumulus_storage::RequestScope;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "cumulus", about = "Cumulus derivative tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the thumbnail of a file
    Thumb {
        /// File ID
        id: i64,
        /// Write inline thumbnails here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Generate (or regenerate) the thumbnail of a file
    Generate {
        /// File ID
        id: i64,
    },
    /// Generate the preview frame of a video file
    Preview {
        /// File ID
        id: i64,
    },
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn load_file(app: &App, id: i64) -> anyhow::Result<cumulus_core::File> {
    app.files
        .get_file(id)
        .await?
        .ok_or_else(|| anyhow!("File {} not found", id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let app = App::from_config(config).await?;

    match cli.command {
        Commands::Thumb {
            id,
            output,
            timeout,
        } => {
            let scope = RequestScope::with_timeout(Duration::from_secs(timeout));
            let response = app.pipeline.get_thumb(&scope, id).await?;

            if response.redirect {
                print_json(&serde_json::json!({
                    "redirect": true,
                    "url": response.url,
                    "max_age": response.max_age,
                }))?;
            } else if let Some(mut content) = response.content {
                let mut written = 0usize;
                match output {
                    Some(path) => {
                        let mut out = tokio::fs::File::create(&path)
                            .await
                            .with_context(|| format!("Failed to create {}", path.display()))?;
                        while let Some(chunk) = content.next().await {
                            let chunk = chunk?;
                            written += chunk.len();
                            out.write_all(&chunk).await?;
                        }
                        out.flush().await?;
                    }
                    None => {
                        let mut out = tokio::io::stdout();
                        while let Some(chunk) = content.next().await {
                            let chunk = chunk?;
                            written += chunk.len();
                            out.write_all(&chunk).await?;
                        }
                        out.flush().await?;
                    }
                }
                tracing::info!(
                    file_id = id,
                    size_bytes = written,
                    max_age = ?response.max_age,
                    "Thumbnail written"
                );
            }
        }
        Commands::Generate { id } => {
            let mut file = load_file(&app, id).await?;
            let outcome = app
                .pipeline
                .try_generate_thumbnail(&RequestScope::new(), &mut file)
                .await?;
            print_json(&outcome_json(&outcome))?;
        }
        Commands::Preview { id } => {
            let file = load_file(&app, id).await?;
            let outcome = app
                .pipeline
                .try_generate_preview_image(&RequestScope::new(), &file)
                .await?;
            print_json(&outcome_json(&outcome))?;
        }
    }

    Ok(())
}
