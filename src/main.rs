use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use summary2story::core::config::{Config, CONFIG_FILE};
use summary2story::core::io::NativeStorage;
use summary2story::core::language::parse_language_list;
use summary2story::services::images::GoApiClient;
use summary2story::services::llm::create_llm;
use summary2story::services::setup::{run_setup, Preset};
use summary2story::services::workflow::WorkflowManager;

/// Turns story summaries into multi-chapter stories, translations and
/// character images.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Folder with the .txt summaries
    #[arg(long)]
    input: Option<String>,

    /// Comma separated target languages, e.g. "italiano,polones"
    #[arg(long)]
    languages: Option<String>,

    /// Never prompt
    #[arg(long)]
    unattended: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!(
                "Please provide {} or the OPENAI_API_KEY / GOAPI_* environment variables.",
                args.config.display()
            );
            return Err(e);
        }
    };

    if let Some(input) = &args.input {
        config.input_folder = input.clone();
    }
    if let Some(raw) = &args.languages {
        config.languages = parse_language_list(raw)?
            .into_iter()
            .map(|l| l.code().to_string())
            .collect();
    }
    if args.unattended {
        config.unattended = true;
    }

    let preset = Preset {
        input_folder: args.input.is_some(),
        languages: args.languages.is_some(),
    };
    run_setup(&mut config, preset, &args.config)?;
    config.ensure_directories()?;

    let llm = create_llm(&config)?;
    let images = Arc::new(GoApiClient::new(&config.image));
    let storage = Arc::new(NativeStorage::new());

    let manager = WorkflowManager::new(config, llm, images, storage)?;
    let report = manager.run().await?;
    if !report.abandoned.is_empty() {
        println!("Summaries without a story: {}", report.abandoned.join(", "));
    }
    if !report.incomplete.is_empty() {
        println!(
            "Summaries with missing translations or images: {}",
            report.incomplete.join(", ")
        );
    }
    Ok(())
}
