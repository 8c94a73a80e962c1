//! adverify CLI entry point

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adverify::agent::GeminiClient;
use adverify::config::{self, Config};
use adverify::tools::{is_placeholder_key, ToolConnector};
use adverify::{templates, ui, Analyzer};

#[derive(Parser)]
#[command(name = "adverify")]
#[command(about = "🔎 adverify - Check ad scripts for exaggerated claims and fake patents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an ad script
    #[command(group(ArgGroup::new("input").required(true).args(["script", "text"])))]
    Analyze {
        /// File containing the ad script
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Ad script passed inline
        #[arg(short, long)]
        text: Option<String>,

        /// Built-in system prompt
        #[arg(short, long, default_value = "basic", conflicts_with = "prompt_file")]
        prompt: String,

        /// Read the system prompt from a file instead
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Maximum tool-calling cycles
        #[arg(long)]
        max_turns: Option<usize>,

        /// Use the offline mock patent provider
        #[arg(long)]
        mock: bool,
    },

    /// List the tools the patent provider offers
    Tools {
        /// Use the offline mock patent provider
        #[arg(long)]
        mock: bool,
    },

    /// Show configuration status
    Status,

    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = config::init()?;
            ui::print_success(&format!("Config written to {}", path.display()));
            println!("\nNext steps:");
            println!("  1. Set GEMINI_API_KEY (or add gemini_api_key to the config)");
            println!("  2. Optionally set KIPRIS_API_KEY for live patent search");
            println!("  3. Run: adverify analyze --text \"...\"");
        }

        Commands::Status => {
            let config = config::load()?;
            print_status(&config);
        }

        Commands::Tools { mock } => {
            let config = config::load()?;
            list_tools(&config, mock).await?;
        }

        Commands::Analyze {
            script,
            text,
            prompt,
            prompt_file,
            max_turns,
            mock,
        } => {
            let mut config = config::load()?;
            if let Some(max_turns) = max_turns {
                config.max_turns = max_turns;
            }
            config.validate()?;

            let payload = match (script, text) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read script {}", path.display()))?,
                (None, Some(text)) => text,
                (None, None) => anyhow::bail!("Provide --script or --text"),
            };

            let system_prompt = match prompt_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt {}", path.display()))?,
                None => templates::preset(&prompt)
                    .with_context(|| {
                        let names: Vec<&str> = templates::PRESETS.iter().map(|(name, _)| *name).collect();
                        format!("Unknown prompt preset '{}' (available: {})", prompt, names.join(", "))
                    })?
                    .to_string(),
            };

            run_analysis(config, &system_prompt, &payload, mock).await?;
        }
    }

    Ok(())
}

async fn run_analysis(config: Config, system_prompt: &str, payload: &str, mock: bool) -> Result<()> {
    let client = GeminiClient::with_timeout(
        &config.gemini_api_key,
        &config.model,
        Duration::from_secs(config.request_timeout_secs),
    )?;

    let provider = if mock || is_placeholder_key(&config.patent_server.api_key) {
        "mock KIPRIS".to_string()
    } else {
        config.patent_server.command.clone()
    };
    ui::print_header(&config.model, &provider);

    let analyzer = Analyzer::new(client, config, mock);
    ui::print_thinking("Analyzing ad script");

    let report = match analyzer.run(system_prompt, payload).await {
        Ok(report) => report,
        Err(e) => {
            ui::print_error(&e.to_string());
            return Err(e.into());
        }
    };

    ui::print_answer(&report.annotated_answer);
    ui::print_termination(report.termination);
    ui::print_step(&format!("Tokens: {}", report.usage));
    if let Some(path) = &report.debug_report_path {
        ui::print_step(&format!("Debug report: {}", path.display()));
    }
    if let Some(path) = &report.archive_path {
        ui::print_success(&format!("Saved to {}", path.display()));
    }

    Ok(())
}

async fn list_tools(config: &Config, mock: bool) -> Result<()> {
    let mut connector = ToolConnector::from_config(config, mock);
    ui::print_step(&format!("Connecting to {}", connector.provider_name()));

    let tools = connector.list_tools().await;
    connector.disconnect().await;

    for tool in tools? {
        println!("\n{}", tool.name);
        println!("  {}", tool.description);
        println!("  {}", serde_json::to_string(&tool.parameters)?);
    }
    Ok(())
}

fn print_status(config: &Config) {
    println!("🔎 adverify Status\n");
    println!("Config: {}", config::config_path().display());
    println!("Model: {}", config.model);
    println!(
        "Gemini API key: {}",
        if config.gemini_api_key.is_empty() { "not set" } else { "✓" }
    );
    println!(
        "Patent provider: {}",
        if is_placeholder_key(&config.patent_server.api_key) {
            "mock (no KIPRIS_API_KEY)".to_string()
        } else {
            format!("{} {}", config.patent_server.command, config.patent_server.args.join(" "))
        }
    );
    println!("Max tool cycles: {}", config.max_turns);
    println!("Google Search grounding: {}", if config.google_search { "on" } else { "off" });
    println!("Debug reports: {}", config.debug_dir.display());
    println!("Responses: {}", config.archive_dir.display());
}
