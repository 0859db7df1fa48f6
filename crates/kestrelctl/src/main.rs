//! Kestrel Control - CLI shell for the Kestrel assistant.
//!
//! With no subcommand it starts an interactive chat session; `ask`,
//! `search`, and `export` cover the one-shot paths.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use console::style;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kestrel_core::{Assistant, AssistantConfig, ExportFormat};

#[derive(Parser)]
#[command(name = "kestrelctl")]
#[command(about = "Kestrel - personal AI assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand (if not provided, starts an interactive session)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the reply
    Ask {
        /// The question or instruction
        text: Vec<String>,
    },

    /// Search the conversation history
    Search {
        /// Keyword to look for
        keyword: String,
    },

    /// Export the conversation history
    Export {
        /// Output format: text, csv, or json
        #[arg(long, default_value = "text")]
        format: ExportFormat,

        /// Earliest creation date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest creation date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(kestrel_core::config::CONFIG_PATH));
    let config = AssistantConfig::load(&config_path);
    let assistant = Assistant::from_config(config)
        .await
        .context("failed to start the assistant")?;

    match cli.command {
        None => interactive(&assistant).await,
        Some(Commands::Ask { text }) => {
            let reply = assistant.process_message(&text.join(" ")).await?;
            println!("{}", reply);
            Ok(())
        }
        Some(Commands::Search { keyword }) => search(&assistant, &keyword).await,
        Some(Commands::Export { format, from, to }) => {
            let blob = assistant.export_history(format, from, to).await?;
            print!("{}", blob);
            Ok(())
        }
    }
}

async fn interactive(assistant: &Assistant) -> Result<()> {
    println!("{}", style("Kestrel ready. Type 'exit' to quit.").dim());

    let stdin = std::io::stdin();
    loop {
        print!("{} ", style("you:").cyan().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let input = line.trim();
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "bye") {
            println!("Goodbye!");
            break;
        }

        let reply = assistant.process_message(input).await?;
        println!("{} {}", style("kestrel:").green().bold(), reply);
    }

    Ok(())
}

async fn search(assistant: &Assistant, keyword: &str) -> Result<()> {
    let hits = assistant.search_messages(keyword).await?;
    if hits.is_empty() {
        println!("No matches for '{}'.", keyword);
        return Ok(());
    }

    for exchange in hits {
        println!(
            "{} {}",
            style(format!("[{}]", exchange.created_at.format("%Y-%m-%d %H:%M"))).dim(),
            exchange.user_text
        );
        if let Some(reply) = exchange.assistant_text {
            println!("    {}", reply);
        }
    }
    Ok(())
}
