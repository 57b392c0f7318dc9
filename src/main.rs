//! # PDF Processor CLI (`pdfp`)
//!
//! Extract, summarize, translate, or chat about a PDF from the terminal, or
//! start the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! pdfp --config ./config/pdfp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfp extract <file>` | Print the extracted text |
//! | `pdfp summarize <file>` | Print a bulleted summary |
//! | `pdfp translate <file>` | Print a full translation |
//! | `pdfp chat <file>` | Ask questions about the document on stdin |
//! | `pdfp stages` | Print the stage label table |
//! | `pdfp serve` | Start the HTTP server |
//!
//! Stage transitions and notices go to stderr; results go to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pdf_processor::completion::HttpCompletionClient;
use pdf_processor::config::{self, Config};
use pdf_processor::models::{ArtifactKind, SourceDocument};
use pdf_processor::processor::DocumentProcessor;
use pdf_processor::progress::ProgressMode;
use pdf_processor::prompts::{artifact_title, CHAT_FALLBACK, CHAT_GREETING};
use pdf_processor::server;
use pdf_processor::session::ChatError;
use pdf_processor::stage::{display, DISPLAYED_STAGES};

/// PDF Processor: summarize, translate, or chat about a PDF document.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Built-in defaults apply when the file does not exist.
#[derive(Parser)]
#[command(
    name = "pdfp",
    about = "Summarize, translate, or chat about a PDF document",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfp.toml")]
    config: PathBuf,

    /// Stage reporting on stderr: `auto`, `off`, `human`, or `json`.
    #[arg(long, global = true, default_value = "auto", value_parser = ProgressMode::parse)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Extract and print the text of a PDF.
    ///
    /// Pages are separated by a blank line. Does not contact the backend.
    Extract {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Summarize a PDF as bullet points.
    Summarize {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Translate a PDF into the configured language.
    Translate {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Chat about a PDF.
    ///
    /// Reads one question per line from stdin. `/quit` or end of input exits.
    Chat {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Print the label, icon, and message for every processing stage.
    Stages,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Serve => "pdf_processor=info",
        _ => "pdf_processor=warn",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Extract { file } => {
            // Extraction never reaches the backend, so no API key is needed.
            let client = HttpCompletionClient::with_api_key(&cfg.completion, None)?;
            let processor = build_processor(&cfg, Arc::new(client), cli.progress);
            processor.submit(read_document(&file).await?)?;
            let text = processor.run_extraction().await?;
            print!("{}", text.as_str());
        }
        Commands::Summarize { file } => {
            run_operation(&cfg, cli.progress, &file, ArtifactKind::Summary).await?;
        }
        Commands::Translate { file } => {
            run_operation(&cfg, cli.progress, &file, ArtifactKind::Translation).await?;
        }
        Commands::Chat { file } => {
            run_chat(&cfg, cli.progress, &file).await?;
        }
        Commands::Stages => {
            for stage in DISPLAYED_STAGES {
                if let Some(d) = display(stage, &cfg.prompts.language) {
                    println!("{:<12} {:<20} {:<10} {}", stage, d.label, d.icon, d.message);
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn build_processor(
    cfg: &Config,
    client: Arc<HttpCompletionClient>,
    progress: ProgressMode,
) -> DocumentProcessor {
    DocumentProcessor::new(cfg, client)
        .with_reporter(Arc::from(progress.reporter(&cfg.prompts.language)))
}

/// Reads `path` and guesses its MIME type from the extension.
async fn read_document(path: &Path) -> anyhow::Result<SourceDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let mut document = SourceDocument::new(bytes, mime_type);
    if let Some(name) = path.file_name() {
        document = document.with_name(name.to_string_lossy());
    }
    Ok(document)
}

async fn run_operation(
    cfg: &Config,
    progress: ProgressMode,
    file: &Path,
    kind: ArtifactKind,
) -> anyhow::Result<()> {
    let client = HttpCompletionClient::new(&cfg.completion)?;
    let processor = build_processor(cfg, Arc::new(client), progress);
    processor.submit(read_document(file).await?)?;

    let artifact = processor.process(kind).await?;
    println!("{}\n", artifact_title(kind, &cfg.prompts));
    println!("{}", artifact.content);
    Ok(())
}

async fn run_chat(cfg: &Config, progress: ProgressMode, file: &Path) -> anyhow::Result<()> {
    let client = HttpCompletionClient::new(&cfg.completion)?;
    let processor = build_processor(cfg, Arc::new(client), progress);
    processor.submit(read_document(file).await?)?;
    processor.run_extraction().await?;

    println!("{}", CHAT_GREETING);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question == "/quit" {
            break;
        }
        if question.is_empty() {
            continue;
        }
        match processor.ask(question).await {
            Ok(turn) => println!("{}\n", turn.content),
            Err(ChatError::Completion(e)) => {
                tracing::debug!(error = %e, "chat turn failed");
                println!("{}\n", CHAT_FALLBACK);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}
