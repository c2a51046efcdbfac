use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use nl2sql_assistant::cache::{CachedCompletion, CompletionCache};
use nl2sql_assistant::config::AppConfig;
use nl2sql_assistant::embedding::SchemaEmbeddings;
use nl2sql_assistant::gemini::GeminiProvider;
use nl2sql_assistant::logging::{init_logging, OperationTimer};
use nl2sql_assistant::provider::{CompletionProvider, EmbeddingProvider};
use nl2sql_assistant::validation::QuestionValidator;
use nl2sql_assistant::{AssistantService, GenerationResult, RankedContextItem, SchemaCatalog};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file, applied after config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schema directory (overrides schema.directory)
    #[arg(long, global = true)]
    schemas: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SQL for a question using the completion service
    Ask {
        /// The question, in plain English
        question: String,
    },
    /// Show the ranked schema context for a question
    Rank {
        /// The question, in plain English
        question: String,

        /// Rank individual columns instead of tables
        #[arg(long)]
        columns: bool,

        /// Number of items to show (defaults to pipeline.max_context_items)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the assembled prompt without calling the completion service
    Prompt {
        /// The question, in plain English
        question: String,
    },
    /// List the tables in the schema catalog
    Tables {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = TableFormat::Text)]
        format: TableFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TableFormat {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_with(cli.config.as_deref())?;
    if let Some(dir) = &cli.schemas {
        config.schema.directory = dir.display().to_string();
    }

    // Initialize logging
    let _guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(std::path::Path::new),
        config.logging.format == "json",
    )?;

    info!("Starting nl2sql-assistant");

    let timer = OperationTimer::new("load_catalog");
    let catalog = SchemaCatalog::load_dir(&config.schema_dir(), &config.schema.extension)
        .with_context(|| format!("Failed to load schemas from {}", config.schema.directory))?;
    timer.finish();
    let catalog = Arc::new(catalog);

    // Process command
    match cli.command {
        Commands::Ask { question } => ask(&config, catalog, &question).await?,
        Commands::Rank {
            question,
            columns,
            limit,
        } => rank(&config, catalog, &question, columns, limit)?,
        Commands::Prompt { question } => prompt(&config, catalog, &question)?,
        Commands::Tables { format } => tables(&catalog, format)?,
    }

    Ok(())
}

/// Run the full pipeline against the configured provider
async fn ask(config: &AppConfig, catalog: Arc<SchemaCatalog>, question: &str) -> Result<()> {
    let api_key = config.get_api_key()?;
    let gemini = Arc::new(GeminiProvider::from_config(
        &config.completion,
        &api_key,
        // The HTTP client gets a little longer than the pipeline timeout
        config.request_timeout() + Duration::from_secs(5),
    )?);

    let mut completion: Arc<dyn CompletionProvider> = gemini.clone();
    if config.cache.enabled {
        let cache = CompletionCache::open(
            std::path::Path::new(&config.cache.directory),
            Duration::from_secs(config.cache.ttl_secs),
        )?;
        info!(directory = %config.cache.directory, "Completion cache enabled");
        completion = Arc::new(CachedCompletion::new(completion, Arc::new(cache)));
    }

    let mut service = AssistantService::new(
        Arc::clone(&catalog),
        completion,
        config.pipeline_settings(),
        config.request_timeout(),
    )?
    .with_assembler(config.assembler());

    if config.uses_embeddings() {
        let embedder: Arc<dyn EmbeddingProvider> = gemini;
        match SchemaEmbeddings::build(embedder.as_ref(), &catalog).await {
            Ok(embeddings) => service = service.with_embeddings(embedder, embeddings),
            Err(e) => warn!(error = %e, "Schema embedding failed, using lexical ranking"),
        }
    }

    let answer = match service.ask(question).await {
        Ok(answer) => answer,
        Err(e) if e.is_validation() => {
            write_line(&e.to_string())?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match &answer.result {
        GenerationResult::Sql(sql) => write_line(sql)?,
        GenerationResult::Fallback(reason) => {
            info!(reason = %reason, "No query generated");
            write_line(reason.user_message())?;
            for suggestion in &answer.suggestions {
                write_line(&format!("  - {suggestion}"))?;
            }
        }
    }
    Ok(())
}

/// Show the ranking for a question
fn rank(
    config: &AppConfig,
    catalog: Arc<SchemaCatalog>,
    question: &str,
    columns: bool,
    limit: Option<usize>,
) -> Result<()> {
    let service = offline_service(config, catalog)?;
    let question = QuestionValidator::validate_question(question, config.pipeline.max_question_chars)?;
    let limit = limit.unwrap_or(config.pipeline.max_context_items);

    let ranked = if columns {
        service.rank_columns(&question, limit)?
    } else {
        service.rank(&question, limit)?
    };

    if ranked.is_empty() {
        write_line("No relevant schema context.")?;
    }
    for item in &ranked {
        write_line(&format_ranked(item))?;
    }
    Ok(())
}

/// Print the prompt that `ask` would send
fn prompt(config: &AppConfig, catalog: Arc<SchemaCatalog>, question: &str) -> Result<()> {
    let service = offline_service(config, catalog)?;
    let prompt = service.prompt_for(question)?;
    info!(
        chars = prompt.char_len(),
        budget = config.pipeline.char_budget,
        fallback = prompt.is_fallback(),
        "Prompt assembled"
    );
    write_line(prompt.text())
}

/// List catalog tables
fn tables(catalog: &SchemaCatalog, format: TableFormat) -> Result<()> {
    let output = match format {
        TableFormat::Text => catalog
            .all_tables()
            .iter()
            .map(|t| format!("{} ({} columns): {}", t.name, t.columns.len(), t.description))
            .collect::<Vec<_>>()
            .join("\n"),
        TableFormat::Json => serde_json::to_string_pretty(catalog.all_tables())?,
        TableFormat::Yaml => serde_yaml::to_string(catalog.all_tables())?,
    };
    write_line(&output)
}

/// A service for the commands that never reach the network
fn offline_service(config: &AppConfig, catalog: Arc<SchemaCatalog>) -> Result<AssistantService> {
    Ok(AssistantService::new(
        catalog,
        Arc::new(OfflineProvider),
        config.pipeline_settings(),
        config.request_timeout(),
    )?
    .with_assembler(config.assembler()))
}

fn format_ranked(item: &RankedContextItem<'_>) -> String {
    format!("{:>2}. {:<40} {:.3}", item.rank, item.target.label(), item.score)
}

fn write_line(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("Failed to write to stdout")
}

/// Completion provider for commands that must not call out
struct OfflineProvider;

#[async_trait::async_trait]
impl CompletionProvider for OfflineProvider {
    async fn complete(
        &self,
        _prompt: &str,
    ) -> std::result::Result<String, nl2sql_assistant::CompletionError> {
        Err(nl2sql_assistant::CompletionError::Config(
            "offline commands do not call the completion service".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}
