use clap::{Parser, Subcommand};
use docvault_embed::{HashingConfig, ProviderConfig};
use docvault_retriever::{
    Backend, RetrievalService, RetrieverConfig,
    retrieval::parser::{DocumentParser, PlainTextParser},
    retrieval::service::DEFAULT_CONTEXT_CHARS,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// A CLI tool to add documents to a docvault store and search it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the persisted store (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Index backend: exact or tfidf (overrides the config file)
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Vector dimension (overrides the config file)
    #[arg(long)]
    dimension: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and store one or more text files
    Add {
        /// Files to add (.txt, .md, .csv, .json)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Find the chunks closest to a query
    Search {
        query: String,
        /// Maximum number of results (defaults to the configured default_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print retrieved excerpts formatted as grounding context
    Context {
        query: String,
        /// Maximum number of excerpts
        #[arg(short, long)]
        k: Option<usize>,
        /// Characters kept from each excerpt
        #[arg(long, default_value_t = DEFAULT_CONTEXT_CHARS)]
        max_chars: usize,
    },
    /// Show store statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Remove every chunk and delete the persisted snapshot
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct AddedFile {
    file: String,
    chunks_created: usize,
    total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    persistence_warning: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = match &args.config {
        Some(path) => RetrieverConfig::from_file(path)?,
        None => RetrieverConfig::default(),
    };
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(dimension) = args.dimension {
        // The hashing provider can produce any length, so it follows the override
        if matches!(config.embedding, ProviderConfig::Hashing(_)) {
            config = config.with_embedding(ProviderConfig::Hashing(HashingConfig::new(dimension)));
        } else {
            config = config.with_dimension(dimension);
        }
    }
    Ok(config)
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let default_k = config.default_k;
    let service = RetrievalService::open(config).await?;

    match args.command {
        Commands::Add { files, format } => {
            let parser = PlainTextParser;
            let mut added = Vec::new();

            for path in files {
                let extension = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default();
                if !parser.supports(extension) {
                    warn!("Skipping {}: unsupported file type", path.display());
                    continue;
                }
                let bytes = std::fs::read(&path)
                    .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
                let text = parser.parse(&bytes, extension);
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());

                let outcome = service.add_document(&text, &filename).await?;
                added.push(AddedFile {
                    file: filename,
                    chunks_created: outcome.chunks_created,
                    total_chunks: outcome.total_chunks,
                    persistence_warning: outcome.persistence_warning,
                });
            }

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&added)?);
                }
                OutputFormat::Summary => {
                    for file in &added {
                        println!(
                            "Added {}: {} chunks ({} total)",
                            file.file, file.chunks_created, file.total_chunks
                        );
                        if let Some(warning) = &file.persistence_warning {
                            println!("  Warning: not persisted: {warning}");
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Search { query, k, format } => {
            let results = service.search(&query, k.unwrap_or(default_k)).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} similar chunks:", results.len());
                    for result in results {
                        println!(
                            "  #{} | Distance: {:.4} | File: {} | Chunk: {}/{}",
                            result.rank,
                            result.distance,
                            result.chunk.source_filename,
                            result.chunk.chunk_index + 1,
                            result.chunk.total_chunks
                        );
                        println!(
                            "    {}",
                            result.chunk.text.chars().take(100).collect::<String>()
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Context {
            query,
            k,
            max_chars,
        } => {
            let context = service
                .build_context(&query, k.unwrap_or(default_k), max_chars)
                .await?;
            if context.is_empty() {
                println!("No relevant documents found.");
            } else {
                print!("{context}");
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let stats = service.stats().await;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary => {
                    println!("Store Statistics:");
                    println!("  Backend: {}", stats.backend);
                    if let Some(provider) = &stats.provider {
                        println!("  Provider: {provider}");
                    }
                    println!("  Dimension: {}", stats.dimension);
                    println!("  Total chunks: {}", stats.total_chunks);
                    println!("  Unique files: {}", stats.unique_source_files);
                    println!("  Trained: {}", if stats.is_trained { "Yes" } else { "No" });
                    println!("  Snapshot size: {:.2} MB", stats.snapshot_megabytes());

                    if !stats.source_files.is_empty() {
                        println!("  Files:");
                        for file in stats.source_files.iter().take(10) {
                            println!("    {file}");
                        }
                        if stats.source_files.len() > 10 {
                            println!("    ... and {} more", stats.source_files.len() - 10);
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Clear => {
            service.clear().await?;
            println!("Cleared store at {}", service.config().data_dir.display());
            Ok(())
        }
    }
}
