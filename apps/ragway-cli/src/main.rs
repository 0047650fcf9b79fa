use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragway_core::config::Config;
use ragway_core::types::{Chunk, SearchMethod};
use ragway_core::CancellationToken;
use ragway_gateway::{GatewayContext, SearchParams};

#[derive(Parser)]
#[command(name = "ragway", version, about = "Hybrid retrieval and multi-agent answering over document collections")]
struct Cli {
    /// Directory relative data paths resolve against
    #[arg(long, env = "RAGWAY_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ranked passages for a prompt
    Search {
        prompt: String,
        #[arg(short, long = "collection", required = true)]
        collections: Vec<String>,
        #[arg(short, long, default_value = "hybrid")]
        method: SearchMethod,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        rrf_k: Option<f64>,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Answer a question from the collections, falling back to the web
    Ask {
        prompt: String,
        #[arg(short, long = "collection", required = true)]
        collections: Vec<String>,
        #[arg(long)]
        max_retries: Option<usize>,
        #[arg(long)]
        window_size: Option<usize>,
    },
    /// Embed and store chunks from a JSON-lines file
    Load { collection: String, file: PathBuf },
    /// Remove every chunk of a document
    DeleteDocument { collection: String, document_id: String },
    /// Configured collections and whether the backend has them
    Collections,
    /// Backend liveness probe
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let base = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving working directory")?,
    };
    let gateway = GatewayContext::from_config(&config, &base).await.context("starting gateway")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = run(&gateway, cli.command, cli.json, &cancel).await;
    gateway.shutdown();
    outcome
}

async fn run(gateway: &Arc<GatewayContext>, command: Command, json: bool, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Search { prompt, collections, method, k, rrf_k, threshold } => {
            let params = SearchParams { method, k, rrf_k, score_threshold: threshold };
            let results = gateway.search(&collections, &prompt, params, cancel).await.context("search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            println!("🔍 Found {} results for: \"{}\"", results.len(), prompt);
            for (i, r) in results.iter().enumerate() {
                println!(
                    "\n  {}. score={:.4}  method={}  source={}  part={}",
                    i + 1,
                    r.score,
                    r.method,
                    r.chunk.document_name(),
                    r.chunk.metadata.document_part
                );
                println!("     {}", r.chunk.content.chars().take(200).collect::<String>());
            }
        }
        Command::Ask { prompt, collections, max_retries, window_size } => {
            let out = gateway
                .orchestrated_answer(&collections, &prompt, max_retries, window_size, cancel)
                .await
                .context("answering failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!("{}\n", out.answer);
            println!("verdict={}  retries={}", out.verdict, out.retries_used);
            for name in &out.source_names {
                println!("  - {name}");
            }
        }
        Command::Load { collection, file } => {
            let text = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let mut chunks = Vec::new();
            for (line_no, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                let chunk: Chunk = serde_json::from_str(line)
                    .with_context(|| format!("{}:{}: not a chunk", file.display(), line_no + 1))?;
                chunks.push(chunk);
            }
            let loaded = gateway.load_chunks(&collection, &chunks, cancel).await.context("loading chunks")?;
            println!("✅ Loaded {loaded} chunks into '{collection}'");
        }
        Command::DeleteDocument { collection, document_id } => {
            match gateway.delete_document(&collection, &document_id).await.context("deleting document")? {
                Some(n) => println!("Removed {n} chunks of '{document_id}'"),
                None => println!("Removed '{document_id}' (chunk count unavailable)"),
            }
        }
        Command::Collections => {
            let present = gateway.backend().list_collections().await.context("listing backend collections")?;
            let configured = gateway.catalog().list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&configured)?);
                return Ok(());
            }
            for c in configured {
                let mark = if present.contains(&c.id) { "stored" } else { "empty" };
                println!("{:<24} model={:<20} {:?}  {}", c.id, c.embedding_model, c.visibility, mark);
            }
        }
        Command::Check => {
            let backend = gateway.backend();
            if !backend.check().await {
                bail!("backend '{}' is not reachable", backend.name());
            }
            println!("backend '{}' ok", backend.name());
        }
    }
    Ok(())
}
