//! # QA Harness CLI (`qah`)
//!
//! The `qah` binary is the primary interface for qa-harness. It provides
//! commands for database initialization, question answering, cache and
//! document administration, learned-query reporting, and starting the JSON
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! qah --config ./config/qah.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qah init` | Create the SQLite catalog, run migrations, load demo data |
//! | `qah ask "<question>"` | Run a question through the full pipeline |
//! | `qah serve` | Start the JSON HTTP API server |
//! | `qah cache stats` | Cache statistics of the running server |
//! | `qah cache clear` | Reset the running server's cache |
//! | `qah cache top` | Most frequent questions on the running server |
//! | `qah learned popular` | Most-used learned queries |
//! | `qah learned recent` | Recently used learned queries |
//! | `qah docs list` | List documents indexed by the running server |
//! | `qah docs add <file>` | Index a file on the running server |
//! | `qah schema` | Introspect the live catalog database |
//!
//! `ask`, `init`, `schema` and `learned` operate directly on local state;
//! the `cache` and `docs` commands administer a running `qah serve` process
//! over its HTTP API, since the cache and document index live in that
//! process's memory.
//!
//! ## Examples
//!
//! ```bash
//! # Initialize and seed the catalog
//! qah init --config ./config/qah.toml
//!
//! # Ask a data question (structured path)
//! qah ask "cuántas aplicaciones hay"
//!
//! # Ask a conceptual question (knowledge path)
//! qah ask "qué es un itinerario de QA"
//!
//! # Start the HTTP API, then inspect its cache
//! qah serve &
//! qah cache stats
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use qa_harness::cache::ResultCache;
use qa_harness::classify;
use qa_harness::config::{self, Config};
use qa_harness::embedding;
use qa_harness::index::DocumentIndex;
use qa_harness::knowledge::KnowledgeResolver;
use qa_harness::learning::LearningStore;
use qa_harness::llm::{LanguageModel, OllamaClient};
use qa_harness::models::{CacheStats, UnifiedResult};
use qa_harness::pipeline::Pipeline;
use qa_harness::seed;
use qa_harness::server;
use qa_harness::store::{DataStore, SqliteStore};
use qa_harness::structured::StructuredResolver;

/// QA Harness CLI — natural-language question answering over a QA-tracking
/// catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qah.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qah",
    about = "QA Harness — natural-language question answering over a QA-tracking catalog",
    version,
    long_about = "QA Harness routes natural-language questions to one of two resolution paths: \
    translation to SQL against the catalog database, or semantic retrieval over an indexed \
    knowledge corpus. A TTL'd result cache sits in front of both, and compound questions are \
    decomposed and merged. Exposed as a CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/qah.toml`. Database, language-model, embedding,
    /// classifier, cache, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/qah.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog database.
    ///
    /// Creates the SQLite file, runs schema migrations (catalog tables plus
    /// the learned-query table), and loads the demo dataset. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Answer a question through the full pipeline.
    ///
    /// Cache lookup, complexity analysis, intent classification, and
    /// resolution via the structured (SQL) or knowledge (retrieval) path.
    /// Prints the unified result; resolver failures are reported in the
    /// output, never as a process error.
    Ask {
        /// The question, in natural language (Spanish or English).
        question: String,
    },

    /// Start the JSON HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// pipeline plus cache/document administration endpoints.
    Serve,

    /// Administer the result cache of a running server.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Report on learned queries (successful structured resolutions).
    Learned {
        #[command(subcommand)]
        action: LearnedAction,
    },

    /// Manage the knowledge documents of a running server.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Introspect the live catalog database.
    ///
    /// Prints every table with its columns, nullability, and row count.
    Schema,
}

/// Cache administration subcommands. These talk to a running `qah serve`
/// process — the cache lives in its memory.
#[derive(Subcommand)]
enum CacheAction {
    /// Print a statistics snapshot: hits, misses, hit rate, entry count,
    /// approximate size, and the most frequent questions.
    Stats,
    /// Reset cache entries, frequency counters, and statistics.
    Clear,
    /// List the most frequently answered questions.
    Top {
        /// Maximum number of questions to list.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Learned-query reporting subcommands. Read directly from the database.
#[derive(Subcommand)]
enum LearnedAction {
    /// Most-used learned queries, by usage count.
    Popular {
        /// Maximum number of queries to list.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Most recently used learned queries.
    Recent {
        /// Maximum number of queries to list.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

/// Document management subcommands. These talk to a running `qah serve`
/// process — the document index lives in its memory.
#[derive(Subcommand)]
enum DocsAction {
    /// List the indexed documents.
    List,
    /// Read a text file and add it to the running server's index.
    Add {
        /// Path to the file to index.
        path: PathBuf,
        /// Document title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },
}

/// Everything a command needs, assembled from the configuration.
struct App {
    cache: Arc<ResultCache>,
    learning: Arc<LearningStore>,
    index: Arc<DocumentIndex>,
    pipeline: Arc<Pipeline>,
}

/// Connect the store, load the knowledge corpus, and wire the pipeline.
///
/// Migrations run here too (they are idempotent), so `ask` and `serve` work
/// against a database that `init` has not touched yet — the catalog is just
/// empty until it is seeded.
async fn build_app(cfg: &Config) -> anyhow::Result<App> {
    let store = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
    seed::run_migrations(store.pool()).await?;

    let provider = embedding::create_provider(&cfg.embedding)?;
    let index = Arc::new(DocumentIndex::new(provider));
    index.add_documents(seed::knowledge_corpus()).await;

    let llm: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(&cfg.llm)?);
    let cache = Arc::new(ResultCache::new(Duration::from_secs(cfg.cache.ttl_secs)));
    let learning = Arc::new(LearningStore::new(store.pool().clone()));

    let data: Arc<dyn DataStore> = store.clone();
    let classifier = classify::create_classifier(&cfg.classifier.strategy, llm.clone())?;
    let structured = StructuredResolver::new(llm.clone(), data.clone());
    let knowledge = KnowledgeResolver::new(index.clone(), data, cfg.retrieval.top_k);

    let pipeline = Arc::new(
        Pipeline::new(
            cache.clone(),
            classifier,
            structured,
            knowledge,
            llm,
            cfg.complexity.clone(),
        )
        .with_learning(learning.clone()),
    );

    Ok(App {
        cache,
        learning,
        index,
        pipeline,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qa_harness=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            run_init(&cfg).await?;
        }
        Commands::Ask { question } => {
            let app = build_app(&cfg).await?;
            let result = app.pipeline.answer(&question).await;
            print_result(&result);
        }
        Commands::Serve => {
            let probe = OllamaClient::new(&cfg.llm)?;
            if !probe.is_running().await {
                eprintln!(
                    "warning: no language model service at {} — structured questions will fail until it is available",
                    cfg.llm.base_url
                );
            }
            let app = build_app(&cfg).await?;
            server::run_server(&cfg, app.pipeline, app.cache, app.learning, app.index).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => run_cache_stats(&cfg).await?,
            CacheAction::Clear => {
                admin_post(&cfg.server.bind, "/cache/clear", None).await?;
                println!("Cache cleared.");
            }
            CacheAction::Top { limit } => run_cache_top(&cfg, limit).await?,
        },
        Commands::Learned { action } => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            seed::run_migrations(store.pool()).await?;
            let learning = LearningStore::new(store.pool().clone());
            let queries = match action {
                LearnedAction::Popular { limit } => learning.popular(limit).await?,
                LearnedAction::Recent { limit } => learning.recent(limit).await?,
            };
            print_learned(&queries);
        }
        Commands::Docs { action } => match action {
            DocsAction::List => run_docs_list(&cfg).await?,
            DocsAction::Add { path, title } => run_docs_add(&cfg, &path, title).await?,
        },
        Commands::Schema => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            println!("{}", store.describe_live_schema().await?);
        }
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::connect(&cfg.db.path).await?;
    seed::run_migrations(store.pool()).await?;
    seed::seed_catalog(store.pool()).await?;

    let rows = store
        .execute("SELECT COUNT(*) AS total FROM aplicacion")
        .await?;
    let total = rows
        .first()
        .and_then(|r| r.get("total"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    println!(
        "Database initialized at {} ({} applications in catalog).",
        cfg.db.path.display(),
        total
    );
    Ok(())
}

/// Render a pipeline result for the terminal.
fn print_result(result: &UnifiedResult) {
    println!(
        "Intent: {} | {}",
        result.intent,
        if result.success { "ok" } else { "failed" }
    );
    println!();
    println!("{}", result.answer);

    if let Some(sql) = &result.generated_sql {
        println!();
        println!("Generated SQL: {}", sql);
    }

    if let Some(sources) = result.sources.as_ref().filter(|s| !s.is_empty()) {
        println!();
        println!("Sources:");
        for doc in sources {
            let score = doc
                .metadata
                .get("similarity_score")
                .map(String::as_str)
                .unwrap_or("-");
            println!(
                "  - {} (score {})",
                doc.title.as_deref().unwrap_or(&doc.id),
                score
            );
        }
    }

    if !result.suggestions.is_empty() {
        println!();
        println!("You could also ask:");
        for suggestion in &result.suggestions {
            println!("  - {}", suggestion);
        }
    }

    if let Some(message) = &result.error_message {
        println!();
        println!("Error: {}", message);
    }
}

fn print_learned(queries: &[qa_harness::learning::LearnedQuery]) {
    if queries.is_empty() {
        println!("(no learned queries yet)");
        return;
    }

    for q in queries {
        let last_used = chrono::DateTime::from_timestamp(q.last_used, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| q.last_used.to_string());
        println!(
            "{:>4}x  {}  [{} row(s), last used {}]",
            q.usage_count, q.question, q.result_count, last_used
        );
        println!("       {}", q.generated_sql);
    }
}

async fn run_cache_stats(cfg: &Config) -> anyhow::Result<()> {
    let value = admin_get(&cfg.server.bind, "/cache/stats").await?;
    let stats: CacheStats = serde_json::from_value(value)?;

    println!("Cache statistics:");
    println!("  hits:          {}", stats.hits);
    println!("  misses:        {}", stats.misses);
    println!("  stores:        {}", stats.stores);
    println!("  hit rate:      {:.2}%", stats.hit_rate);
    println!("  entries:       {}", stats.current_size);
    println!("  approx size:   {} bytes", stats.approx_size_bytes);
    println!("  oldest entry:  {}s", stats.oldest_entry_age_secs);

    if !stats.top_queries.is_empty() {
        println!("  top questions:");
        for (i, q) in stats.top_queries.iter().enumerate() {
            println!("    {}. {}", i + 1, q);
        }
    }
    Ok(())
}

async fn run_cache_top(cfg: &Config, limit: usize) -> anyhow::Result<()> {
    let value = admin_get(&cfg.server.bind, &format!("/cache/top?limit={}", limit)).await?;
    let queries = value
        .get("queries")
        .and_then(|q| q.as_array())
        .cloned()
        .unwrap_or_default();

    if queries.is_empty() {
        println!("(no questions answered yet)");
        return Ok(());
    }

    for (i, q) in queries.iter().enumerate() {
        println!("{}. {}", i + 1, q.as_str().unwrap_or("?"));
    }
    Ok(())
}

async fn run_docs_list(cfg: &Config) -> anyhow::Result<()> {
    let value = admin_get(&cfg.server.bind, "/documents").await?;
    let docs = value
        .get("documents")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();

    println!("{} document(s) indexed:", docs.len());
    for doc in &docs {
        let id = doc.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        let title = doc
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("(untitled)");
        println!("  {}  {}", id, title);
    }
    Ok(())
}

async fn run_docs_add(cfg: &Config, path: &PathBuf, title: Option<String>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document file: {}", path.display()))?;
    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let body = serde_json::json!({ "title": title, "content": content });
    let value = admin_post(&cfg.server.bind, "/documents", Some(body)).await?;
    let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("?");
    println!("Indexed document {} as '{}'.", id, title);
    Ok(())
}

// ============ HTTP admin client ============

fn admin_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?)
}

async fn admin_get(bind: &str, path: &str) -> anyhow::Result<serde_json::Value> {
    let url = format!("http://{}{}", bind, path);
    let response = admin_client()?
        .get(&url)
        .send()
        .await
        .with_context(|| unreachable_server(bind))?;
    Ok(response.error_for_status()?.json().await?)
}

async fn admin_post(
    bind: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<serde_json::Value> {
    let url = format!("http://{}{}", bind, path);
    let mut request = admin_client()?.post(&url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .with_context(|| unreachable_server(bind))?;
    Ok(response.error_for_status()?.json().await?)
}

fn unreachable_server(bind: &str) -> String {
    format!(
        "Could not reach the qa-harness server at http://{} — is `qah serve` running?",
        bind
    )
}
