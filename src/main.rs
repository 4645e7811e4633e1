//! CodeSearch CLI - local-first code intelligence: incremental indexing and
//! hybrid vector + BM25 search.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use codesearch::{
    AnthropicClient, Bm25Index, Bm25Provider, Chunk, ChunkerUseCase, Config, DuckdbVectorStoreFactory,
    EmbeddingProvider, EnricherUseCase, HybridSearchUseCase, IndexSummary, Language, LlmReranking,
    OrtEmbedding, Orchestrator, SearchFilters, TreeSitterParser, VectorStore, VectorStoreFactory,
    BM25_FILE, ROOT_NAMESPACE,
};

/// CodeSearch - local-first code intelligence powered by incremental
/// indexing and hybrid retrieval.
#[derive(ClapParser)]
#[command(name = "codesearch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage directory for vector/BM25/graph indexes
    #[arg(short, long, global = true, default_value = "~/.codesearch")]
    data_dir: String,

    /// Path to a coderag.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more repositories
    Index {
        /// Path to the repository to index (falls back to the config's
        /// `repositories` list when omitted)
        #[arg(short, long)]
        path: Option<String>,

        /// Name for the repository (defaults to its directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Ignore prior index state and reprocess every file
        #[arg(long)]
        full: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Hybrid vector + BM25 search over an indexed repository
    Search {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long = "top-k", default_value = "10")]
        top_k: usize,

        /// Filter by language
        #[arg(short = 'L', long)]
        language: Option<String>,

        /// Restrict to one repository (also selects its storage directory)
        #[arg(long)]
        repo: Option<String>,

        /// Rerank the top candidates with a cross-encoder
        #[arg(long)]
        rerank: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = PathBuf::from(expand_tilde(&cli.data_dir));
    std::fs::create_dir_all(&data_dir)?;

    let config = match &cli.config {
        Some(path) => Config::load(Path::new(path)).context("failed to load config")?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Index { path, name, full, quiet } => {
            run_index(&data_dir, &config, path, name, full, quiet).await
        }
        Commands::Search { query, top_k, language, repo, rerank } => {
            run_search(&data_dir, &config, &query, top_k, language, repo, rerank).await
        }
    }
}

async fn run_index(
    data_dir: &Path,
    config: &Config,
    path: Option<String>,
    name: Option<String>,
    full: bool,
    quiet: bool,
) -> Result<()> {
    let repos: Vec<(String, PathBuf)> = if let Some(path) = path {
        let root = PathBuf::from(expand_tilde(&path));
        let repo_id = name.unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "repo".to_string())
        });
        vec![(repo_id, root)]
    } else if !config.repositories.is_empty() {
        config
            .repositories
            .iter()
            .map(|r| (r.name.clone(), r.path.clone()))
            .collect()
    } else {
        anyhow::bail!("no repository given; pass --path or configure `repositories` in coderag.json");
    };

    let embedder = Arc::new(OrtEmbedding::new(None).context("failed to load embedding model")?);
    let factory = open_vector_store_factory(data_dir, embedder.dimensions())?;
    let orchestrator = build_orchestrator(config, factory, embedder)?;

    let progress = (!quiet).then(|| {
        let bar = ProgressBar::new(repos.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
                .expect("progress template is a literal"),
        );
        bar
    });

    if repos.len() == 1 {
        let (repo_id, root) = &repos[0];
        let storage_dir = data_dir.join(repo_id);
        if let Some(bar) = &progress {
            bar.set_message(format!("indexing {repo_id}"));
        }
        let summary = orchestrator
            .index_repository(repo_id, root, &storage_dir, full)
            .await
            .context("indexing failed")?;
        if let Some(bar) = &progress {
            bar.inc(1);
            bar.finish_and_clear();
        }
        print_summary(&summary);
    } else {
        let summary = orchestrator
            .index_repositories(&repos, data_dir, full)
            .await
            .context("multi-repo indexing failed")?;
        for repo_summary in &summary.per_repo {
            print_summary(repo_summary);
        }
        if let Some(bar) = &progress {
            bar.finish_and_clear();
        }
        println!(
            "root index: {} chunks across {} repositories",
            summary.root_chunk_count,
            summary.per_repo.len()
        );
    }

    Ok(())
}

fn print_summary(summary: &IndexSummary) {
    if summary.up_to_date {
        println!("{}: up to date", summary.repository_id);
        return;
    }
    println!(
        "{}: {} files scanned, {} chunks written, {} chunks retired",
        summary.repository_id, summary.files_scanned, summary.chunks_written, summary.chunks_retired
    );
    for (file, reason) in &summary.parse_errors {
        println!("  parse error in {file}: {reason}");
    }
}

async fn run_search(
    data_dir: &Path,
    _config: &Config,
    query: &str,
    top_k: usize,
    language: Option<String>,
    repo: Option<String>,
    rerank: bool,
) -> Result<()> {
    let storage_dir = match &repo {
        Some(name) => data_dir.join(name),
        None => data_dir.to_path_buf(),
    };

    let embedder = Arc::new(OrtEmbedding::new(None).context("failed to load embedding model")?);
    let factory = open_vector_store_factory(data_dir, embedder.dimensions())?;
    let namespace = repo.as_deref().unwrap_or(ROOT_NAMESPACE);
    let store = factory.open(namespace).await.context("failed to open vector store")?;

    let bm25_path = storage_dir.join(BM25_FILE);
    let bm25_index = if bm25_path.exists() {
        let text = std::fs::read_to_string(&bm25_path).context("failed to read BM25 index")?;
        Bm25Index::deserialize(&text).context("failed to parse BM25 index")?
    } else {
        Bm25Index::new()
    };
    let bm25_provider: Arc<dyn Bm25Provider> = Arc::new(StoredBm25 {
        index: bm25_index,
        store: store.clone(),
    });

    let mut search = HybridSearchUseCase::new(store, embedder, bm25_provider);
    if rerank {
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| "ministral-3b-2512".to_string());
        let llm = Arc::new(AnthropicClient::new(
            std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model.clone(),
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| codesearch::DEFAULT_BASE_URL.to_string()),
        ));
        let reranker = LlmReranking::new(llm, model);
        search = search.with_reranking(Arc::new(reranker));
    }

    let mut filters = SearchFilters::new();
    if let Some(lang) = language {
        filters = filters.with_language(Language::parse(&lang));
    }
    if let Some(ref name) = repo {
        filters = filters.with_repo_name(name.clone());
    }

    let results = search
        .search(query, top_k, &filters, |repository_id: &str| repository_id.to_string())
        .await
        .context("search failed")?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!("{}. {} (score: {:.3})", i + 1, result.chunk().location(), result.score());
        if let Some(symbol) = result.chunk().symbol_name() {
            println!("   Symbol: {} ({})", symbol, result.chunk().chunk_type());
        }
        let preview: String = result
            .chunk()
            .content()
            .lines()
            .take(3)
            .map(|l| format!("   | {l}"))
            .collect::<Vec<_>>()
            .join("\n");
        println!("{preview}");
        println!();
    }

    Ok(())
}

/// One `vectors.duckdb` file per `data_dir`, with every repository (plus the
/// root merge) living in its own schema on a shared connection — see
/// [`DuckdbVectorStoreFactory`].
fn open_vector_store_factory(data_dir: &Path, dimensions: usize) -> Result<Arc<dyn VectorStoreFactory>> {
    let db_path = data_dir.join("vectors.duckdb");
    let factory = DuckdbVectorStoreFactory::open_file(&db_path, dimensions).context("failed to open vector store")?;
    Ok(Arc::new(factory))
}

fn build_orchestrator(
    config: &Config,
    vector_store_factory: Arc<dyn VectorStoreFactory>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Orchestrator> {
    let parser = Arc::new(TreeSitterParser::new());
    let chunker = ChunkerUseCase::new().with_max_tokens_per_chunk(config.max_tokens_per_chunk);

    let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| "ministral-3b-2512".to_string());
    let llm = Arc::new(AnthropicClient::new(
        std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
        model.clone(),
        std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| codesearch::DEFAULT_BASE_URL.to_string()),
    ));
    let enricher = EnricherUseCase::new(llm, model);

    Ok(Orchestrator::new(parser, chunker, enricher, vector_store_factory, embedder, None))
}

/// Bridges the Orchestrator's filesystem-persisted BM25 postings and the
/// vector store's chunk lookup into the synchronous [`Bm25Provider`] seam
/// `HybridSearchUseCase` expects — a persisted [`Bm25Index`] only carries
/// ids and scores, so candidates it surfaces that the vector leg didn't also
/// match need their `Chunk` resolved via `VectorStore::get_by_ids`.
struct StoredBm25 {
    index: Bm25Index,
    store: Arc<dyn VectorStore>,
}

impl Bm25Provider for StoredBm25 {
    fn search(&self, query: &str, limit: usize) -> Vec<(String, f32, Chunk)> {
        let hits = self.index.search(query, limit);
        if hits.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let store = self.store.clone();
        let chunks = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(store.get_by_ids(&ids))
        })
        .unwrap_or_default();

        let mut by_id: HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.id().to_string(), c)).collect();
        hits.into_iter()
            .filter_map(|(id, score)| by_id.remove(&id).map(|chunk| (id, score, chunk)))
            .collect()
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
