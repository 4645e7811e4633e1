use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::interfaces::Parser as ParserTrait;
use crate::application::{
    BacklogState, ChunkerUseCase, EmbeddingProvider, EnricherUseCase, IndexStoreUseCase, ScannerUseCase,
    VectorStore, VectorStoreFactory, WorkItemIndexerUseCase, WorkItemProvider,
};
use crate::domain::{Bm25Index, Chunk, DependencyGraph, DomainError, EnrichmentCheckpoint, IndexState};

const INDEX_STATE_FILE: &str = "index-state.json";
/// File name of the persisted [`Bm25Index`] under a storage directory,
/// public so a CLI composition root can load it for query-time search
/// without duplicating the storage-layout convention.
pub const BM25_FILE: &str = "bm25-index.json";
const GRAPH_FILE: &str = "graph.json";
const CHECKPOINT_FILE: &str = "enrichment-checkpoint.json";
const BACKLOG_STATE_FILE: &str = "backlog-state.json";

/// Namespace (DuckDB schema / logical store id) the multi-repo path's
/// root-merged store is opened under, distinct from any repository id.
pub const ROOT_NAMESPACE: &str = "root";

/// Per-repository outcome of one `index` invocation.
#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub repository_id: String,
    pub up_to_date: bool,
    pub files_scanned: usize,
    pub chunks_written: usize,
    pub chunks_retired: usize,
    pub parse_errors: Vec<(String, String)>,
    pub skipped_files: Vec<(String, String)>,
    pub work_items_indexed: usize,
}

/// Outcome of a multi-repo run: one summary per repo plus the root merge.
#[derive(Debug, Clone, Default)]
pub struct MultiRepoSummary {
    pub per_repo: Vec<IndexSummary>,
    pub root_chunk_count: u64,
}

/// Drives the scan → chunk → enrich → embed/store → index-state pipeline
/// described for single-repo and multi-repo runs alike. Holds the three
/// per-run collaborators (`Parser`, enrichment, and embed+store) and the
/// bare filesystem persistence for `IndexState`/`Bm25Index`/`DependencyGraph`
/// /`EnrichmentCheckpoint` — no dedicated port exists for that persistence
/// (it is an implementation detail of the storage directory layout, not one
/// of the external collaborators), so it lives here as plain `std::fs` +
/// `serde_json`, each artifact written to a temp path then renamed.
pub struct Orchestrator {
    parser: Arc<dyn ParserTrait>,
    scanner: ScannerUseCase,
    chunker: ChunkerUseCase,
    enricher: EnricherUseCase,
    vector_store_factory: Arc<dyn VectorStoreFactory>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    work_item_provider: Option<Arc<dyn WorkItemProvider>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parser: Arc<dyn ParserTrait>,
        chunker: ChunkerUseCase,
        enricher: EnricherUseCase,
        vector_store_factory: Arc<dyn VectorStoreFactory>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        work_item_provider: Option<Arc<dyn WorkItemProvider>>,
    ) -> Self {
        Self {
            parser,
            scanner: ScannerUseCase::new(),
            chunker,
            enricher,
            vector_store_factory,
            embedding_provider,
            work_item_provider,
        }
    }

    /// Fetches work items for `repository_id` (empty query = every
    /// configured item), embeds and upserts the changed ones into `store`,
    /// and links them into `bm25`/`graph` — the post-code-phase extension
    /// from §4.E.3, run only when a work-item provider is configured.
    #[allow(clippy::too_many_arguments)]
    async fn index_work_items(
        &self,
        provider: Arc<dyn WorkItemProvider>,
        store: Arc<dyn VectorStore>,
        repository_id: &str,
        storage_dir: &Path,
        bm25: &mut Bm25Index,
        graph: &mut DependencyGraph,
        code_chunks: &[Chunk],
    ) -> Result<usize, DomainError> {
        let backlog_path = storage_dir.join(BACKLOG_STATE_FILE);
        let mut backlog_state: BacklogState = read_json(&backlog_path)?.unwrap_or_default();

        let use_case = WorkItemIndexerUseCase::new(provider, store, self.embedding_provider.clone());
        let written = use_case
            .index(repository_id, "", &mut backlog_state, bm25, graph, code_chunks)
            .await?;
        write_json_atomic(&backlog_path, &backlog_state)?;
        Ok(written)
    }

    /// Runs the single-repo path against `root`, persisting artifacts under
    /// `storage_dir`. `full` ignores the existing `IndexState` and
    /// re-processes every file.
    pub async fn index_repository(
        &self,
        repository_id: &str,
        root: &Path,
        storage_dir: &Path,
        full: bool,
    ) -> Result<IndexSummary, DomainError> {
        std::fs::create_dir_all(storage_dir)?;

        let mut index_state = if full {
            IndexState::new()
        } else {
            read_json(&storage_dir.join(INDEX_STATE_FILE))?.unwrap_or_default()
        };

        let plan = self.scan_and_chunk(repository_id, root, &index_state, full, None).await?;

        if plan.changed.is_empty() && plan.deleted.is_empty() && !full {
            info!("{repository_id}: up to date, nothing to do");
            return Ok(IndexSummary {
                repository_id: repository_id.to_string(),
                up_to_date: true,
                files_scanned: plan.files_scanned,
                ..Default::default()
            });
        }

        if plan.chunks.is_empty() && !plan.parse_errors.is_empty() {
            warn!(
                "{repository_id}: no chunks produced and {} parse errors, aborting without touching stores",
                plan.parse_errors.len()
            );
            return Ok(IndexSummary {
                repository_id: repository_id.to_string(),
                files_scanned: plan.files_scanned,
                parse_errors: plan.parse_errors,
                skipped_files: plan.skipped_files,
                ..Default::default()
            });
        }

        let mut chunks = plan.chunks;
        let mut checkpoint = read_json(&storage_dir.join(CHECKPOINT_FILE))?.unwrap_or_default();
        let checkpoint_path = storage_dir.join(CHECKPOINT_FILE);

        self.enricher
            .enrich(&mut chunks, &mut checkpoint, |cp| write_json_atomic(&checkpoint_path, cp))
            .await?;
        let _ = std::fs::remove_file(&checkpoint_path);

        let mut bm25: Bm25Index = if full {
            Bm25Index::new()
        } else {
            read_json(&storage_dir.join(BM25_FILE))?.unwrap_or_default()
        };
        let mut graph: DependencyGraph = if full {
            DependencyGraph::new()
        } else {
            read_json(&storage_dir.join(GRAPH_FILE))?.unwrap_or_default()
        };

        let store = self.vector_store_factory.open(repository_id).await?;
        let index_store = IndexStoreUseCase::new(store.clone(), self.embedding_provider.clone());

        let apply_result = index_store
            .apply(
                repository_id,
                &plan.changed,
                &plan.deleted,
                chunks,
                &mut bm25,
                &mut graph,
                &mut index_state,
            )
            .await?;

        let mut work_items_indexed = 0;
        if let Some(provider) = self.work_item_provider.clone() {
            work_items_indexed = self
                .index_work_items(provider, store, repository_id, storage_dir, &mut bm25, &mut graph, &apply_result.written_chunks)
                .await?;
        }

        write_json_atomic(&storage_dir.join(BM25_FILE), &bm25)?;
        write_json_atomic(&storage_dir.join(GRAPH_FILE), &graph)?;
        write_json_atomic(&storage_dir.join(INDEX_STATE_FILE), &index_state)?;

        Ok(IndexSummary {
            repository_id: repository_id.to_string(),
            up_to_date: false,
            files_scanned: plan.files_scanned,
            chunks_written: apply_result.chunks_written,
            chunks_retired: apply_result.chunks_retired,
            parse_errors: plan.parse_errors,
            skipped_files: plan.skipped_files,
            work_items_indexed,
        })
    }

    /// Runs the multi-repo path: per-repo scan+chunk, a single shared
    /// enrichment phase over the union of all repos' chunks, per-repo
    /// embed+store, then a root merge unioning every per-repo artifact into
    /// `root_storage_dir`.
    pub async fn index_repositories(
        &self,
        repos: &[(String, PathBuf)],
        root_storage_dir: &Path,
        full: bool,
    ) -> Result<MultiRepoSummary, DomainError> {
        std::fs::create_dir_all(root_storage_dir)?;
        let root_store = self.vector_store_factory.open(ROOT_NAMESPACE).await?;

        let mut per_repo_plans = Vec::new();
        for (repo_id, root) in repos {
            let storage_dir = root_storage_dir.join(repo_id);
            std::fs::create_dir_all(&storage_dir)?;
            let index_state: IndexState = if full {
                IndexState::new()
            } else {
                read_json(&storage_dir.join(INDEX_STATE_FILE))?.unwrap_or_default()
            };
            let plan = self.scan_and_chunk(repo_id, root, &index_state, full, Some(repo_id)).await?;
            per_repo_plans.push((repo_id.clone(), storage_dir, index_state, plan));
        }

        let no_dirty_files = !full
            && per_repo_plans
                .iter()
                .all(|(_, _, _, plan)| plan.changed.is_empty() && plan.deleted.is_empty());
        if no_dirty_files {
            let root_bm25_path = root_storage_dir.join(BM25_FILE);
            let root_missing_or_empty = !root_bm25_path.exists() || root_store.count().await? == 0;
            if root_missing_or_empty {
                info!("no dirty files but root index is missing or empty; rebuilding merged index from per-repo stores");
                return self.rebuild_merged_index(repos, root_storage_dir).await;
            }
        }

        let mut all_chunks: Vec<Chunk> = Vec::new();
        for (_, _, _, plan) in &per_repo_plans {
            all_chunks.extend(plan.chunks.iter().cloned());
        }

        let checkpoint_path = root_storage_dir.join(CHECKPOINT_FILE);
        let mut checkpoint: EnrichmentCheckpoint = read_json(&checkpoint_path)?.unwrap_or_default();
        if !all_chunks.is_empty() {
            self.enricher
                .enrich(&mut all_chunks, &mut checkpoint, |cp| write_json_atomic(&checkpoint_path, cp))
                .await?;
            let _ = std::fs::remove_file(&checkpoint_path);
        }

        let mut enriched_by_repo: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
        for chunk in all_chunks {
            enriched_by_repo
                .entry(chunk.repository_id().to_string())
                .or_default()
                .push(chunk);
        }

        let mut summaries = Vec::new();
        let mut root_bm25 = Bm25Index::new();
        let mut root_graph = DependencyGraph::new();

        for (repo_id, storage_dir, mut index_state, plan) in per_repo_plans {
            if plan.changed.is_empty() && plan.deleted.is_empty() && !full {
                summaries.push(IndexSummary {
                    repository_id: repo_id,
                    up_to_date: true,
                    files_scanned: plan.files_scanned,
                    ..Default::default()
                });
                continue;
            }

            let chunks = enriched_by_repo.remove(&repo_id).unwrap_or_default();
            let mut bm25: Bm25Index = if full {
                Bm25Index::new()
            } else {
                read_json(&storage_dir.join(BM25_FILE))?.unwrap_or_default()
            };
            let mut graph: DependencyGraph = if full {
                DependencyGraph::new()
            } else {
                read_json(&storage_dir.join(GRAPH_FILE))?.unwrap_or_default()
            };

            let repo_store = self.vector_store_factory.open(&repo_id).await?;
            let index_store = IndexStoreUseCase::new(repo_store.clone(), self.embedding_provider.clone());

            let apply_result = index_store
                .apply(
                    &repo_id,
                    &plan.changed,
                    &plan.deleted,
                    chunks,
                    &mut bm25,
                    &mut graph,
                    &mut index_state,
                )
                .await?;

            if !apply_result.written_ids.is_empty() {
                root_store
                    .upsert(&apply_result.written_ids, &apply_result.written_vectors, &apply_result.written_chunks)
                    .await?;
            }
            if !apply_result.retired_ids.is_empty() {
                root_store.delete_by_ids(&apply_result.retired_ids).await?;
            }

            let mut work_items_indexed = 0;
            if let Some(provider) = self.work_item_provider.clone() {
                work_items_indexed = self
                    .index_work_items(provider, repo_store, &repo_id, &storage_dir, &mut bm25, &mut graph, &apply_result.written_chunks)
                    .await?;
            }

            write_json_atomic(&storage_dir.join(BM25_FILE), &bm25)?;
            write_json_atomic(&storage_dir.join(GRAPH_FILE), &graph)?;
            write_json_atomic(&storage_dir.join(INDEX_STATE_FILE), &index_state)?;

            root_bm25.merge(&bm25);
            root_graph.merge(&graph);

            summaries.push(IndexSummary {
                repository_id: repo_id,
                up_to_date: false,
                files_scanned: plan.files_scanned,
                chunks_written: apply_result.chunks_written,
                chunks_retired: apply_result.chunks_retired,
                parse_errors: plan.parse_errors,
                skipped_files: plan.skipped_files,
                work_items_indexed,
            });
        }

        write_json_atomic(&root_storage_dir.join(BM25_FILE), &root_bm25)?;
        write_json_atomic(&root_storage_dir.join(GRAPH_FILE), &root_graph)?;

        let root_chunk_count = root_store.count().await?;
        Ok(MultiRepoSummary {
            root_chunk_count,
            per_repo: summaries,
        })
    }

    /// Recovery subroutine: reconstructs the root-level vector store, BM25,
    /// and graph purely from each repo's already-persisted per-repo
    /// artifacts — no re-scan, no re-chunk, no re-enrichment. Each per-repo
    /// store's rows (including any prior `nl_summary`) are copied into the
    /// root store via [`VectorStore::export_all`], for the case where root
    /// merging was introduced after per-repo indices already existed.
    pub async fn rebuild_merged_index(
        &self,
        repos: &[(String, PathBuf)],
        root_storage_dir: &Path,
    ) -> Result<MultiRepoSummary, DomainError> {
        std::fs::create_dir_all(root_storage_dir)?;
        let root_store = self.vector_store_factory.open(ROOT_NAMESPACE).await?;

        let mut root_bm25 = Bm25Index::new();
        let mut root_graph = DependencyGraph::new();
        let mut summaries = Vec::new();

        for (repo_id, _root) in repos {
            let storage_dir = root_storage_dir.join(repo_id);
            let bm25: Bm25Index = read_json(&storage_dir.join(BM25_FILE))?.unwrap_or_default();
            let graph: DependencyGraph = read_json(&storage_dir.join(GRAPH_FILE))?.unwrap_or_default();
            root_bm25.merge(&bm25);
            root_graph.merge(&graph);

            let repo_store = self.vector_store_factory.open(repo_id).await?;
            let rows = repo_store.export_all().await?;
            let chunks_written = rows.len();
            if !rows.is_empty() {
                let ids: Vec<String> = rows.iter().map(|(id, _, _)| id.clone()).collect();
                let vectors: Vec<Vec<f32>> = rows.iter().map(|(_, v, _)| v.clone()).collect();
                let chunks: Vec<Chunk> = rows.into_iter().map(|(_, _, c)| c).collect();
                root_store.upsert(&ids, &vectors, &chunks).await?;
            }

            summaries.push(IndexSummary {
                repository_id: repo_id.clone(),
                chunks_written,
                ..Default::default()
            });
        }

        write_json_atomic(&root_storage_dir.join(BM25_FILE), &root_bm25)?;
        write_json_atomic(&root_storage_dir.join(GRAPH_FILE), &root_graph)?;

        let root_chunk_count = root_store.count().await?;
        Ok(MultiRepoSummary {
            root_chunk_count,
            per_repo: summaries,
        })
    }

    /// Scans `root`, filters to dirty files (full reindex sees every file as
    /// dirty), parses and chunks each one. Parser/chunker failures never
    /// abort the scan — they accumulate into `parse_errors`/`skipped_files`
    /// and the remaining files are still processed. `repo_name` is stamped
    /// onto every produced chunk's metadata when set — the multi-repo path
    /// passes the repo id here, the single-repo path passes `None` so the
    /// field stays absent per the data model's single-repo/multi-repo
    /// invariant.
    async fn scan_and_chunk(
        &self,
        repository_id: &str,
        root: &Path,
        index_state: &IndexState,
        full: bool,
        repo_name: Option<&str>,
    ) -> Result<ScanChunkPlan, DomainError> {
        let scan_result = self.scanner.scan(root)?;
        let files_scanned = scan_result.files.len();

        let mut skipped_files: Vec<(String, String)> = scan_result
            .skipped
            .iter()
            .map(|s| (s.relative_path.clone(), s.reason.clone()))
            .collect();

        let scanned_paths: std::collections::BTreeSet<String> = scan_result
            .files
            .iter()
            .map(|f| f.relative_path.clone())
            .collect();
        let deleted: Vec<String> = index_state
            .known_paths()
            .filter(|p| !scanned_paths.contains(*p))
            .cloned()
            .collect();

        let mut changed: Vec<(String, String)> = Vec::new();
        let mut chunks = Vec::new();
        let mut parse_errors: Vec<(String, String)> = Vec::new();

        for file in scan_result.files {
            if !full && !index_state.is_dirty(&file.relative_path, &file.content_hash) {
                continue;
            }
            changed.push((file.relative_path.clone(), file.content_hash.clone()));

            let mut new_chunks = if file.relative_path.ends_with(".md") || file.relative_path.ends_with(".markdown") {
                self.chunker.chunk_markdown(repository_id, &file.relative_path, &file.content)
            } else {
                match self.parser.parse(&file.relative_path, &file.content).await {
                    Ok(Some(parsed)) => self.chunker.chunk(repository_id, &parsed),
                    Ok(None) => {
                        skipped_files.push((file.relative_path.clone(), "unsupported file type".to_string()));
                        continue;
                    }
                    Err(DomainError::Parse { file: f, reason }) => {
                        parse_errors.push((f, reason));
                        continue;
                    }
                    Err(other) => return Err(other),
                }
            };

            if let Some(repo_name) = repo_name {
                for chunk in &mut new_chunks {
                    chunk.set_repo_name(repo_name);
                }
            }
            chunks.extend(new_chunks);
        }

        Ok(ScanChunkPlan {
            files_scanned,
            changed,
            deleted,
            chunks,
            parse_errors,
            skipped_files,
        })
    }
}

struct ScanChunkPlan {
    files_scanned: usize,
    changed: Vec<(String, String)>,
    deleted: Vec<String>,
    chunks: Vec<Chunk>,
    parse_errors: Vec<(String, String)>,
    skipped_files: Vec<(String, String)>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, DomainError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let value = serde_json::from_str(&contents)
                .map_err(|e| DomainError::store(format!("failed to parse {}: {e}", path.display())))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::Io(e)),
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), DomainError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| DomainError::store(format!("failed to serialize {}: {e}", path.display())))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
