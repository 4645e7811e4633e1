use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resumable state for the Enricher phase. Created on enrichment start if
/// absent, overwritten after every batch, deleted once the enrichment phase
/// completes successfully. `summaries` is keyed by full (repo-namespaced)
/// chunk id so a single checkpoint can cover the multi-repo shared
/// enrichment phase as well as the single-repo path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentCheckpoint {
    summaries: BTreeMap<String, String>,
    total_processed: usize,
}

impl EnrichmentCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_processed(&self) -> usize {
        self.total_processed
    }

    pub fn summaries(&self) -> &BTreeMap<String, String> {
        &self.summaries
    }

    pub fn summary_for(&self, chunk_id: &str) -> Option<&str> {
        self.summaries.get(chunk_id).map(|s| s.as_str())
    }

    pub fn is_enriched(&self, chunk_id: &str) -> bool {
        self.summaries.contains_key(chunk_id)
    }

    /// Records one chunk's summary and advances the processed counter. Called
    /// once per chunk in a completed (even if partially successful) batch.
    pub fn record(&mut self, chunk_id: String, summary: String) {
        self.summaries.insert(chunk_id, summary);
        self.total_processed += 1;
    }

    /// Advances the processed counter for a chunk that failed enrichment
    /// without producing a summary, so batch accounting stays accurate.
    pub fn record_failure(&mut self) {
        self.total_processed += 1;
    }
}
