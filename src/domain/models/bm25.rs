use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Splits an identifier into lowercase tokens on whitespace, punctuation,
/// `camelCase`, and `snake_case` boundaries, the way an identifier-aware
/// lexical index must to make `fooBar` and `foo_bar` both match a query for
/// `bar`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            current.push(ch.to_ascii_lowercase());
            prev_lower = ch.is_lowercase() || ch.is_numeric();
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens.retain(|t| !t.is_empty());
    tokens
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Posting {
    doc_id: String,
    term_frequency: u32,
}

/// Inverted-text index with classic Okapi BM25 scoring. `BTreeMap`/`BTreeSet`
/// are used throughout (not hash collections) so `serialize()` produces a
/// byte-identical document across runs over the same input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bm25Index {
    postings: BTreeMap<String, Vec<Posting>>,
    doc_lengths: BTreeMap<String, u32>,
    total_length: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn document_ids(&self) -> BTreeSet<String> {
        self.doc_lengths.keys().cloned().collect()
    }

    fn average_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// Adds one document's text under `doc_id`. A pre-existing `doc_id` is
    /// removed first so re-adding behaves as a replace.
    pub fn add(&mut self, doc_id: &str, text: &str) {
        self.remove_by_ids(&[doc_id.to_string()]);

        let tokens = tokenize(text);
        if tokens.is_empty() {
            self.doc_lengths.insert(doc_id.to_string(), 0);
            return;
        }

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, freq) in counts {
            self.postings.entry(term).or_default().push(Posting {
                doc_id: doc_id.to_string(),
                term_frequency: freq,
            });
        }

        self.doc_lengths.insert(doc_id.to_string(), tokens.len() as u32);
        self.total_length += tokens.len() as u64;
    }

    /// Merges `other`'s postings and lengths into `self`, assuming disjoint
    /// doc id sets (true of a multi-repo root merge, since every chunk id is
    /// already namespaced by its file path). Posting lists and doc-length
    /// sums are simply additive, so the result is identical to having built
    /// one index from the union of both inputs' documents.
    pub fn merge(&mut self, other: &Bm25Index) {
        for (term, postings) in &other.postings {
            self.postings
                .entry(term.clone())
                .or_default()
                .extend(postings.iter().cloned());
        }
        for (doc_id, len) in &other.doc_lengths {
            self.doc_lengths.insert(doc_id.clone(), *len);
        }
        self.total_length += other.total_length;
    }

    /// Removes every posting and length entry for the given ids.
    pub fn remove_by_ids(&mut self, doc_ids: &[String]) {
        let to_remove: BTreeSet<&String> = doc_ids.iter().collect();
        for postings in self.postings.values_mut() {
            postings.retain(|p| !to_remove.contains(&p.doc_id));
        }
        self.postings.retain(|_, postings| !postings.is_empty());

        for id in doc_ids {
            if let Some(len) = self.doc_lengths.remove(id) {
                self.total_length = self.total_length.saturating_sub(len as u64);
            }
        }
    }

    /// Okapi BM25 search over the index. Returns `(doc_id, score)` pairs
    /// sorted descending by score, ties broken by doc id ascending, limited
    /// to `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.doc_lengths.is_empty() {
            return Vec::new();
        }

        let n = self.doc_lengths.len() as f32;
        let avg_len = self.average_doc_length();
        let mut scores: BTreeMap<String, f32> = BTreeMap::new();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings {
                let doc_len = *self.doc_lengths.get(&posting.doc_id).unwrap_or(&0) as f32;
                let tf = posting.term_frequency as f32;
                let denom = tf + K1 * (1.0 - B + B * (doc_len / avg_len.max(1.0)));
                let score = idf * (tf * (K1 + 1.0)) / denom.max(f32::EPSILON);
                *scores.entry(posting.doc_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut results: Vec<(String, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(limit);
        results
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
