//! # Search service
//!
//! Orchestrates ingestion and querying over an [`EmbeddingStore`] and the
//! [`SimilarityIndex`] derived from it.
//!
//! ## Consistency
//! The loaded records and their index live together in a [`Corpus`], which can
//! only be built from a record sequence; the index inside it is always built
//! from exactly those records. The service swaps whole corpora, so a query
//! never pairs an index from one store generation with records from another.
//!
//! - Ingestions are serialized by a writer lock. The new corpus is built
//!   before anything is written, then persisted, then swapped in.
//! - Queries take a cheap `Arc` clone of the current corpus and run without
//!   holding any lock, so an ingestion in progress does not block them.
//!
//! ## Quick Example
//! ```no_run
//! use docsearch::embeddings::{SentenceEmbeddingsModel, DEFAULT_MODEL_ID};
//! use docsearch::service::SearchService;
//! use docsearch::store::EmbeddingStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load(DEFAULT_MODEL_ID, "main", false)?;
//! let service = SearchService::open(model, EmbeddingStore::new("embeddings.json"));
//! service.ingest(&["The cat sat", "Rockets launch into orbit"])?;
//! let response = service.query("feline on a mat", 1)?;
//! println!("{:?}", response.results);
//! # Ok(()) }
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::embeddings::Embedder;
use crate::error::{Result, SearchError};
use crate::index::SimilarityIndex;
use crate::store::{EmbeddingStore, Record};

/// Number of results returned when the caller does not ask for a specific `k`.
pub const DEFAULT_TOP_K: usize = 5;

/// A loaded store generation together with the index built from it.
#[derive(Debug)]
pub struct Corpus {
    records: Vec<Record>,
    index: SimilarityIndex,
}

impl Corpus {
    /// Build the index over `records`' vectors, position for position.
    ///
    /// # Errors
    /// [`SearchError::EmptyInput`], [`SearchError::DimensionMismatch`] or
    /// [`SearchError::NonFiniteVector`], as [`SimilarityIndex::build`].
    pub fn build(records: Vec<Record>) -> Result<Self> {
        let vectors: Vec<&[f64]> = records.iter().map(|r| r.vector.as_slice()).collect();
        let index = SimilarityIndex::build(&vectors)?;
        Ok(Self { records, index })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Nearest `k` records to `vector`, closest first, with `1 - distance` scores.
    pub fn search(&self, vector: &[f64], k: usize) -> Result<Vec<QueryHit>> {
        let neighbors = self.index.search(vector, k)?;
        Ok(neighbors
            .into_iter()
            .map(|n| {
                let record = &self.records[n.position];
                QueryHit {
                    id: record.id,
                    text: record.text.clone(),
                    score: n.score(),
                }
            })
            .collect())
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestStatus {
    pub status: &'static str,
    pub message: String,
    pub documents: usize,
}

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: u64,
    pub text: String,
    pub score: f64,
}

/// Ranked query results, closest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub results: Vec<QueryHit>,
}

/// Owns the store handle and the currently loaded corpus.
pub struct SearchService<E> {
    embedder: E,
    store: EmbeddingStore,
    ingest_lock: Mutex<()>,
    corpus: RwLock<Option<Arc<Corpus>>>,
    default_top_k: usize,
}

impl<E: Embedder> SearchService<E> {
    /// Open the service, loading whatever the store holds.
    ///
    /// Never fails: a missing store is a fresh deployment and a store that
    /// cannot be loaded or indexed is logged. Either way the service starts
    /// without a corpus and queries fail with [`SearchError::IndexUnavailable`]
    /// until the next successful ingestion.
    pub fn open(embedder: E, store: EmbeddingStore) -> Self {
        let corpus = match store.load().and_then(Corpus::build) {
            Ok(corpus) => {
                info!(
                    path = %store.path().display(),
                    documents = corpus.records().len(),
                    "Similarity index loaded"
                );
                Some(Arc::new(corpus))
            }
            Err(SearchError::NotFound { path }) => {
                info!(path = %path.display(), "No stored embeddings yet; starting empty");
                None
            }
            Err(SearchError::EmptyInput) => {
                warn!(path = %store.path().display(), "Stored embeddings are empty; starting without an index");
                None
            }
            Err(e) => {
                error!("Failed to load similarity index: {}", e);
                None
            }
        };

        Self {
            embedder,
            store,
            ingest_lock: Mutex::new(()),
            corpus: RwLock::new(corpus),
            default_top_k: DEFAULT_TOP_K,
        }
    }

    /// Override the `k` used by [`SearchService::query_default`].
    pub fn with_default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// `true` once a non-empty corpus is loaded.
    pub fn is_ready(&self) -> bool {
        self.current().is_some_and(|c| !c.index().is_empty())
    }

    /// Number of documents in the loaded corpus (0 when none is loaded).
    pub fn document_count(&self) -> usize {
        self.current().map_or(0, |c| c.records().len())
    }

    fn current(&self) -> Option<Arc<Corpus>> {
        self.corpus.read().clone()
    }

    /// Embed `texts`, replace the stored collection with them and rebuild the index.
    ///
    /// Ids are assigned `0..n` in input order. Any previous collection is
    /// discarded. On error neither the store nor the loaded corpus changes.
    ///
    /// # Errors
    /// [`SearchError::EmptyInput`], [`SearchError::Embedding`],
    /// [`SearchError::DimensionMismatch`] if the embedder is inconsistent,
    /// [`SearchError::NonFiniteVector`] if it yields NaN or infinity, or
    /// [`SearchError::Persistence`].
    pub fn ingest<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Result<IngestStatus> {
        if texts.is_empty() {
            return Err(SearchError::EmptyInput);
        }

        let _writer = self.ingest_lock.lock();

        let vectors = texts
            .par_iter()
            .map(|t| self.embedder.embed(t.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let records: Vec<Record> = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(id, (text, vector))| Record::new(id as u64, text.as_ref(), vector))
            .collect();

        let corpus = Corpus::build(records)?;
        self.store.save(corpus.records())?;

        let documents = corpus.records().len();
        *self.corpus.write() = Some(Arc::new(corpus));
        info!(documents, "Documents encoded and index rebuilt");

        Ok(IngestStatus {
            status: "success",
            message: "Documents encoded and saved.".to_string(),
            documents,
        })
    }

    /// Read non-empty, trimmed lines from `path` and [`ingest`](Self::ingest) them.
    ///
    /// # Errors
    /// - [`SearchError::SourceNotFound`] if the file cannot be opened.
    /// - [`SearchError::InvalidSource`] if it opens but cannot be read as UTF-8 text.
    /// - Everything `ingest` returns (an all-blank file is `EmptyInput`).
    pub fn ingest_from_source(&self, path: impl AsRef<Path>) -> Result<IngestStatus> {
        let path = path.as_ref();
        let documents = read_documents(path)?;
        debug!(path = %path.display(), documents = documents.len(), "Read document source");
        self.ingest(&documents)
    }

    /// Return the `k` stored documents closest to `text`.
    ///
    /// # Errors
    /// - [`SearchError::EmptyQuery`] if `text` is blank.
    /// - [`SearchError::IndexUnavailable`] if no corpus is loaded.
    /// - [`SearchError::Embedding`] / [`SearchError::DimensionMismatch`] from the embedder.
    pub fn query(&self, text: &str, k: usize) -> Result<QueryResponse> {
        if text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let corpus = self
            .current()
            .filter(|c| !c.index().is_empty())
            .ok_or(SearchError::IndexUnavailable)?;

        let vector = self.embedder.embed(text)?;
        let results = corpus.search(&vector, k)?;
        debug!(query = text, k, hits = results.len(), "Query resolved");

        Ok(QueryResponse { results })
    }

    /// [`query`](Self::query) with the configured default `k`.
    pub fn query_default(&self, text: &str) -> Result<QueryResponse> {
        self.query(text, self.default_top_k)
    }
}

fn read_documents(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|source| SearchError::SourceNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|source| SearchError::InvalidSource {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{DEFAULT_MODEL_ID, ModelError, SentenceEmbeddingsModel};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    /// Character-frequency vectors over `a-z0-9`, case-insensitive.
    struct CharFrequency {
        calls: AtomicUsize,
    }

    impl CharFrequency {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for CharFrequency {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f64>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; 36];
            for c in text.to_lowercase().chars() {
                if let Some(d) = c.to_digit(36) {
                    let slot = if d < 10 { 26 + d } else { d - 10 };
                    v[slot as usize] += 1.0;
                }
            }
            Ok(v)
        }
    }

    /// Returns a vector whose length depends on the text.
    struct Ragged;

    impl Embedder for Ragged {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(vec![1.0; text.len()])
        }
    }

    /// Yields an infinite component for texts containing `!`.
    struct Overflowing;

    impl Embedder for Overflowing {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f64>, ModelError> {
            let first = if text.contains('!') { f64::INFINITY } else { 1.0 };
            Ok(vec![first, text.len() as f64])
        }
    }

    fn service(dir: &TempDir) -> SearchService<CharFrequency> {
        SearchService::open(
            CharFrequency::new(),
            EmbeddingStore::new(dir.path().join("embeddings.json")),
        )
    }

    fn texts(response: &QueryResponse) -> Vec<&str> {
        response.results.iter().map(|h| h.text.as_str()).collect()
    }

    #[test]
    fn test_query_returns_each_ingested_text_first() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let docs = ["Rust is cool.", "I love programming.", "Zebras graze at dawn"];
        svc.ingest(&docs).unwrap();

        for (i, doc) in docs.iter().enumerate() {
            let top = &svc.query(doc, 1).unwrap().results[0];
            assert_eq!(top.id, i as u64);
            assert_eq!(top.text, *doc);
            assert_eq!(top.score, 1.0);
        }
    }

    #[test]
    fn test_ingest_assigns_sequential_ids_and_replaces() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let status = svc.ingest(&["a", "b", "c"]).unwrap();
        assert_eq!(status.status, "success");
        assert_eq!(status.documents, 3);
        let ids: Vec<u64> = svc.store().load().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        svc.ingest(&["x", "y"]).unwrap();
        let stored = svc.store().load().unwrap();
        assert_eq!(
            stored.iter().map(|r| (r.id, r.text.as_str())).collect::<Vec<_>>(),
            vec![(0, "x"), (1, "y")]
        );
        assert_eq!(svc.document_count(), 2);

        let all = svc.query("a", 10).unwrap();
        assert_eq!(all.results.len(), 2);
        assert!(!texts(&all).contains(&"a"));
    }

    #[test]
    fn test_empty_ingest_changes_nothing() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let none: [&str; 0] = [];

        assert!(matches!(svc.ingest(&none), Err(SearchError::EmptyInput)));
        assert!(!svc.store().path().exists());
        assert!(matches!(
            svc.query("anything", 1),
            Err(SearchError::IndexUnavailable)
        ));

        svc.ingest(&["kept"]).unwrap();
        assert!(matches!(svc.ingest(&none), Err(SearchError::EmptyInput)));
        assert_eq!(svc.store().load().unwrap().len(), 1);
        assert_eq!(svc.query("kept", 1).unwrap().results[0].text, "kept");
    }

    #[test]
    fn test_blank_query_is_rejected() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        svc.ingest(&["doc"]).unwrap();

        assert!(matches!(svc.query("", 5), Err(SearchError::EmptyQuery)));
        assert!(matches!(svc.query("  \n\t", 5), Err(SearchError::EmptyQuery)));
    }

    #[test]
    fn test_query_before_ingest_is_unavailable() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        assert!(!svc.is_ready());
        assert!(matches!(
            svc.query("Test", 5),
            Err(SearchError::IndexUnavailable)
        ));
        assert_eq!(svc.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_results_ordered_by_distance_then_position() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        // "ab" and "ba" embed identically; "abc" is one step away, "zzzz" far
        svc.ingest(&["zzzz", "ba", "abc", "ab"]).unwrap();

        let response = svc.query("ab", 4).unwrap();
        assert_eq!(texts(&response), vec!["ba", "ab", "abc", "zzzz"]);
        assert!(
            response
                .results
                .windows(2)
                .all(|w| w[0].score >= w[1].score)
        );
        assert_eq!(response.results[2].score, 0.0);
        // 1 - distance is unbounded below
        assert!(response.results[3].score < 0.0);
    }

    #[test]
    fn test_ingest_from_source_trims_and_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let source = dir.path().join("documents.txt");
        fs::write(&source, "Document 1\n\n   Document 2  \n\t\nDocument 3\n").unwrap();

        let status = svc.ingest_from_source(&source).unwrap();
        assert_eq!(status.documents, 3);
        let stored: Vec<String> = svc
            .store()
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(stored, vec!["Document 1", "Document 2", "Document 3"]);
        assert_eq!(svc.query("document 2", 1).unwrap().results[0].id, 1);
    }

    #[test]
    fn test_ingest_from_missing_source_changes_nothing() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        svc.ingest(&["original"]).unwrap();

        let err = svc
            .ingest_from_source(dir.path().join("nonexistent.txt"))
            .unwrap_err();
        assert!(matches!(err, SearchError::SourceNotFound { .. }));
        assert_eq!(svc.store().load().unwrap()[0].text, "original");
        assert_eq!(svc.document_count(), 1);
    }

    #[test]
    fn test_ingest_from_blank_source_is_empty_input() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let source = dir.path().join("blank.txt");
        fs::write(&source, "\n   \n").unwrap();

        assert!(matches!(
            svc.ingest_from_source(&source),
            Err(SearchError::EmptyInput)
        ));
    }

    #[test]
    fn test_inconsistent_embedder_does_not_persist() {
        let dir = tempdir().unwrap();
        let svc = SearchService::open(Ragged, EmbeddingStore::new(dir.path().join("e.json")));

        assert!(matches!(
            svc.ingest(&["one", "three"]),
            Err(SearchError::DimensionMismatch { .. })
        ));
        assert!(!svc.store().path().exists());
        assert!(!svc.is_ready());
    }

    #[test]
    fn test_non_finite_embedding_leaves_store_and_index_untouched() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        let svc = SearchService::open(Overflowing, store.clone());
        svc.ingest(&["calm", "steady"]).unwrap();

        assert!(matches!(
            svc.ingest(&["fine", "boom!"]),
            Err(SearchError::NonFiniteVector { position: 1 })
        ));
        let stored: Vec<String> = store.load().unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(stored, vec!["calm", "steady"]);
        assert_eq!(svc.document_count(), 2);

        // what was persisted still recovers in full
        assert_eq!(SearchService::open(Overflowing, store).document_count(), 2);
    }

    #[test]
    fn test_ingest_from_non_utf8_source_is_invalid() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        let source = dir.path().join("latin1.txt");
        fs::write(&source, b"caf\xe9\nDocument 2\n").unwrap();

        assert!(matches!(
            svc.ingest_from_source(&source),
            Err(SearchError::InvalidSource { .. })
        ));
        assert!(!svc.store().path().exists());
    }

    #[test]
    #[ignore = "downloads model weights from the Hugging Face Hub"]
    fn test_semantic_query_ranks_related_document_first() {
        let dir = tempdir().unwrap();
        let model = SentenceEmbeddingsModel::load(DEFAULT_MODEL_ID, "main", false).unwrap();
        let svc = SearchService::open(model, EmbeddingStore::new(dir.path().join("e.json")));
        svc.ingest(&["The cat sat", "Rockets launch into orbit"]).unwrap();

        let response = svc.query("feline on a mat", 1).unwrap();
        assert_eq!(response.results.len(), 1);
        let top = &response.results[0];
        assert_eq!((top.id, top.text.as_str()), (0, "The cat sat"));

        let both = svc.query("feline on a mat", 2).unwrap().results;
        assert!(both[0].score > both[1].score);
    }

    #[test]
    fn test_startup_recovers_saved_collection() {
        let dir = tempdir().unwrap();
        service(&dir).ingest(&["The cat sat", "Rockets launch"]).unwrap();

        let reopened = service(&dir);
        assert!(reopened.is_ready());
        assert_eq!(reopened.document_count(), 2);
        let top = &reopened.query("rockets", 1).unwrap().results[0];
        assert_eq!((top.id, top.text.as_str()), (1, "Rockets launch"));
    }

    #[test]
    fn test_startup_with_corrupt_store_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("embeddings.json"), "not json").unwrap();

        let svc = service(&dir);
        assert!(!svc.is_ready());
        assert!(matches!(
            svc.query("Test", 1),
            Err(SearchError::IndexUnavailable)
        ));

        svc.ingest(&["fresh"]).unwrap();
        assert!(svc.is_ready());
    }

    #[test]
    fn test_startup_with_empty_collection_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("embeddings.json"), "[]").unwrap();
        assert!(!service(&dir).is_ready());
    }

    #[test]
    fn test_query_default_uses_configured_k() {
        let dir = tempdir().unwrap();
        let svc = service(&dir).with_default_top_k(2);
        svc.ingest(&["a", "b", "c", "d"]).unwrap();
        assert_eq!(svc.query_default("a").unwrap().results.len(), 2);
    }

    #[test]
    fn test_concurrent_queries_see_whole_generations() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        svc.ingest(&["alpha", "beta"]).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for round in 0..20 {
                    let batch: Vec<String> = (0..3).map(|i| format!("gen{round} doc{i}")).collect();
                    svc.ingest(&batch).unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..50 {
                    let results = svc.query("doc", 10).unwrap().results;
                    // ids always cover exactly one generation's positions
                    let ids: Vec<u64> = results.iter().map(|h| h.id).collect();
                    let mut sorted = ids.clone();
                    sorted.sort_unstable();
                    assert!(sorted == vec![0, 1] || sorted == vec![0, 1, 2]);
                    if sorted.len() == 3 {
                        let generation = results[0].text.split(' ').next().unwrap();
                        assert!(results.iter().all(|h| h.text.starts_with(generation)));
                    }
                }
            });
        });
    }
}
