//! # EmbeddingStore
//!
//! Durable record of `(id, text, vector)` triples: the single source of truth
//! the similarity index is rebuilt from.
//!
//! ## Serialization layout
//! One JSON array, each element
//! `{"id": <int>, "text": <string>, "embedding": [<float>, ...]}`.
//!
//! The collection is always written as a whole. [`EmbeddingStore::save`]
//! writes a temporary file next to the target and renames it into place, so a
//! reader sees either the previous collection or the new one.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, SearchError};

/// One stored document: its batch position, its text and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub text: String,
    #[serde(rename = "embedding")]
    pub vector: Vec<f64>,
}

impl Record {
    pub fn new(id: u64, text: impl Into<String>, vector: Vec<f64>) -> Self {
        Self {
            id,
            text: text.into(),
            vector,
        }
    }
}

/// Handle to the embeddings file on disk.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored collection with `records`.
    ///
    /// # Errors
    /// - [`SearchError::DimensionMismatch`] if the vectors differ in length.
    /// - [`SearchError::NonFiniteVector`] if a component is NaN or infinite (JSON
    ///   would store it as `null` and the next `load` would fail).
    /// - [`SearchError::Persistence`] if the directory or file cannot be written.
    pub fn save(&self, records: &[Record]) -> Result<()> {
        check_vectors(records)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        self.write_atomically(dir, records)
            .map_err(|source| SearchError::Persistence {
                path: self.path.clone(),
                source,
            })?;

        info!(
            path = %self.path.display(),
            records = records.len(),
            "Embeddings saved"
        );
        Ok(())
    }

    fn write_atomically(&self, dir: &Path, records: &[Record]) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, records)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read the stored collection.
    ///
    /// # Errors
    /// - [`SearchError::NotFound`] if nothing has been saved at this path.
    /// - [`SearchError::Unreadable`] if the file exists but cannot be read.
    /// - [`SearchError::CorruptData`] if the bytes are not a record array or mix
    ///   vector lengths.
    pub fn load(&self) -> Result<Vec<Record>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SearchError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(SearchError::Unreadable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let records: Vec<Record> =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        check_vectors(&records).map_err(|e| self.corrupt(e.to_string()))?;

        debug!(path = %self.path.display(), records = records.len(), "Embeddings loaded");
        Ok(records)
    }

    fn corrupt(&self, reason: String) -> SearchError {
        SearchError::CorruptData {
            path: self.path.clone(),
            reason,
        }
    }
}

fn check_vectors(records: &[Record]) -> Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let expected = first.vector.len();
    for (position, record) in records.iter().enumerate() {
        if record.vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: record.vector.len(),
            });
        }
        if !record.vector.iter().all(|x| x.is_finite()) {
            return Err(SearchError::NonFiniteVector { position });
        }
    }
    Ok(())
}
