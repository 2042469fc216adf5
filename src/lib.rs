//! # docsearch (library root)
//!
//! Turns text documents into vector embeddings, stores them and answers
//! nearest-neighbor similarity queries against that store.
//!
//! - [`store`]: durable `(id, text, vector)` collection, replaced as a whole.
//! - [`index`]: exact squared-L2 similarity index, rebuilt from the store.
//! - [`service`]: ingestion, querying and startup recovery over a consistent
//!   (store, index) pair.
//! - [`embeddings`]: the text-to-vector capability (Candle sentence transformer).
//! - [`config`], [`commands`]: YAML configuration and the CLI surface.
//! - [`error`]: the error taxonomy shared by all of the above.
//!
//! ## Example
//! ```no_run
//! use docsearch::{config::DocSearchConfig, embeddings::SentenceEmbeddingsModel};
//! use docsearch::{service::SearchService, store::EmbeddingStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DocSearchConfig::default();
//! let model = SentenceEmbeddingsModel::load(&config.model_id, &config.revision, false)?;
//! let service = SearchService::open(model, EmbeddingStore::new(&config.store_path));
//! service.ingest_from_source("articles.txt")?;
//! for hit in service.query_default("contract law")?.results {
//!     println!("{} {:.2} {}", hit.id, hit.score, hit.text);
//! }
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod service;
pub mod store;

pub use error::{ErrorCategory, Result, SearchError};

/// Return the per-platform configuration directory used by docsearch.
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> std::result::Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "docsearch", "docsearch")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
