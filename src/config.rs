//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `DocSearchConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a file.
//!
//! Every field has a default, so a partial (or empty) YAML document is valid.
//!
//! # Examples
//!
//! ```no_run
//! use docsearch::config::{DocSearchConfig, load_config};
//!
//! let config: DocSearchConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::PathBuf};

use tracing::debug;

use crate::embeddings::DEFAULT_MODEL_ID;
use crate::service::DEFAULT_TOP_K;

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct DocSearchConfig {
    /// Path of the persisted embeddings file.
    pub store_path: PathBuf,

    /// Number of results returned by a search when none is requested.
    pub default_top_k: usize,

    /// Hugging Face Hub repository of the sentence embedding model.
    pub model_id: String,

    /// Model revision (branch, tag or commit).
    pub revision: String,

    // L2-normalize embeddings before storing/searching them.
    pub normalize_embeddings: bool,
}

impl Default for DocSearchConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("embeddings.json"),
            default_top_k: DEFAULT_TOP_K,
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            normalize_embeddings: false,
        }
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid configuration.
pub fn load_config(file: &str) -> Result<DocSearchConfig, Box<dyn Error>> {
    debug!("Loading config from {}", file);
    let content = fs::read_to_string(file)?;
    let config: DocSearchConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
