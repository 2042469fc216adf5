//! # Embeddings
//!
//! Text-to-vector capability used by the search service.
//!
//! The service only depends on the [`Embedder`] trait, so any deterministic
//! `embed(text) -> Vec<f64>` function can be plugged in. The default
//! implementation, [`SentenceEmbeddingsModel`], runs a BERT sentence
//! transformer through Candle (pure Rust ML framework) with weights fetched
//! from the Hugging Face Hub.
//!
//! ## Pipeline
//! 1. Tokenize (the tokenizer truncates at the model's maximum length).
//! 2. Forward pass through `BertModel`.
//! 3. Mean pooling over tokens, weighted by the attention mask.
//! 4. Optional L2 normalization.
//!
//! ## Quick Example
//! ```no_run
//! use docsearch::embeddings::{Embedder, SentenceEmbeddingsModel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load(
//!     "sentence-transformers/paraphrase-MiniLM-L6-v2",
//!     "main",
//!     false,
//! )?;
//! let v = model.embed("Rust is great!")?;
//! println!("{} dimensions", v.len());
//! # Ok(()) }
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use thiserror::Error;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Default sentence-transformer used when the configuration names none.
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/paraphrase-MiniLM-L6-v2";

/// Errors raised while loading or running the embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model download failed: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    #[error("tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The external embedding capability: deterministic `embed(text) -> vector`.
///
/// Implementations must return vectors of the same length for every input.
/// `Sync` is required because ingestion embeds a batch in parallel.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        (**self).embed(text)
    }
}

/// Sentence embeddings model using Candle (pure Rust).
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    normalize: bool,
}

impl SentenceEmbeddingsModel {
    /// Load `model_id` at `revision` from the Hugging Face Hub (cached locally after
    /// the first download).
    ///
    /// # Errors
    /// Network/cache failures, a malformed `config.json`, an unreadable tokenizer
    /// or weights that do not match the BERT architecture.
    pub fn load(model_id: &str, revision: &str, normalize: bool) -> Result<Self, ModelError> {
        let device = Device::Cpu;

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        info!(model_id, revision, "Embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            normalize,
        })
    }

    /// Encode text into an embedding.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        debug!(tokens = tokens.len(), "Encoding text");

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        let mut embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        if self.normalize {
            embedding = Self::normalize(&embedding)?;
        }

        Ok(embedding.to_vec1::<f32>()?)
    }

    /// Mean pooling over token embeddings, considering attention mask.
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor, ModelError> {
        // embeddings: [1, seq_len, hidden]; mask needs [1, seq_len, 1] to broadcast
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }

    fn normalize(tensor: &Tensor) -> Result<Tensor, ModelError> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn embed(&self, text: &str) -> Result<Vec<f64>, ModelError> {
        Ok(self.encode(text)?.into_iter().map(f64::from).collect())
    }
}
