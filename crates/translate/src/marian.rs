//! Local OPUS-MT (Marian) translation on candle
//!
//! Model files are looked up under `<models_dir>/<model-id>/` first and
//! fetched from the Hugging Face hub otherwise. Both the upstream layout
//! (`pytorch_model.bin`, `source.spm`, `vocab.json`) and converted layouts
//! (`model.safetensors`, `tokenizer.json`) are accepted. Generation is greedy
//! and capped at `max_length` tokens.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::marian::{Config, MTModel};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use quicktrans_common::{LanguagePair, QuickTransError, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::backend::{TranslationBackend, Translator};
use crate::spm::SentencePieceVocab;

const CONFIG_FILE: &str = "config.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PTH_FILE: &str = "pytorch_model.bin";
const TOKENIZER_FILE: &str = "tokenizer.json";
const TARGET_TOKENIZER_FILE: &str = "tokenizer-target.json";
const SOURCE_SPM_FILE: &str = "source.spm";
const VOCAB_FILE: &str = "vocab.json";

/// Weight files in order of preference
const WEIGHTS_FILES: &[&str] = &[SAFETENSORS_FILE, PTH_FILE];

/// How text is turned into model ids and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarianVocab {
    /// Converted `tokenizer.json`, with an optional decoder-side tokenizer
    Tokenizer { source: PathBuf, target: Option<PathBuf> },
    /// Upstream SentencePiece model plus `vocab.json`
    SentencePiece { source_spm: PathBuf, vocab: PathBuf },
}

impl MarianVocab {
    fn in_dir(dir: &Path) -> Option<Self> {
        let tokenizer = dir.join(TOKENIZER_FILE);
        if tokenizer.is_file() {
            let target = dir.join(TARGET_TOKENIZER_FILE);
            return Some(Self::Tokenizer {
                source: tokenizer,
                target: target.is_file().then_some(target),
            });
        }

        let source_spm = dir.join(SOURCE_SPM_FILE);
        let vocab = dir.join(VOCAB_FILE);
        (source_spm.is_file() && vocab.is_file()).then_some(Self::SentencePiece { source_spm, vocab })
    }
}

/// Files making up one Marian model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarianFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub vocab: MarianVocab,
}

impl MarianFiles {
    /// Files under a local model directory, if all required ones are present
    pub fn in_dir(dir: &Path) -> Option<Self> {
        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            return None;
        }

        let weights = WEIGHTS_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())?;

        Some(Self {
            config,
            weights,
            vocab: MarianVocab::in_dir(dir)?,
        })
    }
}

/// Read a Marian `config.json`, filling keys older checkpoints leave out
pub fn read_config(path: &Path) -> Result<Config> {
    let invalid = |e: serde_json::Error| QuickTransError::model_load(format!("Invalid Marian config: {}", e));

    let mut value: Value = serde_json::from_reader(std::fs::File::open(path)?).map_err(invalid)?;
    let fields = value
        .as_object_mut()
        .ok_or_else(|| QuickTransError::model_load("Invalid Marian config: not a JSON object"))?;

    let eos = fields.get("eos_token_id").cloned().unwrap_or(json!(0));
    for (key, default) in [
        ("forced_eos_token_id", eos),
        ("share_encoder_decoder_embeddings", json!(true)),
        ("scale_embedding", json!(true)),
        ("use_cache", json!(true)),
        ("is_encoder_decoder", json!(true)),
    ] {
        if fields.get(key).map_or(true, Value::is_null) {
            fields.insert(key.to_string(), default);
        }
    }

    serde_json::from_value(value).map_err(invalid)
}

fn is_safetensors(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("safetensors")
}

fn candle_err(context: &str) -> impl Fn(candle_core::Error) -> QuickTransError + '_ {
    move |e| QuickTransError::processing(format!("{}: {}", context, e))
}

enum TextCodec {
    Tokenizer { source: Tokenizer, target: Tokenizer },
    SentencePiece(SentencePieceVocab),
}

impl TextCodec {
    fn load(vocab: &MarianVocab) -> Result<Self> {
        match vocab {
            MarianVocab::Tokenizer { source, target } => {
                let source = Tokenizer::from_file(source)
                    .map_err(|e| QuickTransError::model_load(format!("Failed to load tokenizer: {}", e)))?;
                let target = match target {
                    Some(path) => Tokenizer::from_file(path).map_err(|e| {
                        QuickTransError::model_load(format!("Failed to load target tokenizer: {}", e))
                    })?,
                    None => source.clone(),
                };
                Ok(Self::Tokenizer { source, target })
            }
            MarianVocab::SentencePiece { source_spm, vocab } => {
                Ok(Self::SentencePiece(SentencePieceVocab::load(source_spm, vocab)?))
            }
        }
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        match self {
            Self::Tokenizer { source, .. } => source
                .encode(text, true)
                .map(|encoding| encoding.get_ids().to_vec())
                .map_err(|e| QuickTransError::processing(format!("Tokenization failed: {}", e))),
            Self::SentencePiece(vocab) => vocab.encode(text),
        }
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        match self {
            Self::Tokenizer { target, .. } => target
                .decode(ids, true)
                .map_err(|e| QuickTransError::processing(format!("Detokenization failed: {}", e))),
            Self::SentencePiece(vocab) => Ok(vocab.decode(ids)),
        }
    }
}

/// A loaded Marian model and its vocabulary
pub struct MarianModel {
    model: Mutex<MTModel>,
    config: Config,
    codec: TextCodec,
    device: Device,
    max_length: usize,
}

impl MarianModel {
    /// Load weights and vocabulary (blocking)
    pub fn load(files: &MarianFiles, device: Device, max_length: usize) -> Result<Self> {
        let config = read_config(&files.config)?;
        let codec = TextCodec::load(&files.vocab)?;

        let vb = if is_safetensors(&files.weights) {
            // SAFETY: the weights file is not modified while mapped
            unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device) }
        } else {
            VarBuilder::from_pth(&files.weights, DType::F32, &device)
        }
        .map_err(|e| QuickTransError::model_load(format!("Failed to read weights: {}", e)))?;

        let model = MTModel::new(&config, vb)
            .map_err(|e| QuickTransError::model_load(format!("Failed to build Marian model: {}", e)))?;

        Ok(Self {
            model: Mutex::new(model),
            config,
            codec,
            device,
            max_length: max_length.max(1),
        })
    }

    /// Translate one text (blocking)
    pub fn generate(&self, text: &str) -> Result<String> {
        let mut source_ids = self.codec.encode(text)?;
        source_ids.truncate(self.max_length.saturating_sub(1).max(1));
        source_ids.push(self.config.eos_token_id);

        let mut model = self
            .model
            .lock()
            .map_err(|_| QuickTransError::processing("Marian model lock poisoned"))?;

        let output = self.decode_greedy(&mut model, &source_ids);
        model.reset_kv_cache();
        let output = output?;

        Ok(self.codec.decode(&output)?.trim().to_string())
    }

    fn decode_greedy(&self, model: &mut MTModel, source_ids: &[u32]) -> Result<Vec<u32>> {
        let input = Tensor::new(source_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("Failed to build input tensor"))?;

        let encoder_xs = model
            .encoder()
            .forward(&input, 0)
            .map_err(candle_err("Encoder failed"))?;

        let mut logits_processor = LogitsProcessor::new(0, None, None);
        let mut token_ids = vec![self.config.decoder_start_token_id];

        for step in 0..self.max_length {
            // Full prefix on the first step, then only the newest token
            let context_size = if step >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);

            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(candle_err("Failed to build decoder input"))?;

            let logits = model
                .decode(&input_ids, &encoder_xs, start_pos)
                .and_then(|l| l.squeeze(0))
                .and_then(|l| {
                    let last = l.dim(0)? - 1;
                    l.get(last)
                })
                .map_err(candle_err("Decoder failed"))?;

            let token = logits_processor
                .sample(&logits)
                .map_err(candle_err("Sampling failed"))?;

            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        if token_ids.len() > self.max_length {
            debug!("Translation hit the {} token limit", self.max_length);
        }

        Ok(token_ids.split_off(1))
    }
}

/// Resolves OPUS-MT models from the models directory or the hub
pub struct MarianBackend {
    models_dir: PathBuf,
    device: Device,
    max_length: usize,
}

impl MarianBackend {
    pub fn new(models_dir: PathBuf, max_length: usize) -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        Self {
            models_dir,
            device,
            max_length,
        }
    }

    /// Local directory for a hub model id
    pub fn local_dir(&self, model_id: &str) -> PathBuf {
        self.models_dir.join(model_id)
    }

    fn hub_api(&self) -> Result<Api> {
        let builder = ApiBuilder::new()
            .with_progress(false)
            .with_cache_dir(self.models_dir.join("hub"))
            .with_token(std::env::var("HF_TOKEN").ok());

        builder
            .build()
            .map_err(|e| QuickTransError::model_load(format!("Failed to create hub client: {}", e)))
    }

    /// Find the model files locally, downloading them if needed
    pub async fn resolve_files(&self, model_id: &str) -> Result<MarianFiles> {
        let local = self.local_dir(model_id);
        if let Some(files) = MarianFiles::in_dir(&local) {
            debug!("Using local model files in {}", local.display());
            return Ok(files);
        }

        info!("Fetching {} from the Hugging Face hub", model_id);
        let repo = self.hub_api()?.model(model_id.to_string());

        let config = fetch_first(&repo, model_id, &[CONFIG_FILE]).await?;
        let weights = fetch_first(&repo, model_id, WEIGHTS_FILES).await?;

        let vocab = match repo.get(TOKENIZER_FILE).await {
            Ok(source) => MarianVocab::Tokenizer {
                source,
                target: repo.get(TARGET_TOKENIZER_FILE).await.ok(),
            },
            Err(e) => {
                debug!("No {} for {} ({}), using SentencePiece files", TOKENIZER_FILE, model_id, e);
                MarianVocab::SentencePiece {
                    source_spm: fetch_first(&repo, model_id, &[SOURCE_SPM_FILE]).await?,
                    vocab: fetch_first(&repo, model_id, &[VOCAB_FILE]).await?,
                }
            }
        };

        Ok(MarianFiles {
            config,
            weights,
            vocab,
        })
    }
}

/// Download the first of `names` the repo has
async fn fetch_first(repo: &ApiRepo, model_id: &str, names: &[&str]) -> Result<PathBuf> {
    let mut failures = Vec::with_capacity(names.len());

    for name in names {
        match repo.get(name).await {
            Ok(path) => return Ok(path),
            Err(e) => failures.push(format!("{}: {}", name, e)),
        }
    }

    Err(QuickTransError::model_load(format!(
        "Failed to download {} ({})",
        model_id,
        failures.join("; ")
    )))
}

#[async_trait]
impl TranslationBackend for MarianBackend {
    async fn acquire(&self, pair: LanguagePair) -> Result<Arc<dyn Translator>> {
        let model_id = pair.model_id();
        let files = self.resolve_files(&model_id).await?;

        let device = self.device.clone();
        let max_length = self.max_length;
        let started = Instant::now();

        let model = tokio::task::spawn_blocking(move || MarianModel::load(&files, device, max_length))
            .await
            .map_err(|e| QuickTransError::model_load(format!("Model load task failed: {}", e)))??;

        info!("Loaded {} in {:.1}s", model_id, started.elapsed().as_secs_f64());

        Ok(Arc::new(MarianTranslator {
            model: Arc::new(model),
            pair,
        }))
    }

    fn name(&self) -> &str {
        "marian"
    }
}

pub struct MarianTranslator {
    model: Arc<MarianModel>,
    pair: LanguagePair,
}

#[async_trait]
impl Translator for MarianTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || model.generate(&text))
            .await
            .map_err(|e| {
                warn!("Marian generation task aborted: {}", e);
                QuickTransError::processing(format!("Translation task failed: {}", e))
            })?
    }

    fn pair(&self) -> LanguagePair {
        self.pair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktrans_common::Language;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"{}").unwrap();
        }
    }

    /// Config as published with upstream OPUS-MT checkpoints
    fn upstream_config() -> Value {
        json!({
            "activation_function": "swish",
            "d_model": 512,
            "decoder_attention_heads": 8,
            "decoder_ffn_dim": 2048,
            "decoder_layers": 6,
            "decoder_start_token_id": 65000,
            "encoder_attention_heads": 8,
            "encoder_ffn_dim": 2048,
            "encoder_layers": 6,
            "eos_token_id": 0,
            "forced_eos_token_id": null,
            "max_position_embeddings": 512,
            "model_type": "marian",
            "pad_token_id": 65000,
            "vocab_size": 65001
        })
    }

    #[test]
    fn test_upstream_layout_is_recognized() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(
            dir.path(),
            &[CONFIG_FILE, PTH_FILE, SOURCE_SPM_FILE, "target.spm", VOCAB_FILE, "tokenizer_config.json"],
        );

        let files = MarianFiles::in_dir(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(PTH_FILE));
        assert_eq!(
            files.vocab,
            MarianVocab::SentencePiece {
                source_spm: dir.path().join(SOURCE_SPM_FILE),
                vocab: dir.path().join(VOCAB_FILE),
            }
        );
    }

    #[test]
    fn test_converted_layout_is_preferred() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(
            dir.path(),
            &[CONFIG_FILE, PTH_FILE, SAFETENSORS_FILE, SOURCE_SPM_FILE, VOCAB_FILE, TOKENIZER_FILE],
        );

        let files = MarianFiles::in_dir(dir.path()).unwrap();
        assert_eq!(files.weights, dir.path().join(SAFETENSORS_FILE));
        assert_eq!(
            files.vocab,
            MarianVocab::Tokenizer {
                source: dir.path().join(TOKENIZER_FILE),
                target: None,
            }
        );

        touch(dir.path(), &[TARGET_TOKENIZER_FILE]);
        let files = MarianFiles::in_dir(dir.path()).unwrap();
        assert!(matches!(files.vocab, MarianVocab::Tokenizer { target: Some(_), .. }));
    }

    #[test]
    fn test_incomplete_layouts_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(MarianFiles::in_dir(dir.path()).is_none());

        // No weights
        touch(dir.path(), &[CONFIG_FILE, SOURCE_SPM_FILE, VOCAB_FILE]);
        assert!(MarianFiles::in_dir(dir.path()).is_none());

        // SentencePiece model without its vocabulary
        std::fs::remove_file(dir.path().join(VOCAB_FILE)).unwrap();
        touch(dir.path(), &[PTH_FILE]);
        assert!(MarianFiles::in_dir(dir.path()).is_none());

        touch(dir.path(), &[VOCAB_FILE]);
        assert!(MarianFiles::in_dir(dir.path()).is_some());
    }

    #[test]
    fn test_read_config_fills_missing_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, serde_json::to_vec(&upstream_config()).unwrap()).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.eos_token_id, 0);
        assert_eq!(config.forced_eos_token_id, 0);
        assert_eq!(config.decoder_start_token_id, 65000);
    }

    #[test]
    fn test_read_config_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, b"[1, 2]").unwrap();

        let err = read_config(&path).err().unwrap();
        assert_eq!(err.kind(), "resource_acquisition_failure");
    }

    #[tokio::test]
    async fn test_resolve_prefers_local_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = MarianBackend::new(dir.path().to_path_buf(), 128);
        let pair = LanguagePair::new(Language::Zh, Language::En).unwrap();

        let local = backend.local_dir(&pair.model_id());
        std::fs::create_dir_all(&local).unwrap();
        touch(&local, &[CONFIG_FILE, PTH_FILE, SOURCE_SPM_FILE, VOCAB_FILE]);

        let files = backend.resolve_files(&pair.model_id()).await.unwrap();
        assert_eq!(files.config, local.join(CONFIG_FILE));
        assert_eq!(files.weights, local.join(PTH_FILE));
    }

    #[tokio::test]
    async fn test_corrupt_local_model_is_acquisition_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = MarianBackend::new(dir.path().to_path_buf(), 128);
        let pair = LanguagePair::new(Language::En, Language::De).unwrap();

        let local = backend.local_dir(&pair.model_id());
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join(CONFIG_FILE), serde_json::to_vec(&upstream_config()).unwrap()).unwrap();
        for name in [PTH_FILE, SOURCE_SPM_FILE, VOCAB_FILE] {
            std::fs::write(local.join(name), b"not a model").unwrap();
        }

        let err = backend.acquire(pair).await.err().unwrap();
        assert!(matches!(err, QuickTransError::ModelLoad(_)));
    }
}
