//! Model Manager for automatic model downloading
//!
//! Fetches whisper.cpp ggml weights into the models directory on first use.

use crate::{QuickTransError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

const HASH_CHUNK_SIZE: usize = 1 << 20;

/// Hex SHA-256 of a file, read in fixed-size chunks
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whisper model information
#[derive(Debug, Clone)]
pub struct WhisperModel {
    /// Model name (e.g., "base", "small", "medium")
    pub name: String,

    /// File size in bytes
    pub size: u64,

    /// Download URL
    pub url: String,
}

impl WhisperModel {
    /// Get model filename
    pub fn filename(&self) -> String {
        whisper_filename(&self.name)
    }

    /// Get size in MB
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

fn whisper_filename(name: &str) -> String {
    format!("ggml-{}.bin", name)
}

/// Available Whisper models
pub fn available_whisper_models() -> Vec<WhisperModel> {
    let base_url = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

    [
        ("tiny", 75),
        ("base", 142),
        ("small", 466),
        ("medium", 1500),
        ("large-v3", 3100),
    ]
    .into_iter()
    .map(|(name, size_mb)| WhisperModel {
        name: name.to_string(),
        size: size_mb * 1024 * 1024,
        url: format!("{}/{}", base_url, whisper_filename(name)),
    })
    .collect()
}

/// Model Manager
pub struct ModelManager {
    models_dir: PathBuf,
    client: Client,
}

impl ModelManager {
    /// Create new model manager
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3600)) // 1 hour for large downloads
            .build()
            .map_err(|e| QuickTransError::model_load(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { models_dir, client })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Ensure Whisper model exists, download if missing.
    ///
    /// An existing file path is also accepted in place of a model name.
    pub async fn ensure_whisper_model(
        &self,
        model_name: &str,
        expected_sha256: Option<&str>,
    ) -> Result<PathBuf> {
        let as_path = Path::new(model_name);
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }

        let model_path = self.models_dir.join(whisper_filename(model_name));

        if model_path.exists() {
            info!("Model already exists: {}", model_path.display());
            return Ok(model_path);
        }

        info!("Model not found, downloading: {}", model_name);

        let models = available_whisper_models();
        let model_info = models
            .iter()
            .find(|m| m.name == model_name)
            .ok_or_else(|| QuickTransError::model_load(format!("Unknown whisper model: {}", model_name)))?;

        self.download_model(model_info, &model_path).await?;

        if !self.verify_model(&model_path, expected_sha256).await? {
            fs::remove_file(&model_path).await?;
            return Err(QuickTransError::model_load(format!(
                "Checksum mismatch for {}",
                model_path.display()
            )));
        }

        Ok(model_path)
    }

    /// Download model from URL
    pub async fn download_model(&self, model: &WhisperModel, dest: &Path) -> Result<()> {
        info!(
            "Downloading {} ({:.1} MB) from {}",
            model.filename(),
            model.size_mb(),
            model.url
        );

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let pb = ProgressBar::new(model.size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let response = self
            .client
            .get(&model.url)
            .send()
            .await
            .map_err(|e| QuickTransError::model_load(format!("Failed to download: {}", e)))?;

        if !response.status().is_success() {
            return Err(QuickTransError::model_load(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        // Write to temporary file first
        let temp_path = dest.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| QuickTransError::model_load(format!("Download error: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        pb.finish_with_message("Download complete");
        file.sync_all().await?;
        drop(file);

        let metadata = fs::metadata(&temp_path).await?;
        if metadata.len() < model.size / 2 {
            fs::remove_file(&temp_path).await?;
            return Err(QuickTransError::model_load(format!(
                "Downloaded file is too small ({} bytes, expected ~{} bytes)",
                metadata.len(),
                model.size
            )));
        }

        fs::rename(&temp_path, dest).await?;

        info!("Download successful: {}", dest.display());

        Ok(())
    }

    /// Verify model integrity
    pub async fn verify_model(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        // If no hash provided, just check file exists
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        info!("Verifying model: {}", path.display());

        let hash = sha256_file(path).await?;

        if !hash.eq_ignore_ascii_case(expected) {
            warn!("Hash mismatch for {}: got {}", path.display(), hash);
            return Ok(false);
        }

        Ok(true)
    }

    /// List installed whisper models
    pub async fn list_installed_models(&self) -> Result<Vec<String>> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }

        let mut models = Vec::new();
        let mut entries = fs::read_dir(&self.models_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("bin") {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some(model) = name.strip_prefix("ggml-") {
                        models.push(model.to_string());
                    }
                }
            }
        }

        models.sort();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_models() {
        let models = available_whisper_models();
        assert_eq!(models.len(), 5);
        let small = models.iter().find(|m| m.name == "small").unwrap();
        assert_eq!(small.filename(), "ggml-small.bin");
        assert!(small.url.ends_with("/ggml-small.bin"));
    }

    #[tokio::test]
    async fn test_existing_model_is_not_downloaded() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("ggml-tiny.bin"), b"weights").unwrap();

        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let path = manager.ensure_whisper_model("tiny", None).await.unwrap();
        assert_eq!(path, dir.path().join("ggml-tiny.bin"));
    }

    #[tokio::test]
    async fn test_unknown_model_is_load_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let err = manager.ensure_whisper_model("gigantic", None).await.unwrap_err();
        assert!(matches!(err, QuickTransError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_verify_model_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ggml-tiny.bin");
        std::fs::write(&path, b"abc").unwrap();

        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let good = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(manager.verify_model(&path, Some(good)).await.unwrap());
        assert!(!manager.verify_model(&path, Some("00")).await.unwrap());
        assert!(manager.verify_model(&path, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_sha256_file_spans_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ggml-base.bin");
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let hash = sha256_file(&path).await.unwrap();
        assert_eq!(hash, hex::encode(Sha256::digest(&data)));
    }

    #[tokio::test]
    async fn test_list_installed_models() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("ggml-small.bin"), b"").unwrap();
        std::fs::write(dir.path().join("ggml-base.bin"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let models = manager.list_installed_models().await.unwrap();
        assert_eq!(models, vec!["base".to_string(), "small".to_string()]);
    }
}
