//! Model download and management.
//!
//! Whisper GGML weights and the Silero VAD model are fetched on first use and
//! cached in the models directory.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ModelSize;

const WHISPER_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";
const SILERO_VAD_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx";

/// A model file the engine can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelId {
    SileroVad,
    /// ~75MB
    WhisperTiny,
    /// ~150MB
    WhisperBase,
    /// ~500MB
    WhisperSmall,
    /// ~1.5GB
    WhisperMedium,
    /// large-v3, ~3GB
    WhisperLarge,
}

impl ModelId {
    /// The Whisper weights for a model size.
    pub fn for_size(size: ModelSize) -> Self {
        match size {
            ModelSize::Tiny => ModelId::WhisperTiny,
            ModelSize::Base => ModelId::WhisperBase,
            ModelSize::Small => ModelId::WhisperSmall,
            ModelSize::Medium => ModelId::WhisperMedium,
            ModelSize::Large => ModelId::WhisperLarge,
        }
    }

    /// File name inside the models directory.
    pub fn filename(&self) -> &'static str {
        match self {
            ModelId::SileroVad => "silero_vad.onnx",
            ModelId::WhisperTiny => "ggml-tiny.bin",
            ModelId::WhisperBase => "ggml-base.bin",
            ModelId::WhisperSmall => "ggml-small.bin",
            ModelId::WhisperMedium => "ggml-medium.bin",
            ModelId::WhisperLarge => "ggml-large-v3.bin",
        }
    }

    pub fn url(&self) -> String {
        match self {
            ModelId::SileroVad => SILERO_VAD_URL.to_string(),
            _ => format!("{WHISPER_BASE_URL}/{}", self.filename()),
        }
    }

    /// Size of a complete file, when pinned. Unpinned downloads are checked
    /// against the server's `Content-Length` instead.
    fn expected_size(&self) -> Option<u64> {
        match self {
            ModelId::SileroVad => Some(2_327_524),
            _ => None,
        }
    }
}

/// State of a model file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Missing,
    Ready(PathBuf),
    Corrupted { expected: u64, actual: u64 },
}

/// Manages model downloads and storage.
#[derive(Debug, Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    pub fn with_dir(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Get the models directory path.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Where a model lives once downloaded.
    pub fn model_path(&self, model: ModelId) -> PathBuf {
        self.models_dir.join(model.filename())
    }

    /// Inspect a model file without touching the network.
    pub async fn check_model(&self, model: ModelId) -> ModelStatus {
        let path = self.model_path(model);
        let Ok(metadata) = fs::metadata(&path).await else {
            return ModelStatus::Missing;
        };

        let actual = metadata.len();
        match model.expected_size() {
            Some(expected) if actual != expected => ModelStatus::Corrupted { expected, actual },
            None if actual == 0 => ModelStatus::Missing,
            _ => ModelStatus::Ready(path),
        }
    }

    /// Return the path of a model, downloading it first if needed.
    pub async fn ensure_model(&self, model: ModelId) -> Result<PathBuf> {
        let path = self.model_path(model);

        match self.check_model(model).await {
            ModelStatus::Ready(path) => {
                debug!(path = %path.display(), "Model already cached");
                return Ok(path);
            }
            ModelStatus::Corrupted { expected, actual } => {
                warn!(?model, expected, actual, "Model size mismatch, re-downloading");
                fs::remove_file(&path)
                    .await
                    .context("Failed to remove corrupted model")?;
            }
            ModelStatus::Missing => {}
        }

        download(model, &path).await?;
        Ok(path)
    }
}

/// Stream `model` into `dest` through a temporary file.
async fn download(model: ModelId, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create models directory")?;
    }

    let url = model.url();
    info!(%url, dest = %dest.display(), "Downloading model");

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to download model from {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to download model: HTTP {}", response.status());
    }

    let expected = model.expected_size().or(response.content_length());
    let bar = download_bar(model.filename(), expected);

    let partial = dest.with_extension("tmp");
    let mut file = fs::File::create(&partial)
        .await
        .context("Failed to create temporary model file")?;

    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let bytes = chunk.context("Failed to read response body")?;
        file.write_all(&bytes)
            .await
            .context("Failed to write model file")?;
        written += bytes.len() as u64;
        bar.set_position(written);
    }
    file.sync_all().await.context("Failed to sync model file")?;
    bar.finish_and_clear();

    if let Some(expected) = expected
        && written != expected
    {
        let _ = fs::remove_file(&partial).await;
        anyhow::bail!("Downloaded model size mismatch: expected {expected}, got {written}");
    }

    fs::rename(&partial, dest)
        .await
        .context("Failed to finalize model file")?;
    info!(path = %dest.display(), size = written, "Model downloaded");
    Ok(())
}

/// Byte progress on stderr. Hidden when stderr is not a terminal.
fn download_bar(name: &str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    if let Ok(style) =
        ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(name.to_string());
    bar
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
