//! Configuration for the transcription engine.
//!
//! The engine reads an optional TOML file; every field has a default, and
//! command-line flags override the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::transcribe::DecodeOptions;

/// Main configuration struct for the engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub decode: DecodeConfig,
    pub logging: LoggingConfig,
}

/// Which model to load and where.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Whisper model size.
    pub size: ModelSize,
    /// Inference device. Unset means auto-detect.
    pub device: Option<Device>,
    /// Where downloaded models are kept. Unset means the XDG data directory.
    pub models_dir: Option<PathBuf>,
}

/// Decoding switches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Language code, or "auto" for detection.
    pub language: String,
    /// Run Silero VAD first and only decode speech regions.
    ///
    /// Off by default: segments then follow Whisper's own 30-second windows
    /// and may span pauses. When on, no segment crosses a detected silence
    /// and silent stretches produce no segments at all.
    pub vad: bool,
    /// Inference threads. Unset lets whisper.cpp decide.
    pub threads: Option<u16>,
}

/// Supported Whisper model sizes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        f.write_str(name)
    }
}

/// Inference device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Pick CUDA when this build can use it and an NVIDIA driver is present.
    pub fn detect() -> Self {
        if cuda_available() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

fn cuda_available() -> bool {
    if !cfg!(feature = "cuda") {
        return false;
    }
    if cfg!(target_os = "linux") {
        Path::new("/proc/driver/nvidia/version").exists()
    } else {
        true
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: LogLevel,
    /// Also append logs to this file.
    pub file: Option<PathBuf>,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to a tracing filter directive string for the engine crate.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "scriptgrab_engine=error",
            LogLevel::Warn => "scriptgrab_engine=warn",
            LogLevel::Info => "scriptgrab_engine=info",
            LogLevel::Debug => "scriptgrab_engine=debug",
            LogLevel::Trace => "scriptgrab_engine=trace",
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            vad: false,
            threads: None,
        }
    }
}

impl DecodeConfig {
    /// Options handed to the transcriber.
    pub fn to_options(&self) -> DecodeOptions {
        let language = match self.language.trim() {
            "" | "auto" => None,
            code => Some(code.to_string()),
        };
        DecodeOptions {
            language,
            vad: self.vad,
            threads: self.threads,
        }
    }
}

impl Config {
    /// Returns the default config file path.
    /// `~/.config/scriptgrab/engine.toml`
    pub fn config_path() -> Result<PathBuf> {
        crate::dirs::config_dir().map(|p| p.join("engine.toml"))
    }

    /// Returns the default models directory path.
    /// `~/.local/share/scriptgrab/models/`
    pub fn default_models_dir() -> Result<PathBuf> {
        crate::dirs::data_dir().map(|p| p.join("models"))
    }

    /// Models directory, honoring `[model] models_dir`.
    pub fn models_dir(&self) -> Result<PathBuf> {
        match &self.model.models_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_models_dir(),
        }
    }

    /// Load an explicitly requested file, or the default one if present.
    ///
    /// An explicit path must exist. The default path is optional, and so is
    /// being able to resolve it at all.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Self::load_from(path);
        }

        match Self::config_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                debug!(error = %e, "No default config location, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file as TOML")
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
