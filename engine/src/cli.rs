//! Command-line arguments of the engine binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, Device, ModelSize};
use crate::engine::Request;

/// Transcribe an audio file, streaming JSON lines to stdout.
#[derive(Debug, Parser)]
#[command(name = "engine")]
#[command(version)]
pub struct Args {
    /// Audio file to transcribe
    pub audio_path: PathBuf,

    /// Whisper model size [default: from config, else base]
    #[arg(long, value_enum)]
    pub model: Option<ModelSize>,

    /// Inference device [default: auto-detect]
    #[arg(long, value_enum)]
    pub device: Option<Device>,

    /// Only transcribe speech regions found by voice activity detection
    #[arg(long)]
    pub vad: bool,

    /// Configuration file [default: $XDG_CONFIG_HOME/scriptgrab/engine.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Merge flags over the configuration file.
    pub fn into_request(self, config: &Config) -> Request {
        let mut options = config.decode.to_options();
        options.vad |= self.vad;

        Request {
            audio_path: self.audio_path,
            model: self.model.unwrap_or(config.model.size),
            device: self.device.or(config.model.device),
            options,
        }
    }
}

/// One-line protocol error for a rejected command line.
pub fn usage_error(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let first = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("invalid arguments");
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}
