//! VAD tests against the real Silero model.
//!
//! Set `VAD_MODEL_PATH` to a local `silero_vad.onnx` and run with
//! `cargo test -- --ignored`.

use std::path::PathBuf;

use scriptgrab_engine::vad::{VAD_CHUNK_SIZES, VAD_SAMPLE_RATE, VadConfig, VoiceActivityDetector};

fn model_path() -> PathBuf {
    std::env::var_os("VAD_MODEL_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .parent()
                .unwrap()
                .join("models/silero_vad.onnx")
        })
}

fn detector() -> VoiceActivityDetector {
    VoiceActivityDetector::new(model_path(), VadConfig::default()).expect("Failed to load VAD")
}

#[test]
#[ignore = "requires the Silero VAD model"]
fn test_silence_has_no_speech_regions() {
    let mut vad = detector();

    let silence = vec![0.0f32; VAD_SAMPLE_RATE as usize * 3];
    let regions = vad.speech_regions(&silence).unwrap();

    assert!(regions.is_empty(), "Silence detected as speech: {regions:?}");
}

#[test]
#[ignore = "requires the Silero VAD model"]
fn test_probabilities_cover_partial_tail() {
    let mut vad = detector();
    let chunk = vad.chunk_size();

    let probs = vad.probabilities(&vec![0.0f32; chunk * 4 + 10]).unwrap();

    assert_eq!(probs.len(), 5);
    assert!(probs.iter().all(|p| *p < 0.3), "{probs:?}");
}

#[test]
#[ignore = "requires the Silero VAD model"]
fn test_chunk_size_validation() {
    for &size in &VAD_CHUNK_SIZES {
        let result =
            VoiceActivityDetector::with_chunk_size(model_path(), VadConfig::default(), size);
        assert!(result.is_ok(), "Failed with valid chunk size {size}");
    }

    let result = VoiceActivityDetector::with_chunk_size(model_path(), VadConfig::default(), 100);
    assert!(result.is_err(), "Should reject invalid chunk size");
}
