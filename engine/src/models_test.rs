use super::*;
use tempfile::TempDir;

const VAD_SIZE: usize = 2_327_524;

#[test]
fn test_vad_model_location() {
    assert_eq!(ModelId::SileroVad.filename(), "silero_vad.onnx");
    assert!(ModelId::SileroVad.url().ends_with("/silero_vad.onnx"));
    assert_eq!(ModelId::SileroVad.expected_size(), Some(VAD_SIZE as u64));
}

#[test]
fn test_sizes_map_to_ggml_files() {
    let cases = [
        (ModelSize::Tiny, "ggml-tiny.bin"),
        (ModelSize::Base, "ggml-base.bin"),
        (ModelSize::Small, "ggml-small.bin"),
        (ModelSize::Medium, "ggml-medium.bin"),
        (ModelSize::Large, "ggml-large-v3.bin"),
    ];
    for (size, filename) in cases {
        let model = ModelId::for_size(size);
        assert_eq!(model.filename(), filename);
        assert_eq!(model.url(), format!("{WHISPER_BASE_URL}/{filename}"));
    }
}

#[test]
fn test_model_path_is_inside_models_dir() {
    let temp = TempDir::new().unwrap();
    let manager = ModelManager::with_dir(temp.path());
    assert_eq!(manager.models_dir(), temp.path());
    assert_eq!(
        manager.model_path(ModelId::WhisperBase),
        temp.path().join("ggml-base.bin")
    );
}

#[tokio::test]
async fn test_check_model_missing() {
    let temp = TempDir::new().unwrap();
    let manager = ModelManager::with_dir(temp.path());

    assert_eq!(
        manager.check_model(ModelId::SileroVad).await,
        ModelStatus::Missing
    );
}

#[tokio::test]
async fn test_check_model_pinned_size() {
    let temp = TempDir::new().unwrap();
    let manager = ModelManager::with_dir(temp.path());
    let path = manager.model_path(ModelId::SileroVad);

    tokio::fs::write(&path, b"too small").await.unwrap();
    assert_eq!(
        manager.check_model(ModelId::SileroVad).await,
        ModelStatus::Corrupted {
            expected: VAD_SIZE as u64,
            actual: 9
        }
    );

    tokio::fs::write(&path, vec![0u8; VAD_SIZE]).await.unwrap();
    assert_eq!(
        manager.check_model(ModelId::SileroVad).await,
        ModelStatus::Ready(path)
    );
}

#[tokio::test]
async fn test_check_model_unpinned_size() {
    let temp = TempDir::new().unwrap();
    let manager = ModelManager::with_dir(temp.path());
    let path = manager.model_path(ModelId::WhisperTiny);

    tokio::fs::write(&path, b"").await.unwrap();
    assert_eq!(
        manager.check_model(ModelId::WhisperTiny).await,
        ModelStatus::Missing
    );

    tokio::fs::write(&path, b"ggml").await.unwrap();
    assert_eq!(
        manager.check_model(ModelId::WhisperTiny).await,
        ModelStatus::Ready(path)
    );
}

#[tokio::test]
async fn test_ensure_model_uses_cached_file() {
    let temp = TempDir::new().unwrap();
    let manager = ModelManager::with_dir(temp.path());
    let path = manager.model_path(ModelId::WhisperSmall);
    tokio::fs::write(&path, b"cached weights").await.unwrap();

    let resolved = manager.ensure_model(ModelId::WhisperSmall).await.unwrap();
    assert_eq!(resolved, path);
}
