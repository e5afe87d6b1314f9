use super::*;
use transcription_hub::config::{load_settings_from, save_settings_to, Settings};

// ============================================================================
// Settings-driven Manager Integration Tests
// ============================================================================

#[tokio::test]
async fn test_manager_from_saved_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    let mut settings = Settings::default();
    settings.fallback.primary = "p1".to_string();
    settings.fallback.fallbacks = vec!["p2".to_string()];
    settings.fallback.confidence_threshold = 0.7;
    save_settings_to(&settings, &path).unwrap();

    let loaded = load_settings_from(&path).unwrap();
    let manager = TranscriptionManager::from_settings(&loaded).unwrap();
    manager
        .register_provider("p1", Arc::new(MockTranscriptionProvider::new("p1").with_confidence(0.5)))
        .unwrap();
    manager
        .register_provider("p2", Arc::new(MockTranscriptionProvider::new("p2").with_confidence(0.9)))
        .unwrap();

    let result = manager.transcribe(clip("a.wav")).await.unwrap();
    assert_eq!(result.model_used, "p2");
}

#[tokio::test]
async fn test_persistent_results_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.fallback.primary = "p1".to_string();
    settings.fallback.fallbacks.clear();
    settings.cache.persistent = true;
    settings.cache.directory = Some(dir.path().join("results"));

    let count = counter();
    for _ in 0..2 {
        let manager = TranscriptionManager::from_settings(&settings).unwrap();
        manager
            .register_provider(
                "p1",
                Arc::new(MockTranscriptionProvider::new("p1").with_call_counter(Arc::clone(&count))),
            )
            .unwrap();
        let result = manager.transcribe(clip("a.wav")).await.unwrap();
        assert_eq!(result.model_used, "p1");
        manager.clear_all_caches().await;
    }

    assert_eq!(calls(&count), 1);
}

#[tokio::test]
async fn test_disabled_cache_recomputes() {
    let mut settings = Settings::default();
    settings.fallback.primary = "p1".to_string();
    settings.cache.enabled = false;

    let manager = TranscriptionManager::from_settings(&settings).unwrap();
    let count = counter();
    manager
        .register_provider(
            "p1",
            Arc::new(MockTranscriptionProvider::new("p1").with_call_counter(Arc::clone(&count))),
        )
        .unwrap();

    manager.transcribe(clip("a.wav")).await.unwrap();
    manager.transcribe(clip("a.wav")).await.unwrap();

    assert_eq!(calls(&count), 2);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let mut settings = Settings::default();
    settings.fallback.confidence_threshold = 1.5;
    assert!(TranscriptionManager::from_settings(&settings).is_err());
}
