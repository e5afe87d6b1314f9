use super::*;
use transcription_hub::transcription::{LifecycleState, TranscriptionError};

// ============================================================================
// SECTION 1: Single-flight and Cache Integration Tests
// ============================================================================

mod single_flight {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_identical_requests_invoke_provider_once() {
        let manager = Arc::new(manager_with_chain(&["whisper"], 0.5));
        let count = counter();
        manager
            .register_provider(
                "whisper",
                Arc::new(
                    MockTranscriptionProvider::new("whisper")
                        .with_delay(50)
                        .with_call_counter(Arc::clone(&count)),
                ),
            )
            .unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.transcribe(clip("meeting.wav")).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls(&count), 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let manager = manager_with_chain(&["whisper"], 0.5);
        let count = counter();
        manager
            .register_provider(
                "whisper",
                Arc::new(MockTranscriptionProvider::new("whisper").with_call_counter(Arc::clone(&count))),
            )
            .unwrap();

        let first = manager.transcribe(clip("a.wav")).await.unwrap();
        let second = manager.transcribe(clip("a.wav")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls(&count), 1);
        assert_eq!(manager.metrics_summary().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_language_hint_is_part_of_identity() {
        let manager = manager_with_chain(&["whisper"], 0.5);
        let count = counter();
        manager
            .register_provider(
                "whisper",
                Arc::new(MockTranscriptionProvider::new("whisper").with_call_counter(Arc::clone(&count))),
            )
            .unwrap();

        let pt = manager.transcribe(clip("a.wav").with_language("pt")).await.unwrap();
        let en = manager.transcribe(clip("a.wav").with_language("EN ")).await.unwrap();
        manager.transcribe(clip("a.wav").with_language("en")).await.unwrap();

        assert_eq!(pt.language, "pt");
        assert_eq!(en.language, "en");
        assert_eq!(calls(&count), 2);
    }

    #[tokio::test]
    async fn test_failed_request_is_retried_from_the_start() {
        let manager = manager_with_chain(&["p1", "p2"], 0.5);
        let p1 = counter();
        let p2 = counter();
        manager
            .register_provider(
                "p1",
                Arc::new(
                    MockTranscriptionProvider::new("p1")
                        .with_error(ProviderError::ExternalService("503".into()))
                        .with_call_counter(Arc::clone(&p1)),
                ),
            )
            .unwrap();
        manager
            .register_provider(
                "p2",
                Arc::new(
                    MockTranscriptionProvider::new("p2")
                        .with_error(ProviderError::InputTooLarge {
                            size_bytes: 30_000_000,
                            limit_bytes: 25_000_000,
                        })
                        .with_call_counter(Arc::clone(&p2)),
                ),
            )
            .unwrap();

        let first = manager.transcribe(clip("a.wav")).await.unwrap();
        let second = manager.transcribe(clip("a.wav")).await.unwrap();

        assert!(first.error_message.is_some());
        assert!(second.error_message.is_some());
        assert_eq!(calls(&p1), 2);
        assert_eq!(calls(&p2), 2);
        assert_eq!(manager.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_cancel_shared_computation() {
        let manager = Arc::new(manager_with_chain(&["slow"], 0.5));
        let count = counter();
        manager
            .register_provider(
                "slow",
                Arc::new(
                    MockTranscriptionProvider::new("slow")
                        .with_delay(80)
                        .with_call_counter(Arc::clone(&count)),
                ),
            )
            .unwrap();

        let impatient = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.transcribe(clip("long.wav")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let patient = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.transcribe(clip("long.wav")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        impatient.abort();
        let _ = impatient.await;

        let result = patient.await.unwrap().unwrap();
        assert_eq!(result.model_used, "slow");
        assert_eq!(calls(&count), 1);
    }

    #[tokio::test]
    async fn test_file_sources_are_fingerprinted_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let copy = dir.path().join("copy.wav");
        std::fs::write(&first, b"RIFF....WAVEfmt ").unwrap();
        std::fs::write(&copy, b"RIFF....WAVEfmt ").unwrap();

        let manager = manager_with_chain(&["whisper"], 0.5);
        let count = counter();
        manager
            .register_provider(
                "whisper",
                Arc::new(MockTranscriptionProvider::new("whisper").with_call_counter(Arc::clone(&count))),
            )
            .unwrap();

        manager.transcribe_file(&first, Some("pt")).await.unwrap();
        manager.transcribe_file(&copy, Some("pt")).await.unwrap();

        assert_eq!(calls(&count), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected_before_any_provider() {
        let manager = manager_with_chain(&["whisper"], 0.5);
        let count = counter();
        manager
            .register_provider(
                "whisper",
                Arc::new(MockTranscriptionProvider::new("whisper").with_call_counter(Arc::clone(&count))),
            )
            .unwrap();

        let err = manager
            .transcribe_file("/definitely/not/here.wav", None)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::InvalidSource { .. }));
        assert_eq!(calls(&count), 0);
    }
}

// ============================================================================
// SECTION 2: Fallback Chain Integration Tests
// ============================================================================

mod fallback_chain {
    use super::*;

    fn two_providers(threshold: f32) -> (TranscriptionManager, Arc<AtomicU32>, Arc<AtomicU32>) {
        let manager = manager_with_chain(&["p1", "p2"], threshold);
        let p1 = counter();
        let p2 = counter();
        manager
            .register_provider(
                "p1",
                Arc::new(
                    MockTranscriptionProvider::new("p1")
                        .with_confidence(0.5)
                        .with_call_counter(Arc::clone(&p1)),
                ),
            )
            .unwrap();
        manager
            .register_provider(
                "p2",
                Arc::new(
                    MockTranscriptionProvider::new("p2")
                        .with_confidence(0.9)
                        .with_call_counter(Arc::clone(&p2)),
                ),
            )
            .unwrap();
        (manager, p1, p2)
    }

    #[tokio::test]
    async fn test_threshold_selects_later_provider() {
        let (manager, p1, p2) = two_providers(0.7);

        let result = manager.transcribe(clip("a.wav")).await.unwrap();

        assert_eq!(result.model_used, "p2");
        assert_eq!(calls(&p1), 1);
        assert_eq!(calls(&p2), 1);
    }

    #[tokio::test]
    async fn test_first_acceptable_provider_wins() {
        let (manager, _p1, p2) = two_providers(0.3);

        let result = manager.transcribe(clip("a.wav")).await.unwrap();

        assert_eq!(result.model_used, "p1");
        assert_eq!(calls(&p2), 0);
    }

    #[tokio::test]
    async fn test_graceful_exhaustion() {
        let manager = manager_with_chain(&["p1", "p2"], 0.6);
        manager
            .register_provider(
                "p1",
                Arc::new(MockTranscriptionProvider::new("p1").with_error(ProviderError::UnsupportedFormat(".xyz".into()))),
            )
            .unwrap();
        manager
            .register_provider(
                "p2",
                Arc::new(MockTranscriptionProvider::new("p2").with_error(ProviderError::ExternalService("quota".into()))),
            )
            .unwrap();

        let result = manager.transcribe(clip("a.wav")).await.unwrap();

        assert!(!result.error_message.as_deref().unwrap_or("").is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(manager.metrics_summary().exhausted_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_skipped() {
        let manager = manager_with_chain(&["never-registered", "p2"], 0.6);
        manager
            .register_provider("p2", Arc::new(MockTranscriptionProvider::new("p2")))
            .unwrap();

        let result = manager.transcribe(clip("a.wav")).await.unwrap();

        assert_eq!(result.model_used, "p2");
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_initialization_failure_falls_through() {
        let manager = manager_with_chain(&["broken", "p2"], 0.6);
        manager
            .register_provider("broken", Arc::new(MockTranscriptionProvider::new("broken").failing_init()))
            .unwrap();
        manager
            .register_provider("p2", Arc::new(MockTranscriptionProvider::new("p2")))
            .unwrap();

        let result = manager.transcribe(clip("a.wav")).await.unwrap();

        assert_eq!(result.model_used, "p2");
        assert!(matches!(manager.status("broken").unwrap().state, LifecycleState::Failed(_)));
        assert_eq!(manager.status("p2").unwrap().state, LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_resource_exhaustion_reorders_later_requests() {
        let manager = manager_with_chain(&["gpu", "cpu"], 0.6);
        let gpu = counter();
        manager
            .register_provider(
                "gpu",
                Arc::new(
                    MockTranscriptionProvider::new("gpu")
                        .with_error(ProviderError::ResourceExhausted("CUDA out of memory".into()))
                        .with_call_counter(Arc::clone(&gpu)),
                ),
            )
            .unwrap();
        manager
            .register_provider("cpu", Arc::new(MockTranscriptionProvider::new("cpu")))
            .unwrap();

        let first = manager.transcribe(clip("a.wav")).await.unwrap();
        assert_eq!(first.model_used, "cpu");
        assert!(matches!(manager.status("gpu").unwrap().state, LifecycleState::Degraded(_)));

        let second = manager.transcribe(clip("b.wav")).await.unwrap();
        assert_eq!(second.model_used, "cpu");
        assert_eq!(calls(&gpu), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_a_configuration_error() {
        let manager = manager_with_chain(&["p1"], 0.6);
        manager.set_primary("");

        let err = manager.transcribe(clip("a.wav")).await.unwrap_err();
        assert_eq!(err, TranscriptionError::NoProvidersConfigured);
    }

    #[tokio::test]
    async fn test_policy_changes_apply_to_later_requests() {
        let (manager, _p1, _p2) = two_providers(0.3);

        let before = manager.transcribe(clip("a.wav")).await.unwrap();
        manager.set_confidence_threshold(0.7).unwrap();
        let after = manager.transcribe(clip("b.wav")).await.unwrap();

        assert_eq!(before.model_used, "p1");
        assert_eq!(after.model_used, "p2");
    }
}

// ============================================================================
// SECTION 3: Registry Status Integration Tests
// ============================================================================

mod status {
    use super::*;

    #[tokio::test]
    async fn test_status_all_is_idempotent() {
        let manager = manager_with_chain(&["p1"], 0.6);
        manager
            .register_provider("p1", Arc::new(MockTranscriptionProvider::new("p1")))
            .unwrap();
        manager
            .register_provider("p2", Arc::new(MockTranscriptionProvider::new("p2")))
            .unwrap();
        manager.transcribe(clip("a.wav")).await.unwrap();

        let first = manager.status_all();
        let second = manager.status_all();

        assert_eq!(first, second);
        assert_eq!(first["p1"].counters.successes, 1);
        assert_eq!(first["p2"].state, LifecycleState::Uninitialized);
    }

    #[test]
    fn test_status_errors() {
        let manager = manager_with_chain(&["p1"], 0.6);
        assert!(manager.status_all().is_empty());
        assert_eq!(
            manager.status("ghost").unwrap_err(),
            TranscriptionError::UnknownProvider("ghost".to_string())
        );

        manager
            .register_provider("p1", Arc::new(MockTranscriptionProvider::new("p1")))
            .unwrap();
        assert_eq!(
            manager
                .register_provider("p1", Arc::new(MockTranscriptionProvider::new("p1")))
                .unwrap_err(),
            TranscriptionError::DuplicateProvider("p1".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_all_caches_reports_per_provider() {
        let manager = manager_with_chain(&["p1"], 0.6);
        manager
            .register_provider("p1", Arc::new(MockTranscriptionProvider::new("p1")))
            .unwrap();
        manager
            .register_provider("cold", Arc::new(MockTranscriptionProvider::new("cold")))
            .unwrap();
        manager.transcribe(clip("a.wav")).await.unwrap();

        let report = manager.clear_all_caches().await;

        assert!(report.is_complete());
        assert_eq!(report.cleared, vec!["p1".to_string()]);
        assert_eq!(report.skipped, vec!["cold".to_string()]);
    }
}
