//! Transcription service
//!
//! Owns the speech engine for the life of the process. The engine is loaded
//! on first use; concurrent first requests share a single load.

use quicktrans_common::{JobLimits, LazyResource, QuickTransError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::audio::check_audio_path;
use crate::engine::{SpeechEngine, SpeechEngineLoader};
use crate::types::{Transcription, TranscriptionOptions};

pub struct TranscriptionService {
    loader: Arc<dyn SpeechEngineLoader>,
    engine: LazyResource<dyn SpeechEngine>,
    limits: JobLimits,
}

impl TranscriptionService {
    pub fn new(loader: Arc<dyn SpeechEngineLoader>, limits: JobLimits) -> Self {
        Self {
            loader,
            engine: LazyResource::new(),
            limits,
        }
    }

    /// Transcribe an audio file.
    ///
    /// Input checks (file exists, hint well-formed) run before the engine is
    /// loaded, so a bad request never triggers a model load.
    pub async fn transcribe(
        &self,
        audio_path: impl AsRef<Path>,
        options: TranscriptionOptions,
    ) -> Result<Transcription> {
        let path = check_audio_path(audio_path.as_ref())?;
        options.validate()?;

        let permit = self.limits.admit().await?;
        let engine = self.engine().await?;

        let started = Instant::now();
        let result = self
            .limits
            .run_blocking("Transcription", permit, move || engine.transcribe(&path, &options))
            .await;

        match &result {
            Ok(t) => info!(
                "Transcribed {:.1}s of audio in {:.2}s (language={})",
                t.duration,
                started.elapsed().as_secs_f64(),
                t.language
            ),
            Err(e) => error!("Transcription failed: {}", e),
        }

        result
    }

    /// Loaded engine, loading it first if needed
    pub async fn engine(&self) -> Result<Arc<dyn SpeechEngine>> {
        self.limits
            .within_load_timeout(
                "speech engine",
                self.engine.get_or_try_init(|| async {
                    info!("Loading speech engine...");
                    let started = Instant::now();
                    let engine = self.loader.load().await.map_err(|e| {
                        error!("Speech engine load failed: {}", e);
                        as_load_failure(e)
                    })?;
                    info!(
                        "Speech engine '{}' ready in {:.1}s",
                        engine.name(),
                        started.elapsed().as_secs_f64()
                    );
                    Ok::<_, QuickTransError>(engine)
                }),
            )
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    /// Release the engine; the next request loads it again
    pub fn unload(&self) {
        if self.engine.is_loaded() {
            info!("Releasing speech engine");
        }
        self.engine.reset();
    }
}

/// Loader failures are acquisition failures unless they already say otherwise
fn as_load_failure(err: QuickTransError) -> QuickTransError {
    match err {
        QuickTransError::ModelLoad(_) => err,
        other => QuickTransError::model_load(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeEngine {
        calls: Arc<AtomicUsize>,
    }

    impl SpeechEngine for FakeEngine {
        fn transcribe(&self, _path: &Path, options: &TranscriptionOptions) -> Result<Transcription> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let language = options.language.clone().unwrap_or_else(|| "zh".to_string());
            Ok(Transcription::from_segments(
                vec![Segment::new(0.0, 1.0, "你好"), Segment::new(1.0, 2.0, "世界")],
                language,
                0.9,
                2.0,
            ))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FakeLoader {
        loads: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        fail_first: bool,
        delay: Duration,
    }

    impl FakeLoader {
        fn new() -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
                fail_first: false,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl SpeechEngineLoader for FakeLoader {
        async fn load(&self) -> Result<Arc<dyn SpeechEngine>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail_first && n == 0 {
                return Err(QuickTransError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            Ok(Arc::new(FakeEngine {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"RIFF").unwrap();
        file
    }

    #[tokio::test]
    async fn test_missing_audio_never_touches_engine() {
        let loader = FakeLoader::new();
        let loads = Arc::clone(&loader.loads);
        let calls = Arc::clone(&loader.calls);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());

        let err = service
            .transcribe("/no/such/file.wav", TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, QuickTransError::NotFound(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!service.is_loaded());
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected_before_load() {
        let loader = FakeLoader::new();
        let loads = Arc::clone(&loader.loads);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());
        let notes = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();

        let err = service
            .transcribe(notes.path(), TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation_error");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_hint_rejected_before_load() {
        let loader = FakeLoader::new();
        let loads = Arc::clone(&loader.loads);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());
        let audio = audio_file();

        let err = service
            .transcribe(audio.path(), TranscriptionOptions::new().with_language("Chinese"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation_error");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_loaded_once_across_requests() {
        let loader = FakeLoader::new();
        let loads = Arc::clone(&loader.loads);
        let calls = Arc::clone(&loader.calls);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());
        let audio = audio_file();

        for _ in 0..3 {
            let result = service
                .transcribe(audio.path(), TranscriptionOptions::new())
                .await
                .unwrap();
            assert_eq!(result.text, "你好 世界");
            assert_eq!(result.language, "zh");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let mut loader = FakeLoader::new();
        loader.delay = Duration::from_millis(50);
        let loads = Arc::clone(&loader.loads);
        let limits = JobLimits::new(8, Duration::from_secs(5), Duration::from_secs(5));
        let service = Arc::new(TranscriptionService::new(Arc::new(loader), limits));
        let audio = Arc::new(audio_file());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let audio = Arc::clone(&audio);
                tokio::spawn(async move {
                    service
                        .transcribe(audio.path(), TranscriptionOptions::new())
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_acquisition_failure_and_retried() {
        let mut loader = FakeLoader::new();
        loader.fail_first = true;
        let loads = Arc::clone(&loader.loads);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());
        let audio = audio_file();

        let err = service
            .transcribe(audio.path(), TranscriptionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "resource_acquisition_failure");
        assert!(!service.is_loaded());

        service
            .transcribe(audio.path(), TranscriptionOptions::new())
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_load_times_out() {
        let mut loader = FakeLoader::new();
        loader.delay = Duration::from_secs(5);
        let limits = JobLimits::new(1, Duration::from_millis(20), Duration::from_secs(5));
        let service = TranscriptionService::new(Arc::new(loader), limits);
        let audio = audio_file();

        let err = service
            .transcribe(audio.path(), TranscriptionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QuickTransError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_unload_forces_reload() {
        let loader = FakeLoader::new();
        let loads = Arc::clone(&loader.loads);
        let service = TranscriptionService::new(Arc::new(loader), JobLimits::default());
        let audio = audio_file();

        service.transcribe(audio.path(), TranscriptionOptions::new()).await.unwrap();
        assert!(service.is_loaded());

        service.unload();
        assert!(!service.is_loaded());

        service.transcribe(audio.path(), TranscriptionOptions::new()).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
