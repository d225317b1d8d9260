//! Translation manager
//!
//! Keeps one translator per language pair for the life of the process.
//! Each pair is acquired on first use; concurrent first requests for the
//! same pair share a single acquisition. Pairs are checked against the
//! routing table before anything is acquired.
//!
//! The cache is unbounded: the routing table allows at most 12 keys.

use quicktrans_common::{JobLimits, LanguagePair, LazyResource, QuickTransError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::backend::{TranslationBackend, Translator};
use crate::types::{BatchItemResult, TranslationRequest, TranslationResult};

type Slot = Arc<LazyResource<dyn Translator>>;

pub struct TranslationManager {
    backend: Arc<dyn TranslationBackend>,
    translators: Mutex<HashMap<LanguagePair, Slot>>,
    limits: JobLimits,
}

impl TranslationManager {
    pub fn new(backend: Arc<dyn TranslationBackend>, limits: JobLimits) -> Self {
        Self {
            backend,
            translators: Mutex::new(HashMap::new()),
            limits,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Translate `text` from `source_lang` to `target_lang`
    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let pair = LanguagePair::from_codes(source_lang, target_lang)?;
        self.translate_pair(text, pair).await
    }

    /// Translate with an already validated pair
    pub async fn translate_pair(&self, text: &str, pair: LanguagePair) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let permit = self.limits.admit().await?;
        let translator = self.acquire(pair).await?;

        let started = Instant::now();
        let input = text.to_string();
        let result = self
            .limits
            .run_detached("Translation", permit, async move { translator.translate(&input).await })
            .await;

        match &result {
            Ok(_) => debug!(
                "Translated {} chars ({}) in {:.2}s",
                text.chars().count(),
                pair,
                started.elapsed().as_secs_f64()
            ),
            Err(e) => error!("Translation {} failed: {}", pair, e),
        }

        result
    }

    /// Translate a request into a full result record
    pub async fn translate_request(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let translated_text = self
            .translate(&request.text, &request.source_lang, &request.target_lang)
            .await?;

        Ok(TranslationResult {
            original_text: request.text.clone(),
            translated_text,
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
        })
    }

    /// Translate items in order.
    ///
    /// Items may use different pairs. Every pair is validated before any
    /// translator is acquired; after that the first failure aborts the batch.
    pub async fn translate_batch(&self, items: &[TranslationRequest]) -> Result<Vec<BatchItemResult>> {
        let pairs = items
            .iter()
            .map(|item| LanguagePair::from_codes(&item.source_lang, &item.target_lang))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(items.len());
        for (item, pair) in items.iter().zip(pairs) {
            let translated = self.translate_pair(&item.text, pair).await?;
            results.push(BatchItemResult {
                original: item.text.clone(),
                translated,
            });
        }

        Ok(results)
    }

    /// Cached translator for the pair, creating it on first use
    pub async fn get_or_create(&self, source_lang: &str, target_lang: &str) -> Result<Arc<dyn Translator>> {
        let pair = LanguagePair::from_codes(source_lang, target_lang)?;
        self.acquire(pair).await
    }

    async fn acquire(&self, pair: LanguagePair) -> Result<Arc<dyn Translator>> {
        let slot = self.slot(pair);

        self.limits
            .within_load_timeout(
                &format!("translator {}", pair),
                slot.get_or_try_init(|| async {
                    info!("Loading translator {} ({})", pair, self.backend.name());
                    let started = Instant::now();
                    let translator = self.backend.acquire(pair).await.map_err(|e| {
                        error!("Failed to load translator {}: {}", pair, e);
                        as_load_failure(e)
                    })?;
                    info!(
                        "Translator {} ready in {:.1}s",
                        pair,
                        started.elapsed().as_secs_f64()
                    );
                    Ok::<_, QuickTransError>(translator)
                }),
            )
            .await
    }

    fn slot(&self, pair: LanguagePair) -> Slot {
        let mut translators = self.translators.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(translators.entry(pair).or_default())
    }

    /// Pairs with a loaded translator, sorted
    pub fn cached_pairs(&self) -> Vec<LanguagePair> {
        let translators = self.translators.lock().unwrap_or_else(|e| e.into_inner());
        let mut pairs: Vec<_> = translators
            .iter()
            .filter(|(_, slot)| slot.is_loaded())
            .map(|(pair, _)| *pair)
            .collect();
        pairs.sort();
        pairs
    }

    /// Drop every cached translator
    pub fn release_all(&self) {
        let mut translators = self.translators.lock().unwrap_or_else(|e| e.into_inner());
        if !translators.is_empty() {
            info!("Releasing {} translator(s)", translators.len());
        }
        for slot in translators.values() {
            slot.reset();
        }
        translators.clear();
    }
}

fn as_load_failure(err: QuickTransError) -> QuickTransError {
    match err {
        QuickTransError::ModelLoad(_) | QuickTransError::UnsupportedLanguagePair { .. } => err,
        other => QuickTransError::model_load(other.to_string()),
    }
}
