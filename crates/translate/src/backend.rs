use async_trait::async_trait;
use quicktrans_common::{LanguagePair, Result};
use std::sync::Arc;

/// A translator bound to exactly one language pair
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;

    fn pair(&self) -> LanguagePair;
}

/// Source of translator instances.
///
/// `acquire` may download weights or contact a remote service; it is called
/// at most once per pair per load cycle of `TranslationManager`.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn acquire(&self, pair: LanguagePair) -> Result<Arc<dyn Translator>>;

    /// Backend name for logs and health output
    fn name(&self) -> &str;
}
