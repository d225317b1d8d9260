use quicktrans_common::{QuickTransError, Result, AUTO_DETECT};
use serde::{Deserialize, Serialize};

/// Single transcription segment with timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f32,

    /// End time in seconds
    pub end: f32,

    /// Transcribed text
    pub text: String,
}

impl Segment {
    /// Create a new segment
    pub fn new(start: f32, end: f32, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Get duration in seconds
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }
}

/// Complete transcription result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// Segment texts joined with single spaces
    pub text: String,

    /// Individual segments, in chronological order
    pub segments: Vec<Segment>,

    /// Detected (or declared) language code
    pub language: String,

    /// Confidence of the language detection (1.0 when declared)
    pub language_probability: f32,

    /// Audio duration in seconds
    pub duration: f32,
}

impl Transcription {
    /// Build a transcription from raw engine segments.
    ///
    /// Segment texts are trimmed and empty segments dropped; order is kept.
    pub fn from_segments(
        segments: impl IntoIterator<Item = Segment>,
        language: impl Into<String>,
        language_probability: f32,
        duration: f32,
    ) -> Self {
        let segments: Vec<Segment> = segments
            .into_iter()
            .filter_map(|seg| {
                let text = seg.text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(Segment::new(seg.start, seg.end, text))
                }
            })
            .collect();

        let text = segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            segments,
            language: language.into(),
            language_probability,
            duration,
        }
    }
}

/// Whether the engine keeps the spoken language or emits English
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionTask {
    #[default]
    Transcribe,
    Translate,
}

/// Transcription options
#[derive(Debug, Clone, Default)]
pub struct TranscriptionOptions {
    /// Language hint (e.g., "zh", "en"); `None` means auto-detect
    pub language: Option<String>,

    /// Transcribe or translate-to-English
    pub task: TranscriptionTask,
}

impl TranscriptionOptions {
    /// Create new options with defaults (auto-detect, transcribe)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set language hint; the `auto` sentinel clears it
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = if language == AUTO_DETECT {
            None
        } else {
            Some(language)
        };
        self
    }

    /// Set task
    pub fn with_task(mut self, task: TranscriptionTask) -> Self {
        self.task = task;
        self
    }

    /// Validate the hint's shape. Engines support far more languages than
    /// the translation table, so only the form of the code is checked here.
    pub fn validate(&self) -> Result<()> {
        if let Some(lang) = &self.language {
            let well_formed = (2..=3).contains(&lang.len())
                && lang.chars().all(|c| c.is_ascii_lowercase());
            if !well_formed {
                return Err(QuickTransError::validation(format!(
                    "Invalid language code: {}",
                    lang
                )));
            }
        }
        Ok(())
    }
}
