//! SentencePiece vocabularies for upstream OPUS-MT checkpoints
//!
//! Upstream repos ship `source.spm` (the SentencePiece model that splits
//! source text into pieces) and `vocab.json` (piece to model id). Pieces
//! come from a unigram model built from the `.spm` pieces and scores; ids
//! come from `vocab.json`.

use prost::Message;
use quicktrans_common::{QuickTransError, Result};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::unigram::Unigram;
use tokenizers::normalizers::{Nmt, NFKC};
use tokenizers::{Model, NormalizedString, Normalizer};

/// Word-boundary marker SentencePiece prepends to each word
pub const WORD_BOUNDARY: char = '\u{2581}';

const UNK_PIECE: &str = "<unk>";

/// `ModelProto` from sentencepiece_model.proto; only the pieces are read
#[derive(Clone, PartialEq, prost::Message)]
pub struct SpmModel {
    #[prost(message, repeated, tag = "1")]
    pub pieces: Vec<SpmPiece>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpmPiece {
    #[prost(string, optional, tag = "1")]
    pub piece: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub score: Option<f32>,
    #[prost(int32, optional, tag = "3")]
    pub kind: Option<i32>,
}

impl SpmPiece {
    pub const NORMAL: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const CONTROL: i32 = 3;
}

/// Source-side splitter plus the model's shared vocabulary
pub struct SentencePieceVocab {
    splitter: Unigram,
    ids: HashMap<String, u32>,
    pieces: HashMap<u32, String>,
    unk_id: u32,
}

impl SentencePieceVocab {
    /// Read `source.spm` and `vocab.json`
    pub fn load(spm: &Path, vocab: &Path) -> Result<Self> {
        let bytes = std::fs::read(spm)?;
        let model = SpmModel::decode(bytes.as_slice()).map_err(|e| {
            QuickTransError::model_load(format!("Invalid SentencePiece model {}: {}", spm.display(), e))
        })?;

        let ids: HashMap<String, u32> = serde_json::from_reader(std::fs::File::open(vocab)?)
            .map_err(|e| QuickTransError::model_load(format!("Invalid vocab {}: {}", vocab.display(), e)))?;

        Self::from_parts(model, ids)
    }

    pub fn from_parts(model: SpmModel, ids: HashMap<String, u32>) -> Result<Self> {
        let mut scored = Vec::with_capacity(model.pieces.len());
        let mut spm_unk = None;

        for piece in model.pieces {
            let kind = piece.kind.unwrap_or(SpmPiece::NORMAL);
            // Control pieces (<s>, </s>) never match input text
            if kind == SpmPiece::CONTROL {
                continue;
            }
            if kind == SpmPiece::UNKNOWN && spm_unk.is_none() {
                spm_unk = Some(scored.len());
            }
            scored.push((piece.piece.unwrap_or_default(), piece.score.unwrap_or(0.0) as f64));
        }

        if scored.is_empty() {
            return Err(QuickTransError::model_load("SentencePiece model has no pieces"));
        }

        let splitter = Unigram::from(scored, Some(spm_unk.unwrap_or(0)), false)
            .map_err(|e| QuickTransError::model_load(format!("Failed to build unigram model: {}", e)))?;

        let unk_id = *ids
            .get(UNK_PIECE)
            .ok_or_else(|| QuickTransError::model_load("vocab.json has no <unk> entry"))?;
        let pieces = ids.iter().map(|(piece, id)| (*id, piece.clone())).collect();

        Ok(Self {
            splitter,
            ids,
            pieces,
            unk_id,
        })
    }

    /// Model ids for `text`, without the trailing end-of-sentence id
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut normalized = NormalizedString::from(text);
        Nmt.normalize(&mut normalized)
            .and_then(|_| NFKC.normalize(&mut normalized))
            .map_err(|e| QuickTransError::processing(format!("Normalization failed: {}", e)))?;

        let mut ids = Vec::new();
        for word in normalized.get().split_whitespace() {
            let word = format!("{}{}", WORD_BOUNDARY, word);
            let tokens = self
                .splitter
                .tokenize(&word)
                .map_err(|e| QuickTransError::processing(format!("Tokenization failed: {}", e)))?;
            ids.extend(
                tokens
                    .iter()
                    .map(|t| self.ids.get(&t.value).copied().unwrap_or(self.unk_id)),
            );
        }

        Ok(ids)
    }

    /// Text for model ids; special pieces are dropped
    pub fn decode(&self, ids: &[u32]) -> String {
        let joined: String = ids
            .iter()
            .filter_map(|id| self.pieces.get(id))
            .filter(|piece| !is_special(piece))
            .map(String::as_str)
            .collect();

        joined.replace(WORD_BOUNDARY, " ").trim().to_string()
    }
}

fn is_special(piece: &str) -> bool {
    piece.len() > 2 && piece.starts_with('<') && piece.ends_with('>')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(text: &str, score: f32, kind: i32) -> SpmPiece {
        SpmPiece {
            piece: Some(text.to_string()),
            score: Some(score),
            kind: Some(kind),
        }
    }

    /// Tiny model: "▁hello" is one piece, "world" has to be split
    fn sample_model() -> SpmModel {
        SpmModel {
            pieces: vec![
                piece("<unk>", 0.0, SpmPiece::UNKNOWN),
                piece("<s>", 0.0, SpmPiece::CONTROL),
                piece("</s>", 0.0, SpmPiece::CONTROL),
                piece("▁hello", -1.0, SpmPiece::NORMAL),
                piece("▁wor", -2.0, SpmPiece::NORMAL),
                piece("ld", -2.0, SpmPiece::NORMAL),
                piece("▁", -3.0, SpmPiece::NORMAL),
                piece("w", -5.0, SpmPiece::NORMAL),
                piece("o", -5.0, SpmPiece::NORMAL),
                piece("r", -5.0, SpmPiece::NORMAL),
                piece("l", -5.0, SpmPiece::NORMAL),
                piece("d", -5.0, SpmPiece::NORMAL),
            ],
        }
    }

    fn sample_vocab() -> HashMap<String, u32> {
        [("</s>", 0), ("<unk>", 1), ("▁hello", 2), ("▁wor", 3), ("ld", 4), ("▁", 5), ("<pad>", 6)]
            .into_iter()
            .map(|(p, id)| (p.to_string(), id))
            .collect()
    }

    #[test]
    fn test_encode_uses_vocab_ids() {
        let vocab = SentencePieceVocab::from_parts(sample_model(), sample_vocab()).unwrap();
        assert_eq!(vocab.encode("hello  world").unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_pieces_missing_from_vocab_are_unknown() {
        let vocab = SentencePieceVocab::from_parts(sample_model(), sample_vocab()).unwrap();
        // "▁" then "w" / "o": "w" and "o" have no vocab entry
        let ids = vocab.encode("wo").unwrap();
        assert!(ids.contains(&1));
    }

    #[test]
    fn test_decode_drops_special_pieces() {
        let vocab = SentencePieceVocab::from_parts(sample_model(), sample_vocab()).unwrap();
        assert_eq!(vocab.decode(&[6, 2, 3, 4, 0]), "hello world");
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let spm = dir.path().join("source.spm");
        let vocab = dir.path().join("vocab.json");
        std::fs::write(&spm, sample_model().encode_to_vec()).unwrap();
        std::fs::write(&vocab, serde_json::to_vec(&sample_vocab()).unwrap()).unwrap();

        let loaded = SentencePieceVocab::load(&spm, &vocab).unwrap();
        assert_eq!(loaded.encode("hello").unwrap(), vec![2]);
    }

    #[test]
    fn test_vocab_without_unk_is_rejected() {
        let mut ids = sample_vocab();
        ids.remove("<unk>");
        let err = SentencePieceVocab::from_parts(sample_model(), ids).err().unwrap();
        assert_eq!(err.kind(), "resource_acquisition_failure");
    }

    #[test]
    fn test_garbage_model_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let spm = dir.path().join("source.spm");
        let vocab = dir.path().join("vocab.json");
        std::fs::write(&spm, [0xff, 0xff, 0xff]).unwrap();
        std::fs::write(&vocab, b"{}").unwrap();

        let err = SentencePieceVocab::load(&spm, &vocab).err().unwrap();
        assert_eq!(err.kind(), "resource_acquisition_failure");
    }
}
