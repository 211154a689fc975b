//! BM25-style sparse vectors. Term frequencies are saturated here; the
//! collection's `idf` modifier supplies the inverse document frequency.

use crate::embeddings::fnv1a;
use crate::models::SparseVector;
use regex::Regex;
use std::collections::BTreeMap;

pub const SPARSE_MODEL_NAME: &str = "bm25";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

#[derive(Debug, Clone)]
pub struct SparseEncoder {
    word: Regex,
    pub k1: f32,
    pub b: f32,
    pub avg_len: f32,
}

impl SparseEncoder {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            word: Regex::new(r"\w+")?,
            k1: 1.2,
            b: 0.75,
            avg_len: 256.0,
        })
    }

    pub fn model_name(&self) -> &'static str {
        SPARSE_MODEL_NAME
    }

    fn term_counts(&self, text: &str) -> (BTreeMap<u32, f32>, usize) {
        let lowered = text.to_lowercase();
        let mut counts = BTreeMap::new();
        let mut length = 0usize;
        for token in self.word.find_iter(&lowered).map(|m| m.as_str()) {
            if STOP_WORDS.contains(&token) {
                continue;
            }
            length += 1;
            *counts.entry(fnv1a(token.as_bytes()) as u32).or_insert(0.0) += 1.0;
        }
        (counts, length)
    }

    pub fn encode_document(&self, text: &str) -> SparseVector {
        let (counts, length) = self.term_counts(text);
        let norm = self.k1 * (1.0 - self.b + self.b * length as f32 / self.avg_len);

        let (indices, values) = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * (self.k1 + 1.0) / (tf + norm)))
            .unzip();
        SparseVector { indices, values }
    }

    pub fn encode_query(&self, text: &str) -> SparseVector {
        let (counts, _) = self.term_counts(text);
        let indices = counts.into_keys().collect::<Vec<_>>();
        let values = vec![1.0; indices.len()];
        SparseVector { indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_ignored_and_case_folded() {
        let encoder = SparseEncoder::new().unwrap();
        let query = encoder.encode_query("The ALARM and the alarm");
        assert_eq!(query.indices.len(), 1);
        assert_eq!(query.values, vec![1.0]);
    }

    #[test]
    fn repeated_terms_saturate() {
        let encoder = SparseEncoder::new().unwrap();
        let once = encoder.encode_document("overcurrent");
        let thrice = encoder.encode_document("overcurrent overcurrent overcurrent");

        assert_eq!(once.indices, thrice.indices);
        assert!(thrice.values[0] > once.values[0]);
        assert!(thrice.values[0] < 3.0 * once.values[0]);
        assert!(thrice.values[0] < encoder.k1 + 1.0);
    }

    #[test]
    fn empty_text_yields_empty_vector() {
        let encoder = SparseEncoder::new().unwrap();
        assert!(encoder.encode_document("the of and").is_empty());
    }
}
