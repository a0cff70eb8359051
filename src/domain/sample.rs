// ============================================================
// Layer 3 — Labelled Sample
// ============================================================
// One row of the labels table: an image filename and the
// text drawn inside it. Paths are resolved against the images
// directory by the data layer, never here.

use serde::{Deserialize, Serialize};

use crate::domain::vocabulary::Vocabulary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledSample {
    /// File name relative to the images directory
    pub filename: String,

    /// Ground-truth text, one alphabet symbol per character
    pub label: String,
}

impl LabelledSample {
    pub fn new(filename: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            label:    label.into(),
        }
    }

    /// Number of characters in the label
    pub fn label_len(&self) -> usize {
        self.label.chars().count()
    }

    /// True when every label character belongs to the vocabulary
    pub fn is_closed_over(&self, vocab: &Vocabulary) -> bool {
        self.label.chars().all(|c| vocab.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_len_counts_chars() {
        let s = LabelledSample::new("captcha_00001.png", "abcd");
        assert_eq!(s.label_len(), 4);
    }

    #[test]
    fn test_vocabulary_closure() {
        let v = Vocabulary::lowercase();
        assert!(LabelledSample::new("a.png", "qwer").is_closed_over(&v));
        assert!(!LabelledSample::new("b.png", "qw3r").is_closed_over(&v));
    }
}
