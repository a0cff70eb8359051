// ============================================================
// Layer 5 — CTC Greedy Decoder
// ============================================================
// Turns per-time-step class scores into text.
//
//   1. At every time step keep the highest-scoring class
//      (ties go to the lowest class index)
//   2. Drop a class equal to the previous time step's class
//   3. Drop the blank class
//   4. Map the remaining indices to characters, in time order
//
// Example (∅ = blank):
//   argmax  ∅ a a ∅ b ∅       →  "ab"
//   argmax  a ∅ a             →  "aa"   (blank separates repeats)
//   argmax  ∅ ∅ ∅             →  ""
//
// No beam search and no probability threshold.

use burn::prelude::*;
use std::sync::Arc;

use crate::domain::vocabulary::{Vocabulary, BLANK};

/// Run-length collapse followed by blank removal
pub fn collapse(indices: &[usize], blank: usize) -> Vec<usize> {
    let mut out  = Vec::with_capacity(indices.len());
    let mut prev = None;
    for &idx in indices {
        if prev != Some(idx) && idx != blank {
            out.push(idx);
        }
        prev = Some(idx);
    }
    out
}

/// Index of the largest score; the first one wins a tie
pub fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct GreedyDecoder {
    vocab: Arc<Vocabulary>,
}

impl GreedyDecoder {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Decode one sequence of per-step argmax indices
    pub fn decode_indices(&self, indices: &[usize]) -> String {
        self.vocab.decode(&collapse(indices, BLANK))
    }

    /// Decode one sequence of per-step score vectors
    pub fn decode_scores(&self, steps: &[Vec<f32>]) -> String {
        let best: Vec<usize> = steps.iter().map(|s| argmax(s)).collect();
        self.decode_indices(&best)
    }

    /// Decode a [batch, time, classes] score tensor into one string per sample
    pub fn decode_batch<B: Backend>(&self, scores: Tensor<B, 3>) -> Vec<String> {
        let [batch, steps, _] = scores.dims();
        if steps == 0 {
            return vec![String::new(); batch];
        }

        let best: Vec<usize> = scores
            .argmax(2)
            .into_data()
            .iter::<i64>()
            .map(|i| i as usize)
            .collect();

        best.chunks(steps).map(|row| self.decode_indices(row)).collect()
    }
}
