// ============================================================
// Layer 3 — Character Vocabulary
// ============================================================
// Maps label characters to class indices and back.
//
// Index layout:
//   0        → CTC blank (never produced by a label)
//   1..=N    → alphabet symbols, in alphabet order
//
// The model therefore predicts N + 1 classes per time step.
// One Vocabulary is built per run. The generator and the
// decoder share it through an Arc; datasets borrow it to
// encode labels.

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Reserved class index for the CTC blank symbol
pub const BLANK: usize = 0;

/// Default CAPTCHA alphabet: lowercase ASCII letters
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<char>,
    index:   HashMap<char, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from an alphabet string.
    /// Fails on an empty alphabet or a repeated character.
    pub fn new(alphabet: &str) -> Result<Self> {
        let symbols: Vec<char> = alphabet.chars().collect();
        if symbols.is_empty() {
            bail!("Alphabet must contain at least one character");
        }

        let mut index = HashMap::with_capacity(symbols.len());
        for (i, &c) in symbols.iter().enumerate() {
            if index.insert(c, i + 1).is_some() {
                bail!("Alphabet contains '{c}' more than once");
            }
        }

        Ok(Self { symbols, index })
    }

    /// The a–z vocabulary used by the synthetic generator
    pub fn lowercase() -> Self {
        let symbols: Vec<char> = LOWERCASE.chars().collect();
        let index = symbols.iter().enumerate().map(|(i, &c)| (c, i + 1)).collect();
        Self { symbols, index }
    }

    /// Number of model output classes (alphabet + blank)
    pub fn num_classes(&self) -> usize {
        self.symbols.len() + 1
    }

    pub fn alphabet(&self) -> String {
        self.symbols.iter().collect()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn contains(&self, c: char) -> bool {
        self.index.contains_key(&c)
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    /// Class index → character. Blank and out-of-range indices map to None.
    pub fn symbol(&self, index: usize) -> Option<char> {
        if index == BLANK {
            return None;
        }
        self.symbols.get(index - 1).copied()
    }

    /// Encode a label into class indices.
    /// Every character must belong to the alphabet.
    pub fn encode(&self, label: &str) -> Result<Vec<usize>> {
        label
            .chars()
            .map(|c| match self.index_of(c) {
                Some(i) => Ok(i),
                None => bail!("Label '{label}' contains '{c}', which is not in the alphabet"),
            })
            .collect()
    }

    /// Decode class indices verbatim (no CTC collapse), skipping blanks
    pub fn decode(&self, indices: &[usize]) -> String {
        indices.iter().filter_map(|&i| self.symbol(i)).collect()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::lowercase()
    }
}
