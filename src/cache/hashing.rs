//! Content hashing and cache key composition
//!
//! Content is digested with BLAKE3. Inputs below a byte threshold are hashed
//! in full; larger inputs contribute a fixed number of evenly spaced
//! characters, located by byte offset so the text is never walked, plus
//! their byte length. A collision on sampled input only costs one redundant
//! provider call, because the cache never decides correctness.

use crate::types::{TaskInput, TaskKind};

pub const CACHE_KEY_PREFIX: &str = "textflow";
pub const DEFAULT_FULL_SCAN_THRESHOLD: usize = 10_000;
pub const DEFAULT_SAMPLE_POINTS: usize = 100;

/// Hashes text content for cache addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    full_scan_threshold: usize,
    sample_points: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_SCAN_THRESHOLD, DEFAULT_SAMPLE_POINTS)
    }
}

impl ContentHasher {
    pub fn new(full_scan_threshold: usize, sample_points: usize) -> Self {
        Self {
            full_scan_threshold,
            sample_points: sample_points.max(1),
        }
    }

    /// Deterministic hash of `text`, formatted as `<hex>:<byte length>`
    pub fn hash(&self, text: &str) -> String {
        let length = text.len();

        let digest = if length < self.full_scan_threshold || length <= self.sample_points {
            blake3::hash(text.as_bytes())
        } else {
            let mut hasher = blake3::Hasher::new();
            for sample in 0..self.sample_points {
                let start = char_start(text, sample * length / self.sample_points);
                let width = text[start..].chars().next().map_or(0, char::len_utf8);
                hasher.update(&text.as_bytes()[start..start + width]);
            }
            hasher.finalize()
        };

        format!("{}:{length}", digest.to_hex())
    }
}

/// Start of the character containing byte `index`
fn char_start(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Hash `text` with the default threshold and sample count
pub fn generate_content_hash(text: &str) -> String {
    ContentHasher::default().hash(text)
}

/// Compose the lookup key for a result. Pure and deterministic.
pub fn generate_key(content_hash: &str, kind: TaskKind, parameter: &str) -> String {
    format!("{CACHE_KEY_PREFIX}:{}:{content_hash}:{parameter}", kind.as_str())
}

/// Cache key for a task input
pub fn key_for_input(hasher: &ContentHasher, input: &TaskInput) -> String {
    generate_key(
        &hasher.hash(input.text()),
        input.kind(),
        &input.cache_parameter(),
    )
}
