mod common;

use common::strategies::*;
use proptest::prelude::*;
use textflow_core::cache::{generate_content_hash, ContentHasher};
use textflow_core::orchestration::{chunk_text, partition, split_sentences};

proptest! {
    /// Property: partitioning yields ceil(M/B) contiguous batches preserving order
    #[test]
    fn partition_preserves_order_and_count(
        items in prop::collection::vec(any::<u32>(), 0..200),
        batch_size in 1usize..50,
    ) {
        let expected_batches = items.len().div_ceil(batch_size);
        let batches = partition(items.clone(), batch_size);

        prop_assert_eq!(batches.len(), expected_batches);
        prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
        prop_assert!(batches.iter().rev().skip(1).all(|b| b.len() == batch_size));
        prop_assert_eq!(batches.concat(), items);
    }

    /// Property: chunks reassemble to the exact input
    #[test]
    fn chunks_concatenate_to_input(text in prose_strategy(), target in 1usize..500) {
        let chunks = chunk_text(&text, target);
        prop_assert_eq!(chunks.concat(), text);
    }

    /// Property: a chunk only exceeds the target when it holds a single sentence
    #[test]
    fn oversized_chunks_hold_one_sentence(text in prose_strategy(), target in 1usize..500) {
        for chunk in chunk_text(&text, target) {
            if chunk.chars().count() > target {
                prop_assert_eq!(split_sentences(&chunk).len(), 1, "chunk: {:?}", chunk);
            }
        }
    }

    /// Property: every chunk but the last ends at a sentence boundary
    #[test]
    fn chunks_never_end_mid_sentence(text in prose_strategy(), target in 1usize..500) {
        let chunks = chunk_text(&text, target);
        for chunk in chunks.iter().rev().skip(1) {
            let trimmed = chunk.trim_end();
            prop_assert!(
                trimmed.ends_with(&['.', '!', '?'][..]),
                "chunk does not end a sentence: {:?}",
                chunk
            );
        }
    }

    /// Property: hashing is deterministic and never panics
    #[test]
    fn content_hash_is_deterministic(text in any_text_strategy()) {
        let first = generate_content_hash(&text);
        let second = generate_content_hash(&text);
        prop_assert_eq!(&first, &second);
        let expected_suffix = format!(":{}", text.len());
        prop_assert!(first.ends_with(&expected_suffix));
    }

    /// Property: below the full-scan threshold any single-character change alters the hash
    #[test]
    fn small_inputs_are_hashed_in_full(
        text in "[a-z]{1,200}",
        position in any::<prop::sample::Index>(),
    ) {
        let hasher = ContentHasher::default();
        let index = position.index(text.len());
        let mut changed = text.clone();
        changed.replace_range(index..=index, "#");
        prop_assert_ne!(hasher.hash(&text), hasher.hash(&changed));
    }
}
