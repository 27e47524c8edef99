use proptest::prelude::*;

/// Strategy for generating one sentence: words followed by a terminator
pub fn sentence_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-zA-Z0-9]{1,12}", 1..12),
        prop_oneof![Just("."), Just("!"), Just("?"), Just("...")],
    )
        .prop_map(|(words, terminator)| format!("{}{}", words.join(" "), terminator))
}

/// Strategy for generating prose: sentences joined by varying whitespace
pub fn prose_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (sentence_strategy(), prop_oneof![Just(" "), Just("  "), Just("\n"), Just("\n\n")]),
        0..40,
    )
    .prop_map(|parts| {
        parts
            .into_iter()
            .map(|(sentence, gap)| format!("{sentence}{gap}"))
            .collect::<String>()
    })
}

/// Strategy for generating arbitrary text, including multi-byte characters
pub fn any_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,200}",
        "[a-z ]{0,20000}",
    ]
}
