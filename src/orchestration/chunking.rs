//! Sentence-boundary chunking for long documents
//!
//! Text is cut only after sentence terminators, so no chunk ever ends in the
//! middle of a sentence. Each sentence keeps its trailing whitespace, which
//! makes concatenating the chunks reproduce the input exactly. A single
//! sentence longer than the target becomes a chunk of its own.

/// Characters that end a sentence
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Closing characters that may follow a terminator and still belong to the
/// sentence, e.g. `"Stop!"` or `(see above.)`
const TRAILING_CLOSERS: &[char] = &['"', '\'', ')', ']', '”', '’', '»'];

/// Split `text` into sentences, each including its trailing whitespace
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&ch) {
            continue;
        }

        // Absorb repeated terminators and closing quotes/brackets
        while let Some(&(_, next)) = chars.peek() {
            if SENTENCE_TERMINATORS.contains(&next) || TRAILING_CLOSERS.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }

        // A terminator not followed by whitespace (e.g. "3.14", "e.g.x") is not a boundary
        match chars.peek() {
            None => {}
            Some(&(_, next)) if next.is_whitespace() => {}
            Some(_) => continue,
        }

        while let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map_or(text.len(), |&(index, _)| index);
        sentences.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Group sentences into ordered chunks of at most `target_chars` characters
/// where possible
pub fn chunk_text(text: &str, target_chars: usize) -> Vec<String> {
    let target_chars = target_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        if !current.is_empty() && current_chars + sentence_chars > target_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push_str(sentence);
        current_chars += sentence_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Join per-chunk outputs in order, separating pieces with one space when
/// neither side already has whitespace at the seam
pub fn reassemble<S: AsRef<str>>(parts: &[S]) -> String {
    let mut output = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        let needs_space = !output.is_empty()
            && !output.ends_with(char::is_whitespace)
            && !part.starts_with(char::is_whitespace);
        if needs_space {
            output.push(' ');
        }
        output.push_str(part);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_whitespace_with_sentence() {
        let sentences = split_sentences("One. Two!  Three? Four");
        assert_eq!(sentences, vec!["One. ", "Two!  ", "Three? ", "Four"]);
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let sentences = split_sentences("Pi is 3.14 today. Yes.");
        assert_eq!(sentences, vec!["Pi is 3.14 today. ", "Yes."]);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        let sentences = split_sentences("He said \"Stop!\" Then left.");
        assert_eq!(sentences, vec!["He said \"Stop!\" ", "Then left."]);
    }

    #[test]
    fn test_chunks_respect_target_and_concatenate_to_input() {
        let text = "Aaaa. Bbbb. Cccc. Dddd.";
        let chunks = chunk_text(text, 12);
        assert_eq!(chunks, vec!["Aaaa. Bbbb. ", "Cccc. Dddd."]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_long_sentence_is_never_split() {
        let text = "This single sentence is far longer than the target. Short.";
        let chunks = chunk_text(text, 10);
        assert_eq!(chunks[0], "This single sentence is far longer than the target. ");
        assert_eq!(chunks[1], "Short.");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
    }

    #[test]
    fn test_reassemble_inserts_single_space_at_bare_seams() {
        assert_eq!(reassemble(&["Hola.", "Adiós."]), "Hola. Adiós.");
        assert_eq!(reassemble(&["Hola. ", "Adiós."]), "Hola. Adiós.");
        assert_eq!(reassemble(&["", "x"]), "x");
    }
}
