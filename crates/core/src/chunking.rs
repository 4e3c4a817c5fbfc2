use crate::error::IngestError;
use crate::metadata::Metadata;
use crate::models::DocumentChunk;

/// Sentence-terminal punctuation for Latin and CJK scripts.
fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Split text into sentence units, keeping each terminator (and any
/// whitespace that follows it) with its sentence. Concatenating the result
/// reproduces the input exactly.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if is_terminal(ch) {
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Accumulate sentences into chunks of at most `chunk_size` characters,
/// carrying a sentence-aligned suffix of at least `overlap` characters into
/// the next chunk. A single sentence longer than `chunk_size` becomes its
/// own oversized chunk rather than being cut mid-sentence.
///
/// Offsets are character offsets into `text`. Each chunk inherits
/// `base_metadata` plus `chunk_method = "sentence"`.
pub fn build_chunks(
    text: &str,
    base_metadata: &Metadata,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>, IngestError> {
    if chunk_size == 0 {
        return Err(IngestError::Validation(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(IngestError::Validation(format!(
            "overlap {overlap} must be smaller than chunk_size {chunk_size}"
        )));
    }

    let mut chunks = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffer_len = 0usize;
    let mut chunk_index = 0usize;
    let mut start_char = 0usize;

    let mut emit = |buffer: &[String], buffer_len: usize, index: usize, start: usize| {
        let mut metadata = base_metadata.clone();
        metadata.insert("chunk_method".to_string(), "sentence".into());
        chunks.push(DocumentChunk {
            content: buffer.concat(),
            metadata,
            chunk_index: index,
            start_char: start,
            end_char: start + buffer_len,
        });
    };

    for sentence in split_sentences(text) {
        let sentence_len = char_len(&sentence);

        if buffer_len + sentence_len > chunk_size && !buffer.is_empty() {
            emit(&buffer, buffer_len, chunk_index, start_char);

            if overlap > 0 {
                // Carry back whole sentences from the tail until the
                // overlap target is met.
                let mut carried = Vec::new();
                let mut carried_len = 0usize;
                for kept in buffer.iter().rev() {
                    carried_len += char_len(kept);
                    carried.insert(0, kept.clone());
                    if carried_len >= overlap {
                        break;
                    }
                }
                start_char = start_char + buffer_len - carried_len;
                buffer = carried;
                buffer_len = carried_len;
            } else {
                start_char += buffer_len;
                buffer.clear();
                buffer_len = 0;
            }

            chunk_index += 1;
        }

        buffer.push(sentence);
        buffer_len += sentence_len;
    }

    if !buffer.is_empty() {
        emit(&buffer, buffer_len, chunk_index, start_char);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, size: usize, overlap: usize) -> Vec<DocumentChunk> {
        build_chunks(text, &Metadata::new(), size, overlap).expect("valid chunk params")
    }

    #[test]
    fn sentences_reassemble_to_the_input() {
        let text = "First one. Second!  Third? 中文句子。尾部没有标点";
        let sentences = split_sentences(text);
        assert_eq!(sentences.concat(), text);
        assert_eq!(sentences.len(), 5);
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let chunks = chunk("A tiny note.", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A tiny note.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 12);
    }

    #[test]
    fn cjk_text_splits_at_the_sentence_boundary() {
        let text = "Python是一种解释型语言。它支持面向对象编程。";
        let chunks = chunk(text, 20, 5);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Python是一种解释型语言。");
        // The overlap tail is sentence-aligned, so the second chunk starts
        // with the whole first sentence (15 chars >= the 5-char overlap).
        assert!(chunks[1].content.starts_with("Python是一种解释型语言。"));
        assert!(chunks[1].content.ends_with("它支持面向对象编程。"));
        let carried = chunks[0].end_char - chunks[1].start_char;
        assert!(carried >= 5);
    }

    #[test]
    fn chunk_indices_increase_from_zero() {
        let text = "One. Two. Three. Four. Five. Six. Seven. Eight.";
        let chunks = chunk(text, 12, 0);
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, expected);
        }
        assert!(chunks.len() > 1);
    }

    #[test]
    fn chunks_without_overlap_cover_the_text_in_order() {
        let text = "Alpha beta. Gamma delta epsilon. Zeta eta theta iota. Kappa.";
        let chunks = chunk(text, 25, 0);

        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);

        let mut cursor = 0;
        for chunk in &chunks {
            assert_eq!(chunk.start_char, cursor);
            cursor = chunk.end_char;
        }
        assert_eq!(cursor, text.chars().count());
    }

    #[test]
    fn no_chunk_exceeds_size_except_an_oversized_sentence() {
        let text = "Short. Also short. Tiny.";
        for chunk in chunk(text, 12, 0) {
            assert!(chunk.content.chars().count() <= 12);
        }

        // A single unsplittable sentence is kept whole by policy.
        let oversized = "this sentence has no terminal punctuation and keeps going";
        let chunks = chunk(oversized, 10, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, oversized);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let result = build_chunks("Some text.", &Metadata::new(), 10, 10);
        assert!(result.is_err());
    }

    #[test]
    fn chunk_metadata_inherits_document_metadata() {
        let mut base = Metadata::new();
        base.insert("format".to_string(), "txt".into());
        let chunks = build_chunks("A sentence.", &base, 100, 0).expect("valid");
        assert_eq!(
            chunks[0].metadata.get("format").and_then(|v| v.as_str()),
            Some("txt")
        );
        assert_eq!(
            chunks[0]
                .metadata
                .get("chunk_method")
                .and_then(|v| v.as_str()),
            Some("sentence")
        );
    }
}
