use crate::error::IngestError;
use crate::models::{sha256_hex, ChunkingOptions, DocumentChunk, DocumentRecord};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

fn validate_options(options: &ChunkingOptions) -> Result<(), IngestError> {
    if options.chunk_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    if options.overlap_chars >= options.chunk_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {} must be smaller than chunk size {}",
            options.overlap_chars, options.chunk_chars
        )));
    }
    Ok(())
}

/// Splits normalized text into fixed-size windows with a fixed overlap.
/// The split depends only on the text and the options, so re-running it
/// always reproduces the same boundaries.
pub fn split_text(normalized: &str, options: &ChunkingOptions) -> Result<Vec<String>, IngestError> {
    validate_options(options)?;

    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = options.chunk_chars - options.overlap_chars;
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + options.chunk_chars).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();

        if trimmed.len() >= options.min_chunk_chars {
            pieces.push(trimmed.to_string());
        } else if pieces.is_empty() && end == chars.len() && !trimmed.is_empty() {
            // A document shorter than the minimum still yields one chunk.
            pieces.push(trimmed.to_string());
        }

        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(pieces)
}

pub fn build_chunks(
    document: &DocumentRecord,
    options: &ChunkingOptions,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let normalized = normalize_whitespace(&document.text);
    let pieces = split_text(&normalized, options)?;

    let chunks = pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk_index = index as u64;
            DocumentChunk {
                chunk_id: make_chunk_id(&document.document_id, chunk_index, &text),
                document_id: document.document_id.clone(),
                file_name: document.file_name.clone(),
                chunk_index,
                text,
            }
        })
        .collect();

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut keyed = Vec::with_capacity(document_id.len() + 8 + text.len());
    keyed.extend_from_slice(document_id.as_bytes());
    keyed.extend_from_slice(&index.to_le_bytes());
    keyed.extend_from_slice(text.as_bytes());
    sha256_hex(&keyed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_text(text: &str) -> DocumentRecord {
        DocumentRecord::new("test.pdf", b"%PDF-1.4", text.to_string())
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn chunking_is_deterministic() {
        let options = ChunkingOptions {
            chunk_chars: 40,
            overlap_chars: 10,
            min_chunk_chars: 5,
        };
        let text = "Alice works for Acme Corp. Acme Corp is headquartered in Berlin. \
                    Bob collaborated with Alice on the rollout.";

        let first = split_text(text, &options).unwrap();
        let second = split_text(text, &options).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_ids_are_stable_across_reingestion() {
        let options = ChunkingOptions {
            chunk_chars: 40,
            overlap_chars: 10,
            min_chunk_chars: 5,
        };
        let document = record_with_text("Alice works for Acme Corp. Acme Corp ships anvils.");

        let first = build_chunks(&document, &options).unwrap();
        let second = build_chunks(&document, &options).unwrap();

        let first_ids: Vec<_> = first.iter().map(|chunk| chunk.chunk_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|chunk| chunk.chunk_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let options = ChunkingOptions {
            chunk_chars: 20,
            overlap_chars: 8,
            min_chunk_chars: 1,
        };
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";

        let pieces = split_text(text, &options).unwrap();
        assert!(pieces.len() >= 2);

        let tail: String = pieces[0].chars().skip(20 - 8).collect();
        assert!(pieces[1].starts_with(&tail));
    }

    #[test]
    fn short_document_still_yields_one_chunk() {
        let options = ChunkingOptions::default();
        let pieces = split_text("Tiny.", &options).unwrap();
        assert_eq!(pieces, vec!["Tiny.".to_string()]);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let options = ChunkingOptions {
            chunk_chars: 10,
            overlap_chars: 10,
            min_chunk_chars: 1,
        };
        let result = split_text("whatever", &options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }
}
