//! Document reading and chunking.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, GB18030, UTF_8};
use std::path::Path;
use tracing::{debug, warn};

use kfuse_core::error::FusionResult;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Counts chars, never bytes, so multi-byte text is never cut mid-character.
/// A `max_chars` of zero is treated as one.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Read a document as text.
///
/// A byte-order mark decides the encoding when present. Otherwise valid UTF-8
/// is taken as is, and anything else goes through charset detection with
/// GB18030 as the fallback.
pub fn read_text_file(path: impl AsRef<Path>) -> FusionResult<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let (text, encoding) = decode_text(&bytes);
    debug!(path = %path.display(), encoding = encoding.name(), chars = text.chars().count(), "Read document");
    Ok(text)
}

/// Decode raw document bytes, returning the text and the encoding used.
pub fn decode_text(bytes: &[u8]) -> (String, &'static Encoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), UTF_8);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);

    for encoding in [guess, GB18030] {
        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if !had_errors {
            return (text.into_owned(), encoding);
        }
    }

    warn!(encoding = guess.name(), "Document has undecodable bytes, replacing them");
    let (text, _) = guess.decode_without_bom_handling(bytes);
    (text.into_owned(), guess)
}
