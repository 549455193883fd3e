//! Marker-based splitting of streamed completion text.
//!
//! The completion stream interleaves chat prose with at most one embedded
//! document, delimited by a start and an end marker. The split is always
//! recomputed from the whole accumulated text so that chunk boundaries never
//! matter, and only the final end marker closes the document.

/// Partition `text` into `(before, inside, after)` around a marker pair.
///
/// - Without a start marker the whole text is `before`.
/// - Only the first start marker opens the document; later occurrences stay
///   in the remainder as plain text.
/// - Without an end marker, or with nothing after the start marker, the
///   remainder is returned as `after`.
/// - Otherwise every segment of the remainder but the last, joined without the
///   delimiter, is `inside` and the last segment is `after`. When the end
///   marker has not arrived yet the whole remainder is `inside`.
pub fn split_content(
    text: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> (String, String, String) {
    let start = match start {
        Some(s) if !s.is_empty() => s,
        _ => return (text.to_string(), String::new(), String::new()),
    };

    let (before, remainder) = match text.find(start) {
        Some(idx) => (&text[..idx], &text[idx + start.len()..]),
        None => return (text.to_string(), String::new(), String::new()),
    };

    let end = match end {
        Some(e) if !e.is_empty() && !remainder.is_empty() => e,
        _ => return (before.to_string(), String::new(), remainder.to_string()),
    };

    let segments: Vec<&str> = remainder.split(end).collect();
    // A single segment means the document is still open.
    let last = if segments.len() > 1 { segments.len() - 1 } else { 1 };

    (
        before.to_string(),
        segments[..last].concat(),
        segments[last..].concat(),
    )
}
