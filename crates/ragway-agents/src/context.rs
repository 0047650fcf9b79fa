use ragway_core::types::SearchResult;

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// The classifier's view of a window: numbered previews tagged by source.
pub fn build_context(window: &[SearchResult], preview_chars: usize) -> String {
    window
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}\n{}", i + 1, r.chunk.document_name(), preview(&r.chunk.content, preview_chars)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Results `[index * size, (index + 1) * size)`, clamped to the list.
pub fn window(candidates: &[SearchResult], index: usize, size: usize) -> &[SearchResult] {
    let start = index.saturating_mul(size).min(candidates.len());
    let end = start.saturating_add(size).min(candidates.len());
    &candidates[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 7), "héllo w");
        assert_eq!(preview("日本語のテキスト", 3), "日本語");
        assert_eq!(preview("short", 400), "short");
        assert_eq!(preview("abc", 0), "");
    }
}
