/// Splits `input` into pieces of at most `limit` characters.
///
/// A piece ends at the last newline inside the window when there is one, so
/// paragraphs survive the split; otherwise it is cut at the limit. Splits never
/// fall inside a multi-byte character. Empty pieces are dropped.
pub fn split_message(input: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some((cut, _)) = rest.char_indices().nth(limit) else {
            push_trimmed(&mut chunks, rest);
            break;
        };

        let window = &rest[..cut];
        let (chunk, next) = match window.rfind('\n') {
            Some(newline) if newline > 0 => (&rest[..newline], &rest[newline + 1..]),
            _ => (window, &rest[cut..]),
        };
        push_trimmed(&mut chunks, chunk);
        rest = next;
    }

    chunks
}

/// Cuts `input` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_message(input: &str, limit: usize) -> String {
    match input.char_indices().nth(limit.saturating_sub(1)) {
        Some((cut, _)) if input[cut..].chars().count() > 1 => format!("{}…", &input[..cut]),
        _ => input.to_string(),
    }
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk.trim_end().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::{split_message, truncate_message};

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 2000), vec!["hello"]);
        assert!(split_message("", 2000).is_empty());
        assert!(split_message("  \n ", 2000).is_empty());
    }

    #[test]
    fn long_line_is_cut_at_limit() {
        let text = "a".repeat(4500);
        let chunks = split_message(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn prefers_newline_boundaries() {
        let text = format!("{}\n{}", "a".repeat(1500), "b".repeat(1000));
        let chunks = split_message(&text, 2000);
        assert_eq!(chunks, vec!["a".repeat(1500), "b".repeat(1000)]);
    }

    #[test]
    fn never_splits_inside_a_character() {
        let text = "é".repeat(2500);
        let chunks = split_message(&text, 2000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[1].chars().count(), 500);
    }

    #[test]
    fn truncation_keeps_short_text() {
        assert_eq!(truncate_message("short", 2000), "short");
        assert_eq!(truncate_message("abc", 3), "abc");
    }

    #[test]
    fn truncation_cuts_on_char_boundary() {
        let text = "é".repeat(2500);
        let cut = truncate_message(&text, 2000);
        assert_eq!(cut.chars().count(), 2000);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_message("abcd", 3), "ab…");
    }
}
