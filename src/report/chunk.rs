//! Splitting reports into platform-sized posts.
//!
//! The number of chunks is derived from the character length of the whole
//! text, but splitting happens on line boundaries so no line is ever cut.

/// Split `text` into posts of roughly `limit` characters.
///
/// `parts = chars / limit + 1`. One part returns the text untouched.
/// Otherwise the lines are divided into `parts` contiguous groups whose sizes
/// differ by at most one, and each group is joined with `\n`. `parts` is
/// clamped to the line count so no chunk is ever empty; a single line longer
/// than `limit` stays whole.
pub fn chunk_report(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let parts = text.chars().count() / limit + 1;
    if parts == 1 {
        return vec![text.to_string()];
    }

    let lines: Vec<&str> = text.lines().collect();
    let parts = parts.min(lines.len());
    if parts <= 1 {
        return vec![text.to_string()];
    }

    split_even(&lines, parts)
        .into_iter()
        .map(|group| group.join("\n"))
        .collect()
}

/// Divide `items` into `n` contiguous groups; the first `len % n` groups get
/// one extra element.
fn split_even<'a, T>(items: &'a [T], n: usize) -> Vec<&'a [T]> {
    let (k, m) = (items.len() / n, items.len() % n);
    (0..n)
        .map(|i| &items[i * k + i.min(m)..(i + 1) * k + (i + 1).min(m)])
        .collect()
}

/// Cut `text` to at most `max` characters, ending with an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(lines: usize) -> String {
        (0..lines)
            .map(|i| format!("Sensor {i:02}: {} - 🟡😐 Maso", 60 + i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_short_text_is_returned_unchanged() {
        let text = "Koa nde aire?\n\nA: 1 - Libre\n";
        assert_eq!(chunk_report(text, 250), vec![text.to_string()]);
    }

    #[test]
    fn test_long_text_chunks_reconstruct_lines() {
        let text = report(23);
        let expected_parts = text.chars().count() / 250 + 1;
        assert!(expected_parts > 1);

        let chunks = chunk_report(&text, 250);
        assert_eq!(chunks.len(), expected_parts);
        assert!(chunks.iter().all(|c| !c.is_empty()));

        let rejoined = chunks.join("\n");
        assert_eq!(
            rejoined.lines().collect::<Vec<_>>(),
            text.lines().collect::<Vec<_>>()
        );

        let sizes: Vec<usize> = chunks.iter().map(|c| c.lines().count()).collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1, "sizes {sizes:?}");
    }

    #[test]
    fn test_limit_counts_characters_not_bytes() {
        // 100 emoji are 400 bytes but only 100 chars
        let text = "🟢".repeat(100);
        assert_eq!(chunk_report(&text, 250).len(), 1);
    }

    #[test]
    fn test_chunks_clamped_to_line_count() {
        let long_line = "x".repeat(1000);
        let text = format!("{long_line}\nshort");
        let chunks = chunk_report(&text, 250);
        assert_eq!(chunks, vec![long_line, "short".to_string()]);

        let single = "y".repeat(600);
        assert_eq!(chunk_report(&single, 250), vec![single.clone()]);
    }

    #[test]
    fn test_split_even_sizes() {
        let items: Vec<u32> = (0..10).collect();
        let groups = split_even(&items, 3);
        assert_eq!(groups, vec![&items[0..4], &items[4..7], &items[7..10]]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("ñandú", 3), "ña…");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
