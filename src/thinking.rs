use once_cell::sync::Lazy;
use regex::Regex;

static THINKING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?s)<think>(.*?)</think>",
        r"(?s)Thinking\.\.\.(.*?)\.\.\.done thinking\.",
        r"(?s)\[THINKING\](.*?)\[/THINKING\]",
    ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Regular(String),
    Thinking(String),
}

/// Splits model output into regular text and reasoning blocks, in order.
/// Whitespace-only regular text between blocks is dropped.
pub fn split_thinking(text: &str) -> Vec<Segment> {
    let mut matches: Vec<(usize, usize, String)> = THINKING_PATTERNS.iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some((whole.start(), whole.end(), inner.as_str().trim().to_string()))
        })
        .collect();
    matches.sort_by_key(|(start, _, _)| *start);

    let mut segments = Vec::new();
    let mut last = 0;
    for (start, end, inner) in matches {
        // overlapping match from a different pattern
        if start < last {
            continue;
        }
        push_regular(&mut segments, &text[last..start]);
        segments.push(Segment::Thinking(inner));
        last = end;
    }
    push_regular(&mut segments, &text[last..]);
    segments
}

fn push_regular(segments: &mut Vec<Segment>, text: &str) {
    if !text.trim().is_empty() {
        segments.push(Segment::Regular(text.to_string()));
    }
}

/// The text with every reasoning block removed.
pub fn strip_thinking(text: &str) -> String {
    split_thinking(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Regular(t) => Some(t),
            Segment::Thinking(_) => None,
        })
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_regular_segment() {
        assert_eq!(split_thinking("just an answer"), vec![Segment::Regular("just an answer".into())]);
    }

    #[test]
    fn think_tags_are_extracted() {
        let segments = split_thinking("<think>\nweigh options\n</think>\n\nThe answer is 4.");
        assert_eq!(segments, vec![
            Segment::Thinking("weigh options".into()),
            Segment::Regular("\n\nThe answer is 4.".into())
        ]);
    }

    #[test]
    fn mixed_patterns_keep_source_order() {
        let text = "A [THINKING]one[/THINKING] B Thinking...two...done thinking. C";
        let segments = split_thinking(text);
        assert_eq!(segments, vec![
            Segment::Regular("A ".into()),
            Segment::Thinking("one".into()),
            Segment::Regular(" B ".into()),
            Segment::Thinking("two".into()),
            Segment::Regular(" C".into())
        ]);
        assert_eq!(strip_thinking(text), "A  B  C");
    }

    #[test]
    fn unterminated_block_stays_regular() {
        let text = "<think>still going";
        assert_eq!(split_thinking(text), vec![Segment::Regular(text.into())]);
    }
}
