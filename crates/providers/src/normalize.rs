//! Text normalization for speech
//!
//! Reply sentences arrive as markdown-flavored model output; synthesis wants
//! plain speakable text. An empty result signals "skip this sentence".

/// Normalizes text before synthesis. The language tag is whatever the
/// transcription provider reported and is treated as opaque.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str, language: Option<&str>) -> String;
}

/// Passthrough normalizer for tests.
pub struct NoopNormalizer;

impl TextNormalizer for NoopNormalizer {
    fn normalize(&self, text: &str, _language: Option<&str>) -> String {
        text.to_string()
    }
}

/// Default normalizer: strips markdown structure and emoji, collapses
/// whitespace.
pub struct SpeechNormalizer;

impl TextNormalizer for SpeechNormalizer {
    fn normalize(&self, text: &str, _language: Option<&str>) -> String {
        let stripped = strip_markdown(text);
        let cleaned: String = stripped.chars().filter(|c| !is_emoji(*c)).collect();
        collapse_whitespace(&cleaned)
    }
}

/// Emoji and pictograph ranges worth silencing before synthesis.
fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F300}'..='\u{1F9FF}'
        | '\u{2600}'..='\u{26FF}'
        | '\u{2700}'..='\u{27BF}'
        | '\u{FE0F}'
    )
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = true; // also trims leading whitespace
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_gap {
                out.push(' ');
                in_gap = true;
            }
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Reduce markdown to the text a voice would read aloud.
fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let mut line = line;

        // Headers, blockquotes, list markers
        line = line.trim_start_matches(|c| c == '#').trim_start_matches('>');
        let trimmed = line.trim_start();
        for marker in ["- ", "* ", "+ "] {
            if let Some(rest) = trimmed.strip_prefix(marker) {
                line = rest;
                break;
            }
        }

        // Horizontal rules
        if !line.is_empty() && line.chars().all(|c| matches!(c, '-' | '*' | '_')) && line.len() >= 3
        {
            out.push('\n');
            continue;
        }

        out.push_str(&strip_inline(line));
        out.push('\n');
    }

    out
}

/// Inline markdown: links become their text, emphasis markers and code
/// fences disappear.
fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            // [text](url) -> text
            '[' => {
                if let Some((text, after)) = parse_link(&chars[i..]) {
                    out.push_str(&text);
                    i += after;
                    continue;
                }
                out.push('[');
                i += 1;
            }
            '*' | '_' | '`' => {
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Parse a `[text](url)` sequence starting at `[`; returns the link text and
/// consumed length.
fn parse_link(chars: &[char]) -> Option<(String, usize)> {
    let close = chars.iter().position(|&c| c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let paren = chars[close + 1..].iter().position(|&c| c == ')')?;
    let text: String = chars[1..close].iter().collect();
    Some((text, close + 2 + paren))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markdown_structure() {
        let normalizer = SpeechNormalizer;
        let input = "## Hello\n- **bold** and _italic_\n[link text](https://example.com)";
        let output = normalizer.normalize(input, None);
        assert_eq!(output, "Hello bold and italic link text");
    }

    #[test]
    fn test_strips_emoji() {
        let normalizer = SpeechNormalizer;
        assert_eq!(normalizer.normalize("great job 🎉", Some("en")), "great job");
    }

    #[test]
    fn test_emoji_only_sentence_normalizes_empty() {
        let normalizer = SpeechNormalizer;
        assert_eq!(normalizer.normalize("🎉🎉", None), "");
    }

    #[test]
    fn test_code_fence_markers_removed() {
        let normalizer = SpeechNormalizer;
        let output = normalizer.normalize("```python\nprint(1)\n```", None);
        assert_eq!(output, "python print(1)");
    }

    #[test]
    fn test_noop_passthrough() {
        assert_eq!(NoopNormalizer.normalize("**as is**", None), "**as is**");
    }
}
