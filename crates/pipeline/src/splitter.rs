//! Reply stream sentence splitting
//!
//! Token deltas accumulate in a pending buffer; after each delta the buffer
//! is tested for sentence completion. Completed sentences are emitted as the
//! raw accumulated text, so concatenating every emission (plus the final
//! flush) reproduces the model output byte for byte.

/// Splits an incremental token stream into speakable sentences.
///
/// One instance per reply; `flush` drains whatever remains at end-of-stream.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    pending: String,
    first_sentence_pending: bool,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            first_sentence_pending: true,
        }
    }

    /// Append one token delta. Returns a finished sentence when the buffer
    /// completes.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.pending.push_str(delta);
        if self.is_complete() {
            self.first_sentence_pending = false;
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Drain the remaining buffer at end-of-stream, regardless of the
    /// completion predicate.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            self.first_sentence_pending = false;
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Text accumulated so far without consuming it.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// The sentence completion predicate, in precedence order.
    fn is_complete(&self) -> bool {
        let trimmed = self.pending.trim();

        // Inside an unclosed code fence nothing completes a sentence.
        if trimmed.matches("```").count() % 2 != 0 {
            return false;
        }

        // A function-call tag must close before the buffer can complete.
        if trimmed.contains("<function>") {
            return trimmed.contains("</function>");
        }

        if self.pending.ends_with('\n') {
            return true;
        }

        if let Some(before_dot) = trimmed.strip_suffix('.') {
            // `1.` etc. is a numbered-list item, not a sentence end.
            return !before_dot
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit());
        }

        if trimmed.ends_with(['?', '!', '。', '？', '！', ';', '；']) {
            return true;
        }

        if trimmed.chars().next_back().is_some_and(is_emoji) {
            return true;
        }

        // Cut the very first sentence at a comma to minimize time to first
        // audio.
        if self.first_sentence_pending && trimmed.ends_with([',', '，']) {
            return true;
        }

        false
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c, '\u{1F300}'..='\u{1F9FF}' | '\u{2600}'..='\u{26FF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run deltas through a splitter, returning emitted sentences including
    /// the final flush.
    fn split_all(deltas: &[&str]) -> Vec<String> {
        let mut splitter = SentenceSplitter::new();
        let mut sentences = Vec::new();
        for delta in deltas {
            if let Some(sentence) = splitter.push(delta) {
                sentences.push(sentence);
            }
        }
        if let Some(rest) = splitter.flush() {
            sentences.push(rest);
        }
        sentences
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        let deltas = [
            "Hel", "lo the", "re, ", "how ", "are you?", " I'm ", "do", "ing well.",
            " Some", " trailing", " tail",
        ];
        let sentences = split_all(&deltas);
        assert_eq!(sentences.concat(), deltas.concat());
        assert!(sentences.len() >= 3);
    }

    #[test]
    fn test_period_completes() {
        let sentences = split_all(&["This is a sentence."]);
        assert_eq!(sentences, vec!["This is a sentence."]);
    }

    #[test]
    fn test_numbered_list_item_does_not_complete() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("Here are the steps:\n").is_some());
        assert!(splitter.push("1.").is_none());
        assert!(splitter.push(" Install it.").is_some());
    }

    #[test]
    fn test_unclosed_code_fence_never_completes() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("```python\ndef f(): return 1.").is_none());
        assert!(splitter.push("\nAlso not done!\n").is_none());
        // Fence closes, trailing newline completes.
        let sentence = splitter.push("```\n");
        assert!(sentence.is_some());
        assert!(sentence.unwrap().contains("def f()"));
    }

    #[test]
    fn test_function_tag_completes_only_when_closed() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("<function>lookup.").is_none());
        assert!(splitter.push("?!").is_none());
        assert!(splitter.push("</function>").is_some());
    }

    #[test]
    fn test_newline_completes() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("a line\n").is_some());
    }

    #[test]
    fn test_fullwidth_punctuation_completes() {
        assert_eq!(split_all(&["你好。"]).len(), 1);
        assert_eq!(split_all(&["真的吗？"]).len(), 1);
        assert_eq!(split_all(&["太好了！"]).len(), 1);
        assert_eq!(split_all(&["first；", "second;"]).len(), 2);
    }

    #[test]
    fn test_emoji_completes() {
        let sentences = split_all(&["Nice work 🎉", " and more"]);
        assert_eq!(sentences[0], "Nice work 🎉");
    }

    #[test]
    fn test_comma_completes_only_first_sentence() {
        let mut splitter = SentenceSplitter::new();
        let first = splitter.push("Well,");
        assert_eq!(first.as_deref(), Some("Well,"));

        assert!(splitter.push(" as I was saying,").is_none());
        assert!(splitter.push(" it works.").is_some());
    }

    #[test]
    fn test_flush_drains_remainder() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("no terminator here").is_none());
        assert_eq!(splitter.flush().as_deref(), Some("no terminator here"));
        assert!(splitter.flush().is_none());
    }

    #[test]
    fn test_empty_stream_flushes_nothing() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.flush().is_none());
    }
}
