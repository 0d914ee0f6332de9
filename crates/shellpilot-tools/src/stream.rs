//! Streaming output classifier
//!
//! Annotates shell output line by line with a coarse event type. The raw
//! output is never modified; events are a side channel.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::LazyLock;
use tracing::warn;

/// Lines remembered for multi-line patterns.
const RECENT_LINES: usize = 8;

static PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b\d{1,3}(?:\.\d+)?\s?%",
        r"|[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏◐◓◑◒]",
        r"|\[[=#]{2,}[>=#\s.\-]*\]",
        r"|(?i)^\s*(?:downloading|installing|compiling|building|fetching|resolving|unpacking|extracting|updating|uploading|collecting|cloning|receiving objects|processing|preparing)\b",
        r"|(?i)\beta\s+\d",
    ))
    .expect("PROGRESS is a compile-time constant")
});

static WARNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:warn(?:ing)?s?|errors?|fatal|fail(?:ed|ure|ures)?|panic(?:ked)?|exception|traceback|denied)\b")
        .expect("WARNING is a compile-time constant")
});

static NEGATED_WARNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:0|no|zero|without)\s+(?:warn(?:ing)?s?|errors?|fail(?:ed|ures?)?)\b")
        .expect("NEGATED_WARNING is a compile-time constant")
});

static SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:done|success(?:ful(?:ly)?)?|succeeded|complete[d]?|finished|passed|ok)\b|[✓✔]")
        .expect("SUCCESS is a compile-time constant")
});

/// Continuation lines of compiler-style diagnostics (`  --> file:1:2`, ` | `).
static DIAGNOSTIC_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| {
    Regex::new(r"^\s+(?:-->|\||=\s)").expect("DIAGNOSTIC_CONTINUATION is a compile-time constant")
});

/// Event type of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEventKind {
    /// Progress indicator
    Progress,
    /// The program waits for input
    Prompt,
    /// Warning or error
    Warning,
    /// Completion message
    Success,
    /// Anything else
    Plain,
}

/// One classified line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event type
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    /// The line, without its terminator
    pub text: String,
}

/// Line classifier with a partial-line buffer and a short memory.
#[derive(Debug)]
pub struct StreamClassifier {
    expect_prompt: Option<Regex>,
    prompt_patterns: Vec<Regex>,
    partial: String,
    recent: VecDeque<(StreamEventKind, String)>,
}

impl StreamClassifier {
    /// Create a classifier recognizing the given prompt patterns.
    /// Invalid patterns are skipped.
    #[must_use]
    pub fn new(prompt_patterns: &[String]) -> Self {
        let prompt_patterns = prompt_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid prompt pattern");
                    None
                }
            })
            .collect();
        Self {
            expect_prompt: None,
            prompt_patterns,
            partial: String::new(),
            recent: VecDeque::with_capacity(RECENT_LINES),
        }
    }

    /// Also classify lines matching `pattern` as prompts.
    #[must_use]
    pub fn with_expect_prompt(mut self, pattern: Option<Regex>) -> Self {
        self.expect_prompt = pattern;
        self
    }

    /// Classify a single line.
    #[must_use]
    pub fn classify(&self, line: &str) -> StreamEvent {
        let previous = self.recent.back().map(|(kind, _)| *kind);
        StreamEvent {
            kind: self.kind_of(line, previous),
            text: line.to_string(),
        }
    }

    /// Whether `line` looks like a prompt (expected or configured).
    #[must_use]
    pub fn is_prompt(&self, line: &str) -> bool {
        self.prompt_pattern(line).is_some()
    }

    /// The pattern that recognizes `line` as a prompt, if any.
    #[must_use]
    pub fn prompt_pattern(&self, line: &str) -> Option<String> {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(re) = self.expect_prompt.as_ref().filter(|re| re.is_match(line)) {
            return Some(re.as_str().to_string());
        }
        self.prompt_patterns
            .iter()
            .find(|re| re.is_match(trimmed))
            .map(|re| re.as_str().to_string())
    }

    fn kind_of(&self, line: &str, previous: Option<StreamEventKind>) -> StreamEventKind {
        if self.is_prompt(line) {
            return StreamEventKind::Prompt;
        }
        if PROGRESS.is_match(line) {
            return StreamEventKind::Progress;
        }
        if previous == Some(StreamEventKind::Warning) && DIAGNOSTIC_CONTINUATION.is_match(line) {
            return StreamEventKind::Warning;
        }

        let without_negations = NEGATED_WARNING.replace_all(line, "");
        let warning_at = WARNING.find(&without_negations).map(|m| m.start());
        let success_at = SUCCESS.find(&without_negations).map(|m| m.start());
        match (warning_at, success_at) {
            (Some(w), Some(s)) if s < w => StreamEventKind::Success,
            (Some(_), _) => StreamEventKind::Warning,
            (None, Some(_)) => StreamEventKind::Success,
            (None, None) if NEGATED_WARNING.is_match(line) => StreamEventKind::Success,
            (None, None) => StreamEventKind::Plain,
        }
    }

    /// Feed a chunk of output. Returns events for every line completed by
    /// this chunk; `\r` ends a line as well so redrawn progress bars are
    /// seen. Blank lines produce no event, nor does a progress line
    /// identical to the one before it.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.partial.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.partial.find(['\n', '\r']) {
            let line: String = self.partial[..pos].to_string();
            self.partial.drain(..=pos);
            if line.trim().is_empty() {
                continue;
            }
            let event = self.classify(&line);
            let repeated = event.kind == StreamEventKind::Progress
                && self
                    .recent
                    .back()
                    .is_some_and(|(k, t)| *k == event.kind && *t == event.text);
            self.remember(&event);
            if !repeated {
                events.push(event);
            }
        }
        events
    }

    /// The buffered incomplete line.
    #[must_use]
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Classify and clear the buffered incomplete line.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        let line = std::mem::take(&mut self.partial);
        if line.trim().is_empty() {
            return None;
        }
        let event = self.classify(&line);
        self.remember(&event);
        Some(event)
    }

    /// Forget buffered and remembered lines.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.recent.clear();
    }

    fn remember(&mut self, event: &StreamEvent) {
        if self.recent.len() == RECENT_LINES {
            self.recent.pop_front();
        }
        self.recent.push_back((event.kind, event.text.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_PROMPT_PATTERNS;

    fn classifier() -> StreamClassifier {
        let patterns: Vec<String> = DEFAULT_PROMPT_PATTERNS.iter().map(|s| s.to_string()).collect();
        StreamClassifier::new(&patterns)
    }

    fn kind(line: &str) -> StreamEventKind {
        classifier().classify(line).kind
    }

    #[test]
    fn test_classify_kinds() {
        assert_eq!(kind("[sudo] password for dev: "), StreamEventKind::Prompt);
        assert_eq!(kind("Do you want to continue? [Y/n] "), StreamEventKind::Prompt);
        assert_eq!(kind(" 45% |#########          |"), StreamEventKind::Progress);
        assert_eq!(kind("Downloading serde v1.0.200"), StreamEventKind::Progress);
        assert_eq!(kind("[=====>    ] 3/10"), StreamEventKind::Progress);
        assert_eq!(kind("⠋ resolving"), StreamEventKind::Progress);
        assert_eq!(kind("warning: unused variable `x`"), StreamEventKind::Warning);
        assert_eq!(kind("ERROR: connection refused"), StreamEventKind::Warning);
        assert_eq!(kind("Build finished"), StreamEventKind::Success);
        assert_eq!(kind("✓ all checks"), StreamEventKind::Success);
        assert_eq!(kind("hello world"), StreamEventKind::Plain);
    }

    #[test]
    fn test_success_marker_before_error_token() {
        assert_eq!(kind("Done, 3 errors ignored"), StreamEventKind::Success);
        assert_eq!(kind("Compiled with 0 errors"), StreamEventKind::Success);
        assert_eq!(kind("failed after done"), StreamEventKind::Warning);
    }

    #[test]
    fn test_expect_prompt_takes_priority() {
        let classifier = classifier().with_expect_prompt(Regex::new(r"Enter code:").ok());
        assert_eq!(
            classifier.classify("Enter code: 45%").kind,
            StreamEventKind::Prompt
        );
    }

    #[test]
    fn test_feed_splits_and_buffers() {
        let mut c = classifier();
        let events = c.feed("first line\nsecond");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "first line");
        assert_eq!(c.partial(), "second");

        let events = c.feed(" half\n\nwarning: careful\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "second half");
        assert_eq!(events[1].kind, StreamEventKind::Warning);
        assert!(c.partial().is_empty());
        assert!(c.flush().is_none());
    }

    #[test]
    fn test_carriage_return_progress_dedup() {
        let mut c = classifier();
        let events = c.feed("10%\r10%\r20%\rdone\n");
        let texts: Vec<_> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["10%", "20%", "done"]);
        assert_eq!(events[2].kind, StreamEventKind::Success);
    }

    #[test]
    fn test_diagnostic_continuation_is_warning() {
        let mut c = classifier();
        let events = c.feed("error[E0425]: cannot find value\n  --> src/main.rs:2:5\n   |\nplain again\n");
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Warning,
                StreamEventKind::Warning,
                StreamEventKind::Warning,
                StreamEventKind::Plain
            ]
        );
    }

    #[test]
    fn test_flush_partial_prompt() {
        let mut c = classifier();
        assert!(c.feed("Password: ").is_empty());
        let event = c.flush().unwrap();
        assert_eq!(event.kind, StreamEventKind::Prompt);
    }

    #[test]
    fn test_invalid_prompt_pattern_skipped() {
        let c = StreamClassifier::new(&["(unclosed".to_string(), "ready>$".to_string()]);
        assert_eq!(c.prompt_pattern("ready>").as_deref(), Some("ready>$"));
        assert!(!c.is_prompt("(unclosed"));
    }
}
