//! Output capture between a command and its sentinel

use super::shell::{parse_sentinel_rest, SentinelReport};
use crate::constants::SENTINEL_PREFIX;
use crate::sanitize::strip_ansi_escapes;
use regex::Regex;

/// Bytes kept for sentinel and prompt searches once output overflows.
const WINDOW: usize = 4096;

/// A sentinel located in the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SentinelHit {
    /// Offset of the sentinel in the tail
    pub start: usize,
    /// Offset just past the sentinel line
    pub end: usize,
    pub report: SentinelReport,
}

/// Output of one step.
///
/// Everything lives in `tail` until the output grows past `limit`; then
/// the first `limit` bytes are frozen in `head` and only a window of
/// recent bytes is kept for searching.
#[derive(Debug)]
pub(super) struct Capture {
    head: Vec<u8>,
    tail: Vec<u8>,
    limit: usize,
    overflowed: bool,
    /// Tail offset up to which lines were handed to the classifier
    fed: usize,
}

impl Capture {
    pub(super) fn new(limit: usize, carry: Vec<u8>) -> Self {
        Self {
            head: Vec::new(),
            tail: carry,
            limit,
            overflowed: false,
            fed: 0,
        }
    }

    pub(super) fn push(&mut self, bytes: &[u8]) {
        self.tail.extend_from_slice(bytes);
    }

    /// Freeze the head and drop searched bytes once output is large.
    pub(super) fn compact(&mut self) {
        if !self.overflowed && self.tail.len() > self.limit + WINDOW {
            self.head = self.tail[..self.limit].to_vec();
            self.overflowed = true;
        }
        if self.overflowed && self.tail.len() > 2 * WINDOW {
            let excess = self.tail.len() - WINDOW;
            self.tail.drain(..excess);
            self.fed = self.fed.saturating_sub(excess);
        }
    }

    /// Locate the complete sentinel line for `token`.
    pub(super) fn find_sentinel(&self, token: &str) -> Option<SentinelHit> {
        let needle = format!("{SENTINEL_PREFIX}{token}:");
        let start = find(&self.tail, needle.as_bytes())?;
        let after = start + needle.len();
        let newline = self.tail[after..].iter().position(|b| *b == b'\n')?;
        let end = after + newline + 1;
        let rest = String::from_utf8_lossy(&self.tail[after..end]);
        Some(SentinelHit {
            start,
            end,
            report: parse_sentinel_rest(&rest),
        })
    }

    /// Drop output belonging to earlier, abandoned commands. Returns whether
    /// anything was discarded.
    pub(super) fn discard_orphans(&mut self, orphans: &mut Vec<String>) -> bool {
        let mut discarded = false;
        loop {
            let hit = orphans
                .iter()
                .enumerate()
                .find_map(|(i, token)| self.find_sentinel(token).map(|hit| (i, hit)));
            let Some((index, hit)) = hit else {
                return discarded;
            };
            orphans.remove(index);
            self.tail.drain(..hit.end);
            self.head.clear();
            self.overflowed = false;
            self.fed = 0;
            discarded = true;
        }
    }

    /// Complete lines not yet classified, cleaned of escapes. Stops before
    /// anything that may be a sentinel, or at `upto` when given.
    pub(super) fn take_lines(&mut self, upto: Option<usize>) -> Option<String> {
        let region_end = upto.unwrap_or(self.tail.len()).min(self.tail.len());
        if self.fed >= region_end {
            return None;
        }
        let region = &self.tail[self.fed..region_end];
        let cut = match upto {
            Some(_) => region.len(),
            None => {
                let stop = find(region, SENTINEL_PREFIX.as_bytes()).unwrap_or(region.len());
                region[..stop].iter().rposition(|b| *b == b'\n')? + 1
            }
        };
        let text = strip_ansi_escapes(&String::from_utf8_lossy(&region[..cut]));
        self.fed += cut;
        Some(text)
    }

    /// Cleaned text of the most recent output.
    fn recent_text(&self) -> String {
        let from = self.tail.len().saturating_sub(WINDOW);
        strip_ansi_escapes(&String::from_utf8_lossy(&self.tail[from..]))
    }

    /// The line of recent output matching `pattern`.
    pub(super) fn match_prompt(&self, pattern: &Regex) -> Option<String> {
        let text = self.recent_text();
        let found = pattern.find(&text)?;
        let line_start = text[..found.start()].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[found.end()..]
            .find('\n')
            .map_or(text.len(), |i| found.end() + i);
        Some(text[line_start..line_end].trim().to_string())
    }

    /// The unterminated last line, if any.
    pub(super) fn trailing_line(&self) -> Option<String> {
        let text = self.recent_text();
        let line = text.rsplit('\n').next().unwrap_or_default();
        (!line.trim().is_empty()).then(|| line.to_string())
    }

    /// Output before the sentinel and the bytes after it.
    pub(super) fn complete(mut self, hit: &SentinelHit) -> (Vec<u8>, bool, Vec<u8>) {
        let carry = self.tail.split_off(hit.end.min(self.tail.len()));
        self.tail.truncate(hit.start);
        let (output, overflowed) = self.into_output();
        (output, overflowed, carry)
    }

    /// Everything captured so far.
    pub(super) fn into_output(self) -> (Vec<u8>, bool) {
        if self.overflowed {
            (self.head, true)
        } else {
            (self.tail, false)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
