//! Log normalization and section tracking for worker output.
//!
//! The worker prefixes its progress lines with a stage tag (`[grammar] ...`)
//! and ends each stage with a completion line (`[grammar] Done.`). A worker
//! that crashes or is killed mid-stage never writes that line, and some
//! writers emit several tags on one line. [`SectionTracker`] repairs both:
//! tags always start a line, and every opened section is closed exactly once
//! in the text that reaches the run log.

use std::collections::HashSet;
use std::sync::LazyLock;

use checkup_common::Stage;
use regex::Regex;

static TAG_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\w+)\]\s*(.*)").unwrap());

static KNOWN_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:spellcheck|grammar|punctuation|clarity|tone)\]").unwrap()
});

/// Words that mark a section as finished when they are the whole line body,
/// trailing punctuation aside.
const COMPLETION_MARKERS: &[&str] = &["done", "bitti"];

/// The line appended to close `stage` when the worker did not.
pub fn closing_line(stage: Stage) -> String {
    format!("[{}] Done.\n", stage)
}

/// Normalize line endings, end the chunk with a newline, and move every
/// known tag that appears mid-line onto a line of its own.
pub fn normalize_chunk(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(s.len() + 8);
    let mut last = 0;
    for m in KNOWN_TAG_REGEX.find_iter(&s) {
        out.push_str(&s[last..m.start()]);
        if m.start() > 0 && s.as_bytes()[m.start() - 1] != b'\n' {
            out.push('\n');
        }
        last = m.start();
    }
    out.push_str(&s[last..]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Per-run section state: at most one open section, plus the set of
/// sections already closed.
#[derive(Debug, Default)]
pub struct SectionTracker {
    open: Option<Stage>,
    closed: HashSet<Stage>,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> Option<Stage> {
        self.open
    }

    pub fn is_closed(&self, stage: Stage) -> bool {
        self.closed.contains(&stage)
    }

    /// Normalize a raw chunk and return it with any synthesized closing
    /// lines inserted, ready to append to the run log.
    pub fn feed(&mut self, raw: &str) -> String {
        let text = normalize_chunk(raw);
        let mut out = String::with_capacity(text.len());

        for line in text.split_inclusive('\n') {
            if let Some((stage, rest)) = parse_tag_line(line) {
                if let Some(open) = self.open
                    && open != stage
                    && !self.closed.contains(&open)
                {
                    out.push_str(&closing_line(open));
                    self.closed.insert(open);
                }

                if is_completion(rest) {
                    self.closed.insert(stage);
                    if self.open == Some(stage) {
                        self.open = None;
                    }
                } else {
                    self.open = Some(stage);
                }
            }
            out.push_str(line);
        }
        out
    }

    /// Close a section left open when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        let open = self.open.take()?;
        if self.closed.insert(open) {
            Some(closing_line(open))
        } else {
            None
        }
    }
}

fn parse_tag_line(line: &str) -> Option<(Stage, &str)> {
    let caps = TAG_LINE_REGEX.captures(line)?;
    let stage = caps.get(1)?.as_str().parse::<Stage>().ok()?;
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((stage, rest))
}

fn is_completion(rest: &str) -> bool {
    let rest = rest.trim().trim_end_matches(['.', '!']).to_lowercase();
    COMPLETION_MARKERS.contains(&rest.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> String {
        let mut tracker = SectionTracker::new();
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&tracker.feed(chunk));
        }
        if let Some(tail) = tracker.finish() {
            out.push_str(&tail);
        }
        out
    }

    #[test]
    fn test_auto_close_on_new_tag_and_at_stream_end() {
        let out = run(&["[spellcheck] working\n[grammar] working\n"]);
        assert_eq!(
            out,
            "[spellcheck] working\n[spellcheck] Done.\n[grammar] working\n[grammar] Done.\n"
        );
    }

    #[test]
    fn test_explicit_completion_is_not_duplicated() {
        let out = run(&[
            "[spellcheck] Started.\n",
            "[spellcheck] 1/1 OK: row_id=1, node_id=n, check=0\n",
            "[spellcheck] Done.\n",
            "[grammar] Started.\n",
            "[grammar] Done.\n",
        ]);
        assert_eq!(out.matches("[spellcheck] Done.").count(), 1);
        assert_eq!(out.matches("[grammar] Done.").count(), 1);
    }

    #[test]
    fn test_legacy_completion_marker() {
        let mut tracker = SectionTracker::new();
        tracker.feed("[tone] Başladı.\n");
        tracker.feed("[tone] Bitti.\n");
        assert!(tracker.is_closed(Stage::Tone));
        assert_eq!(tracker.open(), None);
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn test_chunk_without_newline_gets_one() {
        assert_eq!(normalize_chunk("hello"), "hello\n");
        assert_eq!(normalize_chunk("a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn test_mid_line_tags_are_split() {
        assert_eq!(
            normalize_chunk("[spellcheck] Done.[grammar] Started."),
            "[spellcheck] Done.\n[grammar] Started.\n"
        );
        // A tag already at line start is left alone.
        assert_eq!(normalize_chunk("[grammar] x\n"), "[grammar] x\n");
    }

    #[test]
    fn test_mid_line_split_ignores_tag_case() {
        assert_eq!(
            normalize_chunk("note [GRAMMAR] Started."),
            "note \n[GRAMMAR] Started.\n"
        );
        let out = run(&["[Spellcheck] working [Grammar] working\n"]);
        assert_eq!(
            out,
            "[Spellcheck] working \n[spellcheck] Done.\n[Grammar] working\n[grammar] Done.\n"
        );
    }

    #[test]
    fn test_progress_starting_with_marker_word_keeps_section_open() {
        let mut tracker = SectionTracker::new();
        tracker.feed("[grammar] Started.\n");
        tracker.feed("[grammar] done 3 of 9\n");
        assert_eq!(tracker.open(), Some(Stage::Grammar));
        assert!(!tracker.is_closed(Stage::Grammar));

        tracker.feed("[grammar] DONE!\n");
        assert_eq!(tracker.open(), None);
        assert!(tracker.is_closed(Stage::Grammar));
    }

    #[test]
    fn test_unknown_tags_are_plain_lines() {
        let out = run(&["[prep] building\n[extract] MESSAGE: 3 new rows\n"]);
        assert_eq!(out, "[prep] building\n[extract] MESSAGE: 3 new rows\n");
    }

    #[test]
    fn test_untagged_lines_pass_through() {
        let out = run(&["[clarity] Started.\n", "Traceback: boom\n"]);
        assert_eq!(out, "[clarity] Started.\nTraceback: boom\n[clarity] Done.\n");
    }

    #[test]
    fn test_closed_section_is_not_closed_again_on_reopen() {
        let out = run(&[
            "[spellcheck] a\n",
            "[grammar] b\n",
            "[spellcheck] again\n",
            "[grammar] c\n",
        ]);
        assert_eq!(out.matches("[spellcheck] Done.").count(), 1);
        assert_eq!(out.matches("[grammar] Done.").count(), 1);
    }
}
