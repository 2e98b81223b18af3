//! Incremental removal of upstream inline markup
//!
//! Model output arrives with a leading `<lang primary="..."/>` marker and,
//! for some models, `<thinking>`/`<thought>` blocks. Neither belongs in the
//! assistant message. Text is fed in arbitrary fragments, so a tag split
//! across two records is held back until it can be classified.

use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::DeltaKind;

static LANG_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^<lang\s+primary="[^"]*"\s*/>"#).expect("valid regex"));

static REASONING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^<(thinking|thought)\s*>").expect("valid regex"));

const REASONING_TAGS: &[&str] = &["<thinking>", "<thought>"];

/// Longest partial tag held back before it is released as plain text
const MAX_PENDING_TAG: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Content,
    /// Inside a reasoning block; holds the lowercase closing tag
    Reasoning(String),
}

/// Streaming filter over assistant text
#[derive(Debug)]
pub struct ContentFilter {
    include_reasoning: bool,
    state: State,
    pending: String,
    /// Drop newlines directly after a language marker
    skip_newlines: bool,
    /// Drop whitespace directly after a closing reasoning tag
    skip_whitespace: bool,
}

impl ContentFilter {
    pub fn new(include_reasoning: bool) -> Self {
        Self {
            include_reasoning,
            state: State::Content,
            pending: String::new(),
            skip_newlines: false,
            skip_whitespace: false,
        }
    }

    /// Feed a fragment; returns the pieces that can be released now.
    ///
    /// Adjacent pieces of the same kind are merged.
    pub fn push(&mut self, fragment: &str) -> Vec<(DeltaKind, String)> {
        self.pending.push_str(fragment);
        let mut out = Vec::new();

        loop {
            if self.skip_whitespace {
                let trimmed = self.pending.trim_start().len();
                self.pending.drain(..self.pending.len() - trimmed);
                if self.pending.is_empty() {
                    break;
                }
                self.skip_whitespace = false;
            }
            if self.skip_newlines {
                let trimmed = self.pending.trim_start_matches(['\n', '\r']).len();
                self.pending.drain(..self.pending.len() - trimmed);
                if self.pending.is_empty() {
                    break;
                }
                self.skip_newlines = false;
            }

            let progressed = match self.state.clone() {
                State::Content => self.step_content(&mut out),
                State::Reasoning(close) => self.step_reasoning(&close, &mut out),
            };
            if !progressed {
                break;
            }
        }

        out
    }

    /// Release whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> Vec<(DeltaKind, String)> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        match self.state {
            State::Content => self.emit(&mut out, DeltaKind::Content, &rest),
            State::Reasoning(_) => self.emit(&mut out, DeltaKind::Reasoning, &rest),
        }
        self.state = State::Content;
        out
    }

    fn step_content(&mut self, out: &mut Vec<(DeltaKind, String)>) -> bool {
        let Some(start) = self.pending.find('<') else {
            let text = std::mem::take(&mut self.pending);
            self.emit(out, DeltaKind::Content, &text);
            return false;
        };

        if start > 0 {
            let text: String = self.pending.drain(..start).collect();
            self.emit(out, DeltaKind::Content, &text);
        }

        if let Some(found) = LANG_MARKER.find(&self.pending) {
            let end = found.end();
            self.pending.drain(..end);
            self.skip_newlines = true;
            return true;
        }

        if let Some(captures) = REASONING_OPEN.captures(&self.pending) {
            let close = format!("</{}>", captures[1].to_ascii_lowercase());
            let end = captures[0].len();
            self.pending.drain(..end);
            self.state = State::Reasoning(close);
            return true;
        }

        if self.pending.len() < MAX_PENDING_TAG && could_become_tag(&self.pending) {
            return false;
        }

        // Not markup we know; release the '<' and keep scanning
        self.pending.drain(..1);
        self.emit(out, DeltaKind::Content, "<");
        true
    }

    fn step_reasoning(&mut self, close: &str, out: &mut Vec<(DeltaKind, String)>) -> bool {
        // ASCII lowercasing keeps byte offsets stable
        let lower = self.pending.to_ascii_lowercase();

        if let Some(at) = lower.find(close) {
            let text: String = self.pending.drain(..at).collect();
            self.emit(out, DeltaKind::Reasoning, &text);
            self.pending.drain(..close.len());
            self.state = State::Content;
            self.skip_whitespace = true;
            return true;
        }

        let held = (1..close.len())
            .rev()
            .find(|&n| lower.ends_with(&close[..n]))
            .unwrap_or(0);
        let release = self.pending.len() - held;
        let text: String = self.pending.drain(..release).collect();
        self.emit(out, DeltaKind::Reasoning, &text);
        false
    }

    fn emit(&self, out: &mut Vec<(DeltaKind, String)>, kind: DeltaKind, text: &str) {
        if text.is_empty() || (kind == DeltaKind::Reasoning && !self.include_reasoning) {
            return;
        }
        match out.last_mut() {
            Some((last, buffer)) if *last == kind => buffer.push_str(text),
            _ => out.push((kind, text.to_string())),
        }
    }
}

/// Whether `pending` (which starts with '<') may still turn into known markup
fn could_become_tag(pending: &str) -> bool {
    let lower = pending.to_ascii_lowercase();

    if REASONING_TAGS
        .iter()
        .any(|tag| tag.starts_with(&lower) || (lower.starts_with(&tag[..tag.len() - 1]) && !lower.contains('>')))
    {
        return true;
    }

    "<lang".starts_with(&lower) || (lower.starts_with("<lang") && !lower.contains('>'))
}

/// Apply the filter to a complete text in one go
pub fn clean(text: &str, include_reasoning: bool) -> Vec<(DeltaKind, String)> {
    let mut filter = ContentFilter::new(include_reasoning);
    let mut out = filter.push(text);
    out.extend(filter.finish());
    out
}
