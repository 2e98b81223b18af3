//! Notion inference event stream parser
//!
//! `runInferenceTranscript` answers with NDJSON. Most records are control
//! noise; the ones carrying assistant text come in three shapes:
//!
//! - `patch` records whose operations append to a text value,
//! - `markdown-chat` records holding a snapshot of the whole message so far,
//! - a `record-map` carrying the finished thread message, which ends the turn.
//!
//! Snapshots are reconciled against the text already produced so nothing is
//! repeated, and the result runs through [`ContentFilter`] before leaving.

use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tracing::debug;

use super::filter::ContentFilter;
use crate::error::{AppError, AppResult};
use crate::streaming::LineBuffer;

/// Which message field a delta belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Content,
    Reasoning,
}

/// A clean piece of assistant output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    pub kind: DeltaKind,
    pub content: String,
    /// Set on the empty marker produced after the terminal record
    pub is_final: bool,
}

impl TextDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Content,
            content: text.into(),
            is_final: false,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Reasoning,
            content: text.into(),
            is_final: false,
        }
    }

    pub fn end_of_stream() -> Self {
        Self {
            kind: DeltaKind::Content,
            content: String::new(),
            is_final: true,
        }
    }
}

/// Text carried by a single upstream record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// New text to add after what has been seen
    Append(String),
    /// The full message so far
    Snapshot(String),
    /// The full, finished message
    Terminal(String),
}

fn parse_error(message: impl Into<String>) -> AppError {
    AppError::ResponseParse(message.into())
}

/// Decode one NDJSON record into the text fragments it carries.
///
/// Records that carry no text yield an empty list.
pub fn decode_record(line: &str) -> AppResult<Vec<Fragment>> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| parse_error(format!("Failed to parse Notion response record: {e}")))?;

    let Value::Object(record) = value else {
        return Err(parse_error("Notion response record is not a JSON object"));
    };

    match record.get("type").and_then(Value::as_str) {
        Some("patch") => decode_patch(&record),
        Some("markdown-chat") => match record.get("value") {
            Some(Value::String(text)) if !text.is_empty() => {
                Ok(vec![Fragment::Snapshot(text.clone())])
            }
            Some(Value::String(_)) | Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(parse_error("markdown-chat record value is not a string")),
        },
        Some("record-map") => decode_record_map(&record),
        other => {
            debug!(record_type = ?other, "Skipping control record");
            Ok(Vec::new())
        }
    }
}

fn decode_patch(record: &Map<String, Value>) -> AppResult<Vec<Fragment>> {
    let Some(Value::Array(operations)) = record.get("v") else {
        return Err(parse_error("patch record has no operation list"));
    };

    let mut fragments = Vec::new();
    for operation in operations {
        let Value::Object(operation) = operation else {
            continue;
        };
        let op = operation.get("o").and_then(Value::as_str).unwrap_or_default();
        let path = operation.get("p").and_then(Value::as_str).unwrap_or_default();
        let value = operation.get("v");

        match op {
            "x" if is_text_path(path) => match value {
                Some(Value::String(text)) => push_append(&mut fragments, text),
                _ => return Err(parse_error(format!("patch at {path} appends a non-string value"))),
            },
            "a" if path.ends_with("/value/-") => {
                if let Some(Value::Object(item)) = value {
                    if item.get("type").and_then(Value::as_str) == Some("text") {
                        push_append(&mut fragments, text_field(item, "content")?);
                    }
                }
            }
            "a" if path.ends_with("/s/-") => {
                if let Some(Value::Object(step)) = value {
                    if step.get("type").and_then(Value::as_str) == Some("markdown-chat") {
                        push_append(&mut fragments, text_field(step, "value")?);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(fragments)
}

/// `.../value/...` for transcript text, `/s/N/value` for markdown-chat steps
fn is_text_path(path: &str) -> bool {
    path.contains("/value/") || (path.contains("/s/") && path.ends_with("/value"))
}

fn text_field<'a>(object: &'a Map<String, Value>, key: &str) -> AppResult<&'a str> {
    match object.get(key) {
        Some(Value::String(text)) => Ok(text.as_str()),
        None | Some(Value::Null) => Ok(""),
        Some(_) => Err(parse_error(format!("text item field '{key}' is not a string"))),
    }
}

fn push_append(fragments: &mut Vec<Fragment>, text: &str) {
    if !text.is_empty() {
        fragments.push(Fragment::Append(text.to_string()));
    }
}

fn decode_record_map(record: &Map<String, Value>) -> AppResult<Vec<Fragment>> {
    let Some(Value::Object(record_map)) = record.get("recordMap") else {
        return Err(parse_error("record-map record has no recordMap object"));
    };
    let Some(Value::Object(messages)) = record_map.get("thread_message") else {
        return Ok(Vec::new());
    };

    for message in messages.values() {
        let step = &message["value"]["value"]["step"];
        let text = match step["type"].as_str() {
            Some("markdown-chat") => step["value"].as_str(),
            Some("agent-inference") => step["value"].as_array().and_then(|items| {
                items
                    .iter()
                    .find(|item| item["type"] == "text")
                    .and_then(|item| item["content"].as_str())
            }),
            _ => None,
        };

        if let Some(text) = text.filter(|t| !t.is_empty()) {
            return Ok(vec![Fragment::Terminal(text.to_string())]);
        }
    }

    Ok(Vec::new())
}

/// Turns decoded records into filtered deltas.
///
/// Synchronous so it can be driven by the byte stream below or directly in tests.
#[derive(Debug)]
pub struct DeltaParser {
    /// Unfiltered text seen so far, for snapshot reconciliation
    seen: String,
    filter: ContentFilter,
    done: bool,
}

impl DeltaParser {
    pub fn new(include_reasoning: bool) -> Self {
        Self {
            seen: String::new(),
            filter: ContentFilter::new(include_reasoning),
            done: false,
        }
    }

    /// Whether the terminal record has been handled
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Handle one complete NDJSON line
    pub fn handle_line(&mut self, line: &str) -> AppResult<Vec<TextDelta>> {
        if self.done {
            return Ok(Vec::new());
        }

        let mut deltas = Vec::new();
        for fragment in decode_record(line)? {
            match fragment {
                Fragment::Append(text) => {
                    self.seen.push_str(&text);
                    self.filtered(&text, &mut deltas);
                }
                Fragment::Snapshot(text) => {
                    if let Some(suffix) = self.unseen_suffix(&text) {
                        self.filtered(&suffix, &mut deltas);
                    }
                }
                Fragment::Terminal(text) => {
                    if let Some(suffix) = self.unseen_suffix(&text) {
                        self.filtered(&suffix, &mut deltas);
                    }
                    deltas.extend(self.finish());
                    deltas.push(TextDelta::end_of_stream());
                    self.done = true;
                    break;
                }
            }
        }
        Ok(deltas)
    }

    /// Flush text held back by the filter
    pub fn finish(&mut self) -> Vec<TextDelta> {
        self.filter
            .finish()
            .into_iter()
            .map(|(kind, content)| TextDelta {
                kind,
                content,
                is_final: false,
            })
            .collect()
    }

    fn unseen_suffix(&mut self, snapshot: &str) -> Option<String> {
        match snapshot.strip_prefix(self.seen.as_str()) {
            Some("") => None,
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.seen.push_str(&suffix);
                Some(suffix)
            }
            None => {
                debug!(
                    seen_len = self.seen.len(),
                    snapshot_len = snapshot.len(),
                    "Snapshot diverges from streamed text, ignoring"
                );
                None
            }
        }
    }

    fn filtered(&mut self, text: &str, deltas: &mut Vec<TextDelta>) {
        deltas.extend(self.filter.push(text).into_iter().map(|(kind, content)| TextDelta {
            kind,
            content,
            is_final: false,
        }));
    }
}

/// Parse an upstream response body into a lazy sequence of text deltas.
///
/// The sequence ends after the terminal record's final marker, when the body
/// closes, or with the first error (transport or malformed record).
pub fn text_deltas<S, B>(
    body: S,
    include_reasoning: bool,
) -> impl Stream<Item = AppResult<TextDelta>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::new();
        let mut parser = DeltaParser::new(include_reasoning);

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AppError::from_transport(&e, "reading the Notion response"))?;
            for line in lines.feed(chunk.as_ref()) {
                for delta in parser.handle_line(&line)? {
                    yield delta;
                }
                if parser.is_done() {
                    break 'read;
                }
            }
        }

        if !parser.is_done() {
            if let Some(line) = lines.finish() {
                for delta in parser.handle_line(&line)? {
                    yield delta;
                }
            }
        }
        if !parser.is_done() {
            for delta in parser.finish() {
                yield delta;
            }
        }
    }
}
