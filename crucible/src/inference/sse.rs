//! Server-sent-event parsing for streamed chat completions.
//!
//! The backend emits lines of the form `data: <JSON chunk>` terminated by
//! `data: [DONE]`. The reader must tolerate keep-alive blanks, comment lines,
//! and chunks that split lines mid-byte, so parsing is two pure layers: a
//! byte-level [`LineBuffer`] and a line-level [`parse_sse_line`].

use serde_json::Value;

/// Interpretation of one SSE line.
#[derive(Clone, Debug, PartialEq)]
pub enum SseLine {
    /// A content fragment from `choices[0].delta.content`.
    Delta(String),
    /// The `[DONE]` terminator.
    Done,
    /// Keep-alive blank, comment, role-only delta, or unparseable chunk.
    Ignore,
}

/// Parses one complete line from the event stream.
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
        return SseLine::Ignore;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Ignore;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        // Partial or malformed chunk: skip rather than abort the stream.
        return SseLine::Ignore;
    };
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(content) => SseLine::Delta(content.to_string()),
        None => SseLine::Ignore,
    }
}

/// Accumulates raw body bytes and yields complete `\n`-terminated lines.
///
/// A trailing fragment without a newline stays buffered until the next chunk
/// (or [`LineBuffer::finish`]).
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one body chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // the newline
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Returns any unterminated trailing line.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: delta lines yield content, `[DONE]` terminates, blanks
    /// and comments are ignored.
    #[test]
    fn parse_line_variants() {
        let delta = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(delta), SseLine::Delta("Hel".to_string()));
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(""), SseLine::Ignore);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Ignore);
        assert_eq!(parse_sse_line("event: ping"), SseLine::Ignore);
    }

    /// **Scenario**: a role-only delta (first chunk of a stream) is ignored.
    #[test]
    fn role_only_delta_ignored() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Ignore);
    }

    /// **Scenario**: malformed JSON is skipped, not fatal.
    #[test]
    fn malformed_chunk_ignored() {
        assert_eq!(parse_sse_line("data: {\"choices\":"), SseLine::Ignore);
    }

    /// **Scenario**: carriage returns are stripped before parsing.
    #[test]
    fn crlf_lines_parse() {
        let line = "data: [DONE]\r";
        assert_eq!(parse_sse_line(line), SseLine::Done);
    }

    /// **Scenario**: lines split across chunks reassemble; trailing bytes
    /// stay buffered until finish.
    #[test]
    fn line_buffer_reassembles_partial_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"choices\":[{\"del").is_empty());
        let lines = buf.push(b"ta\":{\"content\":\"Hi\"}}]}\ndata: [DO");
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_sse_line(&lines[0]), SseLine::Delta("Hi".to_string()));
        let lines = buf.push(b"NE]\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_sse_line(&lines[0]), SseLine::Done);
        assert!(buf.finish().is_none());
    }

    /// **Scenario**: finish returns an unterminated trailing line.
    #[test]
    fn line_buffer_finish_returns_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"data: tail-without-newline");
        assert_eq!(buf.finish().as_deref(), Some("data: tail-without-newline"));
    }
}
