//! Conversation memory compression.
//!
//! Pure functions over `(messages, keep_recent)`: deterministic, idempotent,
//! no LLM round trip. Compression folds everything but the last `keep_recent`
//! messages into one summary message that stays first in the list.

use crate::state::Message;

/// Estimated token count for a message list (≈ 4 chars per token).
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    chars / 4
}

/// Builds the deterministic summary line for `dropped` messages.
fn summarize(dropped: &[Message]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(dropped.len());
    for m in dropped {
        let head: String = m.content.chars().take(40).collect();
        match &m.agent {
            Some(agent) => parts.push(format!("{} ({}): {}", m.role, agent, head)),
            None => parts.push(format!("{}: {}", m.role, head)),
        }
    }
    format!(
        "[Summary of {} earlier messages] {}",
        dropped.len(),
        parts.join(" | ")
    )
}

/// Compresses a message list down to one summary plus the last `keep_recent`
/// messages.
///
/// Returns `(messages, changed)`. When the list already starts with a summary
/// and holds at most `keep_recent` further messages, or is short enough to
/// keep whole, the input is returned unchanged — so compressing twice is the
/// same as compressing once.
pub fn compress_messages(messages: Vec<Message>, keep_recent: usize) -> (Vec<Message>, bool) {
    if messages.len() <= keep_recent + 1 {
        return (messages, false);
    }

    let split = messages.len() - keep_recent;
    let (dropped, recent) = messages.split_at(split);

    let summary = Message {
        role: "system".to_string(),
        content: summarize(dropped),
        agent: None,
        compressed: true,
    };

    let mut out = Vec::with_capacity(keep_recent + 1);
    out.push(summary);
    out.extend(recent.iter().cloned());
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(i: usize) -> Message {
        Message {
            role: "user".to_string(),
            content: format!("Long message number {i} with content"),
            agent: None,
            compressed: false,
        }
    }

    /// **Scenario**: ten messages compressed with keep_recent=3 become a
    /// summary plus the last three, and the summary announces itself.
    #[test]
    fn compress_keeps_summary_plus_recent() {
        let messages: Vec<Message> = (0..10).map(msg).collect();
        let (out, changed) = compress_messages(messages, 3);
        assert!(changed);
        assert_eq!(out.len(), 4);
        assert!(out[0].compressed);
        assert!(out[0].content.to_lowercase().contains("summary"));
        assert!(out[0].content.contains("7 earlier messages"));
        assert!(out[3].content.contains("number 9"));
    }

    /// **Scenario**: compression is idempotent — a second pass over an
    /// already-compressed list is a no-op.
    #[test]
    fn compress_is_idempotent() {
        let messages: Vec<Message> = (0..10).map(msg).collect();
        let (once, _) = compress_messages(messages, 3);
        let (twice, changed) = compress_messages(once.clone(), 3);
        assert!(!changed);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].content, twice[0].content);
    }

    /// **Scenario**: short lists are returned unchanged.
    #[test]
    fn short_list_not_compressed() {
        let messages: Vec<Message> = (0..3).map(msg).collect();
        let (out, changed) = compress_messages(messages, 3);
        assert!(!changed);
        assert_eq!(out.len(), 3);
        assert!(!out[0].compressed);
    }

    /// **Scenario**: token estimation tracks total characters / 4.
    #[test]
    fn token_estimate_is_chars_over_four() {
        let messages = vec![Message {
            role: "user".to_string(),
            content: "a".repeat(100),
            agent: None,
            compressed: false,
        }];
        assert_eq!(estimate_tokens(&messages), 25);
    }

    /// **Scenario**: the summary is deterministic for identical input.
    #[test]
    fn summary_is_deterministic() {
        let a: Vec<Message> = (0..6).map(msg).collect();
        let b = a.clone();
        let (out_a, _) = compress_messages(a, 2);
        let (out_b, _) = compress_messages(b, 2);
        assert_eq!(out_a[0].content, out_b[0].content);
    }
}
