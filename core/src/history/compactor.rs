//! Token-estimate-gated history summarization (§4.5).
//!
//! A pure transform: it never touches the store. `summarize_if_needed`
//! either returns the history unchanged or replaces it with a synthetic
//! system-prompt summary followed by the last few messages verbatim.

use agentcore_protocol::MessagePart;

use crate::history::codec::HistoryMessage;

const RECENT_MESSAGES_FOR_FLATTENING: usize = 50;
const VERBATIM_TAIL_LEN: usize = 5;
const SUMMARY_MAX_TOKENS: u32 = 500;

/// `step(state) -> (state', done)`-style hook for the summarizer itself:
/// given the flattened history text, produce a recap. Kept as a trait so
/// the compactor is testable with a stub summarizer (design note §9).
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, flattened_history: &str, max_tokens: u32) -> crate::error::Result<String>;
}

/// Sum of every part's serialized textual footprint (content + tool
/// arguments), divided by 4 — a naive but stable token estimate.
pub fn estimate_tokens(history: &[HistoryMessage]) -> u64 {
    let chars: usize = history
        .iter()
        .flat_map(message_parts)
        .map(part_char_footprint)
        .sum();
    (chars / 4) as u64
}

pub async fn summarize_if_needed(
    history: Vec<HistoryMessage>,
    threshold: u64,
    summarizer: &dyn Summarizer,
) -> crate::error::Result<Vec<HistoryMessage>> {
    if estimate_tokens(&history) < threshold {
        return Ok(history);
    }

    let flattened = flatten_for_summary(&history);
    let summary = summarizer.summarize(&flattened, SUMMARY_MAX_TOKENS).await?;

    let tail_start = history.len().saturating_sub(VERBATIM_TAIL_LEN);
    let mut compacted = Vec::with_capacity(1 + (history.len() - tail_start));
    compacted.push(HistoryMessage::Request {
        parts: vec![MessagePart::SystemPrompt {
            content: format!("Previous conversation summary:\n{summary}"),
        }],
    });
    compacted.extend(history.into_iter().skip(tail_start));
    Ok(compacted)
}

fn message_parts(message: &HistoryMessage) -> &[MessagePart] {
    match message {
        HistoryMessage::Request { parts } | HistoryMessage::Response { parts } => parts,
    }
}

fn part_char_footprint(part: &MessagePart) -> usize {
    match part {
        MessagePart::UserPrompt { content } | MessagePart::SystemPrompt { content } => content.len(),
        MessagePart::Text { content, .. } => content.len(),
        MessagePart::Thinking { content, .. } => content.len(),
        MessagePart::ToolCall { args, .. } => args.to_string().len(),
        MessagePart::ToolReturn { content, .. } => content.as_deref().map(str::len).unwrap_or(0),
    }
}

fn flatten_for_summary(history: &[HistoryMessage]) -> String {
    let start = history.len().saturating_sub(RECENT_MESSAGES_FOR_FLATTENING);
    history[start..]
        .iter()
        .flat_map(flatten_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn flatten_message(message: &HistoryMessage) -> Vec<String> {
    let (prefix, parts) = match message {
        HistoryMessage::Request { parts } => ("User", parts),
        HistoryMessage::Response { parts } => ("Agent", parts),
    };
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::UserPrompt { content } | MessagePart::Text { content, .. } => {
                Some(format!("{prefix}: {content}"))
            }
            MessagePart::ToolCall { tool_name, .. } => Some(format!("Tool called: {tool_name}")),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSummarizer(&'static str);

    #[async_trait::async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _flattened: &str, _max_tokens: u32) -> crate::error::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn user(content: &str) -> HistoryMessage {
        HistoryMessage::Request {
            parts: vec![MessagePart::UserPrompt { content: content.into() }],
        }
    }

    #[tokio::test]
    async fn history_below_threshold_is_unchanged() {
        let history = vec![user("hi")];
        let summarizer = StubSummarizer("recap");
        let result = summarize_if_needed(history.clone(), 10_000, &summarizer).await.unwrap();
        assert_eq!(result, history);
    }

    #[tokio::test]
    async fn history_above_threshold_is_replaced_with_summary_and_tail() {
        let history: Vec<HistoryMessage> = (0..20).map(|i| user(&"x".repeat(100 + i))).collect();
        let summarizer = StubSummarizer("the recap");
        let result = summarize_if_needed(history.clone(), 1, &summarizer).await.unwrap();

        assert_eq!(result.len(), 1 + VERBATIM_TAIL_LEN);
        match &result[0] {
            HistoryMessage::Request { parts } => match &parts[0] {
                MessagePart::SystemPrompt { content } => {
                    assert!(content.contains("the recap"));
                }
                other => panic!("expected system-prompt, got {other:?}"),
            },
            other => panic!("expected request, got {other:?}"),
        }
        assert_eq!(&result[1..], &history[history.len() - VERBATIM_TAIL_LEN..]);
    }

    #[test]
    fn estimate_tokens_divides_char_footprint_by_four() {
        let history = vec![user(&"a".repeat(400))];
        assert_eq!(estimate_tokens(&history), 100);
    }
}
