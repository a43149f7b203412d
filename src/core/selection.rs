//! Choosing the answer message out of a multi-turn conversation.
//!
//! A turn can end with tool results, echoes of the task, or empty assistant
//! messages after the real answer. Each agent carries a selection strategy;
//! the invoker never hardcodes "last message wins".

use crate::core::types::{MessageRole, TurnMessage};

/// Strategy for picking the message that carries the agent's answer.
pub trait AnswerSelector: Send + Sync {
    fn select<'a>(&self, messages: &'a [TurnMessage]) -> Option<&'a TurnMessage>;
}

/// Last non-empty assistant message, scanning in reverse.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastAssistantSelector;

impl AnswerSelector for LastAssistantSelector {
    fn select<'a>(&self, messages: &'a [TurnMessage]) -> Option<&'a TurnMessage> {
        messages
            .iter()
            .rev()
            .find(|msg| msg.role == MessageRole::Assistant && !msg.content.trim().is_empty())
    }
}

/// Data-extraction strategy: prefer the assistant message that carries a
/// price or search-result marker, since the final message after a tool round
/// is often a bare acknowledgement. Falls back to the last non-empty one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceAwareSelector;

const PRICE_MARKERS: [&str; 4] = ["\"price\"", "Result", "руб", "₽"];

impl AnswerSelector for PriceAwareSelector {
    fn select<'a>(&self, messages: &'a [TurnMessage]) -> Option<&'a TurnMessage> {
        let marked = messages.iter().rev().find(|msg| {
            msg.role == MessageRole::Assistant
                && PRICE_MARKERS.iter().any(|marker| msg.content.contains(marker))
        });
        marked.or_else(|| LastAssistantSelector.select(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TurnMessage;

    #[test]
    fn last_assistant_skips_empty_and_tool_messages() {
        let messages = vec![
            TurnMessage::user("task", "user"),
            TurnMessage::assistant("the answer", "coder"),
            TurnMessage::tool_result("raw tool output", "search"),
            TurnMessage::assistant("   ", "coder"),
        ];
        let selected = LastAssistantSelector.select(&messages).expect("selected");
        assert_eq!(selected.content, "the answer");
    }

    #[test]
    fn price_aware_prefers_marked_message_over_later_chatter() {
        let messages = vec![
            TurnMessage::assistant("{\"price\": 139990}", "extractor"),
            TurnMessage::assistant("done with the lookup", "extractor"),
        ];
        let selected = PriceAwareSelector.select(&messages).expect("selected");
        assert_eq!(selected.content, "{\"price\": 139990}");
    }

    #[test]
    fn price_aware_falls_back_without_markers() {
        let messages = vec![
            TurnMessage::assistant("first", "extractor"),
            TurnMessage::assistant("second", "extractor"),
        ];
        let selected = PriceAwareSelector.select(&messages).expect("selected");
        assert_eq!(selected.content, "second");
    }

    #[test]
    fn empty_conversation_selects_nothing() {
        assert!(LastAssistantSelector.select(&[]).is_none());
        assert!(PriceAwareSelector.select(&[]).is_none());
    }
}
