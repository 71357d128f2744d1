//! Selection of the not-yet-consolidated tail of a conversation.

use crate::conversation::Message;

/// Messages strictly after the most recent consolidation marker.
///
/// Returns the whole conversation when no marker exists. The marker itself
/// is never part of the result; an empty result means there is nothing to do.
pub fn select(messages: &[Message]) -> &[Message] {
    match messages.iter().rposition(Message::is_consolidation_marker) {
        Some(index) => &messages[index + 1..],
        None => messages,
    }
}

/// Number of messages waiting for consolidation
pub fn pending_count(messages: &[Message]) -> usize {
    select(messages).len()
}
