use chrono::Local;

use crate::state::{Message, MessageId, Sender};

/// Ordered, append-only log of the current conversation.
///
/// Ids keep increasing across [`Conversation::clear`] so a renderer holding an
/// old id can never confuse it with a newer message.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sender: Sender, content: impl Into<String>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;

        self.messages.push(Message {
            id,
            sender,
            content: content.into(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        });
        id
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn list(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order_and_ids() {
        let mut conversation = Conversation::new();
        let first = conversation.append(Sender::User, "one");
        let second = conversation.append(Sender::Assistant, "two");
        let third = conversation.append(Sender::User, "three");

        assert!(first < second && second < third);
        let contents: Vec<&str> = conversation.list().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);

        let ids: Vec<MessageId> = conversation.list().iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_clear_empties_log() {
        let mut conversation = Conversation::new();
        for i in 0..5 {
            conversation.append(Sender::User, format!("message {}", i));
        }
        conversation.clear();
        assert!(conversation.list().is_empty());
    }

    #[test]
    fn test_ids_keep_increasing_after_clear() {
        let mut conversation = Conversation::new();
        let before = conversation.append(Sender::User, "before");
        conversation.clear();
        let after = conversation.append(Sender::User, "after");
        assert!(after > before);
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_timestamp_format() {
        let mut conversation = Conversation::new();
        conversation.append(Sender::Assistant, "hi");
        let timestamp = &conversation.list()[0].timestamp;
        assert_eq!(timestamp.len(), 8);
        assert_eq!(timestamp.matches(':').count(), 2);
    }
}
