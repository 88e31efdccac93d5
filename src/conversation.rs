use crate::types::{ChatMessage, MessageId, RequestId};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change notifications for whatever renders the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    MessageAdded(ChatMessage),
    MessageUpdated { id: MessageId, content: String },
    MessageReplaced { old_id: MessageId, message: ChatMessage },
    Typing(bool),
    Toast(String),
}

#[derive(Debug, Default)]
struct ConversationState {
    messages: Vec<ChatMessage>,
    // Request currently owning the typing indicator.
    typing: Option<RequestId>,
}

/// In-memory message list plus the typing indicator.
///
/// All mutation happens synchronously between stream suspension points, so a
/// plain lock is enough.
pub struct Conversation {
    state: RwLock<ConversationState>,
    tx: broadcast::Sender<ConversationEvent>,
}

impl Conversation {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(ConversationState::default()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.tx.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, ConversationState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConversationState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.read().messages.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<ChatMessage> {
        self.read().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    pub fn push(&self, message: ChatMessage) -> MessageId {
        let id = message.id;
        self.write().messages.push(message.clone());
        self.emit(ConversationEvent::MessageAdded(message));
        id
    }

    /// Rewrites `content` of an existing message, leaving every other field alone.
    pub fn update_content(&self, id: MessageId, content: &str) -> bool {
        let updated = {
            let mut state = self.write();
            match state.messages.iter_mut().find(|m| m.id == id) {
                Some(message) => {
                    message.content.clear();
                    message.content.push_str(content);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.emit(ConversationEvent::MessageUpdated {
                id,
                content: content.to_string(),
            });
        }
        updated
    }

    /// Swaps the message `id` for `message` at the same position, or appends
    /// `message` when `id` is gone.
    pub fn replace(&self, id: MessageId, message: ChatMessage) {
        let replaced = {
            let mut state = self.write();
            match state.messages.iter().position(|m| m.id == id) {
                Some(index) => {
                    state.messages[index] = message.clone();
                    true
                }
                None => {
                    state.messages.push(message.clone());
                    false
                }
            }
        };
        if replaced {
            self.emit(ConversationEvent::MessageReplaced {
                old_id: id,
                message,
            });
        } else {
            self.emit(ConversationEvent::MessageAdded(message));
        }
    }

    pub fn is_typing(&self) -> bool {
        self.read().typing.is_some()
    }

    /// Shows the typing indicator on behalf of `request_id`.
    pub fn begin_typing(&self, request_id: &RequestId) {
        let was_typing = {
            let mut state = self.write();
            state.typing.replace(request_id.clone()).is_some()
        };
        if !was_typing {
            self.emit(ConversationEvent::Typing(true));
        }
    }

    /// Clears the indicator only if `request_id` still owns it.
    pub fn end_typing(&self, request_id: &RequestId) -> bool {
        let cleared = {
            let mut state = self.write();
            if state.typing.as_ref() == Some(request_id) {
                state.typing = None;
                true
            } else {
                false
            }
        };
        if cleared {
            self.emit(ConversationEvent::Typing(false));
        }
        cleared
    }

    /// Surfaces terminal error text to the notification sink.
    pub fn toast(&self, text: impl Into<String>) {
        self.emit(ConversationEvent::Toast(text.into()));
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    #[test]
    fn update_changes_only_content() {
        let conversation = Conversation::new();
        let original = ChatMessage::teacher(MessageKind::Teaching, "a");
        let id = conversation.push(original.clone());

        assert!(conversation.update_content(id, "a b"));
        let updated = conversation.message(id);
        assert_eq!(
            updated,
            Some(ChatMessage {
                content: "a b".to_string(),
                ..original
            })
        );
        assert!(!conversation.update_content(MessageId::new(), "x"));
    }

    #[test]
    fn replace_keeps_position() {
        let conversation = Conversation::new();
        conversation.push(ChatMessage::student("q"));
        let id = conversation.push(ChatMessage::teacher(MessageKind::Teaching, "partial"));
        conversation.push(ChatMessage::student("later"));

        let error = ChatMessage::teacher(MessageKind::Error, "failed");
        let error_id = error.id;
        conversation.replace(id, error);

        let messages = conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].id, error_id);
        assert!(messages[1].is_error());
    }

    #[test]
    fn typing_is_owned_by_the_latest_request() {
        let conversation = Conversation::new();
        let first = RequestId::new();
        let second = RequestId::new();

        conversation.begin_typing(&first);
        conversation.begin_typing(&second);
        assert!(!conversation.end_typing(&first));
        assert!(conversation.is_typing());
        assert!(conversation.end_typing(&second));
        assert!(!conversation.is_typing());
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let conversation = Conversation::new();
        let mut rx = conversation.subscribe();
        let request = RequestId::new();

        conversation.begin_typing(&request);
        let id = conversation.push(ChatMessage::teacher(MessageKind::Teaching, "hi"));
        conversation.update_content(id, "hi there");
        conversation.end_typing(&request);

        assert_eq!(rx.recv().await.ok(), Some(ConversationEvent::Typing(true)));
        assert!(matches!(
            rx.recv().await,
            Ok(ConversationEvent::MessageAdded(_))
        ));
        assert_eq!(
            rx.recv().await.ok(),
            Some(ConversationEvent::MessageUpdated {
                id,
                content: "hi there".to_string()
            })
        );
        assert_eq!(rx.recv().await.ok(), Some(ConversationEvent::Typing(false)));
    }
}
