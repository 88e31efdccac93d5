use crate::conversation::Conversation;
use crate::types::{ChatMessage, MessageId, MessageKind, RequestId};
use std::sync::Arc;

/// Projects one session's accumulator onto a visible message.
///
/// The message is created lazily on the first non-blank text and updated in
/// place afterwards; at most one message exists per session.
pub struct Materializer {
    conversation: Arc<Conversation>,
    request_id: RequestId,
    kind: MessageKind,
    message_id: Option<MessageId>,
}

impl Materializer {
    pub fn new(conversation: Arc<Conversation>, request_id: RequestId) -> Self {
        Self {
            conversation,
            request_id,
            kind: MessageKind::Teaching,
            message_id: None,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_created(&self) -> bool {
        self.message_id.is_some()
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn on_accumulator_changed(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        match self.message_id {
            Some(id) => {
                if !self.conversation.update_content(id, text) {
                    tracing::warn!("[⚙️ ] Message {} vanished from the conversation", id);
                }
            }
            None => {
                let message = ChatMessage::teacher(self.kind, text);
                let id = self.conversation.push(message);
                self.conversation.end_typing(&self.request_id);
                self.message_id = Some(id);
                tracing::debug!("[⚙️ ] Materialized message {}", id);
            }
        }
    }

    /// Puts `error` where this session's message was, or appends it.
    pub fn fail_with(&mut self, error_text: &str) -> MessageId {
        let message = ChatMessage::teacher(MessageKind::Error, error_text);
        let error_id = message.id;
        match self.message_id.take() {
            Some(id) => self.conversation.replace(id, message),
            None => {
                self.conversation.push(message);
            }
        }
        self.message_id = Some(error_id);
        error_id
    }
}
