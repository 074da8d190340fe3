//! Chat messages and per-session history

use serde::{Deserialize, Serialize};

/// Opaque correlation token tying downstream events (sentences, audio) to the
/// utterance that produced them. Events carrying a stale id are discarded
/// after an interruption.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Allocate a fresh id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Transcript,
}

impl Role {
    /// Wire name used when shaping completion requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Transcript => "transcript",
        }
    }
}

/// One entry of the conversation history, exactly the shape transmitted in
/// `chat_history_delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

/// Ordered conversation history for one session.
///
/// Mutations are append or replace-last only; nothing is ever inserted into
/// the middle. Assistant content grows monotonically as sentences complete.
#[derive(Debug, Default)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent `n` messages, for bounding completion context.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Apply a finalized transcript: replace the most recent message when it
    /// is still an un-finalized user/transcript entry, otherwise append.
    pub fn apply_transcript(&mut self, text: &str, message_id: MessageId) {
        let replace_last = matches!(
            self.messages.last().map(|m| m.role),
            Some(Role::User) | Some(Role::Transcript)
        );

        let message = ChatMessage {
            role: Role::User,
            content: text.to_string(),
            message_id,
        };

        if replace_last {
            let last = self.messages.len() - 1;
            self.messages[last] = message;
        } else {
            self.messages.push(message);
        }
    }

    /// Append an empty assistant entry that will be filled in sentence by
    /// sentence as the reply streams.
    pub fn push_assistant(&mut self, message_id: MessageId) {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: String::new(),
            message_id,
        });
    }

    /// Append `delta` to the content of the newest message tagged with
    /// `message_id`. Returns false when no such message exists (stale id).
    pub fn append_content(&mut self, message_id: &MessageId, delta: &str) -> bool {
        match self
            .messages
            .iter_mut()
            .rev()
            .find(|m| &m.message_id == message_id)
        {
            Some(message) => {
                message.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// First index at which this history diverges from `snapshot`, plus the
    /// suffix from that index. Transmitting only the suffix bounds bandwidth
    /// for long conversations.
    pub fn delta_since<'a>(&'a self, snapshot: &[ChatMessage]) -> (usize, &'a [ChatMessage]) {
        let mut index = 0;
        while index < snapshot.len()
            && index < self.messages.len()
            && snapshot[index] == self.messages[index]
        {
            index += 1;
        }
        (index, &self.messages[index..])
    }
}
