//! Conversation data model

use serde::{Deserialize, Serialize};

/// Role in conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A message in the conversation.
///
/// Owned exclusively by the transcript. A model message is mutated in
/// place while its reply streams and is immutable once streaming ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderSummary>,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: text.to_string(),
            attachment: None,
            folder: None,
        }
    }

    pub fn model(text: &str) -> Self {
        Self {
            role: Role::Model,
            content: text.to_string(),
            attachment: None,
            folder: None,
        }
    }
}

/// An inline binary attachment (typically an image) on a user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    /// Base64-encoded payload, ready for inline transport
    pub data: String,
}

/// Pre-formatted textual context extracted from a folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSummary {
    pub name: String,
    pub file_count: usize,
    pub context: String,
}

/// Event from a streaming reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text content delta
    Delta(String),
    /// Reply is complete
    Done,
}
