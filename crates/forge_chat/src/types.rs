//! Messages, attachments and streaming callbacks.

use std::fs;
use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ChatResult;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A file sent along with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// PNG screenshot attachment.
    pub fn png(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self::new(name, "image/png", data)
    }

    /// Read an attachment from disk, guessing its type from the extension.
    pub fn from_path(path: &Path) -> ChatResult<Self> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("json") => "application/json",
            Some("md") => "text/markdown",
            _ => "text/plain",
        };
        Ok(Self::new(name, mime_type, data))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Textual rendering for providers that only accept images as binary.
    pub fn as_text(&self) -> String {
        format!(
            "Attachment {}:\n{}",
            self.name,
            String::from_utf8_lossy(&self.data)
        )
    }
}

/// Receives streamed chunks while a chat reply is produced.
pub trait ChatListener: Send {
    fn on_thought(&mut self, _chunk: &str) {}

    fn on_content(&mut self, _chunk: &str) {}
}

/// Listener that ignores every chunk.
pub struct NoopListener;

impl ChatListener for NoopListener {}
