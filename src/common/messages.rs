//! Canonical message types for bridge communication.
//!
//! Every adapter translates platform events into these values before
//! handing them to the bridge controller. They are immutable once built.

use bytes::Bytes;

/// Media category of a document, chosen by the receiving adapter from
/// platform attachment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Other,
}

impl MediaKind {
    /// Map a MIME content type to a media kind.
    ///
    /// Only the top-level type is considered; anything unrecognised is `Other`.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let top_level = content_type
            .and_then(|ct| ct.split('/').next())
            .map(|s| s.trim().to_ascii_lowercase());

        match top_level.as_deref() {
            Some("image") => MediaKind::Image,
            Some("audio") => MediaKind::Audio,
            Some("video") => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// A chat message as it exists on its origin platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    author_nickname: String,
    origin_channel: String,
    origin_adapter_id: String,
}

impl ChatMessage {
    pub fn new(
        author_nickname: impl Into<String>,
        origin_channel: impl Into<String>,
        origin_adapter_id: impl Into<String>,
    ) -> Self {
        Self {
            author_nickname: author_nickname.into(),
            origin_channel: origin_channel.into(),
            origin_adapter_id: origin_adapter_id.into(),
        }
    }

    pub fn author_nickname(&self) -> &str {
        &self.author_nickname
    }

    pub fn origin_channel(&self) -> &str {
        &self.origin_channel
    }

    pub fn origin_adapter_id(&self) -> &str {
        &self.origin_adapter_id
    }
}

/// A chat message with optional text (plain replies, captions, notices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    base: ChatMessage,
    text: Option<String>,
}

impl TextMessage {
    pub fn new(base: ChatMessage, text: Option<String>) -> Self {
        Self { base, text }
    }

    pub fn chat(&self) -> &ChatMessage {
        &self.base
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn author_nickname(&self) -> &str {
        self.base.author_nickname()
    }

    pub fn origin_channel(&self) -> &str {
        self.base.origin_channel()
    }

    pub fn origin_adapter_id(&self) -> &str {
        self.base.origin_adapter_id()
    }
}

impl From<ChatMessage> for TextMessage {
    fn from(base: ChatMessage) -> Self {
        Self { base, text: None }
    }
}

/// A text message carrying a file payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMessage {
    text: TextMessage,
    payload: Bytes,
    filename_stem: String,
    file_extension: String,
    media_kind: MediaKind,
}

impl DocumentMessage {
    pub fn new(
        text: TextMessage,
        payload: impl Into<Bytes>,
        filename_stem: impl Into<String>,
        file_extension: impl Into<String>,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            text,
            payload: payload.into(),
            filename_stem: filename_stem.into(),
            file_extension: file_extension.into(),
            media_kind,
        }
    }

    pub fn text_message(&self) -> &TextMessage {
        &self.text
    }

    pub fn text(&self) -> Option<&str> {
        self.text.text()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn filename_stem(&self) -> &str {
        &self.filename_stem
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    /// Full file name (`stem.ext`, or just the stem when there is no extension).
    pub fn filename(&self) -> String {
        if self.file_extension.is_empty() {
            self.filename_stem.clone()
        } else {
            format!("{}.{}", self.filename_stem, self.file_extension)
        }
    }
}

/// A message handed to the bridge for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Text(TextMessage),
    Document(DocumentMessage),
}

impl RelayMessage {
    /// The text envelope part of the message (caption for documents).
    pub fn text_message(&self) -> &TextMessage {
        match self {
            RelayMessage::Text(message) => message,
            RelayMessage::Document(document) => document.text_message(),
        }
    }

    pub fn chat(&self) -> &ChatMessage {
        self.text_message().chat()
    }
}

impl From<ChatMessage> for RelayMessage {
    fn from(message: ChatMessage) -> Self {
        RelayMessage::Text(message.into())
    }
}

impl From<TextMessage> for RelayMessage {
    fn from(message: TextMessage) -> Self {
        RelayMessage::Text(message)
    }
}

impl From<DocumentMessage> for RelayMessage {
    fn from(message: DocumentMessage) -> Self {
        RelayMessage::Document(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type(Some("image/png")), MediaKind::Image);
        assert_eq!(MediaKind::from_content_type(Some("VIDEO/mp4")), MediaKind::Video);
        assert_eq!(MediaKind::from_content_type(Some("audio/ogg; codecs=opus")), MediaKind::Audio);
        assert_eq!(MediaKind::from_content_type(Some("application/pdf")), MediaKind::Other);
        assert_eq!(MediaKind::from_content_type(None), MediaKind::Other);
    }

    #[test]
    fn test_bare_chat_message_has_no_text() {
        let relay: RelayMessage = ChatMessage::new("u", "a1", "A").into();
        assert_eq!(relay.text_message().text(), None);
        assert_eq!(relay.chat().origin_adapter_id(), "A");
    }

    #[test]
    fn test_document_filename() {
        let text = TextMessage::new(ChatMessage::new("u", "a1", "A"), None);
        let doc = DocumentMessage::new(text.clone(), vec![1u8, 2, 3], "clip", "mp4", MediaKind::Video);
        assert_eq!(doc.filename(), "clip.mp4");
        assert_eq!(doc.payload().len(), 3);

        let bare = DocumentMessage::new(text, Bytes::new(), "README", "", MediaKind::Other);
        assert_eq!(bare.filename(), "README");
    }
}
