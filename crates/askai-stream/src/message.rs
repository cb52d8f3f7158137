use std::fmt;

/// Unique identifier of one chat message.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a message id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Creates a random message id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One link card: a category and the URLs grouped under it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceGroup {
    pub category: String,
    pub links: Vec<String>,
}

/// Category to URL-list mapping shown alongside a completed answer.
///
/// Categories keep the order in which they were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceMap {
    groups: Vec<SourceGroup>,
}

impl SourceMap {
    /// Builds the degenerate grouping the endpoint implies: every URL is its
    /// own category. URLs are trimmed of surrounding whitespace; blank ones
    /// are dropped and a repeat keeps the first position.
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for url in urls {
            let url = url.into();
            let url = url.trim();
            if url.is_empty() || map.get(url).is_some() {
                continue;
            }
            map.groups.push(SourceGroup {
                category: url.to_string(),
                links: vec![url.to_string()],
            });
        }
        map
    }

    /// Returns the links stored under `category`.
    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|group| group.category == category)
            .map(|group| group.links.as_slice())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterates `(category, links)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|group| (group.category.as_str(), group.links.as_slice()))
    }
}

/// A single entry of the chat transcript.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub sources: SourceMap,
}

impl ChatMessage {
    /// Creates a user message.
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            text: text.into(),
            sources: SourceMap::default(),
        }
    }

    /// Creates an empty assistant message, filled in as the stream arrives.
    pub fn assistant(id: MessageId) -> Self {
        Self::assistant_text(id, String::new())
    }

    /// Creates an assistant message with fixed text and no sources.
    pub fn assistant_text(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: text.into(),
            sources: SourceMap::default(),
        }
    }
}

/// Append-only transcript. Messages are mutated in place and only removed by
/// `clear`.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| &message.id == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|message| &message.id == id)
    }

    /// Replaces the display text of `id`. Returns `false` if it is unknown.
    pub fn set_text(&mut self, id: &MessageId, text: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.text.clear();
                message.text.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_map_groups_each_url_under_itself() {
        let map = SourceMap::from_urls(["http://a", "http://b", "http://a", "  "]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("http://a"), Some(&["http://a".to_string()][..]));
        let categories: Vec<_> = map.iter().map(|(category, _)| category).collect();
        assert_eq!(categories, vec!["http://a", "http://b"]);
    }

    #[test]
    fn source_urls_are_trimmed_before_deduplication() {
        let map = SourceMap::from_urls([" http://a\n", "http://a", "", "\thttp://b"]);
        let categories: Vec<_> = map.iter().map(|(category, _)| category).collect();
        assert_eq!(categories, vec!["http://a", "http://b"]);
        assert_eq!(map.get("http://b"), Some(&["http://b".to_string()][..]));
    }

    #[test]
    fn set_text_only_touches_the_named_message() {
        let mut log = MessageLog::default();
        log.push(ChatMessage::user("u1".into(), "hi"));
        log.push(ChatMessage::assistant("a1".into()));

        assert!(log.set_text(&"a1".into(), "hello"));
        assert!(!log.set_text(&"missing".into(), "x"));
        assert_eq!(log.get(&"u1".into()).map(|m| m.text.as_str()), Some("hi"));
        assert_eq!(log.last().map(|m| m.text.as_str()), Some("hello"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let value = serde_json::to_value(Role::Assistant).expect("serialize");
        assert_eq!(value, serde_json::json!("assistant"));
    }
}
