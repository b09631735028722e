use serde::{Deserialize, Serialize};

use super::ids::MessageId;

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "ai",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "ai" => Some(Role::Ai),
            _ => None,
        }
    }
}

/// Optional presentation hints carried alongside a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMeta {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    role: Role,
    text: String,
    is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<DisplayMeta>,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            is_loading: false,
            display: None,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageId::generate(), Role::User, text)
    }

    /// An empty AI message reserving a transcript slot until the reply lands.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            is_loading: true,
            ..Self::new(MessageId::generate(), Role::Ai, String::new())
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: DisplayMeta) -> Self {
        self.display = Some(display);
        self
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    #[must_use]
    pub fn display(&self) -> Option<&DisplayMeta> {
        self.display.as_ref()
    }

    /// Apply a patch in place. Fields left as `None` are untouched.
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(chunk) = patch.append {
            self.text.push_str(&chunk);
        }
        if let Some(is_loading) = patch.is_loading {
            self.is_loading = is_loading;
        }
        if let Some(display) = patch.display {
            self.display = Some(display);
        }
    }
}

/// Partial update addressed to a message by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub append: Option<String>,
    pub is_loading: Option<bool>,
    pub display: Option<DisplayMeta>,
}

impl MessagePatch {
    /// Final content for a placeholder: text set, loading cleared.
    #[must_use]
    pub fn resolved(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_loading: Some(false),
            ..Self::default()
        }
    }

    /// Incremental content for a placeholder that is still streaming.
    #[must_use]
    pub fn appended(chunk: impl Into<String>) -> Self {
        Self {
            append: Some(chunk.into()),
            ..Self::default()
        }
    }
}
