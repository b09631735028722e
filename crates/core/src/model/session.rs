use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::SessionId;

/// A chat conversation. The topic stays `None` until a title has been
/// generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: SessionId,
    topic: Option<String>,
    started_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, topic: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            topic: normalize_topic(topic),
            started_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn has_topic(&self) -> bool {
        self.topic.is_some()
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = normalize_topic(Some(topic.into()));
    }
}

fn normalize_topic(topic: Option<String>) -> Option<String> {
    topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn blank_topic_counts_as_missing() {
        let mut session = Session::new(SessionId::new(1), Some("   ".into()), fixed_now());
        assert!(!session.has_topic());

        session.set_topic("  Photosynthesis ");
        assert_eq!(session.topic(), Some("Photosynthesis"));
    }
}
