use std::collections::{HashMap, HashSet};

use study_core::model::{Message, MessageId, MessagePatch, Role, Session, SessionId};

/// Everything the message store owns. Only touched inside the store's short
/// critical sections; `dirty` records whether a section changed anything a
/// renderer can see.
#[derive(Debug, Default)]
pub(super) struct StoreState {
    pub(super) current: Option<SessionId>,
    pub(super) input: String,
    pub(super) sessions: HashMap<SessionId, Session>,
    pub(super) transcripts: HashMap<SessionId, Vec<Message>>,
    pub(super) titles_pending: HashSet<SessionId>,
    pub(super) dirty: bool,
}

/// Messages appended by a send, captured before any network call.
#[derive(Debug)]
pub(super) struct Dispatch {
    pub(super) session_id: SessionId,
    pub(super) text: String,
    pub(super) user: Message,
    pub(super) placeholder: MessageId,
    pub(super) wants_title: bool,
}

/// What a regenerate removed and where the fresh reply goes.
#[derive(Debug)]
pub(super) struct Regeneration {
    pub(super) session_id: SessionId,
    pub(super) text: String,
    pub(super) placeholder: MessageId,
    pub(super) discarded: Vec<MessageId>,
}

impl StoreState {
    pub(super) fn open(&mut self, session: Session, transcript: Option<Vec<Message>>) {
        let id = session.id();
        self.sessions.entry(id).or_insert(session);
        if let Some(messages) = transcript {
            self.transcripts.entry(id).or_insert(messages);
        } else {
            self.transcripts.entry(id).or_default();
        }
        self.current = Some(id);
        self.dirty = true;
    }

    /// Append the user message and its placeholder back to back, clearing
    /// the input. `None` for blank text or when no session is current.
    pub(super) fn begin_send(&mut self, text: &str) -> Option<Dispatch> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let session_id = self.current?;

        let user = Message::user(text);
        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id();
        let transcript = self.transcripts.entry(session_id).or_default();
        transcript.push(user.clone());
        transcript.push(placeholder);
        self.input.clear();

        let untitled = self
            .sessions
            .get(&session_id)
            .is_some_and(|session| !session.has_topic());
        let wants_title = untitled && self.titles_pending.insert(session_id);
        self.dirty = true;

        Some(Dispatch {
            session_id,
            text: text.to_string(),
            user,
            placeholder: placeholder_id,
            wants_title,
        })
    }

    /// Drop everything after the last user message of the current session
    /// and reserve a fresh placeholder.
    pub(super) fn begin_regenerate(&mut self) -> Option<Regeneration> {
        let session_id = self.current?;
        let transcript = self.transcripts.get_mut(&session_id)?;
        let last_user = transcript
            .iter()
            .rposition(|message| message.role() == Role::User)?;

        let discarded = transcript
            .drain(last_user + 1..)
            .map(|message| message.id())
            .collect();
        let text = transcript[last_user].text().to_string();
        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id();
        transcript.push(placeholder);
        self.dirty = true;

        Some(Regeneration {
            session_id,
            text,
            placeholder: placeholder_id,
            discarded,
        })
    }

    pub(super) fn find(&self, session_id: SessionId, id: MessageId) -> Option<&Message> {
        self.transcripts
            .get(&session_id)?
            .iter()
            .find(|message| message.id() == id)
    }

    pub(super) fn patch(&mut self, session_id: SessionId, id: MessageId, patch: MessagePatch) -> bool {
        let Some(message) = self
            .transcripts
            .get_mut(&session_id)
            .and_then(|messages| messages.iter_mut().find(|message| message.id() == id))
        else {
            return false;
        };
        message.apply(patch);
        self.dirty = true;
        true
    }

    pub(super) fn remove(&mut self, session_id: SessionId, id: MessageId) -> bool {
        let Some(messages) = self.transcripts.get_mut(&session_id) else {
            return false;
        };
        let before = messages.len();
        messages.retain(|message| message.id() != id);
        let removed = messages.len() != before;
        self.dirty |= removed;
        removed
    }

    /// Set the topic unless one is already present.
    pub(super) fn fill_topic(&mut self, session_id: SessionId, title: &str) -> bool {
        self.titles_pending.remove(&session_id);
        match self.sessions.get_mut(&session_id) {
            Some(session) if !session.has_topic() => {
                session.set_topic(title);
                self.dirty |= session.has_topic();
                session.has_topic()
            }
            _ => false,
        }
    }
}
