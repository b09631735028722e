use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use storage::repository::{MessageRepository, NewMessageRecord, NewSessionRecord, SessionRepository};
use study_core::model::{Message, MessageId, MessagePatch, Session, SessionId};
use tokio::sync::watch;

use super::state::{Dispatch, StoreState};
use crate::Clock;
use crate::ai::{ChatModel, TitleGenerator};
use crate::error::{AiError, MessageStoreError};

/// Text shown in place of a reply that could not be generated.
pub const AI_ERROR_TEXT: &str = "Sorry, I couldn't generate a reply. Please try again.";

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text or no current session; nothing was appended.
    Skipped,
    Delivered { user: MessageId, reply: MessageId },
    /// The placeholder now shows [`AI_ERROR_TEXT`].
    Failed { user: MessageId, reply: MessageId },
    /// A regenerate removed the placeholder before the reply arrived.
    Superseded { user: MessageId },
}

/// How a regenerate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateOutcome {
    /// No current session or no user message to answer.
    Skipped,
    Replaced(MessageId),
    /// The model failed; the placeholder was removed.
    Discarded,
    /// A later regenerate removed the placeholder first.
    Superseded,
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Owns every session transcript and the chat input.
///
/// State changes happen in short synchronous sections that never span an
/// await, and every later update finds its message by id, so concurrent
/// sends and regenerates interleave without losing or duplicating messages.
/// Renderers watch [`SessionMessageStore::subscribe`] and re-read snapshots.
pub struct SessionMessageStore {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    chat: Arc<dyn ChatModel>,
    titles: Arc<dyn TitleGenerator>,
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
}

impl SessionMessageStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        messages: Arc<dyn MessageRepository>,
        chat: Arc<dyn ChatModel>,
        titles: Arc<dyn TitleGenerator>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            clock,
            sessions,
            messages,
            chat,
            titles,
            state: Mutex::new(StoreState::default()),
            revision,
        }
    }

    /// Revision counter bumped after every visible change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    //
    // ─── SESSIONS ──────────────────────────────────────────────────────────────
    //

    /// Create, persist and select a new untitled session.
    ///
    /// # Errors
    ///
    /// Returns `MessageStoreError::Storage` if the session cannot be created.
    pub async fn start_session(&self) -> Result<Session, MessageStoreError> {
        let started_at = self.clock.now();
        let id = self
            .sessions
            .create_session(NewSessionRecord {
                topic: None,
                started_at,
            })
            .await?;
        let session = Session::new(id, None, started_at);
        self.update(|state| state.open(session.clone(), Some(Vec::new())));
        tracing::debug!(session_id = %id, "started chat session");
        Ok(session)
    }

    /// Select a persisted session, loading its transcript on first open.
    ///
    /// # Errors
    ///
    /// Returns `MessageStoreError::SessionNotFound` for an unknown id, or
    /// `MessageStoreError::Storage` if loading fails.
    pub async fn open_session(&self, id: SessionId) -> Result<Session, MessageStoreError> {
        let stored = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(MessageStoreError::SessionNotFound(id))?;

        let loaded = self.read(|state| state.transcripts.contains_key(&id));
        let transcript = if loaded {
            None
        } else {
            let records = self.messages.list_messages(id).await?;
            Some(records.into_iter().map(|record| record.into_message()).collect())
        };

        Ok(self.update(|state| {
            state.open(stored.clone(), transcript);
            state.sessions.get(&id).cloned().unwrap_or(stored)
        }))
    }

    #[must_use]
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.read(|state| state.current)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.read(|state| state.current.and_then(|id| state.sessions.get(&id).cloned()))
    }

    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.read(|state| state.sessions.get(&id).cloned())
    }

    /// Set a session topic here and in storage.
    ///
    /// # Errors
    ///
    /// Returns `MessageStoreError::Storage` if the topic cannot be saved.
    pub async fn set_topic(&self, id: SessionId, topic: &str) -> Result<(), MessageStoreError> {
        self.update(|state| {
            if let Some(session) = state.sessions.get_mut(&id) {
                session.set_topic(topic);
                state.dirty = true;
            }
        });
        self.sessions.update_topic(id, topic.trim()).await?;
        Ok(())
    }

    //
    // ─── MESSAGES ──────────────────────────────────────────────────────────────
    //

    /// Transcript snapshot in insertion order.
    #[must_use]
    pub fn messages(&self, id: SessionId) -> Vec<Message> {
        self.read(|state| state.transcripts.get(&id).cloned().unwrap_or_default())
    }

    #[must_use]
    pub fn current_messages(&self) -> Vec<Message> {
        self.read(|state| {
            state
                .current
                .and_then(|id| state.transcripts.get(&id).cloned())
                .unwrap_or_default()
        })
    }

    /// Patch one message by id. Returns `false` when the message is gone.
    pub fn patch_message(&self, session_id: SessionId, id: MessageId, patch: MessagePatch) -> bool {
        self.update(|state| state.patch(session_id, id, patch))
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|state| {
            if state.input != text {
                state.input = text;
                state.dirty = true;
            }
        });
    }

    #[must_use]
    pub fn input(&self) -> String {
        self.read(|state| state.input.clone())
    }

    /// Send whatever is in the input field.
    pub async fn submit(&self) -> SendOutcome {
        let text = self.input();
        self.send_message(&text).await
    }

    /// Append `text` as a user message and deliver the full AI reply into a
    /// placeholder. A new session is titled alongside the reply.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let Some(dispatch) = self.update(|state| state.begin_send(text)) else {
            return SendOutcome::Skipped;
        };
        self.persist(dispatch.session_id, &dispatch.user).await;

        let (outcome, ()) = futures::join!(
            async {
                let reply = self.chat.reply(dispatch.session_id, &dispatch.text).await;
                self.finish_send(&dispatch, reply).await
            },
            self.generate_title(&dispatch),
        );
        outcome
    }

    /// Like [`Self::send_message`], but chunks are appended to the
    /// placeholder as they arrive. It stays loading until the stream ends.
    pub async fn send_message_streamed(&self, text: &str) -> SendOutcome {
        let Some(dispatch) = self.update(|state| state.begin_send(text)) else {
            return SendOutcome::Skipped;
        };
        self.persist(dispatch.session_id, &dispatch.user).await;

        let (outcome, ()) = futures::join!(
            async {
                let reply = self.stream_reply(&dispatch).await;
                self.finish_stream(&dispatch, reply).await
            },
            self.generate_title(&dispatch),
        );
        outcome
    }

    /// Re-answer the last user message of the current session, discarding
    /// every reply after it.
    pub async fn regenerate(&self) -> RegenerateOutcome {
        let Some(plan) = self.update(StoreState::begin_regenerate) else {
            return RegenerateOutcome::Skipped;
        };
        for id in &plan.discarded {
            if let Err(err) = self.messages.delete_message(*id).await {
                tracing::warn!(session_id = %plan.session_id, message_id = %id, error = %err, "failed to delete discarded reply");
            }
        }

        match self.chat.reply(plan.session_id, &plan.text).await {
            Ok(reply) => {
                let patched = self.update(|state| {
                    state.patch(plan.session_id, plan.placeholder, MessagePatch::resolved(reply))
                });
                if !patched {
                    return RegenerateOutcome::Superseded;
                }
                self.persist_by_id(plan.session_id, plan.placeholder).await;
                RegenerateOutcome::Replaced(plan.placeholder)
            }
            Err(err) => {
                tracing::warn!(session_id = %plan.session_id, error = %err, "regenerate failed");
                if self.update(|state| state.remove(plan.session_id, plan.placeholder)) {
                    RegenerateOutcome::Discarded
                } else {
                    RegenerateOutcome::Superseded
                }
            }
        }
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    async fn finish_send(&self, dispatch: &Dispatch, reply: Result<String, AiError>) -> SendOutcome {
        let user = dispatch.user.id();
        let (patch, delivered) = match reply {
            Ok(text) => (MessagePatch::resolved(text), true),
            Err(err) => {
                tracing::warn!(session_id = %dispatch.session_id, error = %err, "chat reply failed");
                (MessagePatch::resolved(AI_ERROR_TEXT), false)
            }
        };

        if !self.update(|state| state.patch(dispatch.session_id, dispatch.placeholder, patch)) {
            tracing::debug!(session_id = %dispatch.session_id, "placeholder discarded before reply");
            return SendOutcome::Superseded { user };
        }
        if !delivered {
            return SendOutcome::Failed {
                user,
                reply: dispatch.placeholder,
            };
        }
        self.persist_by_id(dispatch.session_id, dispatch.placeholder).await;
        SendOutcome::Delivered {
            user,
            reply: dispatch.placeholder,
        }
    }

    async fn finish_stream(&self, dispatch: &Dispatch, reply: Result<bool, AiError>) -> SendOutcome {
        let user = dispatch.user.id();
        match reply {
            Ok(true) => {
                let finished = self.update(|state| {
                    state.patch(
                        dispatch.session_id,
                        dispatch.placeholder,
                        MessagePatch {
                            is_loading: Some(false),
                            ..MessagePatch::default()
                        },
                    )
                });
                if !finished {
                    return SendOutcome::Superseded { user };
                }
                self.persist_by_id(dispatch.session_id, dispatch.placeholder).await;
                SendOutcome::Delivered {
                    user,
                    reply: dispatch.placeholder,
                }
            }
            Ok(false) => SendOutcome::Superseded { user },
            Err(err) => self.finish_send(dispatch, Err(err)).await,
        }
    }

    /// Append chunks to the placeholder. `Ok(false)` once the placeholder
    /// has been removed.
    async fn stream_reply(&self, dispatch: &Dispatch) -> Result<bool, AiError> {
        let mut chunks = self.chat.reply_stream(dispatch.session_id, &dispatch.text).await?;
        let mut received = false;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            received = true;
            let alive = self.update(|state| {
                state.patch(dispatch.session_id, dispatch.placeholder, MessagePatch::appended(chunk))
            });
            if !alive {
                return Ok(false);
            }
        }
        if !received {
            return Err(AiError::EmptyResponse);
        }
        Ok(true)
    }

    async fn generate_title(&self, dispatch: &Dispatch) {
        if !dispatch.wants_title {
            return;
        }
        let session_id = dispatch.session_id;
        match self.titles.generate_title(session_id, &dispatch.text).await {
            Ok(title) => {
                if self.update(|state| state.fill_topic(session_id, &title)) {
                    if let Err(err) = self.sessions.update_topic(session_id, &title).await {
                        tracing::warn!(%session_id, error = %err, "failed to persist session topic");
                    }
                }
            }
            Err(err) => {
                self.update(|state| state.titles_pending.remove(&session_id));
                tracing::warn!(%session_id, error = %err, "title generation failed");
            }
        }
    }

    async fn persist_by_id(&self, session_id: SessionId, id: MessageId) {
        let message = self.read(|state| state.find(session_id, id).cloned());
        if let Some(message) = message {
            self.persist(session_id, &message).await;
        }
    }

    /// Failures keep the optimistic copy and are only logged.
    async fn persist(&self, session_id: SessionId, message: &Message) {
        let record = NewMessageRecord::from_message(session_id, message, self.clock.now());
        if let Err(err) = self.messages.create_message(record).await {
            tracing::warn!(%session_id, message_id = %message.id(), error = %err, "failed to persist message");
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&*self.lock())
    }

    fn update<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let (result, changed) = {
            let mut state = self.lock();
            let result = f(&mut *state);
            (result, std::mem::take(&mut state.dirty))
        };
        if changed {
            self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::repository::{MessageRecord, Storage, StorageError};
    use study_core::model::Role;
    use study_core::time::fixed_now;
    use tokio::sync::oneshot;

    use crate::ai::TextStream;

    struct EchoChat;

    #[async_trait]
    impl ChatModel for EchoChat {
        async fn reply(&self, _session_id: SessionId, text: &str) -> Result<String, AiError> {
            Ok(format!("re: {text}"))
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        async fn reply(&self, _session_id: SessionId, _text: &str) -> Result<String, AiError> {
            Err(AiError::Failed("model offline".into()))
        }
    }

    /// Replies only once the test releases the gate for that text.
    #[derive(Default)]
    struct GatedChat {
        gates: std::sync::Mutex<HashMap<String, oneshot::Receiver<String>>>,
    }

    impl GatedChat {
        fn gate(&self, text: &str) -> oneshot::Sender<String> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(text.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl ChatModel for GatedChat {
        async fn reply(&self, _session_id: SessionId, text: &str) -> Result<String, AiError> {
            let gate = self.gates.lock().unwrap().remove(text);
            match gate {
                Some(rx) => rx.await.map_err(|_| AiError::Failed("gate dropped".into())),
                None => Err(AiError::Failed(format!("no gate for {text}"))),
            }
        }
    }

    struct ChunkedChat(Vec<&'static str>);

    #[async_trait]
    impl ChatModel for ChunkedChat {
        async fn reply(&self, _session_id: SessionId, _text: &str) -> Result<String, AiError> {
            Ok(self.0.concat())
        }

        async fn reply_stream(&self, _session_id: SessionId, _text: &str) -> Result<TextStream, AiError> {
            let chunks: Vec<Result<String, AiError>> = self.0.iter().map(|c| Ok((*c).to_string())).collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    struct FixedTitle {
        title: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl FixedTitle {
        fn ok(title: &'static str) -> Self {
            Self {
                title: Ok(title),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                title: Err("title model offline"),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TitleGenerator for FixedTitle {
        async fn generate_title(&self, _session_id: SessionId, _seed: &str) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.title
                .map(str::to_string)
                .map_err(|e| AiError::Failed(e.to_string()))
        }
    }

    /// Titles only once the test releases the gate.
    struct GatedTitle {
        gate: std::sync::Mutex<Option<oneshot::Receiver<String>>>,
    }

    impl GatedTitle {
        fn new() -> (Self, oneshot::Sender<String>) {
            let (tx, rx) = oneshot::channel();
            let title = Self {
                gate: std::sync::Mutex::new(Some(rx)),
            };
            (title, tx)
        }
    }

    #[async_trait]
    impl TitleGenerator for GatedTitle {
        async fn generate_title(&self, _session_id: SessionId, _seed: &str) -> Result<String, AiError> {
            let gate = self.gate.lock().unwrap().take();
            match gate {
                Some(rx) => rx.await.map_err(|_| AiError::Failed("gate dropped".into())),
                None => Err(AiError::Failed("title already requested".into())),
            }
        }
    }

    struct FailingMessages;

    #[async_trait]
    impl MessageRepository for FailingMessages {
        async fn create_message(&self, _message: NewMessageRecord) -> Result<MessageRecord, StorageError> {
            Err(StorageError::Connection("disk full".into()))
        }

        async fn list_messages(&self, _session_id: SessionId) -> Result<Vec<MessageRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn delete_message(&self, _id: MessageId) -> Result<(), StorageError> {
            Err(StorageError::Connection("disk full".into()))
        }
    }

    fn store_with(
        storage: &Storage,
        chat: Arc<dyn ChatModel>,
        titles: Arc<dyn TitleGenerator>,
    ) -> SessionMessageStore {
        SessionMessageStore::new(
            Clock::fixed(fixed_now()),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.messages),
            chat,
            titles,
        )
    }

    fn texts(messages: &[Message]) -> Vec<(Role, String, bool)> {
        messages
            .iter()
            .map(|m| (m.role(), m.text().to_string(), m.is_loading()))
            .collect()
    }

    async fn persisted(storage: &Storage, id: SessionId) -> Vec<String> {
        storage
            .messages
            .list_messages(id)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.text)
            .collect()
    }

    #[tokio::test]
    async fn send_delivers_reply_and_titles_session() {
        let storage = Storage::in_memory();
        let titles = Arc::new(FixedTitle::ok("Cell Biology"));
        let store = store_with(&storage, Arc::new(EchoChat), titles.clone());
        let session = store.start_session().await.unwrap();
        store.set_input("What is a cell?");

        let outcome = store.submit().await;

        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(store.input(), "");
        assert_eq!(
            texts(&store.messages(session.id())),
            [
                (Role::User, "What is a cell?".to_string(), false),
                (Role::Ai, "re: What is a cell?".to_string(), false),
            ]
        );
        assert_eq!(persisted(&storage, session.id()).await, ["What is a cell?", "re: What is a cell?"]);

        assert_eq!(store.session(session.id()).unwrap().topic(), Some("Cell Biology"));
        let stored = storage.sessions.get_session(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.topic(), Some("Cell Biology"));

        store.send_message("And a tissue?").await;
        assert_eq!(titles.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_input_or_no_session_is_a_no_op() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::ok("t")));
        let revisions = store.subscribe();

        assert_eq!(store.send_message("hello").await, SendOutcome::Skipped);
        store.start_session().await.unwrap();
        assert_eq!(store.send_message("   ").await, SendOutcome::Skipped);
        assert!(store.current_messages().is_empty());
        assert_eq!(*revisions.borrow(), 1);
    }

    #[tokio::test]
    async fn failed_reply_becomes_visible_error() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(FailingChat), Arc::new(FixedTitle::failing()));
        let session = store.start_session().await.unwrap();

        let outcome = store.send_message("hello").await;

        let messages = store.messages(session.id());
        let SendOutcome::Failed { reply, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(messages[1].id(), reply);
        assert_eq!(
            texts(&messages),
            [
                (Role::User, "hello".to_string(), false),
                (Role::Ai, AI_ERROR_TEXT.to_string(), false),
            ]
        );
        assert_eq!(store.session(session.id()).unwrap().topic(), None);
        assert_eq!(persisted(&storage, session.id()).await, ["hello"]);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_optimistic_messages() {
        let storage = Storage::in_memory();
        let store = SessionMessageStore::new(
            Clock::fixed(fixed_now()),
            Arc::clone(&storage.sessions),
            Arc::new(FailingMessages),
            Arc::new(EchoChat),
            Arc::new(FixedTitle::ok("t")),
        );
        let session = store.start_session().await.unwrap();

        let outcome = store.send_message("hello").await;

        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(store.messages(session.id()).len(), 2);
    }

    #[tokio::test]
    async fn concurrent_sends_each_get_their_own_reply() {
        let storage = Storage::in_memory();
        let chat = Arc::new(GatedChat::default());
        let release_a = chat.gate("A");
        let release_b = chat.gate("B");
        let store = store_with(&storage, chat.clone(), Arc::new(FixedTitle::ok("t")));
        let session = store.start_session().await.unwrap();

        let driver = async {
            for _ in 0..50 {
                if store.messages(session.id()).len() == 4 {
                    break;
                }
                tokio::task::yield_now().await;
            }
            release_b.send("reply B".into()).unwrap();
            for _ in 0..50 {
                if store.messages(session.id()).iter().any(|m| m.text() == "reply B") {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let midway = texts(&store.messages(session.id()));
            release_a.send("reply A".into()).unwrap();
            midway
        };
        let (a, b, midway) = futures::join!(store.send_message("A"), store.send_message("B"), driver);

        assert_eq!(
            midway,
            [
                (Role::User, "A".to_string(), false),
                (Role::Ai, String::new(), true),
                (Role::User, "B".to_string(), false),
                (Role::Ai, "reply B".to_string(), false),
            ]
        );
        let messages = store.messages(session.id());
        let reply_of = |outcome: SendOutcome| match outcome {
            SendOutcome::Delivered { reply, .. } => messages.iter().find(|m| m.id() == reply).unwrap().text().to_string(),
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(reply_of(a), "reply A");
        assert_eq!(reply_of(b), "reply B");
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn regenerate_truncates_after_last_user_message() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::ok("t")));
        let session = store.start_session().await.unwrap();
        store.send_message("A").await;
        let ai = Message::new(MessageId::generate(), Role::Ai, "r2");
        storage
            .messages
            .create_message(NewMessageRecord::from_message(session.id(), &ai, fixed_now()))
            .await
            .unwrap();
        store.update(|state| state.transcripts.get_mut(&session.id()).unwrap().push(ai));

        let outcome = store.regenerate().await;

        let messages = store.messages(session.id());
        assert_eq!(outcome, RegenerateOutcome::Replaced(messages[1].id()));
        assert_eq!(
            texts(&messages),
            [
                (Role::User, "A".to_string(), false),
                (Role::Ai, "re: A".to_string(), false),
            ]
        );
        assert!(messages.iter().all(|m| m.text() != "r2"));
        assert_eq!(persisted(&storage, session.id()).await, ["A", "re: A"]);
    }

    #[tokio::test]
    async fn failed_regenerate_removes_placeholder_silently() {
        let storage = Storage::in_memory();
        let chat = Arc::new(GatedChat::default());
        let release = chat.gate("A");
        let store = store_with(&storage, chat.clone(), Arc::new(FixedTitle::ok("t")));
        let session = store.start_session().await.unwrap();
        release.send("r1".into()).unwrap();
        store.send_message("A").await;
        let r2 = Message::new(MessageId::generate(), Role::Ai, "r2");
        storage
            .messages
            .create_message(NewMessageRecord::from_message(session.id(), &r2, fixed_now()))
            .await
            .unwrap();
        store.update(|state| state.transcripts.get_mut(&session.id()).unwrap().push(r2));

        let fail_regen = chat.gate("A");
        let driver = async {
            for _ in 0..50 {
                if store.messages(session.id()).last().is_some_and(Message::is_loading) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let pending = texts(&store.messages(session.id()));
            drop(fail_regen);
            pending
        };
        let (outcome, pending) = futures::join!(store.regenerate(), driver);

        assert_eq!(
            pending,
            [
                (Role::User, "A".to_string(), false),
                (Role::Ai, String::new(), true),
            ]
        );
        assert_eq!(outcome, RegenerateOutcome::Discarded);
        assert_eq!(
            texts(&store.messages(session.id())),
            [(Role::User, "A".to_string(), false)]
        );
        assert_eq!(persisted(&storage, session.id()).await, ["A"]);
    }

    #[tokio::test]
    async fn reply_is_delivered_while_title_is_pending() {
        let storage = Storage::in_memory();
        let (titles, release_title) = GatedTitle::new();
        let store = store_with(&storage, Arc::new(EchoChat), Arc::new(titles));
        let session = store.start_session().await.unwrap();

        let driver = async {
            for _ in 0..200 {
                if store.messages(session.id()).get(1).is_some_and(|m| !m.is_loading()) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let delivered = texts(&store.messages(session.id()));
            let topic = store.session(session.id()).and_then(|s| s.topic().map(str::to_string));
            release_title.send("Greetings".into()).unwrap();
            (delivered, topic)
        };
        let (outcome, (delivered, topic_before)) = futures::join!(store.send_message("hi"), driver);

        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(
            delivered,
            [
                (Role::User, "hi".to_string(), false),
                (Role::Ai, "re: hi".to_string(), false),
            ]
        );
        assert_eq!(topic_before, None);
        assert_eq!(persisted(&storage, session.id()).await, ["hi", "re: hi"]);
        assert_eq!(store.session(session.id()).unwrap().topic(), Some("Greetings"));
    }

    #[tokio::test]
    async fn streamed_reply_is_delivered_while_title_is_pending() {
        let storage = Storage::in_memory();
        let (titles, release_title) = GatedTitle::new();
        let store = store_with(&storage, Arc::new(ChunkedChat(vec!["Hel", "lo"])), Arc::new(titles));
        let session = store.start_session().await.unwrap();

        let driver = async {
            for _ in 0..200 {
                if store.messages(session.id()).get(1).is_some_and(|m| !m.is_loading()) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let delivered = texts(&store.messages(session.id()));
            drop(release_title);
            delivered
        };
        let (outcome, delivered) = futures::join!(store.send_message_streamed("hi"), driver);

        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(delivered[1], (Role::Ai, "Hello".to_string(), false));
        assert_eq!(store.session(session.id()).unwrap().topic(), None);
    }

    #[tokio::test]
    async fn regenerate_without_user_message_is_a_no_op() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::ok("t")));
        assert_eq!(store.regenerate().await, RegenerateOutcome::Skipped);

        store.start_session().await.unwrap();
        assert_eq!(store.regenerate().await, RegenerateOutcome::Skipped);
        assert!(store.current_messages().is_empty());
    }

    #[tokio::test]
    async fn regenerate_supersedes_in_flight_send() {
        let storage = Storage::in_memory();
        let chat = Arc::new(GatedChat::default());
        let release_send = chat.gate("A");
        let store = store_with(&storage, chat.clone(), Arc::new(FixedTitle::ok("t")));
        let session = store.start_session().await.unwrap();

        let driver = async {
            for _ in 0..50 {
                if store.messages(session.id()).len() == 2 {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let release_regen = chat.gate("A");
            release_regen.send("fresh".into()).unwrap();
            let regenerated = store.regenerate().await;
            release_send.send("stale".into()).unwrap();
            regenerated
        };
        let (sent, regenerated) = futures::join!(store.send_message("A"), driver);

        assert!(matches!(sent, SendOutcome::Superseded { .. }));
        assert!(matches!(regenerated, RegenerateOutcome::Replaced(_)));
        let texts: Vec<String> = store.messages(session.id()).iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, ["A", "fresh"]);
    }

    #[tokio::test]
    async fn streamed_send_appends_chunks_by_id() {
        let storage = Storage::in_memory();
        let store = store_with(
            &storage,
            Arc::new(ChunkedChat(vec!["Mito", "chon", "dria"])),
            Arc::new(FixedTitle::ok("t")),
        );
        let session = store.start_session().await.unwrap();
        let mut revisions = store.subscribe();
        let _ = revisions.borrow_and_update();

        let outcome = store.send_message_streamed("powerhouse?").await;

        assert!(matches!(outcome, SendOutcome::Delivered { .. }));
        assert_eq!(
            texts(&store.messages(session.id()))[1],
            (Role::Ai, "Mitochondria".to_string(), false)
        );
        assert!(revisions.has_changed().unwrap());
        assert_eq!(persisted(&storage, session.id()).await, ["powerhouse?", "Mitochondria"]);
    }

    #[tokio::test]
    async fn empty_stream_is_a_failed_send() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(ChunkedChat(Vec::new())), Arc::new(FixedTitle::ok("t")));
        store.start_session().await.unwrap();

        let outcome = store.send_message_streamed("hello").await;

        assert!(matches!(outcome, SendOutcome::Failed { .. }));
        assert_eq!(store.current_messages()[1].text(), AI_ERROR_TEXT);
    }

    #[tokio::test]
    async fn open_session_loads_persisted_transcript() {
        let storage = Storage::in_memory();
        let writer = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::ok("Cells")));
        let session = writer.start_session().await.unwrap();
        writer.send_message("hello").await;

        let reader = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::ok("t")));
        let opened = reader.open_session(session.id()).await.unwrap();

        assert_eq!(opened.topic(), Some("Cells"));
        assert_eq!(reader.current_session_id(), Some(session.id()));
        assert_eq!(
            texts(&reader.current_messages()),
            [
                (Role::User, "hello".to_string(), false),
                (Role::Ai, "re: hello".to_string(), false),
            ]
        );

        let missing = reader.open_session(SessionId::new(99)).await;
        assert!(matches!(missing, Err(MessageStoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn patch_and_set_topic_address_by_id() {
        let storage = Storage::in_memory();
        let store = store_with(&storage, Arc::new(EchoChat), Arc::new(FixedTitle::failing()));
        let session = store.start_session().await.unwrap();
        store.send_message("hello").await;
        let reply = store.messages(session.id())[1].id();

        assert!(store.patch_message(session.id(), reply, MessagePatch::appended("!")));
        assert!(!store.patch_message(session.id(), MessageId::generate(), MessagePatch::resolved("x")));
        assert_eq!(store.messages(session.id())[1].text(), "re: hello!");

        store.set_topic(session.id(), " Greetings ").await.unwrap();
        assert_eq!(store.current_session().unwrap().topic(), Some("Greetings"));
        let stored = storage.sessions.get_session(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.topic(), Some("Greetings"));
    }
}
