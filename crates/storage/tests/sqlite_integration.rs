use chrono::Duration;
use study_core::model::{AppSettingsDraft, MessageId, Role, SessionId};
use study_core::time::fixed_now;
use storage::repository::{
    AppSettingsRepository, MessageRepository, NewMessageRecord, NewSessionRecord,
    SessionRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn message(session_id: SessionId, role: Role, text: &str) -> NewMessageRecord {
    NewMessageRecord {
        id: MessageId::generate(),
        session_id,
        role,
        text: text.to_string(),
        created_at: fixed_now(),
    }
}

#[tokio::test]
async fn sqlite_keeps_transcript_order_and_roles() {
    let repo = connect("memdb_transcript").await;
    let session = repo
        .create_session(NewSessionRecord {
            topic: None,
            started_at: fixed_now(),
        })
        .await
        .unwrap();

    let sent = [
        message(session, Role::User, "What is osmosis?"),
        message(session, Role::Ai, "Diffusion of water across a membrane."),
        message(session, Role::User, "Give an example."),
    ];
    for record in sent.clone() {
        repo.create_message(record).await.unwrap();
    }

    let listed = repo.list_messages(session).await.unwrap();
    let ids: Vec<MessageId> = listed.iter().map(|m| m.id).collect();
    let expected: Vec<MessageId> = sent.iter().map(|m| m.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(listed[1].role, Role::Ai);

    repo.delete_message(listed[1].id).await.unwrap();
    assert_eq!(repo.list_messages(session).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_maps_constraint_violations() {
    let repo = connect("memdb_constraints").await;

    let err = repo
        .create_message(message(SessionId::new(77), Role::User, "orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let session = repo
        .create_session(NewSessionRecord {
            topic: None,
            started_at: fixed_now(),
        })
        .await
        .unwrap();
    let record = message(session, Role::User, "once");
    repo.create_message(record.clone()).await.unwrap();
    let err = repo.create_message(record).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn sqlite_sessions_list_newest_first_and_update_topic() {
    let repo = connect("memdb_sessions").await;
    let older = repo
        .create_session(NewSessionRecord {
            topic: Some("Algebra".into()),
            started_at: fixed_now(),
        })
        .await
        .unwrap();
    let newer = repo
        .create_session(NewSessionRecord {
            topic: None,
            started_at: fixed_now() + Duration::minutes(5),
        })
        .await
        .unwrap();

    let sessions = repo.list_sessions(10).await.unwrap();
    assert_eq!(
        sessions.iter().map(|s| s.id()).collect::<Vec<_>>(),
        [newer, older]
    );
    assert_eq!(sessions[0].topic(), None);

    repo.update_topic(newer, "Photosynthesis").await.unwrap();
    let fetched = repo.get_session(newer).await.unwrap().unwrap();
    assert_eq!(fetched.topic(), Some("Photosynthesis"));

    assert!(repo.get_session(SessionId::new(999)).await.unwrap().is_none());
    assert!(matches!(
        repo.update_topic(SessionId::new(999), "x").await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_settings_round_trip() {
    let repo = connect("memdb_settings").await;
    assert!(repo.get_settings().await.unwrap().is_none());

    let settings = AppSettingsDraft {
        api_key: Some("sk-test".into()),
        api_model: Some("gpt-4o-mini".into()),
        quiz_stream_url: Some("http://localhost:3000/api/quiz/stream".into()),
        ..AppSettingsDraft::default()
    }
    .validate()
    .unwrap();
    repo.save_settings(&settings).await.unwrap();

    let loaded = repo.get_settings().await.unwrap().unwrap();
    assert_eq!(loaded, settings);
}
