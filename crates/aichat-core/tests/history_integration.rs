//! Integration tests for the conversation history file.

use aichat_core::{ChatMessage, ChatSession, ConversationStore, LoadOutcome, ReplyOutcome, BeginOutcome};

#[test]
fn save_then_load_preserves_conversations_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".aichat").join("conversations.json");

    let mut store = ConversationStore::new(&path);
    let id = store.create();
    {
        let conv = store.get_mut(&id).unwrap();
        conv.push(ChatMessage::user("你好，世界"));
        conv.push(ChatMessage::assistant("Hello, world"));
    }
    store.save().expect("save should succeed");

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("你好，世界"), "non-ASCII text should be stored as-is");
    assert!(raw.contains("\"version\": 1"));
    assert!(!dir.path().join(".aichat").join("conversations.json.tmp").exists());

    let mut loaded = ConversationStore::new(&path);
    assert_eq!(loaded.load().unwrap(), LoadOutcome::Loaded(1));
    let conv = loaded.get(&id).unwrap();
    assert_eq!(conv.title, "你好，世界");
    assert_eq!(conv.messages.len(), 2);
    assert_eq!(conv.messages[1].text(), "Hello, world");
}

#[test]
fn load_reads_multipart_messages_and_legacy_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.json");
    std::fs::write(
        &path,
        r#"{
  "version": 1,
  "conversations": {
    "a": {
      "id": "a",
      "title": "picture",
      "messages": [
        {"role": "user", "content": [
          {"type": "text", "text": "what is this?"},
          {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
        ]},
        {"role": "assistant", "content": "A cat."}
      ],
      "created_at": "01/02 03:04"
    },
    "b": {
      "id": "b",
      "title": "newer",
      "messages": [],
      "created_at": "2999-01-01T00:00:00.000000"
    }
  },
  "last_updated": "2025-01-01T00:00:00"
}"#,
    )
    .unwrap();

    let mut store = ConversationStore::new(&path);
    assert_eq!(store.load().unwrap(), LoadOutcome::Loaded(2));
    assert_eq!(store.sorted_ids(), vec!["b", "a"]);

    let first = &store.get("a").unwrap().messages[0];
    assert_eq!(first.text(), "what is this?");
    assert_eq!(first.image_urls(), vec!["data:image/png;base64,AAAA"]);
}

#[test]
fn load_reports_missing_corrupt_and_incompatible_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.json");

    let mut store = ConversationStore::new(&path);
    assert_eq!(store.load().unwrap(), LoadOutcome::Missing);

    std::fs::write(&path, "{ this is not json").unwrap();
    assert!(matches!(store.load().unwrap(), LoadOutcome::Corrupt(_)));

    std::fs::write(&path, r#"{"version": 2, "conversations": {}}"#).unwrap();
    assert_eq!(store.load().unwrap(), LoadOutcome::Incompatible(2));

    std::fs::write(&path, r#"{"conversations": {}}"#).unwrap();
    assert_eq!(store.load().unwrap(), LoadOutcome::Incompatible(0));

    std::fs::write(&path, r#"{"version": 1, "conversations": {}}"#).unwrap();
    assert_eq!(store.load().unwrap(), LoadOutcome::Empty);
    assert!(store.is_empty());
}

#[test]
fn clear_removes_history_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.json");

    let mut store = ConversationStore::new(&path);
    store.create();
    store.save().unwrap();
    assert!(path.exists());

    store.clear().unwrap();
    assert!(!path.exists());
    assert!(store.is_empty());

    // Clearing again with no file is fine
    store.clear().unwrap();
}

#[test]
fn session_flush_persists_completed_turn() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.json");

    let mut session = ChatSession::open(ConversationStore::new(&path));
    let request = match session.begin_request("What is Rust?", &[], None) {
        BeginOutcome::Started(request) => request,
        other => panic!("request should start, got {:?}", other),
    };
    session.apply_delta(request.request_id, "A systems language.");
    assert_eq!(session.finish_request(request.request_id), ReplyOutcome::Appended);
    session.flush().unwrap();

    let mut reopened = ConversationStore::new(&path);
    assert_eq!(reopened.load().unwrap(), LoadOutcome::Loaded(1));
    let session = ChatSession::open(reopened);
    let conv = session.current().unwrap();
    assert_eq!(conv.title, "What is Rust?");
    assert_eq!(conv.messages[1].text(), "A systems language.");
}
