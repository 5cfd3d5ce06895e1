//! Chat history document store
//!
//! Holds every chat message plus the last presence snapshot. Appended to on
//! every message by rewriting the whole document, same discipline as the
//! main store.

use crate::errors::Result;
use crate::models::{ChatMessage, PresenceEntry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// The chat history document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatDocument {
    pub messages: Vec<ChatMessage>,
    /// Presence snapshot written on disconnect, kept for recovery and
    /// debugging only. Never a primary record.
    pub users: Vec<PresenceEntry>,
}

/// Store for the chat history document
pub struct ChatHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ChatHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole chat document; absent file yields an empty one.
    pub async fn load(&self) -> Result<ChatDocument> {
        super::load_document(&self.path).await
    }

    /// Append one message and rewrite the document
    pub async fn append(&self, message: ChatMessage) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc: ChatDocument = super::load_document(&self.path).await?;
        doc.messages.push(message);
        super::persist(&self.path, &doc).await
    }

    /// Replace the stored presence snapshot
    pub async fn snapshot_users(&self, users: Vec<PresenceEntry>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc: ChatDocument = super::load_document(&self.path).await?;
        doc.users = users;
        super::persist(&self.path, &doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileSnapshot;
    use chrono::Utc;

    fn message(user: &str, text: &str) -> ChatMessage {
        ChatMessage {
            user: user.into(),
            text: text.into(),
            time: Utc::now(),
            profile: ProfileSnapshot::default(),
        }
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatHistoryStore::new(dir.path().join("chat.json"));

        store.append(message("alice", "hi")).await.unwrap();
        store.append(message("bob", "hello")).await.unwrap();
        store.append(message("alice", "how are you")).await.unwrap();

        let doc = store.load().await.unwrap();
        let texts: Vec<&str> = doc.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hi", "hello", "how are you"]);
    }

    #[tokio::test]
    async fn test_snapshot_replaces_users() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatHistoryStore::new(dir.path().join("chat.json"));

        store
            .snapshot_users(vec![PresenceEntry {
                identity: "alice".into(),
                profile: ProfileSnapshot::default(),
            }])
            .await
            .unwrap();
        store.snapshot_users(vec![]).await.unwrap();

        let doc = store.load().await.unwrap();
        assert!(doc.users.is_empty());
    }
}
