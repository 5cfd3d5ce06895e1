//! Domain models for the portal
//!
//! These are the records persisted in the flat-file stores. Field names are
//! serialized in camelCase to match the on-disk document format consumed by
//! the frontend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Approval lifecycle of a submitted paper.
///
/// The transition function is total: an admin may move a paper from any
/// state to any other state, including resetting approved or rejected
/// papers back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Pending => "pending",
            PaperStatus::Approved => "approved",
            PaperStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: PaperStatus,
    pub to: PaperStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// A submitted research paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Display name of the submitter
    pub author: String,
    pub date: DateTime<Utc>,
    pub status: PaperStatus,
    /// Upload store locator. The public URL is derived from it at read
    /// time and never persisted.
    pub file_name: String,
    /// Audit trail of status transitions
    #[serde(default)]
    pub status_log: Vec<StatusChange>,
}

/// Lifecycle of an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
}

/// A request for portal access. Once approved it carries the PIN
/// credential matched against future logins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub reason: String,
    pub status: RequestStatus,
    /// 6-digit numeric credential, set only on approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

/// Free-form staff profile keyed by email. No schema is enforced; unknown
/// fields round-trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expertise: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// Base64 payload or URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Snapshot of a profile taken when a chat message is sent, denormalized
/// so history stays displayable after the profile changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&Profile> for ProfileSnapshot {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            image: profile.image.clone(),
        }
    }
}

/// A chat message as broadcast and persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Submitter identity
    pub user: String,
    pub text: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub profile: ProfileSnapshot,
}

/// Online-user entry broadcast on join/leave. Ephemeral; snapshots may be
/// written into the chat document on disconnect for recovery only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub identity: String,
    #[serde(default)]
    pub profile: ProfileSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PaperStatus::Approved).unwrap(),
            "\"approved\""
        );
        let status: PaperStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(status, PaperStatus::Rejected);
    }

    #[test]
    fn test_paper_round_trip() {
        let paper = Paper {
            id: "p1".into(),
            title: "Test Paper".into(),
            description: "desc".into(),
            category: "Economic Policy".into(),
            abstract_text: "abstract".into(),
            author: "alice".into(),
            date: Utc::now(),
            status: PaperStatus::Pending,
            file_name: "1700000000-0-paper.pdf".into(),
            status_log: vec![],
        };

        let json = serde_json::to_string(&paper).unwrap();
        assert!(json.contains("\"abstract\""));
        assert!(json.contains("\"fileName\""));
        let back: Paper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, paper);
    }

    #[test]
    fn test_pin_omitted_while_pending() {
        let request = AccessRequest {
            id: "r1".into(),
            name: "Ana".into(),
            email: "a@b.com".into(),
            department: "Research".into(),
            reason: "access".into(),
            status: RequestStatus::Pending,
            pin: None,
            approved_at: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("pin"));
        assert!(json.contains("\"pending\""));
    }

    #[test]
    fn test_profile_keeps_unknown_fields() {
        let json = r#"{"name":"Ana","officeHours":"Tue 2-4"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(
            profile.extra.get("officeHours").and_then(|v| v.as_str()),
            Some("Tue 2-4")
        );

        let back = serde_json::to_string(&profile).unwrap();
        assert!(back.contains("officeHours"));
    }
}
