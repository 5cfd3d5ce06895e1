//! Paper workflow service
//!
//! Owns the `papers` collection of the flat-file store: submission with
//! upload, the public/admin listings, and the approval state machine.
//!
//! The transition function is deliberately total. Admins may move a paper
//! between any two states, including resetting decisions back to pending;
//! every transition is appended to the paper's audit log with the acting
//! identity and timestamp.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{Paper, PaperStatus, StatusChange};
use crate::store::FlatFileStore;
use crate::uploads::UploadStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Fields supplied by the submitter
#[derive(Debug, Clone)]
pub struct PaperDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub abstract_text: String,
}

/// Service over the papers collection
#[derive(Clone)]
pub struct PaperService {
    store: Arc<FlatFileStore>,
    uploads: Arc<dyn UploadStore>,
}

impl PaperService {
    pub fn new(store: Arc<FlatFileStore>, uploads: Arc<dyn UploadStore>) -> Self {
        Self { store, uploads }
    }

    /// Submit a new paper. Stores the blob first, then appends the record
    /// with `status = pending`.
    pub async fn submit(
        &self,
        author: &str,
        draft: PaperDraft,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Paper> {
        require_field("title", &draft.title)?;
        require_field("description", &draft.description)?;
        require_field("category", &draft.category)?;
        require_field("abstract", &draft.abstract_text)?;
        require_field("author", author)?;
        if bytes.is_empty() {
            return Err(AppError::MissingField {
                field: "file".into(),
            });
        }

        let locator = self
            .uploads
            .store(bytes, file_name)
            .await
            .map_err(|e| AppError::UploadFailed {
                message: e.to_string(),
            })?;

        let paper = Paper {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            abstract_text: draft.abstract_text,
            author: author.to_string(),
            date: Utc::now(),
            status: PaperStatus::Pending,
            file_name: locator,
            status_log: Vec::new(),
        };

        let stored = paper.clone();
        self.store
            .mutate(move |doc| {
                doc.papers.push(stored);
                Ok(())
            })
            .await?;

        metrics::record_paper_submitted(&paper.category);
        info!(
            paper_id = %paper.id,
            author = %paper.author,
            title = %paper.title,
            "Paper submitted"
        );

        Ok(paper)
    }

    /// Approved papers only, for the public site
    pub async fn list_public(&self) -> Result<Vec<Paper>> {
        self.store
            .read(|doc| {
                doc.papers
                    .iter()
                    .filter(|p| p.status == PaperStatus::Approved)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// All papers regardless of status; the gateway gates this on the
    /// admin scope.
    pub async fn list_for_admin(&self) -> Result<Vec<Paper>> {
        self.store.read(|doc| doc.papers.clone()).await
    }

    /// Fetch one paper. Non-admin callers get `PaperNotFound` for
    /// unapproved papers; their existence is hidden, not forbidden.
    pub async fn get(&self, id: &str, admin: bool) -> Result<Paper> {
        let wanted = id.to_string();
        let paper = self
            .store
            .read(move |doc| doc.papers.iter().find(|p| p.id == wanted).cloned())
            .await?;

        match paper {
            Some(p) if admin || p.status == PaperStatus::Approved => Ok(p),
            _ => Err(AppError::PaperNotFound { id: id.to_string() }),
        }
    }

    /// Apply a status transition. Any state may move to any other state;
    /// the transition is recorded in the paper's audit log.
    pub async fn set_status(&self, id: &str, status: PaperStatus, actor: &str) -> Result<Paper> {
        let target = id.to_string();
        let actor_owned = actor.to_string();
        let updated = self
            .store
            .mutate(move |doc| {
                let paper = doc
                    .papers
                    .iter_mut()
                    .find(|p| p.id == target)
                    .ok_or(AppError::PaperNotFound { id: target.clone() })?;

                let from = paper.status;
                paper.status = status;
                paper.status_log.push(StatusChange {
                    from,
                    to: status,
                    actor: actor_owned,
                    at: Utc::now(),
                });
                Ok(paper.clone())
            })
            .await?;

        let from = updated
            .status_log
            .last()
            .map(|c| c.from.as_str())
            .unwrap_or("?");
        metrics::record_status_change(status.as_str());
        info!(
            paper_id = %updated.id,
            from = %from,
            to = %status,
            actor = %actor,
            "Paper status changed"
        );

        Ok(updated)
    }

    /// Destructive maintenance operation: drop every paper record. Blob
    /// files are left in place. Refuses without explicit confirmation.
    pub async fn truncate(&self, confirm: bool) -> Result<usize> {
        if !confirm {
            return Err(AppError::Validation {
                message: "truncate requires explicit confirmation".into(),
                field: Some("confirm".into()),
            });
        }

        let removed = self
            .store
            .mutate(|doc| {
                let count = doc.papers.len();
                doc.papers.clear();
                Ok(count)
            })
            .await?;

        warn!(removed = removed, "Paper collection truncated");
        Ok(removed)
    }

    /// Resolve the public URL for a stored paper file
    pub fn url_for(&self, paper: &Paper) -> String {
        self.uploads.url_for(&paper.file_name)
    }
}

fn require_field(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AppError::MissingField {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploads::DiskUploadStore;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> PaperService {
        let store = Arc::new(FlatFileStore::new(dir.path().join("portal.json")));
        let uploads = Arc::new(DiskUploadStore::new(
            dir.path().join("uploads"),
            "http://localhost:8080".to_string(),
        ));
        PaperService::new(store, uploads)
    }

    fn draft() -> PaperDraft {
        PaperDraft {
            title: "Test Paper".into(),
            description: "A study".into(),
            category: "Economic Policy".into(),
            abstract_text: "We study things.".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_yields_pending_with_resolvable_file() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let paper = svc
            .submit("alice", draft(), "paper.pdf", b"pdf bytes")
            .await
            .unwrap();

        assert_eq!(paper.status, PaperStatus::Pending);
        assert!(!paper.file_name.is_empty());
        let url = svc.uploads.resolve(&paper.file_name).await.unwrap();
        assert!(url.contains(&paper.file_name));
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let mut missing_title = draft();
        missing_title.title = "  ".into();
        let err = svc
            .submit("alice", missing_title, "paper.pdf", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "title"));

        let err = svc.submit("alice", draft(), "paper.pdf", b"").await.unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "file"));
    }

    #[tokio::test]
    async fn test_public_list_is_approved_subset_of_admin_list() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let a = svc.submit("alice", draft(), "a.pdf", b"a").await.unwrap();
        let _b = svc.submit("bob", draft(), "b.pdf", b"b").await.unwrap();
        svc.set_status(&a.id, PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap();

        let public = svc.list_public().await.unwrap();
        let admin = svc.list_for_admin().await.unwrap();

        assert_eq!(public.len(), 1);
        assert_eq!(admin.len(), 2);
        for paper in &public {
            assert_eq!(paper.status, PaperStatus::Approved);
            assert!(admin.iter().any(|p| p.id == paper.id));
        }
    }

    #[tokio::test]
    async fn test_unapproved_paper_hidden_from_public() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let paper = svc.submit("alice", draft(), "a.pdf", b"a").await.unwrap();

        // Public callers get NotFound, not Forbidden
        let err = svc.get(&paper.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::PaperNotFound { .. }));

        // Admin callers see it
        let found = svc.get(&paper.id, true).await.unwrap();
        assert_eq!(found.id, paper.id);
    }

    #[tokio::test]
    async fn test_set_status_is_total_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let paper = svc.submit("alice", draft(), "a.pdf", b"a").await.unwrap();

        // Permissive by design: rejected may go back to pending, approved
        // may be rejected outright.
        let p = svc
            .set_status(&paper.id, PaperStatus::Rejected, "admin@civica.org")
            .await
            .unwrap();
        assert_eq!(p.status, PaperStatus::Rejected);

        let p = svc
            .set_status(&paper.id, PaperStatus::Pending, "admin@civica.org")
            .await
            .unwrap();
        assert_eq!(p.status, PaperStatus::Pending);

        let p = svc
            .set_status(&paper.id, PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap();
        assert_eq!(p.status, PaperStatus::Approved);

        assert_eq!(p.status_log.len(), 3);
        assert_eq!(p.status_log[0].from, PaperStatus::Pending);
        assert_eq!(p.status_log[2].to, PaperStatus::Approved);
        assert!(p.status_log.iter().all(|c| c.actor == "admin@civica.org"));
    }

    #[tokio::test]
    async fn test_set_status_idempotent_on_target() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let paper = svc.submit("alice", draft(), "a.pdf", b"a").await.unwrap();

        let first = svc
            .set_status(&paper.id, PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap();
        let second = svc
            .set_status(&paper.id, PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.id, second.id);
        assert_eq!(first.title, second.title);
        assert_eq!(first.file_name, second.file_name);
    }

    #[tokio::test]
    async fn test_set_status_missing_paper() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let err = svc
            .set_status("nope", PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaperNotFound { .. }));
    }

    #[tokio::test]
    async fn test_truncate_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        svc.submit("alice", draft(), "a.pdf", b"a").await.unwrap();

        assert!(svc.truncate(false).await.is_err());
        assert_eq!(svc.list_for_admin().await.unwrap().len(), 1);

        let removed = svc.truncate(true).await.unwrap();
        assert_eq!(removed, 1);
        assert!(svc.list_for_admin().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approval_scenario_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let paper = svc
            .submit("alice", draft(), "test-paper.pdf", b"pdf")
            .await
            .unwrap();

        let admin_view = svc.list_for_admin().await.unwrap();
        assert_eq!(admin_view[0].status, PaperStatus::Pending);
        assert!(svc.list_public().await.unwrap().is_empty());

        svc.set_status(&paper.id, PaperStatus::Approved, "admin@civica.org")
            .await
            .unwrap();

        let public = svc.list_public().await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].title, "Test Paper");
        assert_eq!(public[0].category, "Economic Policy");
        assert!(svc.uploads.resolve(&public[0].file_name).await.is_ok());
    }
}
