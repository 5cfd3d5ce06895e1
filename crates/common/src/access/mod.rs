//! Access-request service
//!
//! Owns the `accessRequests` collection and the staff profiles keyed by
//! email. Approval mints a fresh 6-digit PIN, persists the record, then
//! dispatches the PIN mail fire-and-forget: a provider failure is logged
//! and never rolls back the stored approval.

use crate::auth::BootstrapCredentials;
use crate::errors::{AppError, Result};
use crate::mail::Mailer;
use crate::metrics;
use crate::models::{AccessRequest, Profile, RequestStatus};
use crate::store::FlatFileStore;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Service over access requests and profiles
#[derive(Clone)]
pub struct AccessService {
    store: Arc<FlatFileStore>,
    mailer: Arc<Mailer>,
    bootstrap: BootstrapCredentials,
}

impl AccessService {
    pub fn new(
        store: Arc<FlatFileStore>,
        mailer: Arc<Mailer>,
        bootstrap: BootstrapCredentials,
    ) -> Self {
        Self {
            store,
            mailer,
            bootstrap,
        }
    }

    /// File a new access request. Duplicate pending requests from the same
    /// email are allowed to coexist; deduplication is an open product
    /// question and is not silently applied here.
    pub async fn request(
        &self,
        name: &str,
        email: &str,
        department: &str,
        reason: &str,
    ) -> Result<AccessRequest> {
        require_field("name", name)?;
        require_field("email", email)?;
        require_field("reason", reason)?;
        if !email.contains('@') {
            return Err(AppError::InvalidFormat {
                message: format!("not an email address: {email}"),
            });
        }

        let request = AccessRequest {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            department: department.trim().to_string(),
            reason: reason.trim().to_string(),
            status: RequestStatus::Pending,
            pin: None,
            approved_at: None,
        };

        let stored = request.clone();
        self.store
            .mutate(move |doc| {
                doc.access_requests.push(stored);
                Ok(())
            })
            .await?;

        metrics::record_access_request();
        info!(request_id = %request.id, email = %request.email, "Access requested");
        Ok(request)
    }

    /// All access requests; the gateway gates this on the admin scope.
    pub async fn list_for_admin(&self) -> Result<Vec<AccessRequest>> {
        self.store.read(|doc| doc.access_requests.clone()).await
    }

    /// Approve a request: mint a fresh PIN, persist, then dispatch the
    /// mail. Re-approving an already approved request mints a new PIN.
    pub async fn approve(&self, id: &str) -> Result<AccessRequest> {
        let target = id.to_string();
        let pin = generate_pin();
        let minted = pin.clone();

        let approved = self
            .store
            .mutate(move |doc| {
                let request = doc
                    .access_requests
                    .iter_mut()
                    .find(|r| r.id == target)
                    .ok_or(AppError::RequestNotFound { id: target.clone() })?;

                request.status = RequestStatus::Approved;
                request.pin = Some(minted);
                request.approved_at = Some(Utc::now());
                Ok(request.clone())
            })
            .await?;

        metrics::record_access_approval();
        info!(request_id = %approved.id, email = %approved.email, "Access request approved");

        // Persisted above; the mail is best-effort from here on.
        let mailer = self.mailer.clone();
        let email = approved.email.clone();
        tokio::spawn(async move {
            match mailer.send_pin(&email, &pin).await {
                Ok(()) => metrics::record_mail_dispatch(true),
                Err(e) => {
                    metrics::record_mail_dispatch(false);
                    error!(email = %email, error = %e, "PIN mail dispatch failed");
                }
            }
        });

        Ok(approved)
    }

    /// Verify a PIN against approved requests. The bootstrap master PIN is
    /// checked first and never enters the normal PIN space.
    pub async fn verify_pin(&self, pin: &str) -> Result<String> {
        if self.bootstrap.master_pin_matches(pin) {
            warn!("PIN verified via bootstrap master PIN");
            metrics::record_pin_login(true);
            return Ok(crate::auth::BOOTSTRAP_IDENTITY.to_string());
        }

        let wanted = pin.to_string();
        let matched = self
            .store
            .read(move |doc| {
                doc.access_requests
                    .iter()
                    .find(|r| {
                        r.status == RequestStatus::Approved && r.pin.as_deref() == Some(&wanted)
                    })
                    .map(|r| r.email.clone())
            })
            .await?;

        match matched {
            Some(email) => {
                metrics::record_pin_login(true);
                info!(email = %email, "PIN verified");
                Ok(email)
            }
            None => {
                metrics::record_pin_login(false);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// Fetch a profile by email
    pub async fn get_profile(&self, email: &str) -> Result<Profile> {
        let wanted = email.to_string();
        self.store
            .read(move |doc| doc.profiles.get(&wanted).cloned())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "profile".into(),
                id: email.to_string(),
            })
    }

    /// Create or replace a profile
    pub async fn update_profile(&self, email: &str, profile: Profile) -> Result<Profile> {
        let key = email.to_string();
        let stored = profile.clone();
        self.store
            .mutate(move |doc| {
                doc.profiles.insert(key, stored);
                Ok(())
            })
            .await?;

        info!(email = %email, "Profile updated");
        Ok(profile)
    }
}

/// Uniform random 6-digit PIN
fn generate_pin() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
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
    use crate::config::{BootstrapConfig, MailConfig};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> AccessService {
        service_with_bootstrap(dir, BootstrapConfig::default())
    }

    fn service_with_bootstrap(dir: &TempDir, bootstrap: BootstrapConfig) -> AccessService {
        let store = Arc::new(FlatFileStore::new(dir.path().join("portal.json")));
        let mailer = Arc::new(Mailer::from_config(&MailConfig {
            endpoint: None,
            api_key: None,
            from: "portal@civica.org".into(),
            timeout_secs: 15,
        }));
        AccessService::new(store, mailer, BootstrapCredentials::new(bootstrap))
    }

    async fn file_request(svc: &AccessService) -> AccessRequest {
        svc.request("Ana", "a@b.com", "Research", "portal access")
            .await
            .unwrap()
    }

    #[test]
    fn test_generated_pins_are_six_digits() {
        for _ in 0..100 {
            let pin = generate_pin();
            assert_eq!(pin.len(), crate::PIN_LENGTH);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
            let value: u32 = pin.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[tokio::test]
    async fn test_request_starts_pending_without_pin() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let request = file_request(&svc).await;
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.pin.is_none());
        assert!(request.approved_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_pending_requests_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        file_request(&svc).await;
        file_request(&svc).await;

        let all = svc.list_for_admin().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.email == "a@b.com"));
    }

    #[tokio::test]
    async fn test_request_rejects_bad_email() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let err = svc
            .request("Ana", "not-an-email", "Research", "why")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }

    #[tokio::test]
    async fn test_approve_mints_pin_and_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let request = file_request(&svc).await;

        let approved = svc.approve(&request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert!(approved.approved_at.is_some());

        let pin = approved.pin.clone().unwrap();
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));

        let email = svc.verify_pin(&pin).await.unwrap();
        assert_eq!(email, "a@b.com");
    }

    #[tokio::test]
    async fn test_approval_persists_even_without_mail_provider() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let request = file_request(&svc).await;

        svc.approve(&request.id).await.unwrap();

        // The approval is durable regardless of mail dispatch outcome
        let all = svc.list_for_admin().await.unwrap();
        assert_eq!(all[0].status, RequestStatus::Approved);
        assert!(all[0].pin.is_some());
    }

    #[tokio::test]
    async fn test_approve_missing_request() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let err = svc.approve("nope").await.unwrap_err();
        assert!(matches!(err, AppError::RequestNotFound { .. }));
    }

    #[tokio::test]
    async fn test_verify_rejects_unapproved_or_unknown_pin() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        file_request(&svc).await;

        // No request has been approved, so no PIN can verify
        let err = svc.verify_pin("123456").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_master_pin_only_when_bootstrap_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service_with_bootstrap(
            &dir,
            BootstrapConfig {
                enabled: true,
                bearer_token: None,
                master_pin: Some("424242".into()),
                admin_password: None,
            },
        );

        let identity = svc.verify_pin("424242").await.unwrap();
        assert_eq!(identity, crate::auth::BOOTSTRAP_IDENTITY);

        let dir2 = tempfile::tempdir().unwrap();
        let disabled = service(&dir2);
        assert!(disabled.verify_pin("424242").await.is_err());
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let mut profile = Profile::default();
        profile.name = Some("Ana".into());
        profile.expertise = vec!["fiscal policy".into()];

        svc.update_profile("a@b.com", profile.clone()).await.unwrap();
        let loaded = svc.get_profile("a@b.com").await.unwrap();
        assert_eq!(loaded, profile);

        let err = svc.get_profile("missing@b.com").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
