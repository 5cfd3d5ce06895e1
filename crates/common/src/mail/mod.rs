//! Mail dispatch collaborator
//!
//! Thin client for a transactional-mail provider reached over HTTP. The
//! portal only sends one kind of message (the access PIN on approval), and
//! dispatch is fire-and-forget: failures are logged by the caller, never
//! rolled back into the approval.
//!
//! When no endpoint is configured the mailer runs disabled and logs the
//! would-be send, so approvals work in development without a provider.

use crate::config::MailConfig;
use crate::errors::{AppError, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Outbound mail client
pub struct Mailer {
    from: String,
    provider: Option<Provider>,
}

struct Provider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Self {
        let provider = config.endpoint.as_ref().map(|endpoint| {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to create HTTP client");

            Provider {
                client,
                endpoint: endpoint.clone(),
                api_key: config.api_key.clone(),
            }
        });

        if provider.is_none() {
            info!("Mail dispatch disabled, no endpoint configured");
        }

        Self {
            from: config.from.clone(),
            provider,
        }
    }

    pub fn enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Send one message through the provider
    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<()> {
        let Some(provider) = &self.provider else {
            debug!(to = %to, subject = %subject, "Mail dispatch skipped (disabled)");
            return Ok(());
        };

        let mut request = provider.client.post(&provider.endpoint).json(&SendRequest {
            from: &self.from,
            to,
            subject,
            text,
        });

        if let Some(ref key) = provider.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: "mail".into(),
                message: format!("status {status}: {body}"),
            });
        }

        debug!(to = %to, subject = %subject, "Mail dispatched");
        Ok(())
    }

    /// Send the access PIN to a newly approved requester
    pub async fn send_pin(&self, to: &str, pin: &str) -> Result<()> {
        let text = format!(
            "Your portal access request has been approved.\n\n\
             Your PIN: {pin}\n\n\
             Use it to sign in on the employee portal."
        );
        self.send(to, "Portal access approved", &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;

    fn disabled_config() -> MailConfig {
        MailConfig {
            endpoint: None,
            api_key: None,
            from: "portal@civica.org".into(),
            timeout_secs: 15,
        }
    }

    #[test]
    fn test_disabled_without_endpoint() {
        let mailer = Mailer::from_config(&disabled_config());
        assert!(!mailer.enabled());
    }

    #[tokio::test]
    async fn test_disabled_send_succeeds() {
        let mailer = Mailer::from_config(&disabled_config());
        assert!(mailer.send_pin("a@b.com", "123456").await.is_ok());
    }
}
