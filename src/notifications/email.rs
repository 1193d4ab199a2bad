// ABOUTME: Outbound email client speaking the Resend HTTP API shape
// ABOUTME: Unconfigured or failed sends degrade to logged outcomes, never errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

//! Email dispatch for the password-reset flow.
//!
//! The client posts `{from, to, subject, html}` to `{api_base_url}/emails`
//! with a bearer key. Delivery is best-effort by contract: a missing key or
//! from-address skips the send with a warning, an API or network failure is
//! logged and swallowed. Callers branch on [`EmailDispatch`] only for audit
//! purposes, never to fail a request.

use crate::config::environment::EmailConfig;
use serde::Serialize;
use tracing::{debug, warn};

/// Subject line for password-reset emails
const RESET_SUBJECT: &str = "Reset your epicflare password";

/// Outcome of a dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailDispatch {
    /// Accepted by the delivery API
    Sent,
    /// Not attempted because delivery is unconfigured
    Skipped,
    /// Attempted and rejected or unreachable; details are in the log
    Failed,
}

/// Request body in the Resend API shape
#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// HTTP client for the email delivery API
pub struct EmailClient {
    http: reqwest::Client,
    api_base_url: String,
    api_key: Option<String>,
    from_address: Option<String>,
}

impl EmailClient {
    /// Build a client from the email configuration
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            from_address: config
                .from_address
                .as_deref()
                .map(str::trim)
                .filter(|from| !from.is_empty())
                .map(ToOwned::to_owned),
        }
    }

    /// Send one HTML email
    ///
    /// Recipient addresses are never logged raw; only the subject and the
    /// API status reach the log stream.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> EmailDispatch {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!(subject, "email skipped: RESEND_API_KEY is not configured");
            return EmailDispatch::Skipped;
        };
        let Some(from) = self.from_address.as_deref() else {
            warn!(subject, "email skipped: RESEND_FROM_EMAIL is not configured");
            return EmailDispatch::Skipped;
        };

        let payload = EmailPayload {
            from,
            to,
            subject,
            html,
        };

        let response = match self
            .http
            .post(format!("{}/emails", self.api_base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, subject, "email dispatch failed");
                return EmailDispatch::Failed;
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(subject, "email dispatched");
            return EmailDispatch::Sent;
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, subject, "email API returned an error");
        EmailDispatch::Failed
    }

    /// Send the password-reset email carrying a reset URL
    pub async fn send_password_reset(&self, to: &str, reset_url: &str) -> EmailDispatch {
        self.send(to, RESET_SUBJECT, &reset_email_html(reset_url))
            .await
    }
}

/// Reset email body; the URL is hex-token query material, safe to embed
fn reset_email_html(reset_url: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Password reset</title>
  </head>
  <body>
    <p>We received a request to reset your epicflare password.</p>
    <p><a href="{reset_url}">Reset your password</a></p>
    <p>If you did not request a reset, you can safely ignore this email.</p>
  </body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::environment::EmailConfig;

    fn config(api_key: Option<&str>, from: Option<&str>) -> EmailConfig {
        EmailConfig {
            api_key: api_key.map(ToOwned::to_owned),
            api_base_url: "https://api.resend.example".into(),
            from_address: from.map(ToOwned::to_owned),
        }
    }

    #[tokio::test]
    async fn test_send_skips_without_api_key() {
        let client = EmailClient::new(&config(None, Some("auth@epicflare.example")));
        let outcome = client.send("a@b.com", "subject", "<p>hi</p>").await;
        assert_eq!(outcome, EmailDispatch::Skipped);
    }

    #[tokio::test]
    async fn test_send_skips_without_from_address() {
        let client = EmailClient::new(&config(Some("re_key"), None));
        assert_eq!(
            client.send("a@b.com", "subject", "<p>hi</p>").await,
            EmailDispatch::Skipped
        );

        // Whitespace-only from address counts as unconfigured
        let client = EmailClient::new(&config(Some("re_key"), Some("   ")));
        assert_eq!(
            client.send("a@b.com", "subject", "<p>hi</p>").await,
            EmailDispatch::Skipped
        );
    }

    #[test]
    fn test_payload_serializes_resend_shape() {
        let payload = EmailPayload {
            from: "auth@epicflare.example",
            to: "a@b.com",
            subject: "Reset your epicflare password",
            html: "<p>hi</p>",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["from"], "auth@epicflare.example");
        assert_eq!(json["to"], "a@b.com");
        assert_eq!(json["subject"], "Reset your epicflare password");
        assert_eq!(json["html"], "<p>hi</p>");
    }

    #[test]
    fn test_reset_email_embeds_url() {
        let html = reset_email_html("http://localhost:8080/reset-password?token=abc123");
        assert!(html.contains(r#"href="http://localhost:8080/reset-password?token=abc123""#));
        assert!(html.contains("safely ignore"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut config = config(Some("re_key"), Some("auth@epicflare.example"));
        config.api_base_url = "https://api.resend.example/".into();
        let client = EmailClient::new(&config);
        assert_eq!(client.api_base_url, "https://api.resend.example");
    }
}
