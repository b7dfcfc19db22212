// Submission of user edits: attribute changes, creation and deletion.

use anyhow::Result;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

use crate::config::ServerConfig;
use crate::fields::FieldInput;
use crate::hooks::PageHooks;
use crate::notice::Notifier;
use crate::poll::{PollHandle, build_client, server_message};

/// Header carrying the CSRF token on unsafe requests
const CSRF_HEADER: &str = "X-CSRFToken";

/// Successful reply to a submission
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SubmitReply {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<SubmitReplyData>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SubmitReplyData {
    /// The command has been queued for the device but not yet confirmed
    #[serde(default)]
    pub waiting_for_pump: bool,
}

impl SubmitReply {
    pub fn waiting_for_pump(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.waiting_for_pump)
    }
}

/// Failed submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitFailure {
    /// HTTP status, or `None` when no response arrived
    pub status: Option<u16>,
    /// The server's `message`, if any
    pub message: Option<String>,
    pub detail: String,
}

impl fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.message) {
            (Some(status), Some(message)) => write!(f, "{} ({})", message, status),
            (Some(status), None) => write!(f, "HTTP {}: {}", status, self.detail),
            (None, _) => write!(f, "{}", self.detail),
        }
    }
}

impl std::error::Error for SubmitFailure {}

/// Result of one submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted(SubmitReply),
    Rejected(SubmitFailure),
    /// A create or delete was already in flight
    Skipped,
}

/// Which flow a submission belongs to; decides the error wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitKind {
    Change,
    Create,
    Delete,
}

impl SubmitKind {
    fn failure_notice(self, failure: &SubmitFailure) -> String {
        match (self, failure.status) {
            (SubmitKind::Create | SubmitKind::Delete, Some(500)) => "Error: server error".to_string(),
            (SubmitKind::Create, Some(403)) => "Error: CSRF token invalid".to_string(),
            _ => match (&failure.message, self) {
                (Some(message), _) => message.clone(),
                (None, SubmitKind::Change) => "Error sending command.".to_string(),
                (None, SubmitKind::Create) => "Error: creation failed.".to_string(),
                (None, SubmitKind::Delete) => "Error: delete failed.".to_string(),
            },
        }
    }
}

/// Sends user edits to the page's endpoint
pub struct Submitter {
    client: Client,
    server: ServerConfig,
    url: Url,
    notifier: Arc<Notifier>,
    hooks: Arc<dyn PageHooks>,
    poll: Option<PollHandle>,
    create_in_flight: AtomicBool,
    delete_in_flight: AtomicBool,
}

impl Submitter {
    pub fn new(
        server: &ServerConfig,
        timeout: Duration,
        notifier: Arc<Notifier>,
        hooks: Arc<dyn PageHooks>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(server, timeout)?,
            url: server.endpoint_url()?,
            server: server.clone(),
            notifier,
            hooks,
            poll: None,
            create_in_flight: AtomicBool::new(false),
            delete_in_flight: AtomicBool::new(false),
        })
    }

    /// Steer this poll loop after successful submissions
    pub fn with_poll_handle(mut self, handle: PollHandle) -> Self {
        self.poll = Some(handle);
        self
    }

    /// POST a new value for one attribute
    ///
    /// `old_password` is only sent when changing `password`.
    pub async fn submit_change(
        &self,
        attr_name: &str,
        input: &FieldInput,
        old_password: Option<&str>,
        url_override: Option<&str>,
    ) -> Result<SubmitOutcome> {
        self.notifier.show_pending("Sending...");

        let mut form = self.base_form(attr_name, input.form_value());
        if attr_name == "password" {
            if let Some(old) = old_password {
                form.push(("old_password".to_string(), old.to_string()));
            }
        }

        let url = self.target(url_override)?;
        let outcome = self.send(Method::POST, url, Some(&form)).await;

        match &outcome {
            SubmitOutcome::Accepted(reply) => {
                tracing::info!("Changed {}: {}", attr_name, reply.message);
                self.notifier.set_awaiting_device_ack(reply.waiting_for_pump());
                if let Some(poll) = &self.poll {
                    poll.submission_accepted();
                }
                self.notifier.show_notice(&reply.message);
            }
            SubmitOutcome::Rejected(failure) => {
                tracing::warn!("Change of {} rejected: {}", attr_name, failure);
                self.notifier.set_awaiting_device_ack(false);
                self.notifier
                    .show_notice(&SubmitKind::Change.failure_notice(failure));
            }
            SubmitOutcome::Skipped => {}
        }

        Ok(outcome)
    }

    /// POST a raw value, notifying the simple-submit hooks
    ///
    /// Resets the poll interval on success but leaves the schedule alone.
    pub async fn submit_simple(
        &self,
        attr_name: &str,
        new_value: &str,
        url_override: Option<&str>,
    ) -> Result<SubmitOutcome> {
        self.notifier.show_pending("Sending...");

        let form = self.base_form(attr_name, new_value.to_string());
        let url = self.target(url_override)?;
        let outcome = self.send(Method::POST, url, Some(&form)).await;

        match &outcome {
            SubmitOutcome::Accepted(reply) => {
                if reply.data.is_some() {
                    self.notifier.set_awaiting_device_ack(reply.waiting_for_pump());
                }
                if let Some(poll) = &self.poll {
                    poll.reset_interval();
                }
                self.hooks.simple_submit_success(reply);
                self.notifier.show_notice(&reply.message);
            }
            SubmitOutcome::Rejected(failure) => {
                self.notifier.set_awaiting_device_ack(false);
                self.notifier
                    .show_notice(&SubmitKind::Change.failure_notice(failure));
                self.hooks.simple_submit_error(failure);
            }
            SubmitOutcome::Skipped => {}
        }

        Ok(outcome)
    }

    /// PUT a new object built from the given fields
    pub async fn submit_create(
        &self,
        fields: &[(String, FieldInput)],
        supplemental: &[(String, String)],
        url_override: Option<&str>,
    ) -> Result<SubmitOutcome> {
        if self.create_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Create already in progress, ignoring");
            return Ok(SubmitOutcome::Skipped);
        }

        self.notifier.show_pending("Sending...");

        let form: Vec<(String, String)> = fields
            .iter()
            .map(|(name, input)| (name.clone(), input.form_value()))
            .chain(supplemental.iter().cloned())
            .collect();

        let url = match self.target(url_override) {
            Ok(url) => url,
            Err(e) => {
                self.create_in_flight.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let outcome = self.send(Method::PUT, url, Some(&form)).await;

        match &outcome {
            SubmitOutcome::Accepted(reply) => {
                // Stays locked: the page is expected to move on after a create
                self.notifier.show_notice(&reply.message);
                self.hooks.successful_create(reply);
            }
            SubmitOutcome::Rejected(failure) => {
                tracing::warn!("Create rejected: {}", failure);
                self.notifier.set_awaiting_device_ack(false);
                self.notifier
                    .show_notice(&SubmitKind::Create.failure_notice(failure));
                self.create_in_flight.store(false, Ordering::SeqCst);
            }
            SubmitOutcome::Skipped => {}
        }

        Ok(outcome)
    }

    /// DELETE the page's object
    pub async fn submit_delete(&self) -> Result<SubmitOutcome> {
        if self.delete_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Delete already in progress, ignoring");
            return Ok(SubmitOutcome::Skipped);
        }

        self.notifier.show_pending("Deleting...");

        let outcome = self.send(Method::DELETE, self.url.clone(), None).await;

        match &outcome {
            SubmitOutcome::Accepted(reply) => {
                self.notifier.show_notice(&reply.message);
                self.hooks.successful_delete(reply);
            }
            SubmitOutcome::Rejected(failure) => {
                tracing::warn!("Delete rejected: {}", failure);
                self.notifier.set_awaiting_device_ack(false);
                self.notifier
                    .show_notice(&SubmitKind::Delete.failure_notice(failure));
                self.delete_in_flight.store(false, Ordering::SeqCst);
            }
            SubmitOutcome::Skipped => {}
        }

        Ok(outcome)
    }

    fn base_form(&self, attr_name: &str, new_value: String) -> Vec<(String, String)> {
        vec![
            ("attr_name".to_string(), attr_name.to_string()),
            ("new_value".to_string(), new_value),
            ("units".to_string(), self.server.units.to_string()),
        ]
    }

    fn target(&self, url_override: Option<&str>) -> Result<Url> {
        match url_override {
            Some(path) => self.server.resolve(path),
            None => Ok(self.url.clone()),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        form: Option<&[(String, String)]>,
    ) -> SubmitOutcome {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);

        if !is_csrf_safe(&method) {
            if let Some(token) = &self.server.csrf_token {
                request = request.header(CSRF_HEADER, token);
            }
        }

        if let Some(form) = form {
            request = request.form(form);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return SubmitOutcome::Rejected(SubmitFailure {
                    status: None,
                    message: None,
                    detail: e.to_string(),
                });
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return SubmitOutcome::Rejected(SubmitFailure {
                status: Some(status.as_u16()),
                message: server_message(&body),
                detail: status.to_string(),
            });
        }

        if body.trim().is_empty() {
            return SubmitOutcome::Accepted(SubmitReply::default());
        }

        match serde_json::from_str(&body) {
            Ok(reply) => SubmitOutcome::Accepted(reply),
            Err(e) => SubmitOutcome::Rejected(SubmitFailure {
                status: Some(status.as_u16()),
                message: None,
                detail: format!("Invalid reply: {}", e),
            }),
        }
    }
}

/// Methods that don't need CSRF protection
fn is_csrf_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
