use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::fetcher::{FetchFailure, FetchOutcome};
use super::interval::AdaptiveInterval;
use crate::fields::display_value;
use crate::hooks::PageHooks;
use crate::notice::Notifier;

/// Where the loop sends the user when it gives up on the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Session expired
    Login,
    /// Resource no longer exists
    Home,
}

/// What a poll cycle asks of the loop
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Schedule the next poll
    Continue,
    /// Server version changed: discard all state and load again
    Reload,
    /// Leave the page
    Navigate(Navigation),
}

/// Result of reconciling a fresh payload
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Rendered and stored as the new baseline
    Applied,
    /// Missing `version` or `data`; nothing changed
    Rejected,
    /// Version differs from the stored one; nothing rendered
    VersionChanged { previous: Value, current: Value },
}

/// Poll state for one page load
#[derive(Debug)]
pub struct PollState {
    page_id: Uuid,
    last_payload: Option<Value>,
    last_version: Option<Value>,
    validation_token: Option<String>,
    interval: AdaptiveInterval,
    generation: u64,
    last_checked: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

impl PollState {
    pub fn new(interval: AdaptiveInterval) -> Self {
        Self {
            page_id: Uuid::new_v4(),
            last_payload: None,
            last_version: None,
            validation_token: None,
            interval,
            generation: 0,
            last_checked: None,
            last_updated: None,
        }
    }

    /// Apply the result of a poll request
    pub fn apply_fetch(
        &mut self,
        outcome: FetchOutcome,
        hooks: &dyn PageHooks,
        notifier: &Notifier,
    ) -> CycleOutcome {
        self.last_checked = Some(Utc::now());

        match outcome {
            FetchOutcome::NotModified => {
                self.interval.record_poll();
                CycleOutcome::Continue
            }
            FetchOutcome::Fresh { payload, etag } => {
                let previous_token = std::mem::replace(&mut self.validation_token, etag);

                match self.reconcile(payload, hooks, notifier) {
                    Ok(Reconciled::VersionChanged { previous, current }) => {
                        tracing::info!(
                            "Server version changed from {} to {}; reloading",
                            previous,
                            current
                        );
                        CycleOutcome::Reload
                    }
                    Ok(_) => {
                        self.interval.record_poll();
                        CycleOutcome::Continue
                    }
                    Err(e) => {
                        tracing::error!("Failed to apply polled state: {:#}", e);
                        notifier.show_notice(&format!("Exception: {:#}", e));
                        // Fetch the body again rather than getting a 304 for content never shown
                        self.validation_token = previous_token;
                        self.interval.force_short();
                        CycleOutcome::Continue
                    }
                }
            }
            FetchOutcome::Failed(FetchFailure::Unauthorized) => {
                tracing::warn!("Session expired (401)");
                notifier.show_notice("Please log in again");
                CycleOutcome::Navigate(Navigation::Login)
            }
            FetchOutcome::Failed(FetchFailure::NotFound) => {
                tracing::warn!("Resource not found (404), leaving page");
                CycleOutcome::Navigate(Navigation::Home)
            }
            FetchOutcome::Failed(failure) => {
                tracing::warn!("Poll failed: {}", failure);
                notifier.show_notice(&format!("Error: {}", failure.describe()));
                self.interval.force_long();
                CycleOutcome::Continue
            }
        }
    }

    /// Validate a payload, render it, and store it as the new baseline
    pub fn reconcile(
        &mut self,
        payload: Value,
        hooks: &dyn PageHooks,
        notifier: &Notifier,
    ) -> Result<Reconciled> {
        let Some(fields) = payload.as_object() else {
            notifier.show_notice("No valid data received");
            return Ok(Reconciled::Rejected);
        };

        let (Some(version), Some(data)) = (fields.get("version"), fields.get("data")) else {
            tracing::warn!("Payload is missing version or data");
            notifier.show_notice("No valid data received");
            return Ok(Reconciled::Rejected);
        };

        if let Some(previous) = self.last_version.as_ref().filter(|v| is_set(v)) {
            if previous != version {
                return Ok(Reconciled::VersionChanged {
                    previous: previous.clone(),
                    current: version.clone(),
                });
            }
        }

        // A null flash means none; anything else is shown as text
        match fields.get("flash").filter(|f| !f.is_null()) {
            Some(flash) => {
                notifier.show_flash(&display_value(flash), fields.contains_key("safeFlash"))
            }
            None => notifier.hide_flash(),
        }

        let previous_data = self.last_payload.as_ref().and_then(|p| p.get("data"));
        hooks
            .populate(data, previous_data)
            .context("Page renderer failed")?;

        self.last_version = Some(version.clone());
        self.last_payload = Some(payload);
        self.last_updated = Some(Utc::now());

        Ok(Reconciled::Applied)
    }

    /// Render the stored baseline again without fetching
    pub fn redraw(&self, hooks: &dyn PageHooks) -> Result<bool> {
        let Some(data) = self.last_payload.as_ref().and_then(|p| p.get("data")) else {
            return Ok(false);
        };

        hooks.populate(data, None).context("Page renderer failed")?;
        Ok(true)
    }

    /// A user action went through: poll quickly again
    pub fn note_submission(&mut self) {
        self.interval.reset();
    }

    /// Tag a new request and return its generation
    pub fn begin_request(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Invalidate the request in flight so its result is dropped
    pub fn supersede(&mut self) {
        self.generation += 1;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn interval(&self) -> std::time::Duration {
        self.interval.current()
    }

    pub fn consecutive_polls(&self) -> u32 {
        self.interval.consecutive_polls()
    }

    pub fn validation_token(&self) -> Option<&str> {
        self.validation_token.as_deref()
    }

    pub fn last_version(&self) -> Option<&Value> {
        self.last_version.as_ref()
    }

    pub fn last_payload(&self) -> Option<&Value> {
        self.last_payload.as_ref()
    }

    pub fn page_id(&self) -> Uuid {
        self.page_id
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

/// Versions that are null, false or empty count as "never set"
fn is_set(version: &Value) -> bool {
    match version {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}
