// Page-supplied behavior invoked by the poll loop and the submission client.

use anyhow::Result;
use serde_json::Value;

use crate::submit::{SubmitFailure, SubmitReply};

/// Callbacks a page provides; every hook defaults to doing nothing
pub trait PageHooks: Send + Sync {
    /// Runs once per page load, before the first poll
    fn page_setup(&self) {}

    /// Render the `data` section of a polled payload
    ///
    /// `previous` is the data section of the prior baseline, if any. An error
    /// is shown as a notice and makes the loop retry at the short interval.
    fn populate(&self, _data: &Value, _previous: Option<&Value>) -> Result<()> {
        Ok(())
    }

    fn successful_create(&self, _reply: &SubmitReply) {}

    fn successful_delete(&self, _reply: &SubmitReply) {}

    fn simple_submit_success(&self, _reply: &SubmitReply) {}

    fn simple_submit_error(&self, _failure: &SubmitFailure) {}
}
