// Recording doubles shared by unit tests.

use anyhow::Result;
use serde_json::Value;
use std::sync::Mutex;

use crate::hooks::PageHooks;
use crate::notice::Surface;
use crate::submit::{SubmitFailure, SubmitReply};

#[derive(Default)]
pub struct RecordingSurface {
    notices: Mutex<Vec<String>>,
    notice_hides: Mutex<usize>,
    flashes: Mutex<Vec<String>>,
    flash_hides: Mutex<usize>,
}

impl RecordingSurface {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn last_notice(&self) -> Option<String> {
        self.notices.lock().unwrap().last().cloned()
    }

    pub fn notice_hides(&self) -> usize {
        *self.notice_hides.lock().unwrap()
    }

    pub fn flashes(&self) -> Vec<String> {
        self.flashes.lock().unwrap().clone()
    }

    pub fn flash_hides(&self) -> usize {
        *self.flash_hides.lock().unwrap()
    }
}

impl Surface for RecordingSurface {
    fn show_notice(&self, text: &str) {
        self.notices.lock().unwrap().push(text.to_string());
    }

    fn hide_notice(&self) {
        *self.notice_hides.lock().unwrap() += 1;
    }

    fn show_flash(&self, text: &str) {
        self.flashes.lock().unwrap().push(text.to_string());
    }

    fn hide_flash(&self) {
        *self.flash_hides.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    pub populated: Mutex<Vec<(Value, Option<Value>)>>,
    pub fail_populate: Mutex<bool>,
    pub setups: Mutex<usize>,
    pub created: Mutex<Vec<SubmitReply>>,
    pub deleted: Mutex<Vec<SubmitReply>>,
    pub simple_successes: Mutex<Vec<SubmitReply>>,
    pub simple_errors: Mutex<Vec<SubmitFailure>>,
}

impl RecordingHooks {
    pub fn populate_count(&self) -> usize {
        self.populated.lock().unwrap().len()
    }

    pub fn rendered(&self) -> Vec<Value> {
        self.populated
            .lock()
            .unwrap()
            .iter()
            .map(|(data, _)| data.clone())
            .collect()
    }
}

impl PageHooks for RecordingHooks {
    fn page_setup(&self) {
        *self.setups.lock().unwrap() += 1;
    }

    fn populate(&self, data: &Value, previous: Option<&Value>) -> Result<()> {
        if *self.fail_populate.lock().unwrap() {
            anyhow::bail!("renderer failed");
        }
        self.populated
            .lock()
            .unwrap()
            .push((data.clone(), previous.cloned()));
        Ok(())
    }

    fn successful_create(&self, reply: &SubmitReply) {
        self.created.lock().unwrap().push(reply.clone());
    }

    fn successful_delete(&self, reply: &SubmitReply) {
        self.deleted.lock().unwrap().push(reply.clone());
    }

    fn simple_submit_success(&self, reply: &SubmitReply) {
        self.simple_successes.lock().unwrap().push(reply.clone());
    }

    fn simple_submit_error(&self, failure: &SubmitFailure) {
        self.simple_errors.lock().unwrap().push(failure.clone());
    }
}
