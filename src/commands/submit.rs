use anyhow::Result;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::fields::FieldInput;
use crate::notice::Notifier;
use crate::submit::{SubmitOutcome, Submitter};
use crate::terminal::{TerminalPage, TerminalSurface};

use super::utils::parse_assignment;

fn submitter(config: &ClientConfig) -> Result<Submitter> {
    let notifier = Arc::new(Notifier::new(
        Arc::new(TerminalSurface),
        config.notice.hide_after(),
    ));
    let page = Arc::new(TerminalPage::new(config.fields.clone()));

    Submitter::new(&config.server, config.polling.timeout(), notifier, page)
}

fn finish(outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Accepted(reply) => {
            if reply.waiting_for_pump() {
                println!("Waiting for the pump to confirm. Run 'webpilot watch' to follow.");
            }
            Ok(())
        }
        SubmitOutcome::Rejected(failure) => Err(failure.into()),
        SubmitOutcome::Skipped => Ok(()),
    }
}

/// Change one attribute
pub fn set(
    config: &ClientConfig,
    attr: &str,
    input: &FieldInput,
    old_password: Option<&str>,
    url: Option<&str>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        submitter(config)?
            .submit_change(attr, input, old_password, url)
            .await
    })?;

    finish(outcome)
}

/// Create an object from `name=value` pairs
pub fn create(config: &ClientConfig, assignments: &[String], url: Option<&str>) -> Result<()> {
    let fields = assignments
        .iter()
        .map(|a| parse_assignment(a).map(|(name, value)| (name, FieldInput::Text(value))))
        .collect::<Result<Vec<_>>>()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        submitter(config)?.submit_create(&fields, &[], url).await
    })?;

    finish(outcome)
}

/// Delete the page's object
pub fn delete(config: &ClientConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async { submitter(config)?.submit_delete().await })?;

    finish(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::{SubmitFailure, SubmitReply};

    #[test]
    fn rejected_submission_is_an_error() {
        let failure = SubmitFailure {
            status: Some(400),
            message: Some("Value out of range".to_string()),
            detail: "400 Bad Request".to_string(),
        };
        let err = finish(SubmitOutcome::Rejected(failure)).unwrap_err();
        assert_eq!(err.to_string(), "Value out of range (400)");

        assert!(finish(SubmitOutcome::Accepted(SubmitReply::default())).is_ok());
        assert!(finish(SubmitOutcome::Skipped).is_ok());
    }
}
