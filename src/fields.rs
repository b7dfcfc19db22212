// Field values: what an edited input submits, and how polled values are shown.

use anyhow::{Context, Result};
use serde_json::Value;

/// Value entered into an editable field, by field type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    /// Duration split across hours/minutes/seconds inputs
    Time { hours: u64, minutes: u64, seconds: u64 },
    Checkbox(bool),
    Select(String),
    Text(String),
}

impl FieldInput {
    /// The `new_value` sent to the server for this input
    pub fn form_value(&self) -> String {
        match self {
            FieldInput::Time { hours, minutes, seconds } => {
                // parse_time rejects overflowing inputs; saturate for hand-built ones
                total_seconds(*hours, *minutes, *seconds)
                    .unwrap_or(u64::MAX)
                    .to_string()
            }
            FieldInput::Checkbox(checked) => checked.to_string(),
            FieldInput::Select(value) | FieldInput::Text(value) => value.clone(),
        }
    }

    /// Parse `H:M:S`, `M:S` or plain seconds into a time input
    pub fn parse_time(text: &str) -> Result<Self> {
        let parts = text
            .trim()
            .split(':')
            .map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    Ok(0)
                } else {
                    part.parse::<u64>()
                        .with_context(|| format!("Invalid time component '{}'", part))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let (hours, minutes, seconds) = match parts.as_slice() {
            [s] => (0, 0, *s),
            [m, s] => (0, *m, *s),
            [h, m, s] => (*h, *m, *s),
            _ => anyhow::bail!("Expected H:M:S, got '{}'", text),
        };

        if total_seconds(hours, minutes, seconds).is_none() {
            anyhow::bail!("Time out of range: '{}'", text);
        }

        Ok(FieldInput::Time { hours, minutes, seconds })
    }

    /// Parse a checkbox value (true/false, on/off, 1/0)
    pub fn parse_checkbox(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(FieldInput::Checkbox(true)),
            "false" | "off" | "no" | "0" => Ok(FieldInput::Checkbox(false)),
            other => anyhow::bail!("Expected a boolean, got '{}'", other),
        }
    }
}

/// `h*3600 + m*60 + s`, or `None` on overflow
fn total_seconds(hours: u64, minutes: u64, seconds: u64) -> Option<u64> {
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Split seconds into zero-padded hours, minutes and seconds
pub fn to_hh_mm_ss(total_seconds: u64) -> [String; 3] {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    [
        format!("{:02}", hours),
        format!("{:02}", minutes),
        format!("{:02}", seconds),
    ]
}

/// Format seconds as HH:MM:SS
pub fn time_text(total_seconds: u64) -> String {
    to_hh_mm_ss(total_seconds).join(":")
}

/// Rendered state of an on/off field
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleState {
    pub label: String,
    pub on: bool,
    /// Value a click on the toggle would submit
    pub ready_value: u8,
}

/// Work out how a toggle field should display
///
/// Booleans count as 0/1. A value outside `labels` displays as its raw text.
pub fn toggle_state(value: &Value, labels: &[String], true_values: &[i64]) -> ToggleState {
    let index = match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };

    let on = index.is_some_and(|i| true_values.contains(&i));
    let index = index.unwrap_or(0);

    let label = usize::try_from(index)
        .ok()
        .and_then(|i| labels.get(i))
        .cloned()
        .unwrap_or_else(|| display_value(value));

    ToggleState {
        label,
        on,
        ready_value: if on { 0 } else { 1 },
    }
}

/// Plain-text rendering of a JSON value
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Keys of `current` whose values differ from `previous`
///
/// Nothing is reported when there is no previous data, so the first render
/// doesn't highlight every field.
pub fn changed_fields(previous: Option<&Value>, current: &Value) -> Vec<String> {
    let (Some(Value::Object(previous)), Value::Object(current)) = (previous, current) else {
        return Vec::new();
    };

    current
        .iter()
        .filter(|(key, value)| previous.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn time_input_submits_total_seconds() {
        let input = FieldInput::Time { hours: 1, minutes: 30, seconds: 0 };
        assert_eq!(input.form_value(), "5400");
    }

    #[test]
    fn checkbox_and_text_inputs_submit_raw_values() {
        assert_eq!(FieldInput::Checkbox(true).form_value(), "true");
        assert_eq!(FieldInput::Checkbox(false).form_value(), "false");
        assert_eq!(FieldInput::Select("gallons".into()).form_value(), "gallons");
        assert_eq!(FieldInput::Text("Tank 3".into()).form_value(), "Tank 3");
    }

    #[test]
    fn parse_time_accepts_partial_forms() {
        assert_eq!(
            FieldInput::parse_time("1:30:00").unwrap(),
            FieldInput::Time { hours: 1, minutes: 30, seconds: 0 }
        );
        assert_eq!(
            FieldInput::parse_time("2:05").unwrap(),
            FieldInput::Time { hours: 0, minutes: 2, seconds: 5 }
        );
        assert_eq!(FieldInput::parse_time("90").unwrap().form_value(), "90");
        assert!(FieldInput::parse_time("1:2:3:4").is_err());
        assert!(FieldInput::parse_time("a:b").is_err());
    }

    #[test]
    fn parse_time_rejects_overflowing_values() {
        let err = FieldInput::parse_time("5124095576030432:0:0").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(FieldInput::parse_time("0:307445734561825861:0").is_err());
        assert!(FieldInput::parse_time("1:0:18446744073709551615").is_err());

        // Largest value that still fits
        let max = FieldInput::parse_time("0:0:18446744073709551615").unwrap();
        assert_eq!(max.form_value(), u64::MAX.to_string());
    }

    #[test]
    fn hand_built_oversized_time_does_not_panic() {
        let input = FieldInput::Time { hours: u64::MAX, minutes: 0, seconds: 0 };
        assert_eq!(input.form_value(), u64::MAX.to_string());
    }

    #[test]
    fn parse_checkbox_understands_common_spellings() {
        assert_eq!(FieldInput::parse_checkbox("on").unwrap(), FieldInput::Checkbox(true));
        assert_eq!(FieldInput::parse_checkbox("0").unwrap(), FieldInput::Checkbox(false));
        assert!(FieldInput::parse_checkbox("maybe").is_err());
    }

    #[test]
    fn time_text_pads_components() {
        assert_eq!(time_text(0), "00:00:00");
        assert_eq!(time_text(5400), "01:30:00");
        assert_eq!(time_text(3661), "01:01:01");
        assert_eq!(time_text(360_000), "100:00:00");
    }

    #[test]
    fn toggle_state_for_true_value() {
        let labels = vec!["Stopped".to_string(), "Running".to_string()];
        let state = toggle_state(&json!(1), &labels, &[1]);
        assert_eq!(state.label, "Running");
        assert!(state.on);
        assert_eq!(state.ready_value, 0);
    }

    #[test]
    fn toggle_state_treats_booleans_as_indexes() {
        let labels = vec!["Off".to_string(), "On".to_string()];
        let state = toggle_state(&json!(false), &labels, &[1]);
        assert_eq!(state.label, "Off");
        assert!(!state.on);
        assert_eq!(state.ready_value, 1);
    }

    #[test]
    fn toggle_state_with_custom_true_values() {
        let labels = vec!["Idle".to_string(), "Alarm".to_string(), "Running".to_string()];
        let state = toggle_state(&json!(2), &labels, &[2]);
        assert_eq!(state.label, "Running");
        assert!(state.on);

        let state = toggle_state(&json!(1), &labels, &[2]);
        assert_eq!(state.label, "Alarm");
        assert!(!state.on);
    }

    #[test]
    fn changed_fields_reports_only_differences() {
        let previous = json!({"pressure": 10, "runtime": 60, "name": "A"});
        let current = json!({"pressure": 12, "runtime": 60, "name": "A", "alarm": true});

        let mut changed = changed_fields(Some(&previous), &current);
        changed.sort();
        assert_eq!(changed, vec!["alarm".to_string(), "pressure".to_string()]);
    }

    #[test]
    fn changed_fields_is_empty_on_first_render() {
        assert!(changed_fields(None, &json!({"pressure": 10})).is_empty());
    }
}
