// Terminal rendering of notices and polled state for the CLI.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::config::FieldsConfig;
use crate::fields::{changed_fields, display_value, time_text, toggle_state};
use crate::hooks::PageHooks;
use crate::notice::Surface;
use crate::submit::{SubmitFailure, SubmitReply};

/// Prints notices and flash messages to stderr
pub struct TerminalSurface;

impl Surface for TerminalSurface {
    fn show_notice(&self, text: &str) {
        eprintln!("» {}", text);
    }

    fn hide_notice(&self) {
        tracing::trace!("Notice hidden");
    }

    fn show_flash(&self, text: &str) {
        eprintln!("[!] {}", text);
    }

    fn hide_flash(&self) {
        tracing::debug!("Flash cleared");
    }
}

/// Renders the `data` section as one `name: value` line per field
pub struct TerminalPage {
    fields: FieldsConfig,
    last_data: Mutex<Option<Value>>,
}

impl TerminalPage {
    pub fn new(fields: FieldsConfig) -> Self {
        Self {
            fields,
            last_data: Mutex::new(None),
        }
    }

    /// What clicking toggle field `name` would submit, based on the last render
    pub fn toggle_click_value(&self, name: &str) -> Result<String> {
        let toggle = self
            .fields
            .toggles
            .get(name)
            .with_context(|| format!("'{}' is not a toggle field", name))?;

        let data = self.last_data.lock().unwrap_or_else(PoisonError::into_inner);
        let value = data
            .as_ref()
            .and_then(|d| d.get(name))
            .with_context(|| format!("No value for '{}' received yet", name))?;

        let state = toggle_state(value, &toggle.labels, &toggle.true_values);
        Ok(state.ready_value.to_string())
    }

    /// Lines for a data section; fields changed since `previous` are starred
    pub fn render_lines(&self, data: &Value, previous: Option<&Value>) -> Vec<String> {
        let Value::Object(map) = data else {
            return vec![display_value(data)];
        };

        let changed = changed_fields(previous, data);
        let width = map.keys().map(String::len).max().unwrap_or(0);

        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let marker = if changed.contains(key) { '*' } else { ' ' };
                format!(
                    "{} {:<width$}  {}",
                    marker,
                    key,
                    self.format_field(key, &map[key]),
                    width = width
                )
            })
            .collect()
    }

    fn format_field(&self, name: &str, value: &Value) -> String {
        if self.fields.time.iter().any(|t| t == name) {
            if let Some(seconds) = value.as_u64() {
                return time_text(seconds);
            }
        }

        if let Some(toggle) = self.fields.toggles.get(name) {
            let state = toggle_state(value, &toggle.labels, &toggle.true_values);
            let icon = if state.on { "[on] " } else { "[off]" };
            return format!("{} {}", icon, state.label);
        }

        display_value(value)
    }
}

impl PageHooks for TerminalPage {
    fn page_setup(&self) {
        println!("Loading data...");
    }

    fn populate(&self, data: &Value, previous: Option<&Value>) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "--- {} ---", chrono::Local::now().format("%H:%M:%S"))?;
        for line in self.render_lines(data, previous) {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;

        *self.last_data.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.clone());
        Ok(())
    }

    fn successful_create(&self, reply: &SubmitReply) {
        println!("✓ Created: {}", reply.message);
    }

    fn successful_delete(&self, reply: &SubmitReply) {
        println!("✓ Deleted: {}", reply.message);
    }

    fn simple_submit_success(&self, reply: &SubmitReply) {
        println!("✓ {}", reply.message);
    }

    fn simple_submit_error(&self, failure: &SubmitFailure) {
        eprintln!("✗ {}", failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToggleConfig;
    use serde_json::json;

    fn page() -> TerminalPage {
        let mut fields = FieldsConfig::default();
        fields.time.push("runtime".to_string());
        fields.toggles.insert(
            "pump_on".to_string(),
            ToggleConfig {
                labels: vec!["Stopped".to_string(), "Running".to_string()],
                true_values: vec![1],
            },
        );
        TerminalPage::new(fields)
    }

    #[test]
    fn render_formats_time_and_toggle_fields() {
        let lines = page().render_lines(
            &json!({"runtime": 5400, "pump_on": 1, "name": "Tank 3"}),
            None,
        );

        assert_eq!(
            lines,
            vec![
                "  name     Tank 3".to_string(),
                "  pump_on  [on]  Running".to_string(),
                "  runtime  01:30:00".to_string(),
            ]
        );
    }

    #[test]
    fn render_marks_changed_fields() {
        let lines = page().render_lines(
            &json!({"pressure": 12, "name": "Tank 3"}),
            Some(&json!({"pressure": 10, "name": "Tank 3"})),
        );

        assert_eq!(lines[0], "  name      Tank 3");
        assert_eq!(lines[1], "* pressure  12");
    }

    #[test]
    fn toggle_click_flips_the_rendered_value() {
        let page = page();
        assert!(page.toggle_click_value("pump_on").is_err());

        page.populate(&json!({"pump_on": 1, "name": "Tank 3"}), None).unwrap();
        assert_eq!(page.toggle_click_value("pump_on").unwrap(), "0");

        page.populate(&json!({"pump_on": 0, "name": "Tank 3"}), None).unwrap();
        assert_eq!(page.toggle_click_value("pump_on").unwrap(), "1");

        assert!(page.toggle_click_value("name").is_err());
    }

    #[test]
    fn render_non_object_data_as_single_line() {
        assert_eq!(page().render_lines(&json!("offline"), None), vec!["offline".to_string()]);
    }
}
