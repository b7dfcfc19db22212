// Transient notices and persistent flash messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Where notices and flash messages are displayed
pub trait Surface: Send + Sync {
    fn show_notice(&self, text: &str);
    fn hide_notice(&self);
    fn show_flash(&self, text: &str);
    fn hide_flash(&self);
}

/// Notice channel shared by the poll loop and the submission client
pub struct Notifier {
    surface: Arc<dyn Surface>,
    hide_after: Duration,
    awaiting_device_ack: AtomicBool,
    hide_task: Mutex<Option<JoinHandle<()>>>,
    current_flash: Mutex<Option<String>>,
}

impl Notifier {
    pub fn new(surface: Arc<dyn Surface>, hide_after: Duration) -> Self {
        Self {
            surface,
            hide_after,
            awaiting_device_ack: AtomicBool::new(false),
            hide_task: Mutex::new(None),
            current_flash: Mutex::new(None),
        }
    }

    /// Show a notice, hiding it again after the configured delay unless a
    /// device acknowledgement is pending
    pub fn show_notice(&self, text: &str) {
        self.cancel_hide();
        tracing::debug!(notice = text, "Showing notice");
        self.surface.show_notice(text);

        if !self.is_awaiting_device_ack() {
            self.schedule_hide();
        }
    }

    /// Show a notice that stays up until the next one replaces it
    pub fn show_pending(&self, text: &str) {
        self.cancel_hide();
        self.surface.show_notice(text);
    }

    pub fn hide_notice(&self) {
        self.cancel_hide();
        self.surface.hide_notice();
    }

    /// Show a flash message, escaping HTML unless the server marked it safe
    pub fn show_flash(&self, message: &str, safe: bool) {
        let text = if safe {
            message.to_string()
        } else {
            escape_html(message)
        };

        let mut current = self.current_flash.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() == Some(text.as_str()) {
            return;
        }

        if current.is_some() {
            self.surface.hide_flash();
        }
        self.surface.show_flash(&text);
        *current = Some(text);
    }

    pub fn hide_flash(&self) {
        let mut current = self.current_flash.lock().unwrap_or_else(PoisonError::into_inner);
        if current.take().is_some() {
            self.surface.hide_flash();
        }
    }

    /// Flash text currently displayed, after escaping
    pub fn current_flash(&self) -> Option<String> {
        self.current_flash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_awaiting_device_ack(&self, waiting: bool) {
        self.awaiting_device_ack.store(waiting, Ordering::SeqCst);
    }

    pub fn is_awaiting_device_ack(&self) -> bool {
        self.awaiting_device_ack.load(Ordering::SeqCst)
    }

    fn cancel_hide(&self) {
        let mut task = self.hide_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.abort();
        }
    }

    fn schedule_hide(&self) {
        // Outside a runtime (one-shot commands, unit tests) the notice just stays
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let surface = Arc::clone(&self.surface);
        let hide_after = self.hide_after;
        let task = runtime.spawn(async move {
            tokio::time::sleep(hide_after).await;
            surface.hide_notice();
        });

        *self.hide_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSurface;

    fn notifier() -> (Arc<RecordingSurface>, Notifier) {
        let surface = Arc::new(RecordingSurface::default());
        let notifier = Notifier::new(surface.clone(), Duration::from_secs(5));
        (surface, notifier)
    }

    #[test]
    fn escape_html_replaces_markup() {
        assert_eq!(
            escape_html("<b>\"Tom's\" & co</b>"),
            "&lt;b&gt;&quot;Tom&#39;s&quot; &amp; co&lt;/b&gt;"
        );
    }

    #[test]
    fn unsafe_flash_is_escaped() {
        let (surface, notifier) = notifier();
        notifier.show_flash("<script>alert(1)</script>", false);
        assert_eq!(surface.flashes(), vec!["&lt;script&gt;alert(1)&lt;/script&gt;".to_string()]);
    }

    #[test]
    fn safe_flash_is_shown_verbatim() {
        let (surface, notifier) = notifier();
        notifier.show_flash("<a href=\"/billing\">Renew</a>", true);
        assert_eq!(surface.flashes(), vec!["<a href=\"/billing\">Renew</a>".to_string()]);
    }

    #[test]
    fn repeated_flash_is_not_redisplayed() {
        let (surface, notifier) = notifier();
        notifier.show_flash("Subscription expiring", false);
        notifier.show_flash("Subscription expiring", false);
        assert_eq!(surface.flashes().len(), 1);
        assert_eq!(surface.flash_hides(), 0);

        notifier.show_flash("Subscription expired", false);
        assert_eq!(surface.flashes().len(), 2);
        assert_eq!(surface.flash_hides(), 1);
    }

    #[test]
    fn hide_flash_only_hides_a_displayed_flash() {
        let (surface, notifier) = notifier();
        notifier.hide_flash();
        assert_eq!(surface.flash_hides(), 0);

        notifier.show_flash("hello", false);
        notifier.hide_flash();
        assert_eq!(surface.flash_hides(), 1);
        assert!(notifier.current_flash().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn notice_hides_after_delay() {
        let (surface, notifier) = notifier();
        notifier.show_notice("Saved");
        assert_eq!(surface.notices(), vec!["Saved".to_string()]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(surface.notice_hides(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notice_stays_while_awaiting_device_ack() {
        let (surface, notifier) = notifier();
        notifier.set_awaiting_device_ack(true);
        notifier.show_notice("Command sent, waiting for pump");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(surface.notice_hides(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_notice_restarts_hide_timer() {
        let (surface, notifier) = notifier();
        notifier.show_notice("first");
        tokio::time::sleep(Duration::from_secs(4)).await;
        notifier.show_notice("second");
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(surface.notice_hides(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(surface.notice_hides(), 1);
    }
}
